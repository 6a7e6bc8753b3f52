//! Stub accrual service for testing.
//!
//! Returns pre-programmed outcomes without making network calls.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use loyalty_domain::{AccrualOutcome, OrderNumber};

use crate::ports::AccrualPort;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stub accrual service for testing.
///
/// Each order has a queue of outcomes. Calls pop from the queue and the
/// last entry repeats forever. Orders without a script get the default
/// outcome (`NotFound` unless changed).
pub struct ScriptedAccrual {
    /// Outcome queues by order number
    scripts: Mutex<HashMap<OrderNumber, VecDeque<AccrualOutcome>>>,
    /// Outcome for unscripted orders
    default_outcome: Mutex<AccrualOutcome>,
    /// Orders whose request never completes
    hanging: Mutex<HashSet<OrderNumber>>,
    /// Every number queried, in call order
    calls: Mutex<Vec<OrderNumber>>,
}

impl ScriptedAccrual {
    /// Create a stub that answers `NotFound` for everything.
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_outcome: Mutex::new(AccrualOutcome::NotFound),
            hanging: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes for one order.
    pub fn script(&self, number: &OrderNumber, outcomes: impl IntoIterator<Item = AccrualOutcome>) {
        lock(&self.scripts)
            .entry(number.clone())
            .or_default()
            .extend(outcomes);
    }

    /// Change the outcome for unscripted orders.
    pub fn set_default(&self, outcome: AccrualOutcome) {
        *lock(&self.default_outcome) = outcome;
    }

    /// Make requests for `number` hang until the caller gives up.
    pub fn hang_on(&self, number: &OrderNumber) {
        lock(&self.hanging).insert(number.clone());
    }

    /// Numbers queried so far, in call order.
    pub fn calls(&self) -> Vec<OrderNumber> {
        lock(&self.calls).clone()
    }

    /// How many requests were made.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// How many requests were made for one order.
    pub fn calls_for(&self, number: &OrderNumber) -> usize {
        lock(&self.calls).iter().filter(|n| *n == number).count()
    }

    fn next_outcome(&self, number: &OrderNumber) -> AccrualOutcome {
        let mut scripts = lock(&self.scripts);
        match scripts.get_mut(number) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(AccrualOutcome::NotFound),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => lock(&self.default_outcome).clone(),
        }
    }
}

impl Default for ScriptedAccrual {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccrualPort for ScriptedAccrual {
    async fn fetch(&self, number: &OrderNumber) -> AccrualOutcome {
        lock(&self.calls).push(number.clone());

        let hangs = lock(&self.hanging).contains(number);
        if hangs {
            tracing::debug!(order = %number, "Stub: request hanging");
            std::future::pending::<()>().await;
        }

        self.next_outcome(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_domain::{Amount, AccrualStatus};

    fn number(raw: &str) -> OrderNumber {
        OrderNumber::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_last_scripted_outcome_repeats() {
        let stub = ScriptedAccrual::new();
        let order = number("12345678903");
        let amount = Amount::from_minor(100).unwrap();
        let processed = AccrualOutcome::settled(AccrualStatus::Processed, Some(amount));
        stub.script(&order, [AccrualOutcome::NotFound, processed.clone()]);

        assert_eq!(stub.fetch(&order).await, AccrualOutcome::NotFound);
        assert_eq!(stub.fetch(&order).await, processed);
        assert_eq!(stub.fetch(&order).await, processed);
        assert_eq!(stub.calls_for(&order), 3);
    }

    #[tokio::test]
    async fn test_unscripted_uses_default() {
        let stub = ScriptedAccrual::new();
        let order = number("79927398713");

        assert_eq!(stub.fetch(&order).await, AccrualOutcome::NotFound);
        stub.set_default(AccrualOutcome::ServiceUnavailable);
        assert_eq!(stub.fetch(&order).await, AccrualOutcome::ServiceUnavailable);
        assert_eq!(stub.calls(), vec![order.clone(), order]);
    }
}
