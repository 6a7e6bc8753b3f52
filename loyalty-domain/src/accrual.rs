//! Outcomes of querying the external accrual service.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::entities::OrderStatus;
use crate::value_objects::Amount;

/// Status as reported by the accrual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    /// Known to the service, calculation not started
    Registered,
    /// Calculation in progress
    Processing,
    /// Order rejected; no reward
    Invalid,
    /// Reward computed
    Processed,
}

impl AccrualStatus {
    /// Translate to the internal order status (`Registered` becomes `New`).
    pub fn to_order_status(self) -> OrderStatus {
        match self {
            AccrualStatus::Registered => OrderStatus::New,
            AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processed => OrderStatus::Processed,
        }
    }
}

impl fmt::Display for AccrualStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccrualStatus::Registered => "REGISTERED",
            AccrualStatus::Processing => "PROCESSING",
            AccrualStatus::Invalid => "INVALID",
            AccrualStatus::Processed => "PROCESSED",
        };
        f.write_str(s)
    }
}

/// Classified result of one request to the accrual service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// Service returned a verdict; `amount` only for `Processed`
    Settled {
        /// External status
        status: AccrualStatus,
        /// Reward in minor units
        amount: Option<Amount>,
    },
    /// Service does not know the order yet
    NotFound,
    /// Backpressure: stop querying until the hint (or default cooldown) elapses
    RateLimited {
        /// Interval advertised by the service, if any
        retry_after: Option<Duration>,
    },
    /// Service-side failure (5xx)
    ServiceUnavailable,
    /// Request could not be completed or the response was unusable
    TransportFailure {
        /// Human-readable cause, for logs
        reason: String,
    },
}

impl AccrualOutcome {
    /// Build a `Settled` outcome, dropping any amount for non-`Processed` statuses.
    pub fn settled(status: AccrualStatus, amount: Option<Amount>) -> Self {
        let amount = match status {
            AccrualStatus::Processed => Some(amount.unwrap_or(Amount::ZERO)),
            _ => None,
        };
        AccrualOutcome::Settled { status, amount }
    }

    /// Build a `TransportFailure` from any displayable cause.
    pub fn transport(reason: impl fmt::Display) -> Self {
        AccrualOutcome::TransportFailure {
            reason: reason.to_string(),
        }
    }

    /// Short label for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            AccrualOutcome::Settled { .. } => "settled",
            AccrualOutcome::NotFound => "not_found",
            AccrualOutcome::RateLimited { .. } => "rate_limited",
            AccrualOutcome::ServiceUnavailable => "service_unavailable",
            AccrualOutcome::TransportFailure { .. } => "transport_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_maps_to_new() {
        assert_eq!(AccrualStatus::Registered.to_order_status(), OrderStatus::New);
        assert_eq!(AccrualStatus::Processing.to_order_status(), OrderStatus::Processing);
        assert_eq!(AccrualStatus::Invalid.to_order_status(), OrderStatus::Invalid);
        assert_eq!(AccrualStatus::Processed.to_order_status(), OrderStatus::Processed);
    }

    #[test]
    fn test_status_deserializes_from_wire_names() {
        let status: AccrualStatus = serde_json::from_str("\"REGISTERED\"").unwrap();
        assert_eq!(status, AccrualStatus::Registered);
        assert!(serde_json::from_str::<AccrualStatus>("\"NEW\"").is_err());
    }

    #[test]
    fn test_settled_drops_amount_unless_processed() {
        let amount = Some(Amount::from_minor(100).unwrap());

        assert_eq!(
            AccrualOutcome::settled(AccrualStatus::Processing, amount),
            AccrualOutcome::Settled {
                status: AccrualStatus::Processing,
                amount: None
            }
        );
        assert_eq!(
            AccrualOutcome::settled(AccrualStatus::Processed, None),
            AccrualOutcome::Settled {
                status: AccrualStatus::Processed,
                amount: Some(Amount::ZERO)
            }
        );
    }
}
