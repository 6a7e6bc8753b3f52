//! Accrual client against an in-process fake service.

use std::time::Duration;

use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use loyalty_connectors::AccrualRestClient;
use loyalty_domain::{AccrualOutcome, AccrualStatus, Amount, OrderNumber};
use serde_json::json;
use tokio::net::TcpListener;

const ORDER: &str = "12345678903";

/// Serve `router` on an ephemeral loopback port and return its base URL.
async fn spawn_service(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Fake service answering every order with the same response.
async fn service_with<F, R>(respond: F) -> AccrualRestClient
where
    F: Fn(String) -> R + Clone + Send + Sync + 'static,
    R: IntoResponse + 'static,
{
    let router = Router::new().route(
        "/api/orders/:number",
        get(move |Path(number): Path<String>| {
            let respond = respond.clone();
            async move { respond(number) }
        }),
    );
    let base = spawn_service(router).await;
    AccrualRestClient::new(&base, Duration::from_millis(500)).unwrap()
}

fn order() -> OrderNumber {
    OrderNumber::parse(ORDER).unwrap()
}

#[tokio::test]
async fn test_processed_with_accrual() {
    let client = service_with(|number| {
        Json(json!({ "order": number, "status": "PROCESSED", "accrual": 500.5 }))
    })
    .await;

    let outcome = client.fetch(&order()).await;

    assert_eq!(
        outcome,
        AccrualOutcome::Settled {
            status: AccrualStatus::Processed,
            amount: Some(Amount::from_minor(50_050).unwrap()),
        }
    );
}

#[tokio::test]
async fn test_fractional_cents_are_rounded() {
    let client = service_with(|number| {
        Json(json!({ "order": number, "status": "PROCESSED", "accrual": 729.98 }))
    })
    .await;

    let outcome = client.fetch(&order()).await;

    assert_eq!(
        outcome,
        AccrualOutcome::Settled {
            status: AccrualStatus::Processed,
            amount: Some(Amount::from_minor(72_998).unwrap()),
        }
    );
}

#[tokio::test]
async fn test_non_terminal_statuses() {
    for (wire, expected) in [
        ("REGISTERED", AccrualStatus::Registered),
        ("PROCESSING", AccrualStatus::Processing),
        ("INVALID", AccrualStatus::Invalid),
    ] {
        let client =
            service_with(move |number| Json(json!({ "order": number, "status": wire }))).await;

        let outcome = client.fetch(&order()).await;

        assert_eq!(outcome, AccrualOutcome::Settled { status: expected, amount: None });
    }
}

#[tokio::test]
async fn test_no_content_is_not_found() {
    let client = service_with(|_| StatusCode::NO_CONTENT).await;

    assert_eq!(client.fetch(&order()).await, AccrualOutcome::NotFound);
}

#[tokio::test]
async fn test_rate_limited_with_header() {
    let client = service_with(|_| {
        (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "60")],
            "No more than 10 requests per minute allowed",
        )
    })
    .await;

    assert_eq!(
        client.fetch(&order()).await,
        AccrualOutcome::RateLimited { retry_after: Some(Duration::from_secs(60)) }
    );
}

#[tokio::test]
async fn test_rate_limited_with_json_body() {
    let client = service_with(|_| {
        (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "retry_after": 15 })))
    })
    .await;

    assert_eq!(
        client.fetch(&order()).await,
        AccrualOutcome::RateLimited { retry_after: Some(Duration::from_secs(15)) }
    );
}

#[tokio::test]
async fn test_rate_limited_without_hint() {
    let client = service_with(|_| StatusCode::TOO_MANY_REQUESTS).await;

    assert_eq!(
        client.fetch(&order()).await,
        AccrualOutcome::RateLimited { retry_after: None }
    );
}

#[tokio::test]
async fn test_server_errors_are_unavailable() {
    for status in [StatusCode::INTERNAL_SERVER_ERROR, StatusCode::SERVICE_UNAVAILABLE] {
        let client = service_with(move |_| status).await;

        assert_eq!(client.fetch(&order()).await, AccrualOutcome::ServiceUnavailable);
    }
}

#[tokio::test]
async fn test_unusable_bodies_are_transport_failures() {
    let malformed = service_with(|_| "not json").await;
    let mismatched = service_with(|_| {
        Json(json!({ "order": "79927398713", "status": "PROCESSED", "accrual": 1 }))
    })
    .await;
    let negative = service_with(|number| {
        Json(json!({ "order": number, "status": "PROCESSED", "accrual": -5 }))
    })
    .await;
    let unexpected = service_with(|_| StatusCode::NOT_FOUND).await;

    for client in [malformed, mismatched, negative, unexpected] {
        let outcome = client.fetch(&order()).await;
        assert!(
            matches!(outcome, AccrualOutcome::TransportFailure { .. }),
            "got {:?}",
            outcome
        );
    }
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let router = Router::new().route(
        "/api/orders/:number",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::NO_CONTENT
        }),
    );
    let base = spawn_service(router).await;
    let client = AccrualRestClient::new(&base, Duration::from_millis(100)).unwrap();

    let started = std::time::Instant::now();
    let outcome = client.fetch(&order()).await;

    assert!(matches!(outcome, AccrualOutcome::TransportFailure { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let client =
        AccrualRestClient::new(&format!("http://{}", addr), Duration::from_millis(500)).unwrap();

    let outcome = client.fetch(&order()).await;

    assert!(matches!(outcome, AccrualOutcome::TransportFailure { .. }));
}
