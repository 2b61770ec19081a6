//! Routewatch - payment route failure prediction and on-call escalation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ROUTEWATCH                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────┐  ┌──────────────────────┐ │
//! │  │  API      │  │  Prediction  │  │  Scheduler           │ │
//! │  │  (Axum)   │  │  Service     │  │  (risk/retry sweeps) │ │
//! │  └─────┬─────┘  └──────┬───────┘  └──────────┬───────────┘ │
//! │        │               ▼                     ▼              │
//! │        │        ┌──────────────────────────────────┐       │
//! │        └──────▶ │  Risk Orchestrator (escalation)  │       │
//! │                 └──────────────┬───────────────────┘       │
//! │                                ▼                            │
//! │             ┌─────────────┐   ┌───────────────────┐        │
//! │             │ PostgreSQL  │   │ Notification relays│        │
//! │             └─────────────┘   └───────────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod escalation;
pub mod handlers;
pub mod models;
pub mod prediction;
pub mod scheduler;
pub mod store;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use error::{AppError, AppResult};

use escalation::RiskOrchestrator;
use prediction::PredictionService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub predictions: Arc<PredictionService>,
    pub orchestrator: Arc<RiskOrchestrator>,
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    let prediction_routes = Router::new()
        .route(
            "/api/v1/failure-prediction",
            get(handlers::predictions::get_predictions).post(handlers::predictions::post_predictions),
        )
        .route("/api/v1/failure-prediction/dashboard", get(handlers::predictions::dashboard))
        .route("/api/v1/failure-prediction/merchants/at-risk", get(handlers::predictions::merchants_at_risk))
        .route("/api/v1/failure-prediction/providers/at-risk", get(handlers::predictions::providers_at_risk))
        .route("/api/v1/failure-prediction/top3", get(handlers::predictions::top3))
        .route("/api/v1/failure-prediction/top3/:scope", get(handlers::predictions::top3_scope))
        .route("/api/v1/health-graph", get(handlers::health_graph::get_graph))
        .route("/api/v1/health-graph/critical", get(handlers::health_graph::critical_routes));

    let risk_routes = Router::new()
        .route("/api/v1/risk-notifications", get(handlers::risk_notifications::list))
        .route("/api/v1/risk-notifications/pending", get(handlers::risk_notifications::pending))
        .route("/api/v1/risk-notifications/check-now", post(handlers::risk_notifications::check_now))
        .route("/api/v1/risk-notifications/:id", get(handlers::risk_notifications::get))
        // GET variants serve the links in guard messages
        .route(
            "/api/v1/risk-notifications/:id/dismiss",
            post(handlers::risk_notifications::dismiss).get(handlers::risk_notifications::dismiss_link),
        )
        .route(
            "/api/v1/risk-notifications/:id/propagate",
            post(handlers::risk_notifications::propagate).get(handlers::risk_notifications::propagate),
        )
        .route("/api/v1/risk-notifications/:id/resolve", post(handlers::risk_notifications::resolve));

    Router::new()
        .route("/health", get(handlers::health::check))
        .merge(prediction_routes)
        .merge(risk_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::clock::{Clock, ManualClock};
    use crate::models::{OnCallSchedule, TransactionFact, TxStatus, User};
    use crate::store::{MemoryStore, Stores};

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        guard_id: Uuid,
    }

    fn test_app() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = config::Config::from_lookup(|_| None);

        let guard_id = Uuid::new_v4();
        store.add_user(User {
            id: guard_id,
            name: "Guard".to_string(),
            email: Some("guard@example.com".to_string()),
            phone: None,
            slack_id: None,
            user_type: "YUNO".to_string(),
            active: true,
        });
        store.add_schedule(OnCallSchedule {
            id: Uuid::new_v4(),
            user_id: guard_id,
            priority: 1,
            active: true,
            start_at: None,
            end_at: None,
            created_at: clock.now(),
        });

        let stores = Stores::memory(store.clone());
        let predictions = Arc::new(PredictionService::new(stores.clone(), clock.clone()));
        let orchestrator = Arc::new(RiskOrchestrator::new(
            stores,
            predictions.clone(),
            clock.clone(),
            config.orchestrator_settings(),
        ));

        let router = create_router(AppState { config, predictions, orchestrator });
        TestApp { router, store, clock, guard_id }
    }

    impl TestApp {
        async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            let body = match body {
                Some(json) => {
                    builder = builder.header("content-type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };

            let response = self
                .router
                .clone()
                .oneshot(builder.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }

        fn seed_failing_route(&self) {
            let at = self.clock.now() - Duration::minutes(5);
            self.store.add_transactions((0..30).map(|i| TransactionFact {
                status: if i % 3 == 0 { TxStatus::Declined } else { TxStatus::Error },
                latency_ms: Some(8_000),
                merchant_id: "m1".to_string(),
                provider_id: "p1".to_string(),
                method_id: "card".to_string(),
                country_code: "CO".to_string(),
                date: at,
            }));
        }
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = app.call(Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_invalid_query_is_rejected() {
        let app = test_app();

        let (status, body) = app
            .call(Method::GET, "/api/v1/failure-prediction?time_window_minutes=0", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);

        let (status, _) = app.call(Method::GET, "/api/v1/failure-prediction/top3/banks", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_predictions_over_http() {
        let app = test_app();
        app.seed_failing_route();

        let (status, body) = app
            .call(Method::GET, "/api/v1/failure-prediction/providers/at-risk", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_entities_analyzed"], 1);
        assert_eq!(body["predictions"][0]["entity_id"], "p1");

        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/failure-prediction",
                Some(serde_json::json!({
                    "query": { "entity_type": "merchant" },
                    "config": { "thresholds": { "critical": 0.99 } }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["predictions"][0]["risk_level"], "high");

        let (status, body) = app.call(Method::GET, "/api/v1/failure-prediction/top3/providers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["rank"], 1);
    }

    #[tokio::test]
    async fn test_health_graph_over_http() {
        let app = test_app();
        app.seed_failing_route();
        let at = app.clock.now() - Duration::minutes(10);
        app.store.add_transactions((0..20).map(|_| TransactionFact {
            status: TxStatus::Approved,
            latency_ms: Some(150),
            merchant_id: "m2".to_string(),
            provider_id: "p2".to_string(),
            method_id: "pix".to_string(),
            country_code: "BR".to_string(),
            date: at,
        }));

        let (status, graph) = app.call(Method::GET, "/api/v1/health-graph", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(graph["summary"]["total_routes"], 2);
        assert_eq!(graph["summary"]["ok_routes"], 1);
        assert_eq!(graph["routes"][0]["overall_status"], "critical");
        assert_eq!(graph["routes"][0]["provider"]["id"], "provider-p1");
        assert_eq!(graph["routes"][0]["provider"]["type"], "provider");
        assert_eq!(graph["routes"][0]["edges"].as_array().map(Vec::len), Some(3));

        let (status, critical) = app.call(Method::GET, "/api/v1/health-graph/critical", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(critical["summary"]["total_routes"], 1);
        assert_eq!(critical["routes"][0]["route_id"], "m1|p1|card|CO");

        let (status, _) = app
            .call(Method::GET, "/api/v1/health-graph?critical_error_rate=2", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_notification_is_404() {
        let app = test_app();
        let uri = format!("/api/v1/risk-notifications/{}", Uuid::new_v4());
        let (status, body) = app.call(Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_sweep_then_dismiss_from_link() {
        let app = test_app();
        app.seed_failing_route();

        let (status, report) = app.call(Method::POST, "/api/v1/risk-notifications/check-now", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["created"], 2);

        let (_, page) = app.call(Method::GET, "/api/v1/risk-notifications?limit=10", None).await;
        assert_eq!(page["total"], 2);
        let id = page["items"][0]["id"].as_str().unwrap().to_string();

        let (status, pending) = app.call(Method::GET, "/api/v1/risk-notifications/pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending.as_array().map(Vec::len), Some(2));

        let link = format!(
            "/api/v1/risk-notifications/{}/dismiss?user_id={}&reason=False%20positive",
            id, app.guard_id
        );
        let (status, record) = app.call(Method::GET, &link, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "dismissed");
        assert_eq!(record["dismissal_reason"], "False positive");

        let resolve = format!("/api/v1/risk-notifications/{}/resolve", id);
        let (status, _) = app.call(Method::POST, &resolve, None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/api/v1/risk-notifications/{}/dismiss", id),
                Some(serde_json::json!({ "user_id": app.guard_id, "reason": "" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
