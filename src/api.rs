//! REST API server for the Bitcoin analyst
//!
//! Exposes analysis, relay and price lookups over HTTP for a front end.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::pipeline::AnalysisPipeline;
use crate::relay::TelegramRelay;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalyzeRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RelayRequest {
    pub message: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub relay: Option<Arc<TelegramRelay>>,
}

type ApiResult = (StatusCode, Json<ApiResponse>);

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn analyze(State(state): State<ApiState>, Json(req): Json<AnalyzeRequest>) -> ApiResult {
    let query = req.query.trim();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Query must not be empty".into())),
        );
    }

    info!("Received analysis request: {}", query);

    match state.pipeline.run_analysis(query).await {
        Ok(report) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "analysis": report.formatted.html,
                "title": report.formatted.title,
                "plain": report.formatted.plain,
                "ledger": report.ledger.entries(),
                "run_id": report.ledger.run_id,
            }))),
        ),
        Err(e) => {
            error!(error = %e, "Analysis request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to perform analysis".into()).with_details(e.to_string())),
            )
        }
    }
}

/// =============================
/// Relay Endpoint
/// =============================

async fn relay_message(State(state): State<ApiState>, Json(req): Json<RelayRequest>) -> ApiResult {
    let Some(relay) = state.relay.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("Telegram relay is not configured".into())),
        );
    };

    match relay.relay(&req.message).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "success": true }))),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::error("Failed to send to Telegram".into()).with_details(e.to_string())),
        ),
    }
}

/// =============================
/// Price Endpoint
/// =============================

async fn current_price(State(state): State<ApiState>) -> ApiResult {
    match state.pipeline.current_price().await {
        Ok(price) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "price": price }))),
        ),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::error("Failed to fetch Bitcoin price".into()).with_details(e.to_string())),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(pipeline: Arc<AnalysisPipeline>, relay: Option<Arc<TelegramRelay>>) -> Router {
    let state = ApiState { pipeline, relay };

    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/relay", post(relay_message))
        .route("/api/price", get(current_price))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    pipeline: Arc<AnalysisPipeline>,
    relay: Option<Arc<TelegramRelay>>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(pipeline, relay);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use crate::market::CoinGeckoClient;
    use crate::retry::{RetryPolicy, RetryableFetcher};
    use crate::testing::{ScriptedModel, ScriptedTransport};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router(transport: Arc<ScriptedTransport>, with_relay: bool) -> Router {
        let fetcher = RetryableFetcher::new(transport.clone(), RetryPolicy::new(3, Duration::ZERO));
        let market = Arc::new(CoinGeckoClient::new(fetcher, "http://cg/api/v3"));
        let pipeline = Arc::new(AnalysisPipeline::new(market, Arc::new(ScriptedModel::new())));
        let relay = with_relay.then(|| {
            Arc::new(TelegramRelay::new(transport, "123:abc".into(), "-1001".into(), "http://tg"))
        });
        create_router(pipeline, relay)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(Arc::new(ScriptedTransport::new()), false);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_analyze_returns_formatted_analysis() {
        let transport = Arc::new(ScriptedTransport::new().with_healthy_market());
        let response = router(transport, false)
            .oneshot(post_json("/api/analyze", serde_json::json!({"query": "Should I buy BTC?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["title"], "Bitcoin Decision Helper");
        assert!(body["data"]["analysis"].as_str().unwrap().contains("analysis-container"));
        assert_eq!(body["data"]["ledger"].as_array().unwrap().len(), 5);
        assert_eq!(body["data"]["ledger"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_analyze_rejects_empty_query() {
        let response = router(Arc::new(ScriptedTransport::new()), false)
            .oneshot(post_json("/api/analyze", serde_json::json!({"query": "   "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_failure_carries_details() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route_always("/simple/price", HttpResponse::new(500, "boom"));

        let response = router(transport, false)
            .oneshot(post_json("/api/analyze", serde_json::json!({"query": "q"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Failed to perform analysis");
        assert!(body["details"].as_str().unwrap().contains("collecting market data"));
    }

    #[tokio::test]
    async fn test_relay_unconfigured_is_503() {
        let response = router(Arc::new(ScriptedTransport::new()), false)
            .oneshot(post_json("/api/relay", serde_json::json!({"message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_relay_sends_message() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route_always("/sendMessage", HttpResponse::new(200, r#"{"ok":true}"#));

        let response = router(transport.clone(), true)
            .oneshot(post_json("/api/relay", serde_json::json!({"message": "hi"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["success"], true);
        assert_eq!(transport.requests_to("/sendMessage"), 1);
    }

    #[tokio::test]
    async fn test_price() {
        let transport = Arc::new(ScriptedTransport::new().with_healthy_market());
        let response = router(transport, false)
            .oneshot(Request::builder().uri("/api/price").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["price"], "65000");
    }
}
