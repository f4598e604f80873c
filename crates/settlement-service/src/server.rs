//! HTTP API server.
//!
//! Every mutating route acts as the service's configured account. Failures
//! render the engine's [`FailureOutcome`] with a status code chosen by its
//! kind.

use alloy::primitives::B256;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use serde::Deserialize;
use settlement_config::ApiConfig;
use settlement_core::engine::{CreateOrderRequest, PublishBidRequest};
use settlement_core::lifecycle::TransitionOutcome;
use settlement_core::{EngineError, ErrorKind, FailureOutcome, SettlementEngine};
use settlement_types::{Bid, DeadlineSignal, Order};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
	engine: Arc<SettlementEngine>,
}

/// Engine failure rendered as a [`FailureOutcome`].
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
	fn from(error: EngineError) -> Self {
		Self(error)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let outcome: FailureOutcome = self.0.outcome();
		let status = status_for(outcome.kind);
		if status.is_server_error() {
			warn!(kind = ?outcome.kind, reason = %outcome.reason, "Request failed");
		}
		(status, Json(outcome)).into_response()
	}
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
	match kind {
		ErrorKind::Validation => StatusCode::BAD_REQUEST,
		ErrorKind::Authorization => StatusCode::FORBIDDEN,
		ErrorKind::Funding => StatusCode::PAYMENT_REQUIRED,
		ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
		ErrorKind::ProtocolViolation => StatusCode::INTERNAL_SERVER_ERROR,
		ErrorKind::NotFound => StatusCode::NOT_FOUND,
	}
}

pub fn router(engine: Arc<SettlementEngine>) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/bids", post(publish_bid))
		.route("/bids/{bid_hash}/cancel", post(cancel_bid))
		.route("/orders", post(create_order))
		.route("/orders/{order_id}/paid", post(mark_paid))
		.route("/orders/{order_id}/confirm", post(confirm_release))
		.route("/orders/{order_id}/cancel", post(request_cancel))
		.route("/orders/{order_id}/cancellation", post(finalize_cancellation))
		.route("/orders/{order_id}/dispute", post(open_dispute))
		.route("/orders/{order_id}/signals", get(deadline_signals))
		.with_state(AppState { engine })
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

pub async fn serve(engine: Arc<SettlementEngine>, config: &ApiConfig) -> anyhow::Result<()> {
	let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
	info!(host = %config.host, port = config.port, "API server listening");
	axum::serve(listener, router(engine)).await?;
	Ok(())
}

fn parse_hash(value: &str) -> Result<B256, ApiError> {
	B256::from_str(value)
		.map_err(|e| EngineError::Validation(format!("invalid hash {}: {}", value, e)).into())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
	let operator = state
		.engine
		.operator_actor()
		.await
		.ok()
		.map(|actor| actor.address);
	Json(serde_json::json!({
		"status": "ok",
		"name": state.engine.config().engine.name,
		"operator": operator,
		"chains": state.engine.registry().chain_ids(),
	}))
}

async fn publish_bid(
	State(state): State<AppState>,
	Json(request): Json<PublishBidRequest>,
) -> Result<(StatusCode, Json<Bid>), ApiError> {
	let actor = state.engine.operator_actor().await?;
	let bid = state.engine.publish_bid(&actor, request).await?;
	Ok((StatusCode::CREATED, Json(bid)))
}

async fn cancel_bid(
	State(state): State<AppState>,
	Path(bid_hash): Path<String>,
) -> Result<Json<Bid>, ApiError> {
	let bid_hash = parse_hash(&bid_hash)?;
	let actor = state.engine.operator_actor().await?;
	Ok(Json(state.engine.cancel_bid(&actor, &bid_hash).await?))
}

async fn create_order(
	State(state): State<AppState>,
	Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
	let actor = state.engine.operator_actor().await?;
	let order = state.engine.create_order(&actor, request).await?;
	Ok((StatusCode::CREATED, Json(order)))
}

async fn mark_paid(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Json<TransitionOutcome>, ApiError> {
	let order_id = parse_hash(&order_id)?;
	let actor = state.engine.operator_actor().await?;
	Ok(Json(state.engine.mark_paid(&actor, &order_id).await?))
}

async fn confirm_release(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Json<TransitionOutcome>, ApiError> {
	let order_id = parse_hash(&order_id)?;
	let actor = state.engine.operator_actor().await?;
	Ok(Json(
		state.engine.confirm_and_release(&actor, &order_id).await?,
	))
}

async fn request_cancel(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Json<TransitionOutcome>, ApiError> {
	let order_id = parse_hash(&order_id)?;
	let actor = state.engine.operator_actor().await?;
	Ok(Json(state.engine.request_cancel(&actor, &order_id).await?))
}

#[derive(Debug, Deserialize)]
struct CancellationBody {
	tx_hash: B256,
}

async fn finalize_cancellation(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	Json(body): Json<CancellationBody>,
) -> Result<Json<TransitionOutcome>, ApiError> {
	let order_id = parse_hash(&order_id)?;
	let actor = state.engine.operator_actor().await?;
	Ok(Json(
		state
			.engine
			.finalize_cancellation(&actor, &order_id, &body.tx_hash)
			.await?,
	))
}

async fn open_dispute(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Json<TransitionOutcome>, ApiError> {
	let order_id = parse_hash(&order_id)?;
	let actor = state.engine.operator_actor().await?;
	Ok(Json(state.engine.open_dispute(&actor, &order_id).await?))
}

async fn deadline_signals(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Json<Vec<DeadlineSignal>>, ApiError> {
	let order_id = parse_hash(&order_id)?;
	Ok(Json(state.engine.deadline_signals(&order_id).await?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::service::{build_engine, tests::config};
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use tower::ServiceExt;

	fn app() -> Router {
		router(Arc::new(build_engine(config("memory")).unwrap()))
	}

	async fn body_json(response: Response) -> serde_json::Value {
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&bytes).unwrap()
	}

	fn post(uri: &str) -> Request<Body> {
		Request::builder()
			.method("POST")
			.uri(uri)
			.body(Body::empty())
			.unwrap()
	}

	#[test]
	fn test_status_by_kind() {
		assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
		assert_eq!(status_for(ErrorKind::Authorization), StatusCode::FORBIDDEN);
		assert_eq!(status_for(ErrorKind::Funding), StatusCode::PAYMENT_REQUIRED);
		assert_eq!(status_for(ErrorKind::Transient), StatusCode::SERVICE_UNAVAILABLE);
		assert_eq!(
			status_for(ErrorKind::ProtocolViolation),
			StatusCode::INTERNAL_SERVER_ERROR
		);
		assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_health_reports_operator_and_chains() {
		let response = app()
			.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let body = body_json(response).await;
		assert_eq!(body["status"], "ok");
		assert_eq!(body["chains"], serde_json::json!([137]));
		assert_eq!(
			body["operator"].as_str().unwrap().to_lowercase(),
			"0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
		);
	}

	#[tokio::test]
	async fn test_unknown_order_renders_failure_outcome() {
		let uri = format!("/orders/{}/paid", B256::repeat_byte(9));
		let response = app().oneshot(post(&uri)).await.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
		let body = body_json(response).await;
		assert_eq!(body["succeeded"], false);
		assert_eq!(body["kind"], "not_found");
	}

	#[tokio::test]
	async fn test_malformed_hash_is_a_validation_failure() {
		let response = app().oneshot(post("/bids/0x1234/cancel")).await.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		let body = body_json(response).await;
		assert_eq!(body["kind"], "validation");
	}

	#[tokio::test]
	async fn test_unknown_bid_cancel_is_not_found() {
		let uri = format!("/bids/{}/cancel", B256::repeat_byte(3));
		let response = app().oneshot(post(&uri)).await.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}
}
