//! HTTP surface of the integration service
//!
//! Endpoints:
//! - POST   /integrations/{merchant_id}/authorization           — begin the device-code flow
//! - POST   /integrations/{merchant_id}/authorization/complete  — exchange the approved code
//! - GET    /integrations/{merchant_id}/status                  — authorization state
//! - POST   /integrations/{merchant_id}/refresh                 — forced token renewal
//! - DELETE /integrations/{merchant_id}                         — revoke
//! - GET    /integrations/{merchant_id}/orders                  — authenticated passthrough
//! - GET    /integrations/{merchant_id}/menu                    — authenticated passthrough
//! - POST   /webhooks/events                                    — event ingress (fast ack)
//! - GET    /health, GET /metrics

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Json;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tracing::{info, warn};

use ifood_auth::{Error as AuthError, StoreError, device, epoch_ms, token};
use ifood_guard::{EventDispatcher, MerchantApi, MerchantEvent, TokenGuard};

use crate::error::ApiError;

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<TokenGuard>,
    pub api: Arc<MerchantApi>,
    pub dispatcher: Arc<EventDispatcher>,
    pub prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route(
            "/integrations/{merchant_id}/authorization",
            post(begin_authorization),
        )
        .route(
            "/integrations/{merchant_id}/authorization/complete",
            post(complete_authorization),
        )
        .route("/integrations/{merchant_id}/status", get(integration_status))
        .route("/integrations/{merchant_id}/refresh", post(refresh_token))
        .route("/integrations/{merchant_id}", delete(revoke_integration))
        .route("/integrations/{merchant_id}/orders", get(list_orders))
        .route("/integrations/{merchant_id}/menu", get(fetch_menu))
        .route("/webhooks/events", post(ingest_event))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Optional body for begin/complete: binds the internal restaurant.
#[derive(Debug, Default, Deserialize)]
struct BindingRequest {
    restaurant_id: Option<String>,
}

/// POST /integrations/{merchant_id}/authorization
///
/// Asks the vendor for a user code and stores it as the merchant's pending
/// record. Calling again before completion replaces the previous pending
/// state: the old verifier is gone, only the newest code can complete.
async fn begin_authorization(
    State(state): State<AppState>,
    Path(merchant_id): Path<String>,
    body: Option<Json<BindingRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let binding = body.map(|Json(b)| b).unwrap_or_default();

    let grant = device::request_user_code(state.guard.http_client(), state.guard.vendor()).await?;
    let pending = state
        .guard
        .store()
        .begin_pending(&merchant_id, &grant, binding.restaurant_id)
        .await?;

    info!(merchant_id, user_code = %pending.user_code, "authorization flow initiated");

    Ok(Json(serde_json::json!({
        "merchant_id": merchant_id,
        "user_code": pending.user_code,
        "code_verifier": pending.verifier,
        "verification_url": pending.verification_url,
        "verification_url_complete": pending.verification_url_complete,
        "expires_in": pending.code_expires_in,
        "instructions": "Enter the user code in the vendor partner portal, then call authorization/complete",
    })))
}

/// POST /integrations/{merchant_id}/authorization/complete
///
/// Exchanges the stored verifier for tokens once the merchant has approved
/// in the portal, and transitions the record to authorized. Tokens are
/// persisted, never echoed back.
async fn complete_authorization(
    State(state): State<AppState>,
    Path(merchant_id): Path<String>,
    body: Option<Json<BindingRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let binding = body.map(|Json(b)| b).unwrap_or_default();

    let verifier = match state.guard.store().get(&merchant_id).await {
        Some(ifood_auth::IntegrationRecord::Pending(p)) => p.verifier,
        Some(other) => {
            return Err(StoreError::InvalidMerchantRef(format!(
                "merchant {merchant_id} is {}, expected a pending authorization",
                other.state_label()
            ))
            .into());
        }
        None => {
            return Err(StoreError::InvalidMerchantRef(format!(
                "merchant {merchant_id} has no pending authorization"
            ))
            .into());
        }
    };

    let tokens = token::exchange_authorization_code(
        state.guard.http_client(),
        state.guard.vendor(),
        &verifier,
    )
    .await?;

    // The vendor names the merchant the approved code belongs to; a mismatch
    // means the user code was issued for someone else.
    if let Some(vendor_merchant) = tokens.merchant_id.as_deref()
        && vendor_merchant != merchant_id
    {
        warn!(merchant_id, vendor_merchant, "token response names a different merchant");
        return Err(AuthError::Protocol(format!(
            "token response is for merchant {vendor_merchant}, not {merchant_id}"
        ))
        .into());
    }

    let refresh_token = tokens.refresh_token.ok_or_else(|| {
        AuthError::Protocol("authorization exchange returned no refreshToken".into())
    })?;
    let expires_at_ms = epoch_ms() + tokens.expires_in * 1000;

    let authorization = state
        .guard
        .store()
        .complete(
            &merchant_id,
            tokens.access_token,
            refresh_token,
            expires_at_ms,
            binding.restaurant_id,
        )
        .await?;

    info!(merchant_id, expires_at_ms, "authorization completed");

    Ok(Json(serde_json::json!({
        "merchant_id": merchant_id,
        "restaurant_id": authorization.restaurant_id,
        "authorized": true,
        "token_type": tokens.token_type,
        "expires_in": tokens.expires_in,
        "expires_at_ms": authorization.expires_at_ms,
    })))
}

/// GET /integrations/{merchant_id}/status
async fn integration_status(
    State(state): State<AppState>,
    Path(merchant_id): Path<String>,
) -> impl IntoResponse {
    Json(state.guard.status(&merchant_id).await)
}

/// POST /integrations/{merchant_id}/refresh (operator-forced renewal)
async fn refresh_token(
    State(state): State<AppState>,
    Path(merchant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.guard.force_renew(&merchant_id, None).await?;
    let status = state.guard.status(&merchant_id).await;
    Ok(Json(serde_json::json!({
        "message": "token renewed",
        "merchant_id": merchant_id,
        "expires_at_ms": status.expires_at_ms,
    })))
}

/// DELETE /integrations/{merchant_id}
async fn revoke_integration(
    State(state): State<AppState>,
    Path(merchant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state.guard.store().revoke(&merchant_id).await?;
    if !revoked {
        return Err(ApiError::NotFound(format!(
            "no integration record for merchant {merchant_id}"
        )));
    }
    Ok(Json(serde_json::json!({
        "merchant_id": merchant_id,
        "revoked": true,
    })))
}

#[derive(Debug, Deserialize)]
struct OrdersQuery {
    status: Option<String>,
    limit: Option<u32>,
}

/// GET /integrations/{merchant_id}/orders
async fn list_orders(
    State(state): State<AppState>,
    Path(merchant_id): Path<String>,
    Query(query): Query<OrdersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut filters: Vec<(&str, String)> = Vec::new();
    if let Some(status) = query.status {
        filters.push(("status", status));
    }
    if let Some(limit) = query.limit {
        filters.push(("limit", limit.to_string()));
    }

    let response = state.api.get_orders(&merchant_id, &filters).await?;
    if !response.is_success() {
        return Err(AuthError::UpstreamAuth {
            status: response.status,
            body: response.body.to_string(),
        }
        .into());
    }
    Ok(Json(serde_json::json!({
        "merchant_id": merchant_id,
        "orders": response.body,
    })))
}

/// GET /integrations/{merchant_id}/menu
async fn fetch_menu(
    State(state): State<AppState>,
    Path(merchant_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.api.get_menu(&merchant_id).await?;
    if !response.is_success() {
        return Err(AuthError::UpstreamAuth {
            status: response.status,
            body: response.body.to_string(),
        }
        .into());
    }
    Ok(Json(serde_json::json!({
        "merchant_id": merchant_id,
        "menu": response.body,
    })))
}

/// POST /webhooks/events
///
/// Always answers 200 quickly: the synchronous path is one store lookup and
/// one queue push. Everything heavier happens on the background worker.
async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<MerchantEvent>,
) -> impl IntoResponse {
    let ack = state.dispatcher.handle_event(event).await;
    Json(ack)
}

/// GET /health
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.guard.store().summary().await;
    Json(serde_json::json!({
        "status": "ok",
        "integrations": summary,
    }))
}

/// GET /metrics — Prometheus text exposition format.
async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
