//! Authenticated calls to the merchant API
//!
//! Thin wrapper over the vendor's order/menu endpoints: obtain a valid
//! token from the guard, attach it as a bearer credential, send. The guard
//! can believe a token valid that the vendor has revoked out-of-band, so on
//! a 401 the wrapper forces one renewal and retries exactly once. A second
//! 401 surfaces as `AuthenticationRejected`; anything else is handed back
//! to the caller untouched.

use std::sync::Arc;

use reqwest::Method;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::guard::TokenGuard;

/// A vendor response the wrapper does not interpret.
///
/// `body` is `Null` when the vendor returned an empty or non-JSON body
/// (order actions answer 202 with no content).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Bearer-authenticated client for the merchant API.
pub struct MerchantApi {
    guard: Arc<TokenGuard>,
    client: reqwest::Client,
    api_base_url: String,
}

impl MerchantApi {
    pub fn new(guard: Arc<TokenGuard>, client: reqwest::Client) -> Self {
        let api_base_url = guard.vendor().api_base_url.clone();
        Self {
            guard,
            client,
            api_base_url,
        }
    }

    /// Issue an authenticated request.
    ///
    /// `path` is relative to the merchant API base URL. The single retry
    /// passes the rejected token to the guard so a concurrent renewal is
    /// reused instead of repeated.
    pub async fn call(
        &self,
        merchant_id: &str,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse> {
        let token = self.guard.get_valid_access_token(merchant_id).await?;
        let response = self.execute(method.clone(), path, body, &token).await?;
        if response.status != 401 {
            return Ok(response);
        }

        warn!(merchant_id, path, "vendor rejected a token believed valid, forcing renewal");
        metrics::counter!("merchant_api_forced_renewals_total").increment(1);
        let token = self.guard.force_renew(merchant_id, Some(&token)).await?;

        let retry = self.execute(method, path, body, &token).await?;
        if retry.status == 401 {
            return Err(Error::AuthenticationRejected {
                merchant_id: merchant_id.to_string(),
            });
        }
        Ok(retry)
    }

    /// List orders, with optional status/limit filters.
    pub async fn get_orders(
        &self,
        merchant_id: &str,
        filters: &[(&str, String)],
    ) -> Result<ApiResponse> {
        let mut path = String::from("/orders");
        for (i, (key, value)) in filters.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            path.push_str(&format!("{sep}{key}={value}"));
        }
        self.call(merchant_id, Method::GET, &path, None).await
    }

    /// Fetch the merchant's menu.
    pub async fn get_menu(&self, merchant_id: &str) -> Result<ApiResponse> {
        self.call(merchant_id, Method::GET, "/menu", None).await
    }

    /// Fetch full details for a single order.
    pub async fn get_order_details(&self, merchant_id: &str, order_id: &str) -> Result<ApiResponse> {
        self.call(
            merchant_id,
            Method::GET,
            &format!("/order/v1.0/orders/{order_id}"),
            None,
        )
        .await
    }

    /// Confirm a placed order.
    pub async fn confirm_order(&self, merchant_id: &str, order_id: &str) -> Result<ApiResponse> {
        self.call(
            merchant_id,
            Method::POST,
            &format!("/order/v1.0/orders/{order_id}/confirm"),
            None,
        )
        .await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<ApiResponse> {
        let url = format!("{}{}", self.api_base_url, path);
        let mut request = self.client.request(method, &url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(format!("merchant API request failed: {e}")))?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
        debug!(status, url, "merchant API response");
        metrics::counter!("merchant_api_requests_total", "status" => status.to_string())
            .increment(1);
        Ok(ApiResponse { status, body })
    }
}
