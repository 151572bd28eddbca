//! Lazy token renewal with per-merchant serialization
//!
//! `get_valid_access_token` is the single entry point every authenticated
//! operation calls. Renewal is on-demand: no per-merchant refresh timers,
//! merchants can sit inactive for months, and the first call after expiry
//! pays one extra round trip.
//!
//! Concurrent callers that both observe an expired token must not both hit
//! the vendor: the second renewal would race the first, and a vendor that
//! rotates refresh tokens would invalidate the in-flight one. Each merchant
//! therefore has a renewal mutex: one caller renews, the rest re-read the
//! store after acquiring the lock and leave with the fresh token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ifood_auth::store::Authorization;
use ifood_auth::{IntegrationRecord, IntegrationStore, VendorConfig, epoch_ms, token};

use crate::error::{Error, Result};

/// Default buffer before hard expiry that triggers proactive renewal.
///
/// 30 seconds suits the interactive request path; the per-merchant renewal
/// lock closes the concurrency window, so a larger margin would only renew
/// earlier, not safer.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// Authorization state reported to the boundary layer.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationStatus {
    pub merchant_id: String,
    /// "pending", "authorized", "revoked", or "absent"
    pub state: String,
    pub authenticated: bool,
    /// Whether the stored access token is past the safety margin
    pub token_valid: bool,
    pub expires_at_ms: Option<u64>,
    pub expires_in_secs: Option<i64>,
}

/// Hands out currently-valid access tokens for merchants.
///
/// Dependencies are injected at construction (store, vendor config, HTTP
/// client); there are no ambient globals, so tests substitute a mock vendor.
/// The client carries the outbound timeout; the guard never blocks past it.
pub struct TokenGuard {
    store: Arc<IntegrationStore>,
    vendor: VendorConfig,
    http_client: reqwest::Client,
    safety_margin_ms: u64,
    renewal_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenGuard {
    pub fn new(
        store: Arc<IntegrationStore>,
        vendor: VendorConfig,
        http_client: reqwest::Client,
        safety_margin: Duration,
    ) -> Self {
        Self {
            store,
            vendor,
            http_client,
            safety_margin_ms: safety_margin.as_millis() as u64,
            renewal_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return an access token guaranteed valid for at least the safety margin.
    ///
    /// Fast path: the stored token is fresh and is returned with zero
    /// network calls. Slow path: renew through the per-merchant lock, persist the
    /// new pair, return the new token. A renewal failure leaves the stored
    /// record untouched; the caller may retry later.
    pub async fn get_valid_access_token(&self, merchant_id: &str) -> Result<String> {
        let authorization = self.authorized(merchant_id).await?;
        if !self.expiring(&authorization) {
            debug!(merchant_id, "access token still valid, no renewal");
            return Ok(authorization.access_token);
        }

        let lock = self.renewal_lock(merchant_id).await;
        let _guard = lock.lock().await;

        // Another caller may have renewed while we waited for the lock
        let authorization = self.authorized(merchant_id).await?;
        if !self.expiring(&authorization) {
            debug!(merchant_id, "token renewed by a concurrent caller");
            return Ok(authorization.access_token);
        }

        self.renew(merchant_id, &authorization).await
    }

    /// Renew regardless of the stored expiry.
    ///
    /// Used by the request wrapper when the vendor rejects a token the guard
    /// believed valid (vendor-side revocation), and by the operator-facing
    /// forced refresh. `rejected` is the token the vendor turned down: if
    /// the store already holds a different one, a concurrent caller has
    /// renewed and that token is returned without a vendor call.
    pub async fn force_renew(&self, merchant_id: &str, rejected: Option<&str>) -> Result<String> {
        let lock = self.renewal_lock(merchant_id).await;
        let _guard = lock.lock().await;

        let authorization = self.authorized(merchant_id).await?;
        if let Some(rejected) = rejected
            && authorization.access_token != rejected
        {
            debug!(merchant_id, "rejected token already replaced, skipping renewal");
            return Ok(authorization.access_token);
        }

        self.renew(merchant_id, &authorization).await
    }

    /// Authorization state for the status endpoint. Never triggers a renewal.
    pub async fn status(&self, merchant_id: &str) -> IntegrationStatus {
        let record = self.store.get(merchant_id).await;
        let state = record
            .as_ref()
            .map(|r| r.state_label().to_string())
            .unwrap_or_else(|| "absent".into());
        let (authenticated, token_valid, expires_at_ms, expires_in_secs) = match record {
            Some(IntegrationRecord::Authorized(a)) => {
                let now = epoch_ms();
                (
                    true,
                    now + self.safety_margin_ms < a.expires_at_ms,
                    Some(a.expires_at_ms),
                    Some((a.expires_at_ms as i64 - now as i64) / 1000),
                )
            }
            _ => (false, false, None, None),
        };
        IntegrationStatus {
            merchant_id: merchant_id.to_string(),
            state,
            authenticated,
            token_valid,
            expires_at_ms,
            expires_in_secs,
        }
    }

    pub fn store(&self) -> &Arc<IntegrationStore> {
        &self.store
    }

    pub fn vendor(&self) -> &VendorConfig {
        &self.vendor
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Call the vendor refresh endpoint and persist the result.
    ///
    /// Must run under the merchant's renewal lock. The store write is one
    /// atomic update: access token, refresh token (previous value kept when
    /// the vendor omitted a new one), and the recomputed absolute expiry.
    async fn renew(&self, merchant_id: &str, authorization: &Authorization) -> Result<String> {
        debug!(merchant_id, "renewing access token");
        let started = Instant::now();

        let tokens = match token::exchange_refresh_token(
            &self.http_client,
            &self.vendor,
            &authorization.refresh_token,
        )
        .await
        {
            Ok(tokens) => tokens,
            Err(cause) => {
                metrics::counter!("token_renewals_total", "outcome" => "failure").increment(1);
                warn!(merchant_id, error = %cause, "token renewal failed");
                return Err(Error::RenewalFailed {
                    merchant_id: merchant_id.to_string(),
                    cause,
                });
            }
        };

        let expires_at_ms = epoch_ms() + tokens.expires_in * 1000;
        self.store
            .update_tokens(
                merchant_id,
                tokens.access_token.clone(),
                tokens.refresh_token,
                expires_at_ms,
            )
            .await?;

        metrics::counter!("token_renewals_total", "outcome" => "success").increment(1);
        metrics::histogram!("renewal_duration_seconds").record(started.elapsed().as_secs_f64());
        info!(merchant_id, expires_at_ms, "access token renewed");
        Ok(tokens.access_token)
    }

    fn expiring(&self, authorization: &Authorization) -> bool {
        epoch_ms() + self.safety_margin_ms >= authorization.expires_at_ms
    }

    async fn authorized(&self, merchant_id: &str) -> Result<Authorization> {
        match self.store.get(merchant_id).await {
            Some(IntegrationRecord::Authorized(a)) => Ok(a),
            Some(_) | None => Err(Error::NotAuthorized {
                merchant_id: merchant_id.to_string(),
            }),
        }
    }

    /// One mutex per merchant, created on first use. The map only grows with
    /// distinct merchants, so it stays bounded by the store's population.
    async fn renewal_lock(&self, merchant_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.renewal_locks.lock().await;
        locks
            .entry(merchant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
