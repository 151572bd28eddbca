//! Durable per-merchant integration records
//!
//! One JSON file maps merchant ids to integration records. All writes use
//! atomic temp-file + rename to prevent corruption on crash; a tokio Mutex
//! serializes concurrent writers. The file is the single source of truth
//! for token data: the validity guard reads records from here on every call.
//!
//! A record is a tagged variant, so the pending/authorized invariant is
//! enforced by construction: a record either carries a user code + verifier
//! (pending), a token pair (authorized), or neither (revoked). Revocation
//! keeps the row, so the audit trail and the merchant-to-restaurant mapping
//! survive token deletion.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::device::DeviceCodeGrant;
use crate::error::StoreError;

/// Current unix time in milliseconds. All persisted timestamps use this base.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A merchant waiting for portal approval. The verifier is the secret the
/// token exchange will need; the user code is what the merchant types in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub id: Uuid,
    pub restaurant_id: Option<String>,
    pub user_code: String,
    pub verifier: String,
    pub verification_url: String,
    pub verification_url_complete: String,
    /// Vendor-declared lifetime of the user code, seconds
    pub code_expires_in: u64,
    pub requested_at_ms: u64,
}

/// A merchant with a live token pair.
///
/// `expires_at_ms` is the absolute access-token expiry, computed once at
/// write time from the vendor's `expiresIn` delta. Readers compare against
/// it directly instead of re-deriving expiry from a creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    pub id: Uuid,
    pub restaurant_id: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_ms: u64,
    pub authorized_at_ms: u64,
    pub updated_at_ms: u64,
}

/// A merchant whose authorization was revoked. Tokens are gone; the row stays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedAuthorization {
    pub id: Uuid,
    pub restaurant_id: Option<String>,
    pub revoked_at_ms: u64,
}

/// Lifecycle states of a merchant integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IntegrationRecord {
    Pending(PendingAuthorization),
    Authorized(Authorization),
    Revoked(RevokedAuthorization),
}

impl IntegrationRecord {
    pub fn is_authorized(&self) -> bool {
        matches!(self, IntegrationRecord::Authorized(_))
    }

    pub fn restaurant_id(&self) -> Option<&str> {
        match self {
            IntegrationRecord::Pending(p) => p.restaurant_id.as_deref(),
            IntegrationRecord::Authorized(a) => a.restaurant_id.as_deref(),
            IntegrationRecord::Revoked(r) => r.restaurant_id.as_deref(),
        }
    }

    /// State label for status reporting and logs.
    pub fn state_label(&self) -> &'static str {
        match self {
            IntegrationRecord::Pending(_) => "pending",
            IntegrationRecord::Authorized(_) => "authorized",
            IntegrationRecord::Revoked(_) => "revoked",
        }
    }

    fn id(&self) -> Uuid {
        match self {
            IntegrationRecord::Pending(p) => p.id,
            IntegrationRecord::Authorized(a) => a.id,
            IntegrationRecord::Revoked(r) => r.id,
        }
    }
}

/// Counts per state, for the health endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreSummary {
    pub total: usize,
    pub pending: usize,
    pub authorized: usize,
    pub revoked: usize,
}

/// Thread-safe integration record store backed by one JSON file.
#[derive(Debug)]
pub struct IntegrationStore {
    path: PathBuf,
    state: Mutex<HashMap<String, IntegrationRecord>>,
}

impl IntegrationStore {
    /// Load records from the given file path.
    ///
    /// A missing file is a cold start: an empty store file is created so
    /// later loads take the normal path.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StoreError::Io(format!("reading integration store: {e}")))?;
            let records: HashMap<String, IntegrationRecord> = serde_json::from_str(&contents)
                .map_err(|e| StoreError::Corrupt(format!("parsing integration store: {e}")))?;
            info!(path = %path.display(), merchants = records.len(), "loaded integration store");
            records
        } else {
            info!(path = %path.display(), "integration store not found, starting empty");
            let records = HashMap::new();
            write_atomic(&path, &records).await?;
            records
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of a merchant's record.
    pub async fn get(&self, merchant_id: &str) -> Option<IntegrationRecord> {
        let state = self.state.lock().await;
        state.get(merchant_id).cloned()
    }

    /// Insert or replace a record verbatim and persist.
    pub async fn insert(
        &self,
        merchant_id: String,
        record: IntegrationRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.insert(merchant_id.clone(), record);
        debug!(merchant_id, "inserted integration record");
        write_atomic(&self.path, &state).await
    }

    /// Write a merchant's pending record from a fresh device-code grant.
    ///
    /// Re-invocation replaces any previous pending state wholesale: there is
    /// never more than one live verifier per merchant. An established
    /// restaurant binding survives the overwrite; a conflicting one is
    /// rejected.
    pub async fn begin_pending(
        &self,
        merchant_id: &str,
        grant: &DeviceCodeGrant,
        restaurant_id: Option<String>,
    ) -> Result<PendingAuthorization, StoreError> {
        let mut state = self.state.lock().await;
        let existing = state.get(merchant_id);
        let bound = resolve_restaurant(
            existing.and_then(|r| r.restaurant_id()),
            restaurant_id,
            merchant_id,
        )?;
        let pending = PendingAuthorization {
            id: existing.map(|r| r.id()).unwrap_or_else(Uuid::new_v4),
            restaurant_id: bound,
            user_code: grant.user_code.clone(),
            verifier: grant.authorization_code_verifier.clone(),
            verification_url: grant.verification_url.clone(),
            verification_url_complete: grant.verification_url_complete.clone(),
            code_expires_in: grant.expires_in,
            requested_at_ms: epoch_ms(),
        };
        state.insert(
            merchant_id.to_string(),
            IntegrationRecord::Pending(pending.clone()),
        );
        debug!(merchant_id, user_code = %pending.user_code, "wrote pending authorization");
        write_atomic(&self.path, &state).await?;
        Ok(pending)
    }

    /// Transition a merchant from pending to authorized.
    ///
    /// The swap is a single map insert persisted by one atomic file write:
    /// either the full token set lands together or nothing changes. The
    /// pending fields (user code, verifier) are gone afterwards by
    /// construction.
    pub async fn complete(
        &self,
        merchant_id: &str,
        access_token: String,
        refresh_token: String,
        expires_at_ms: u64,
        restaurant_id: Option<String>,
    ) -> Result<Authorization, StoreError> {
        let mut state = self.state.lock().await;
        let pending = match state.get(merchant_id) {
            Some(IntegrationRecord::Pending(p)) => p,
            Some(other) => {
                return Err(StoreError::InvalidMerchantRef(format!(
                    "merchant {merchant_id} is {}, expected a pending authorization",
                    other.state_label()
                )));
            }
            None => {
                return Err(StoreError::InvalidMerchantRef(format!(
                    "merchant {merchant_id} has no pending authorization"
                )));
            }
        };
        let bound = resolve_restaurant(
            pending.restaurant_id.as_deref(),
            restaurant_id,
            merchant_id,
        )?;
        let now = epoch_ms();
        let authorization = Authorization {
            id: pending.id,
            restaurant_id: bound,
            access_token,
            refresh_token,
            expires_at_ms,
            authorized_at_ms: now,
            updated_at_ms: now,
        };
        state.insert(
            merchant_id.to_string(),
            IntegrationRecord::Authorized(authorization.clone()),
        );
        info!(merchant_id, "authorization completed");
        write_atomic(&self.path, &state).await?;
        Ok(authorization)
    }

    /// Persist a renewal for an authorized merchant.
    ///
    /// `refresh_token = None` keeps the previous refresh credential. The
    /// vendor does not return one on every refresh, and nulling it out would
    /// strand the merchant at the next renewal.
    pub async fn update_tokens(
        &self,
        merchant_id: &str,
        access_token: String,
        refresh_token: Option<String>,
        expires_at_ms: u64,
    ) -> Result<Authorization, StoreError> {
        let mut state = self.state.lock().await;
        let authorization = match state.get_mut(merchant_id) {
            Some(IntegrationRecord::Authorized(a)) => a,
            Some(other) => {
                return Err(StoreError::InvalidMerchantRef(format!(
                    "merchant {merchant_id} is {}, cannot update tokens",
                    other.state_label()
                )));
            }
            None => {
                return Err(StoreError::InvalidMerchantRef(format!(
                    "merchant {merchant_id} not in integration store"
                )));
            }
        };
        authorization.access_token = access_token;
        if let Some(refresh) = refresh_token {
            authorization.refresh_token = refresh;
        }
        authorization.expires_at_ms = expires_at_ms;
        authorization.updated_at_ms = epoch_ms();
        let updated = authorization.clone();
        debug!(merchant_id, "updated token pair");
        write_atomic(&self.path, &state).await?;
        Ok(updated)
    }

    /// Revoke a merchant's authorization.
    ///
    /// Tokens and pending secrets are dropped; the row and its restaurant
    /// mapping remain. Returns false when the merchant has no record at all.
    pub async fn revoke(&self, merchant_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(existing) = state.get(merchant_id) else {
            warn!(merchant_id, "no integration record to revoke");
            return Ok(false);
        };
        let revoked = RevokedAuthorization {
            id: existing.id(),
            restaurant_id: existing.restaurant_id().map(str::to_owned),
            revoked_at_ms: epoch_ms(),
        };
        state.insert(
            merchant_id.to_string(),
            IntegrationRecord::Revoked(revoked),
        );
        info!(merchant_id, "authorization revoked");
        write_atomic(&self.path, &state).await?;
        Ok(true)
    }

    /// Look up the internal restaurant for a vendor-side merchant id.
    /// Used by the webhook mapper on every inbound event.
    pub async fn restaurant_for_merchant(&self, merchant_id: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .get(merchant_id)
            .and_then(|r| r.restaurant_id())
            .map(str::to_owned)
    }

    /// All merchant ids with a record, any state.
    pub async fn merchant_ids(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.keys().cloned().collect()
    }

    /// Per-state counts for the health endpoint.
    pub async fn summary(&self) -> StoreSummary {
        let state = self.state.lock().await;
        let mut summary = StoreSummary {
            total: state.len(),
            pending: 0,
            authorized: 0,
            revoked: 0,
        };
        for record in state.values() {
            match record {
                IntegrationRecord::Pending(_) => summary.pending += 1,
                IntegrationRecord::Authorized(_) => summary.authorized += 1,
                IntegrationRecord::Revoked(_) => summary.revoked += 1,
            }
        }
        summary
    }
}

/// Reject a write that would rebind an established merchant→restaurant
/// mapping; otherwise prefer the existing binding.
fn resolve_restaurant(
    existing: Option<&str>,
    requested: Option<String>,
    merchant_id: &str,
) -> Result<Option<String>, StoreError> {
    match (existing, requested) {
        (Some(bound), Some(requested)) if bound != requested => {
            Err(StoreError::InvalidMerchantRef(format!(
                "merchant {merchant_id} is bound to restaurant {bound}, cannot rebind to {requested}"
            )))
        }
        (Some(bound), _) => Ok(Some(bound.to_owned())),
        (None, requested) => Ok(requested),
    }
}

/// Write the record map to disk atomically (temp file + rename, 0600).
/// The file holds bearer secrets, so it is never world-readable.
async fn write_atomic(
    path: &Path,
    records: &HashMap<String, IntegrationRecord>,
) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| StoreError::Corrupt(format!("serializing integration store: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Io("store path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".integrations.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| StoreError::Io(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| StoreError::Io(format!("setting store file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::Io(format!("renaming temp store file: {e}")))?;

    debug!(path = %path.display(), "persisted integration store");
    Ok(())
}
