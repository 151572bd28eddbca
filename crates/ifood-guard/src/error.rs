//! Error types for the guard, the request wrapper, and event dispatch

use ifood_auth::{Error as AuthError, StoreError};
use thiserror::Error;

/// Failures surfaced to callers of the guard and the request wrapper.
///
/// Only `NotAuthorized` means "restart the authorization flow". Everything
/// else means "retry later" or "check vendor-side configuration". In
/// particular `RenewalFailed` never revokes the stored record: a transient
/// vendor failure must not force a merchant through the portal again.
#[derive(Debug, Error)]
pub enum Error {
    #[error("merchant {merchant_id} has no valid authorization")]
    NotAuthorized { merchant_id: String },

    #[error("token renewal failed for merchant {merchant_id}: {cause}")]
    RenewalFailed {
        merchant_id: String,
        #[source]
        cause: AuthError,
    },

    #[error("vendor rejected credentials for merchant {merchant_id} even after forced renewal")]
    AuthenticationRejected { merchant_id: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for guard operations.
pub type Result<T> = std::result::Result<T, Error>;
