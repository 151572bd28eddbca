//! Error types for vendor authentication and record storage

use thiserror::Error;

/// Errors from vendor-facing authentication operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure: connect error, timeout, TLS. The request
    /// never produced a vendor status code.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The vendor rejected the request with a non-2xx status.
    #[error("vendor rejected request ({status}): {body}")]
    UpstreamAuth { status: u16, body: String },

    /// The vendor answered 2xx but the body did not match the documented shape.
    #[error("unexpected vendor response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the integration record store.
///
/// `InvalidMerchantRef` is the constraint-violation class: the caller named
/// a merchant or restaurant the store cannot accept (unknown merchant,
/// conflicting restaurant binding, wrong record state). It maps to an
/// actionable 400 at the boundary, unlike `Io`/`Corrupt` which are 500s.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid merchant reference: {0}")]
    InvalidMerchantRef(String),

    #[error("store I/O error: {0}")]
    Io(String),

    #[error("store data corrupt: {0}")]
    Corrupt(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
