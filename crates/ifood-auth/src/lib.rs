//! iFood merchant OAuth authentication library
//!
//! Provides the distributed (device-code) authorization flow, token
//! exchange/refresh against the vendor token endpoint, and durable storage
//! of per-merchant integration records. This crate is a standalone library
//! with no dependency on the service binary; it can be tested and used
//! independently.
//!
//! Credential flow:
//! 1. `device::request_user_code()` obtains a user code + verifier secret
//! 2. The merchant enters the user code in the vendor partner portal
//! 3. `token::exchange_authorization_code()` trades the stored verifier
//!    for an access/refresh token pair
//! 4. The record transitions PENDING → AUTHORIZED via
//!    `store::IntegrationStore::complete()`
//! 5. `token::exchange_refresh_token()` renews expiring access tokens;
//!    `store::IntegrationStore::update_tokens()` persists each renewal

pub mod device;
pub mod error;
pub mod store;
pub mod token;
pub mod vendor;

pub use device::{DeviceCodeGrant, request_user_code};
pub use error::{Error, Result, StoreError};
pub use store::{Authorization, IntegrationRecord, IntegrationStore, PendingAuthorization, epoch_ms};
pub use token::{TokenSet, exchange_authorization_code, exchange_refresh_token};
pub use vendor::VendorConfig;
