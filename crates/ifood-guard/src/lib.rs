//! Token validity guard and authenticated vendor access
//!
//! Everything that talks to the merchant API goes through this crate:
//!
//! 1. [`TokenGuard`] hands out currently-valid access tokens, renewing
//!    lazily when a token is inside the safety margin. Renewals are
//!    serialized per merchant, so concurrent callers share one vendor call.
//! 2. [`MerchantApi`] attaches the token as a bearer credential and retries
//!    exactly once (after a forced renewal) when the vendor answers 401.
//! 3. [`EventDispatcher`] maps inbound webhook events to internal
//!    restaurants and defers the heavy per-event work to a background
//!    worker so the webhook response is never delayed.

pub mod api;
pub mod error;
pub mod events;
pub mod guard;

pub use api::{ApiResponse, MerchantApi};
pub use error::{Error, Result};
pub use events::{EventAck, EventDispatcher, MerchantEvent, event_channel, spawn_event_worker};
pub use guard::{DEFAULT_SAFETY_MARGIN, IntegrationStatus, TokenGuard};
