//! Vendor endpoint configuration
//!
//! The vendor exposes two base URLs: the authentication host (user code and
//! token endpoints) and the merchant API host (orders, menu, actions). Both
//! are configurable so tests can point at a local mock server. The client
//! credentials identify the registered application; the client secret is
//! wrapped in `common::Secret` so it never appears in logs.

use common::Secret;

/// Production authentication base URL.
pub const DEFAULT_AUTH_BASE_URL: &str = "https://merchant-api.ifood.com.br/authentication/v1.0";

/// Production merchant API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://merchant-api.ifood.com.br";

/// Registered-application credentials plus endpoint roots.
#[derive(Debug, Clone)]
pub struct VendorConfig {
    pub auth_base_url: String,
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl VendorConfig {
    /// Build a config against the production endpoints.
    pub fn new(client_id: String, client_secret: Secret<String>) -> Self {
        Self {
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            client_id,
            client_secret,
        }
    }

    /// Device-code endpoint (`POST`, form-encoded).
    pub fn user_code_url(&self) -> String {
        format!("{}/oauth/userCode", self.auth_base_url)
    }

    /// Token endpoint for both authorization-code exchange and refresh.
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.auth_base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> VendorConfig {
        VendorConfig::new("client-abc".into(), Secret::new("shh".into()))
    }

    #[test]
    fn default_endpoints_target_production_hosts() {
        let vendor = test_config();
        assert_eq!(
            vendor.user_code_url(),
            "https://merchant-api.ifood.com.br/authentication/v1.0/oauth/userCode"
        );
        assert_eq!(
            vendor.token_url(),
            "https://merchant-api.ifood.com.br/authentication/v1.0/oauth/token"
        );
    }

    #[test]
    fn debug_never_prints_the_client_secret() {
        let vendor = test_config();
        let debug = format!("{vendor:?}");
        assert!(!debug.contains("shh"), "secret leaked: {debug}");
        assert!(debug.contains("[REDACTED]"));
    }
}
