//! Token exchange and refresh
//!
//! Both grant types POST to the same vendor token endpoint with a
//! `grantType` discriminator:
//! 1. `authorizationCode` completes the distributed flow using the
//!    verifier stored when the flow was initiated
//! 2. `refreshToken` renews an expiring access token
//!
//! The vendor response is normalized into [`TokenSet`]. Refresh responses
//! do not always return a new `refreshToken`; the field stays `Option` so
//! callers persist the previous refresh credential instead of nulling it.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::vendor::VendorConfig;

/// Vendor token response, camelCase on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenWire {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    #[serde(rename = "type")]
    token_type: Option<String>,
    merchant_id: Option<String>,
}

/// Vendor omits `expiresIn` on occasion; one hour matches its documented default.
fn default_expires_in() -> u64 {
    3600
}

/// Normalized result of a token exchange or refresh.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    /// `None` when the vendor omitted it (refresh responses only); keep
    /// the previous refresh credential in that case.
    pub refresh_token: Option<String>,
    /// Declared lifetime in seconds, converted to an absolute expiry at
    /// storage time.
    pub expires_in: u64,
    pub token_type: String,
    /// The vendor-side merchant this credential belongs to. Present on
    /// authorization-code exchanges, usually absent on refresh.
    pub merchant_id: Option<String>,
}

impl From<TokenWire> for TokenSet {
    fn from(wire: TokenWire) -> Self {
        Self {
            access_token: wire.access_token,
            refresh_token: wire.refresh_token,
            expires_in: wire.expires_in,
            token_type: wire.token_type.unwrap_or_else(|| "Bearer".into()),
            merchant_id: wire.merchant_id,
        }
    }
}

/// Exchange an approved authorization for tokens (completes the flow).
///
/// `verifier` is the `authorizationCodeVerifier` returned when the flow was
/// initiated, persisted in the merchant's pending record.
pub async fn exchange_authorization_code(
    client: &reqwest::Client,
    vendor: &VendorConfig,
    verifier: &str,
) -> Result<TokenSet> {
    post_token(
        client,
        vendor,
        &[
            ("grantType", "authorizationCode"),
            ("clientId", vendor.client_id.as_str()),
            ("clientSecret", vendor.client_secret.expose().as_str()),
            ("authorizationCodeVerifier", verifier),
        ],
    )
    .await
}

/// Renew an access token using a refresh credential.
///
/// No retry here: retry policy belongs to the caller (the validity guard
/// classifies the failure and decides).
pub async fn exchange_refresh_token(
    client: &reqwest::Client,
    vendor: &VendorConfig,
    refresh_token: &str,
) -> Result<TokenSet> {
    post_token(
        client,
        vendor,
        &[
            ("grantType", "refreshToken"),
            ("clientId", vendor.client_id.as_str()),
            ("clientSecret", vendor.client_secret.expose().as_str()),
            ("refreshToken", refresh_token),
        ],
    )
    .await
}

/// Shared call shape for both grant types.
async fn post_token(
    client: &reqwest::Client,
    vendor: &VendorConfig,
    form: &[(&str, &str)],
) -> Result<TokenSet> {
    let response = client
        .post(vendor.token_url())
        .form(form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::UpstreamAuth {
            status: status.as_u16(),
            body,
        });
    }

    let wire = response
        .json::<TokenWire>()
        .await
        .map_err(|e| Error::Protocol(format!("invalid token response: {e}")))?;
    Ok(wire.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vendor_for(server: &MockServer) -> VendorConfig {
        VendorConfig {
            auth_base_url: server.uri(),
            api_base_url: server.uri(),
            client_id: "client-abc".into(),
            client_secret: Secret::new("client-secret".into()),
        }
    }

    #[test]
    fn wire_shape_with_all_fields_normalizes() {
        let json = r#"{
            "accessToken": "tok1",
            "refreshToken": "ref1",
            "expiresIn": 21600,
            "type": "bearer",
            "merchantId": "m-123"
        }"#;
        let set: TokenSet = serde_json::from_str::<TokenWire>(json).unwrap().into();
        assert_eq!(set.access_token, "tok1");
        assert_eq!(set.refresh_token.as_deref(), Some("ref1"));
        assert_eq!(set.expires_in, 21600);
        assert_eq!(set.token_type, "bearer");
        assert_eq!(set.merchant_id.as_deref(), Some("m-123"));
    }

    #[test]
    fn missing_refresh_token_and_type_stay_optional() {
        let json = r#"{"accessToken": "tok2", "expiresIn": 3600}"#;
        let set: TokenSet = serde_json::from_str::<TokenWire>(json).unwrap().into();
        assert_eq!(set.refresh_token, None);
        assert_eq!(set.token_type, "Bearer");
        assert_eq!(set.merchant_id, None);
    }

    #[test]
    fn missing_expires_in_defaults_to_one_hour() {
        let json = r#"{"accessToken": "tok3", "refreshToken": "ref3"}"#;
        let set: TokenSet = serde_json::from_str::<TokenWire>(json).unwrap().into();
        assert_eq!(set.expires_in, 3600);
    }

    #[tokio::test]
    async fn code_exchange_sends_authorization_code_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grantType=authorizationCode"))
            .and(body_string_contains("authorizationCodeVerifier=verif-1"))
            .and(body_string_contains("clientId=client-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "tok1",
                "refreshToken": "ref1",
                "expiresIn": 21600,
                "type": "bearer",
                "merchantId": "m-123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let set =
            exchange_authorization_code(&reqwest::Client::new(), &vendor_for(&server), "verif-1")
                .await
                .unwrap();
        assert_eq!(set.access_token, "tok1");
        assert_eq!(set.merchant_id.as_deref(), Some("m-123"));
    }

    #[tokio::test]
    async fn refresh_sends_refresh_token_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grantType=refreshToken"))
            .and(body_string_contains("refreshToken=ref-old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "tok-new",
                "expiresIn": 21600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let set = exchange_refresh_token(&reqwest::Client::new(), &vendor_for(&server), "ref-old")
            .await
            .unwrap();
        assert_eq!(set.access_token, "tok-new");
        // Vendor omitted refreshToken; normalization must not invent one
        assert_eq!(set.refresh_token, None);
    }

    #[tokio::test]
    async fn vendor_400_surfaces_as_upstream_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let err = exchange_refresh_token(&reqwest::Client::new(), &vendor_for(&server), "ref-bad")
            .await
            .unwrap_err();
        match err {
            Error::UpstreamAuth { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("expected UpstreamAuth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_success_body_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("gateway says hi"))
            .mount(&server)
            .await;

        let err = exchange_refresh_token(&reqwest::Client::new(), &vendor_for(&server), "ref-x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    }
}
