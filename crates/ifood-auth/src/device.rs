//! Device-code (distributed flow) initiation
//!
//! The distributed authorization flow starts here: the application asks the
//! vendor for a short-lived user code, which the merchant enters in the
//! partner portal to approve the integration. The response also carries the
//! verifier secret the token exchange later requires; the caller persists
//! both as the merchant's pending record.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vendor::VendorConfig;

/// Response from the vendor's user-code endpoint.
///
/// `expires_in` is the lifetime of the user code in seconds. The merchant
/// must approve within that window or the flow has to be re-initiated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCodeGrant {
    /// Short code the merchant types into the partner portal
    pub user_code: String,
    /// Secret required when exchanging the approved code for tokens
    pub authorization_code_verifier: String,
    /// Portal page where the merchant enters the user code
    pub verification_url: String,
    /// Portal page with the user code pre-filled
    pub verification_url_complete: String,
    /// Seconds until the user code expires
    pub expires_in: u64,
}

/// Request a user code from the vendor, starting the distributed flow.
///
/// Form-encoded POST carrying only the registered client identifier. The
/// verifier in the response is the secret the later token exchange needs;
/// callers persist it alongside the user code.
pub async fn request_user_code(
    client: &reqwest::Client,
    vendor: &VendorConfig,
) -> Result<DeviceCodeGrant> {
    let response = client
        .post(vendor.user_code_url())
        .form(&[("clientId", vendor.client_id.as_str())])
        .send()
        .await
        .map_err(|e| Error::Http(format!("user code request failed: {e}")))?;

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

    response
        .json::<DeviceCodeGrant>()
        .await
        .map_err(|e| Error::Protocol(format!("invalid user code response: {e}")))
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
            client_secret: Secret::new("secret".into()),
        }
    }

    #[test]
    fn grant_deserializes_from_vendor_shape() {
        let json = r#"{
            "userCode": "ABCD-EFGH",
            "authorizationCodeVerifier": "verifier-secret-value",
            "verificationUrl": "https://portal.ifood.com.br/apps/code",
            "verificationUrlComplete": "https://portal.ifood.com.br/apps/code?c=ABCD-EFGH",
            "expiresIn": 600
        }"#;
        let grant: DeviceCodeGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.user_code, "ABCD-EFGH");
        assert_eq!(grant.authorization_code_verifier, "verifier-secret-value");
        assert_eq!(grant.expires_in, 600);
    }

    #[tokio::test]
    async fn request_posts_client_id_as_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/userCode"))
            .and(body_string_contains("clientId=client-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "userCode": "WXYZ-1234",
                "authorizationCodeVerifier": "v",
                "verificationUrl": "https://portal.example/code",
                "verificationUrlComplete": "https://portal.example/code?c=WXYZ-1234",
                "expiresIn": 600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = request_user_code(&reqwest::Client::new(), &vendor_for(&server))
            .await
            .unwrap();
        assert_eq!(grant.user_code, "WXYZ-1234");
    }

    #[tokio::test]
    async fn non_2xx_becomes_upstream_auth_with_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/userCode"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unknown client"))
            .mount(&server)
            .await;

        let err = request_user_code(&reqwest::Client::new(), &vendor_for(&server))
            .await
            .unwrap_err();
        match err {
            Error::UpstreamAuth { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "unknown client");
            }
            other => panic!("expected UpstreamAuth, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_becomes_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/userCode"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = request_user_code(&reqwest::Client::new(), &vendor_for(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    }
}
