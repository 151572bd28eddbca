//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The vendor client secret is loaded from the IFOOD_CLIENT_SECRET env var
//! or `client_secret_file`, never stored in the TOML directly to avoid
//! leaking secrets.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub vendor: VendorSection,
    pub store: StoreConfig,
    #[serde(default)]
    pub guard: GuardConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Vendor endpoints and registered-application credentials
#[derive(Debug, Deserialize)]
pub struct VendorSection {
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to the
    /// IFOOD_CLIENT_SECRET env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
}

/// Integration record store location
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

/// Token guard tuning
#[derive(Debug, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_safety_margin")]
    pub safety_margin_secs: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            safety_margin_secs: default_safety_margin(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_auth_base_url() -> String {
    ifood_auth::vendor::DEFAULT_AUTH_BASE_URL.to_string()
}

fn default_api_base_url() -> String {
    ifood_auth::vendor::DEFAULT_API_BASE_URL.to_string()
}

fn default_max_connections() -> usize {
    1000
}

fn default_safety_margin() -> u64 {
    30
}

fn default_http_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. IFOOD_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        for (field, url) in [
            ("vendor.auth_base_url", &config.vendor.auth_base_url),
            ("vendor.api_base_url", &config.vendor.api_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{field} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if config.vendor.client_id.is_empty() {
            return Err(common::Error::Config(
                "vendor.client_id must not be empty".into(),
            ));
        }

        if config.guard.http_timeout_secs == 0 {
            return Err(common::Error::Config(
                "guard.http_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "server.max_connections must be greater than 0".into(),
            ));
        }

        // Resolve client secret: env var takes precedence over file
        if let Ok(secret) = std::env::var("IFOOD_CLIENT_SECRET") {
            config.vendor.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.vendor.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.vendor.client_secret = Some(Secret::new(secret));
            }
        }

        if config.vendor.client_secret.is_none() {
            return Err(common::Error::Config(
                "vendor client secret missing: set IFOOD_CLIENT_SECRET or client_secret_file".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("integration-api.toml")
    }

    /// Vendor config handed to the auth crate. Callable only after a
    /// successful `load` (the secret is guaranteed resolved).
    pub fn vendor_config(&self) -> ifood_auth::VendorConfig {
        ifood_auth::VendorConfig {
            auth_base_url: self.vendor.auth_base_url.clone(),
            api_base_url: self.vendor.api_base_url.clone(),
            client_id: self.vendor.client_id.clone(),
            client_secret: self
                .vendor
                .client_secret
                .clone()
                .expect("client secret resolved during Config::load"),
        }
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.guard.safety_margin_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.guard.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:8080"

[vendor]
client_id = "client-abc"

[store]
path = "/var/lib/integration-api/integrations.json"
"#
    }

    #[test]
    fn load_valid_config_with_env_secret() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        unsafe { set_env("IFOOD_CLIENT_SECRET", "from-env") };
        let config = Config::load(&path).unwrap();
        unsafe { remove_env("IFOOD_CLIENT_SECRET") };

        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.vendor.client_id, "client-abc");
        assert_eq!(
            config.vendor.auth_base_url,
            "https://merchant-api.ifood.com.br/authentication/v1.0"
        );
        assert_eq!(config.guard.safety_margin_secs, 30);
        assert_eq!(config.guard.http_timeout_secs, 10);
        assert_eq!(
            config.vendor_config().client_secret.expose(),
            "from-env"
        );
    }

    #[test]
    fn secret_file_is_a_fallback_for_the_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client-secret");
        std::fs::write(&secret_path, "from-file\n").unwrap();

        let toml = format!(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[vendor]
client_id = "client-abc"
client_secret_file = "{}"

[store]
path = "/tmp/integrations.json"
"#,
            secret_path.display()
        );
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();

        unsafe { remove_env("IFOOD_CLIENT_SECRET") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.vendor_config().client_secret.expose(),
            "from-file",
            "file secret must be trimmed"
        );
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        unsafe { remove_env("IFOOD_CLIENT_SECRET") };
        let err = Config::load(&path).unwrap_err();
        assert!(
            err.to_string().contains("client secret missing"),
            "got: {err}"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[vendor]
client_id = "client-abc"
auth_base_url = "ftp://nope"

[store]
path = "/tmp/integrations.json"
"#,
        )
        .unwrap();

        unsafe { set_env("IFOOD_CLIENT_SECRET", "s") };
        let err = Config::load(&path).unwrap_err();
        unsafe { remove_env("IFOOD_CLIENT_SECRET") };
        assert!(err.to_string().contains("auth_base_url"), "got: {err}");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[vendor]
client_id = "client-abc"

[store]
path = "/tmp/integrations.json"

[guard]
http_timeout_secs = 0
"#,
        )
        .unwrap();

        unsafe { set_env("IFOOD_CLIENT_SECRET", "s") };
        let err = Config::load(&path).unwrap_err();
        unsafe { remove_env("IFOOD_CLIENT_SECRET") };
        assert!(err.to_string().contains("http_timeout_secs"), "got: {err}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = Config::load(Path::new("/nonexistent/integration-api.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{{{ toml").unwrap();
        let result = Config::load(&path);
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn resolve_path_prefers_cli_argument() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/from/env.toml") };
        assert_eq!(
            Config::resolve_path(Some("/from/cli.toml")),
            PathBuf::from("/from/cli.toml")
        );
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("/from/env.toml")
        );
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("integration-api.toml")
        );
    }
}
