//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

use crate::federation::ServerProfile;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub federation: FederationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3001)
    pub port: u16,
    /// Public base URL, used to mint actor and activity URIs
    /// e.g., "https://social.example.com"
    pub base_url: String,
    /// Directory served as static files
    pub public_path: PathBuf,
    /// Directory holding one subdirectory per local actor
    pub actors_path: PathBuf,
}

impl ServerConfig {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Host (with non-default port) of the public base URL
    pub fn domain(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.base_url).ok()?;
        let host = parsed.host_str()?;
        Some(match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

/// Federation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Name of the server compatibility profile (see `ServerProfile::ALL`)
    pub profile: String,
    /// How the signature keyId is derived from the actor id
    pub key_id_style: KeyIdStyle,
    /// Scheme used for WebFinger discovery ("https" outside development)
    pub webfinger_scheme: String,
    /// Per-request timeout for outbound requests
    pub request_timeout_secs: u64,
    /// User-Agent header for outbound requests
    pub user_agent: String,
}

impl FederationConfig {
    /// Resolve the configured compatibility profile
    pub fn server_profile(&self) -> Result<&'static ServerProfile, crate::error::AppError> {
        ServerProfile::by_name(&self.profile).ok_or_else(|| {
            crate::error::AppError::Config(format!(
                "unknown federation.profile '{}'",
                self.profile
            ))
        })
    }
}

/// keyId convention used when signing
///
/// Servers disagree on whether the keyId must carry the `#main-key`
/// fragment; the actor document we publish always advertises the same
/// value as `publicKey.id`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyIdStyle {
    /// `<actor id>#main-key`
    #[default]
    Fragment,
    /// `<actor id>`
    Bare,
}

impl KeyIdStyle {
    pub fn key_id_for(self, actor_id: &str) -> String {
        match self {
            KeyIdStyle::Fragment => format!("{}#main-key", actor_id),
            KeyIdStyle::Bare => actor_id.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDSEND__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3001)?
            .set_default("server.base_url", "http://localhost:3001")?
            .set_default("server.public_path", "public")?
            .set_default("server.actors_path", "./actors")?
            .set_default("logging.level", "debug")?
            .set_default("logging.format", "pretty")?
            .set_default("federation.profile", "standard")?
            .set_default("federation.key_id_style", "fragment")?
            .set_default("federation.webfinger_scheme", "https")?
            .set_default("federation.request_timeout_secs", 30)?
            .set_default(
                "federation.user_agent",
                concat!("fedsend/", env!("CARGO_PKG_VERSION")),
            )?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("FEDSEND")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        let base_url = url::Url::parse(&self.server.base_url)
            .map_err(|e| AppError::Config(format!("server.base_url is not a URL: {}", e)))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.host_str().is_none() {
            return Err(AppError::Config(
                "server.base_url must be an http(s) URL with a host".to_string(),
            ));
        }

        self.federation.server_profile()?;

        if !matches!(self.federation.webfinger_scheme.as_str(), "http" | "https") {
            return Err(AppError::Config(
                "federation.webfinger_scheme must be http or https".to_string(),
            ));
        }

        if self.federation.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "federation.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
