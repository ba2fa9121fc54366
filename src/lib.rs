//! fedsend - a minimal ActivityPub sender
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 CLI (clap) / API Layer (Axum)                │
//! │  - `send` command                                           │
//! │  - WebFinger, actor, icon, inbox endpoints                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Federation                              │
//! │  - Identity resolution (WebFinger + actor fetch)            │
//! │  - HTTP Signatures, digests                                 │
//! │  - Activity construction and delivery                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Local identities                           │
//! │  - actors/<username>/{actor.json,public.pem,private.pem}    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `federation`: ActivityPub federation handling
//! - `identity`: Local actors and their key material
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod config;
pub mod error;
pub mod federation;
pub mod identity;
pub mod metrics;

use std::sync::Arc;

/// Maximum accepted inbox body
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Process-wide collaborators, built once and passed explicitly
///
/// Cloned for each request; every field is shared read-only.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Local identities
    pub identities: Arc<dyn identity::IdentityProvider>,

    /// Outbound delivery
    pub dispatcher: federation::DeliveryDispatcher,
}

impl AppState {
    /// Initialize application state with the file-backed identity provider
    ///
    /// # Errors
    /// Returns error if the configuration is inconsistent or the HTTP
    /// client cannot be built.
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        let identities = Arc::new(identity::FileIdentityProvider::new(
            &config.server.actors_path,
            config.server.base_url(),
            config.federation.key_id_style,
        ));
        Self::with_identities(config, identities)
    }

    /// Initialize application state with a given identity provider
    pub fn with_identities(
        config: config::AppConfig,
        identities: Arc<dyn identity::IdentityProvider>,
    ) -> Result<Self, error::AppError> {
        let http_client = Arc::new(federation::build_http_client(&config.federation)?);
        let dispatcher = federation::DeliveryDispatcher::from_config(
            &config,
            http_client,
            identities.clone(),
        )?;

        if config.federation.webfinger_scheme == "http" {
            tracing::warn!("WebFinger discovery over plain http; use only for local development");
        }

        tracing::info!(
            profile = %config.federation.profile,
            actors_path = %config.server.actors_path.display(),
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            identities,
            dispatcher,
        })
    }
}

/// Router for `fedsend server`
///
/// Unmatched paths fall through to static files under `server.public_path`.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer};

    let static_files = ServeDir::new(&state.config.server.public_path);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::wellknown_router())
        .merge(api::activitypub_router())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
        .fallback_service(static_files)
}

async fn health_check() -> &'static str {
    "OK"
}
