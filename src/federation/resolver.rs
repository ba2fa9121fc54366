//! Remote identity resolution
//!
//! `user@host` -> WebFinger JRD -> actor document -> `RemoteActor`.
//! The two requests are strictly sequential; the second depends on the
//! first response.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;

use crate::config::FederationConfig;
use crate::error::AppError;
use crate::federation::compat::ServerProfile;
use crate::federation::signature::sign_request;
use crate::federation::webfinger::{ACTIVITY_JSON, Account, WebFingerResponse};
use crate::identity::LocalActor;
use crate::metrics::{FEDERATION_REQUEST_DURATION_SECONDS, RESOLUTIONS_TOTAL};

/// A resolved foreign identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteActor {
    /// Actor URI
    pub id: String,
    /// Personal inbox
    pub inbox_url: String,
    /// Shared inbox, when the server advertises one
    pub shared_inbox_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActorDocument {
    id: Option<String>,
    inbox: Option<String>,
    #[serde(default)]
    endpoints: Option<ActorEndpoints>,
}

#[derive(Debug, Deserialize)]
struct ActorEndpoints {
    #[serde(rename = "sharedInbox")]
    shared_inbox: Option<String>,
}

impl RemoteActor {
    /// Extract the fields delivery needs from an actor document
    ///
    /// # Errors
    /// `AppError::Resolution` if `id` or `inbox` is missing.
    pub fn from_document(document: serde_json::Value) -> Result<Self, AppError> {
        let malformed = || AppError::Resolution("malformed actor document".to_string());

        let document: ActorDocument = serde_json::from_value(document).map_err(|e| {
            tracing::debug!(error = %e, "Actor document did not deserialize");
            malformed()
        })?;

        Ok(Self {
            id: document.id.ok_or_else(malformed)?,
            inbox_url: document.inbox.ok_or_else(malformed)?,
            shared_inbox_url: document.endpoints.and_then(|e| e.shared_inbox),
        })
    }
}

/// Resolves `user@host` addresses to remote actors
#[derive(Clone)]
pub struct IdentityResolver {
    http_client: Arc<reqwest::Client>,
    profile: &'static ServerProfile,
    scheme: String,
}

impl IdentityResolver {
    /// Create a resolver
    ///
    /// # Arguments
    /// * `http_client` - Shared HTTP client (carries the request timeout)
    /// * `profile` - Server compatibility profile
    /// * `scheme` - Scheme for WebFinger discovery, "https" in production
    pub fn new(
        http_client: Arc<reqwest::Client>,
        profile: &'static ServerProfile,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            profile,
            scheme: scheme.into(),
        }
    }

    pub fn from_config(
        http_client: Arc<reqwest::Client>,
        config: &FederationConfig,
    ) -> Result<Self, AppError> {
        Ok(Self::new(
            http_client,
            config.server_profile()?,
            config.webfinger_scheme.clone(),
        ))
    }

    pub fn profile(&self) -> &'static ServerProfile {
        self.profile
    }

    /// WebFinger endpoint for a host
    pub fn webfinger_url(&self, host: &str) -> String {
        format!("{}://{}/.well-known/webfinger", self.scheme, host)
    }

    /// Resolve an account address to a remote actor
    ///
    /// # Arguments
    /// * `address` - `user@host`
    /// * `local` - Local actor used to sign the actor fetch
    /// * `date` - Date header shared by every request of this operation
    ///
    /// # Errors
    /// - `AppError::Resolution` for lookup failures or malformed responses
    /// - `AppError::Signing` if the local key cannot sign
    pub async fn resolve(
        &self,
        address: &str,
        local: &LocalActor,
        date: &str,
    ) -> Result<RemoteActor, AppError> {
        let result = self.resolve_inner(address, local, date).await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        RESOLUTIONS_TOTAL.with_label_values(&[outcome]).inc();

        result
    }

    async fn resolve_inner(
        &self,
        address: &str,
        local: &LocalActor,
        date: &str,
    ) -> Result<RemoteActor, AppError> {
        let account = Account::parse(address)?;
        let jrd = self.webfinger(&account).await?;
        let actor_url = jrd.actor_url()?;
        tracing::debug!(%account, actor_url, "WebFinger resolved");

        let remote = self.fetch_actor(actor_url, local, date).await?;
        tracing::debug!(
            actor = %remote.id,
            inbox = %remote.inbox_url,
            shared_inbox = ?remote.shared_inbox_url,
            "Remote actor resolved"
        );
        Ok(remote)
    }

    /// Query WebFinger, trying each resource format of the profile in order
    ///
    /// A 404 moves on to the next format; anything else that is not a
    /// success ends the lookup.
    pub async fn webfinger(&self, account: &Account) -> Result<WebFingerResponse, AppError> {
        let url = self.webfinger_url(&account.host);

        for format in self.profile.webfinger_formats {
            let resource = format.resource(account);
            tracing::debug!(url = %url, resource = %resource, "WebFinger lookup");

            let started = Instant::now();
            let response = self
                .http_client
                .get(&url)
                .query(&[("resource", resource.as_str())])
                .header("Accept", "application/jrd+json, application/json")
                .send()
                .await;
            FEDERATION_REQUEST_DURATION_SECONDS
                .with_label_values(&["webfinger"])
                .observe(started.elapsed().as_secs_f64());

            let response = response.map_err(|e| {
                AppError::Resolution(format!("WebFinger request to {} failed: {}", url, e))
            })?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!(resource = %resource, "WebFinger returned 404, trying next format");
                continue;
            }
            if !status.is_success() {
                return Err(AppError::Resolution(format!(
                    "WebFinger lookup for {} failed: HTTP {}",
                    account, status
                )));
            }

            return response.json::<WebFingerResponse>().await.map_err(|e| {
                AppError::Resolution(format!("Invalid WebFinger response for {}: {}", account, e))
            });
        }

        Err(AppError::Resolution(format!(
            "no WebFinger record for {}",
            account
        )))
    }

    /// Fetch and parse a remote actor document
    ///
    /// The GET is always signed; servers with authorized fetch require it
    /// and the rest ignore it.
    pub async fn fetch_actor(
        &self,
        actor_url: &str,
        local: &LocalActor,
        date: &str,
    ) -> Result<RemoteActor, AppError> {
        url::Url::parse(actor_url).map_err(|e| {
            AppError::Resolution(format!("Invalid actor URL {}: {}", actor_url, e))
        })?;

        let signed = sign_request(local, "GET", actor_url, date, None)?;

        let started = Instant::now();
        let response = self
            .http_client
            .get(actor_url)
            .header("Accept", ACTIVITY_JSON)
            .headers(signed.to_header_map()?)
            .send()
            .await;
        FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&["actor"])
            .observe(started.elapsed().as_secs_f64());

        let response = response.map_err(|e| {
            AppError::Resolution(format!("Failed to fetch actor {}: {}", actor_url, e))
        })?;

        if !response.status().is_success() {
            return Err(AppError::Resolution(format!(
                "Failed to fetch actor {}: HTTP {}",
                actor_url,
                response.status()
            )));
        }

        let document: serde_json::Value = response.json().await.map_err(|e| {
            AppError::Resolution(format!("Failed to parse actor {}: {}", actor_url, e))
        })?;

        RemoteActor::from_document(document)
    }
}
