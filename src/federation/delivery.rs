//! Activity delivery
//!
//! Resolves the recipient, builds the activity, signs and POSTs it to
//! exactly one inbox. Delivery failures come back as a `DeliveryResult`;
//! resolution and signing failures abort with an error before anything
//! is posted.

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::federation::activity::ActivityBuilder;
use crate::federation::resolver::IdentityResolver;
use crate::federation::signature::{http_date, sign_request};
use crate::federation::webfinger::ACTIVITY_JSON;
use crate::identity::{IdentityProvider, LocalActor, run_blocking};
use crate::metrics::{DELIVERIES_TOTAL, FEDERATION_REQUEST_DURATION_SECONDS};

/// Result of a delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// Target inbox URI
    pub inbox_uri: String,
    /// Id of the delivered activity
    pub activity_id: String,
    /// Whether the inbox answered 2xx
    pub success: bool,
    /// HTTP status code if a response was received
    pub status_code: Option<u16>,
    /// Response body: JSON when parseable, otherwise the raw text
    pub body: Option<serde_json::Value>,
    /// Error message if failed
    pub error: Option<String>,
}

/// Inbox response that was accepted
struct InboxResponse {
    status: u16,
    body: Option<serde_json::Value>,
}

/// Delivery service
///
/// Every collaborator is injected; the dispatcher holds no mutable state
/// and can be cloned into concurrent tasks.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    http_client: Arc<reqwest::Client>,
    identities: Arc<dyn IdentityProvider>,
    resolver: IdentityResolver,
    builder: ActivityBuilder,
}

impl DeliveryDispatcher {
    pub fn new(
        http_client: Arc<reqwest::Client>,
        identities: Arc<dyn IdentityProvider>,
        resolver: IdentityResolver,
        builder: ActivityBuilder,
    ) -> Self {
        Self {
            http_client,
            identities,
            resolver,
            builder,
        }
    }

    /// Wire up resolver and builder from configuration
    pub fn from_config(
        config: &AppConfig,
        http_client: Arc<reqwest::Client>,
        identities: Arc<dyn IdentityProvider>,
    ) -> Result<Self, AppError> {
        let resolver = IdentityResolver::from_config(http_client.clone(), &config.federation)?;
        let builder = ActivityBuilder::new(
            config.server.base_url(),
            config.federation.server_profile()?,
        );
        Ok(Self::new(http_client, identities, resolver, builder))
    }

    /// Load a local actor by username and deliver a message from it
    ///
    /// # Errors
    /// `AppError::NotFound` if the local actor is not provisioned, plus
    /// everything `deliver` returns.
    pub async fn send(
        &self,
        username: &str,
        account: &str,
        content: &str,
    ) -> Result<DeliveryResult, AppError> {
        let username = username.to_string();
        let local = run_blocking(&self.identities, move |p| p.load(&username)).await?;
        tracing::debug!(from = %local.id, "Local actor loaded");
        self.deliver(&local, account, content).await
    }

    /// Deliver a direct `Create(Note)` to one remote account
    ///
    /// # Arguments
    /// * `local` - Sending actor
    /// * `account` - Recipient address (`user@host`)
    /// * `content` - Note content
    ///
    /// # Errors
    /// - `AppError::Resolution` if the recipient cannot be resolved
    /// - `AppError::Signing` if the local key cannot sign
    ///
    /// Inbox rejections and network failures are returned as an
    /// unsuccessful `DeliveryResult`, not as an error.
    pub async fn deliver(
        &self,
        local: &LocalActor,
        account: &str,
        content: &str,
    ) -> Result<DeliveryResult, AppError> {
        // One Date for the whole operation
        let date = http_date(chrono::Utc::now());

        let remote = self.resolver.resolve(account, local, &date).await?;
        let activity = self.builder.build(local, &remote, account, content);
        tracing::debug!(activity = ?activity, "Activity built");

        // Serialized once: these exact bytes are digested and sent
        let body = serde_json::to_vec(&activity)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize activity: {}", e)))?;

        let outcome = self
            .deliver_to_inbox(local, &remote.inbox_url, body, &date)
            .await;

        let result = match outcome {
            Ok(response) => {
                tracing::info!(
                    inbox = %remote.inbox_url,
                    activity = %activity.id,
                    status = response.status,
                    "Successfully delivered activity"
                );
                DeliveryResult {
                    inbox_uri: remote.inbox_url,
                    activity_id: activity.id,
                    success: true,
                    status_code: Some(response.status),
                    body: response.body,
                    error: None,
                }
            }
            Err(AppError::Delivery { status, detail }) => {
                tracing::warn!(
                    inbox = %remote.inbox_url,
                    activity = %activity.id,
                    status = ?status,
                    error = %detail,
                    "Delivery failed"
                );
                DeliveryResult {
                    inbox_uri: remote.inbox_url,
                    activity_id: activity.id,
                    success: false,
                    status_code: status,
                    body: None,
                    error: Some(detail),
                }
            }
            Err(other) => return Err(other),
        };

        let label = if result.success { "success" } else { "failure" };
        DELIVERIES_TOTAL.with_label_values(&[label]).inc();

        Ok(result)
    }

    /// POST a serialized activity to a single inbox
    ///
    /// # Errors
    /// - `AppError::Signing` if the request cannot be signed
    /// - `AppError::Delivery` for network errors, timeouts and non-2xx responses
    async fn deliver_to_inbox(
        &self,
        local: &LocalActor,
        inbox_uri: &str,
        body: Vec<u8>,
        date: &str,
    ) -> Result<InboxResponse, AppError> {
        let sig_headers = sign_request(local, "POST", inbox_uri, date, Some(&body))
            .map_err(|e| match e {
                AppError::Validation(msg) => AppError::Delivery {
                    status: None,
                    detail: format!("Invalid inbox URL {}: {}", inbox_uri, msg),
                },
                other => other,
            })?;
        let headers = sig_headers.to_header_map()?;

        tracing::debug!(inbox = %inbox_uri, "Posting activity");

        let started = Instant::now();
        let response = self
            .http_client
            .post(inbox_uri)
            .header("Content-Type", ACTIVITY_JSON)
            .headers(headers)
            .body(body)
            .send()
            .await;
        FEDERATION_REQUEST_DURATION_SECONDS
            .with_label_values(&["inbox"])
            .observe(started.elapsed().as_secs_f64());

        let response = response.map_err(|e| AppError::Delivery {
            status: e.status().map(|s| s.as_u16()),
            detail: if e.is_timeout() {
                format!("Timed out delivering to {}", inbox_uri)
            } else {
                format!("Failed to deliver to {}: {}", inbox_uri, e)
            },
        })?;

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    inbox = %inbox_uri,
                    status = %status,
                    error = %e,
                    "Failed to read inbox response body"
                );
                String::new()
            }
        };

        if !status.is_success() {
            return Err(AppError::Delivery {
                status: Some(status.as_u16()),
                detail: format!("Inbox {} rejected activity: HTTP {}", inbox_uri, status),
            });
        }

        Ok(InboxResponse {
            status: status.as_u16(),
            body: parse_response_body(&text),
        })
    }
}

/// Inbox responses are usually empty; some servers answer with JSON or text.
fn parse_response_body(text: &str) -> Option<serde_json::Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(
        serde_json::from_str(text)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::valid_config;
    use crate::identity::MockIdentityProvider;

    fn dispatcher(identities: MockIdentityProvider) -> DeliveryDispatcher {
        DeliveryDispatcher::from_config(
            &valid_config(),
            Arc::new(reqwest::Client::new()),
            Arc::new(identities),
        )
        .expect("valid config")
    }

    #[test]
    fn parse_response_body_handles_empty_json_and_text() {
        assert_eq!(parse_response_body(""), None);
        assert_eq!(parse_response_body("  \n"), None);
        assert_eq!(
            parse_response_body(r#"{"ok":true}"#),
            Some(serde_json::json!({"ok": true}))
        );
        assert_eq!(
            parse_response_body("Accepted"),
            Some(serde_json::Value::String("Accepted".to_string()))
        );
    }

    #[tokio::test]
    async fn send_with_unknown_local_actor_is_not_found() {
        let mut identities = MockIdentityProvider::new();
        identities
            .expect_load()
            .withf(|username| username == "nobody")
            .times(1)
            .returning(|_| Err(AppError::NotFound));

        let result = dispatcher(identities)
            .send("nobody", "bob@example.org", "hi")
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn send_with_unreadable_key_is_signing_failure() {
        let mut identities = MockIdentityProvider::new();
        identities
            .expect_load()
            .times(1)
            .returning(|_| Err(AppError::Signing("Cannot read private.pem".to_string())));

        let result = dispatcher(identities)
            .send("alice", "bob@example.org", "hi")
            .await;
        assert!(matches!(result, Err(AppError::Signing(_))));
    }

    #[tokio::test]
    async fn deliver_to_malformed_address_fails_resolution() {
        let identities = MockIdentityProvider::new();
        let local = crate::identity::test_support::test_actor("alice");

        let result = dispatcher(identities)
            .deliver(&local, "not-an-address", "hi")
            .await;
        assert!(matches!(result, Err(AppError::Resolution(_))));
    }
}
