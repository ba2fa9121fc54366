//! WebFinger protocol implementation
//!
//! Used to discover ActivityPub actor URIs from addresses, and to answer
//! discovery queries for local actors.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// ActivityStreams media type
pub const ACTIVITY_JSON: &str = "application/activity+json";

/// JSON-LD form of the ActivityStreams media type, treated as equivalent
const LD_JSON_ACTIVITYSTREAMS: &str =
    "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// An account address split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub host: String,
}

impl Account {
    /// Parse `user@host`, tolerating a leading `@` or `acct:`
    ///
    /// Splits at the first `@`; everything after it is the host.
    pub fn parse(address: &str) -> Result<Self, AppError> {
        let trimmed = address.trim();
        let trimmed = trimmed.strip_prefix("acct:").unwrap_or(trimmed);
        let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);

        let (username, host) = trimmed.split_once('@').ok_or_else(|| {
            AppError::Resolution(format!("'{}' is not a user@host address", address))
        })?;

        if username.is_empty() || host.is_empty() {
            return Err(AppError::Resolution(format!(
                "'{}' is not a user@host address",
                address
            )));
        }

        Ok(Self {
            username: username.to_string(),
            host: host.to_string(),
        })
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.username, self.host)
    }
}

/// Form of the `resource` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceFormat {
    /// `acct:user@host`
    Acct,
    /// `user@host`
    Bare,
}

impl ResourceFormat {
    pub fn resource(self, account: &Account) -> String {
        match self {
            ResourceFormat::Acct => format!("acct:{}", account),
            ResourceFormat::Bare => account.to_string(),
        }
    }
}

/// WebFinger JRD response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerResponse {
    #[serde(default)]
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub links: Vec<WebFingerLink>,
}

/// WebFinger link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebFingerLink {
    pub rel: String,
    #[serde(rename = "type")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl WebFingerResponse {
    /// The ActivityPub actor URL advertised by this JRD
    ///
    /// Selects the `rel="self"` link with an ActivityStreams media type
    /// and returns its `href` unmodified.
    pub fn actor_url(&self) -> Result<&str, AppError> {
        self.links
            .iter()
            .find(|link| {
                link.rel == "self"
                    && link
                        .link_type
                        .as_deref()
                        .is_some_and(|t| t == ACTIVITY_JSON || t == LD_JSON_ACTIVITYSTREAMS)
            })
            .and_then(|link| link.href.as_deref())
            .ok_or_else(|| AppError::Resolution("no self-link".to_string()))
    }
}

/// Generate WebFinger response for a local account.
///
/// # Arguments
/// * `resource` - Resource exactly as queried (echoed as `subject`)
/// * `actor_url` - Local actor URI
pub fn generate_webfinger_response(resource: &str, actor_url: &str) -> WebFingerResponse {
    WebFingerResponse {
        subject: resource.to_string(),
        aliases: None,
        links: vec![WebFingerLink {
            rel: "self".to_string(),
            link_type: Some(ACTIVITY_JSON.to_string()),
            href: Some(actor_url.to_string()),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jrd(json: serde_json::Value) -> WebFingerResponse {
        serde_json::from_value(json).expect("valid JRD")
    }

    #[test]
    fn account_parse_splits_at_first_at_sign() {
        let account = Account::parse("bob@example.org").unwrap();
        assert_eq!(account.username, "bob");
        assert_eq!(account.host, "example.org");

        let account = Account::parse("bob@example.org@extra").unwrap();
        assert_eq!(account.host, "example.org@extra");
    }

    #[test]
    fn account_parse_strips_prefixes() {
        assert_eq!(
            Account::parse("@bob@example.org").unwrap().to_string(),
            "bob@example.org"
        );
        assert_eq!(
            Account::parse("acct:bob@example.org").unwrap().to_string(),
            "bob@example.org"
        );
    }

    #[test]
    fn account_parse_rejects_incomplete_addresses() {
        for address in ["bob", "@example.org", "bob@", ""] {
            assert!(
                matches!(Account::parse(address), Err(AppError::Resolution(_))),
                "{address:?} should be rejected"
            );
        }
    }

    #[test]
    fn resource_formats() {
        let account = Account::parse("bob@example.org").unwrap();
        assert_eq!(
            ResourceFormat::Acct.resource(&account),
            "acct:bob@example.org"
        );
        assert_eq!(ResourceFormat::Bare.resource(&account), "bob@example.org");
    }

    #[test]
    fn actor_url_returns_self_link_unmodified() {
        let response = jrd(serde_json::json!({
            "subject": "acct:bob@example.org",
            "links": [
                {"rel": "http://webfinger.net/rel/profile-page", "type": "text/html", "href": "https://example.org/@bob"},
                {"rel": "self", "type": "application/activity+json", "href": "https://example.org/actors/bob?x=1#frag"}
            ]
        }));

        assert_eq!(
            response.actor_url().unwrap(),
            "https://example.org/actors/bob?x=1#frag"
        );
    }

    #[test]
    fn actor_url_accepts_ld_json_profile() {
        let response = jrd(serde_json::json!({
            "links": [{
                "rel": "self",
                "type": "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"",
                "href": "https://example.org/users/bob"
            }]
        }));

        assert_eq!(response.actor_url().unwrap(), "https://example.org/users/bob");
    }

    #[test]
    fn actor_url_fails_without_matching_link() {
        let response = jrd(serde_json::json!({
            "subject": "acct:bob@example.org",
            "links": [
                {"rel": "self", "type": "text/html", "href": "https://example.org/@bob"},
                {"rel": "alternate", "type": "application/activity+json", "href": "https://example.org/x"}
            ]
        }));

        match response.actor_url() {
            Err(AppError::Resolution(msg)) => assert_eq!(msg, "no self-link"),
            other => panic!("expected resolution failure, got: {other:?}"),
        }
        assert!(jrd(serde_json::json!({})).actor_url().is_err());
    }

    #[test]
    fn generated_response_round_trips_through_actor_url() {
        let response = generate_webfinger_response(
            "acct:alice@local.example",
            "https://local.example/actors/alice",
        );
        assert_eq!(response.subject, "acct:alice@local.example");
        assert_eq!(
            response.actor_url().unwrap(),
            "https://local.example/actors/alice"
        );
    }
}
