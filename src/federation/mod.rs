//! ActivityPub federation module
//!
//! Handles:
//! - HTTP Signatures and body digests
//! - WebFinger discovery
//! - Actor fetching
//! - Activity construction
//! - Activity delivery (outbox)
//! - Per-server compatibility profiles

mod activity;
mod compat;
mod delivery;
mod resolver;
mod signature;
mod webfinger;

use std::time::Duration;

pub use activity::{
    ACTIVITYSTREAMS_CONTEXT, Activity, ActivityBuilder, ActivityObject, Mention, PUBLIC_COLLECTION,
};
pub use compat::{MentionStyle, ServerProfile};
pub use delivery::{DeliveryDispatcher, DeliveryResult};
pub use resolver::{IdentityResolver, RemoteActor};
pub use signature::{
    ParsedSignature, SignatureHeaders, SigningString, body_digest, build_signing_string,
    digest_header, host_and_target, http_date, parse_signature_header, sign_request, sign_string,
    verify_signature,
};
pub use webfinger::{
    ACTIVITY_JSON, Account, ResourceFormat, WebFingerLink, WebFingerResponse,
    generate_webfinger_response,
};

use crate::config::FederationConfig;
use crate::error::AppError;

/// HTTP client for outbound federation requests
///
/// Every request made through it is bounded by the configured timeout.
pub fn build_http_client(config: &FederationConfig) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| AppError::Internal(e.into()))
}
