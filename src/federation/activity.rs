//! Activity construction
//!
//! Builds the `Create(Note)` envelope for a direct message to one remote
//! actor. Construction is pure: the only inputs besides the actors are
//! the random source and the clock, both injectable.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::federation::compat::{MentionStyle, ServerProfile};
use crate::federation::resolver::RemoteActor;
use crate::identity::LocalActor;

/// ActivityStreams context
pub const ACTIVITYSTREAMS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// The public collection
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

/// A `Create` activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actor: String,
    pub published: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub object: ActivityObject,
}

/// The `Note` carried by a `Create`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityObject {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub published: String,
    #[serde(rename = "attributedTo")]
    pub attributed_to: String,
    pub content: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<Mention>,
}

/// A `Mention` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    #[serde(rename = "type")]
    pub kind: String,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Builds activities for one local instance
#[derive(Debug, Clone)]
pub struct ActivityBuilder {
    base_url: String,
    profile: &'static ServerProfile,
}

impl ActivityBuilder {
    pub fn new(base_url: &str, profile: &'static ServerProfile) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            profile,
        }
    }

    /// Build a `Create(Note)` with fresh random ids and the current time
    pub fn build(
        &self,
        local: &LocalActor,
        remote: &RemoteActor,
        account: &str,
        content: &str,
    ) -> Activity {
        self.build_with(&mut rand::thread_rng(), Utc::now(), local, remote, account, content)
    }

    /// Build a `Create(Note)` from an explicit random source and instant
    ///
    /// # Arguments
    /// * `rng` - Source of the two 128-bit identifiers
    /// * `now` - Publication instant
    /// * `local` - Author
    /// * `remote` - Recipient
    /// * `account` - Recipient address as typed (`user@host`), used for the mention name
    /// * `content` - Note content
    pub fn build_with<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
        now: DateTime<Utc>,
        local: &LocalActor,
        remote: &RemoteActor,
        account: &str,
        content: &str,
    ) -> Activity {
        let published = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        let to = vec![PUBLIC_COLLECTION.to_string()];
        let cc = if self.profile.cc_recipient {
            vec![remote.id.clone()]
        } else {
            Vec::new()
        };

        let mention = Mention {
            kind: "Mention".to_string(),
            href: remote.id.clone(),
            name: match self.profile.mention_style {
                MentionStyle::Named => Some(mention_name(account)),
                MentionStyle::HrefOnly => None,
            },
        };

        let object = ActivityObject {
            id: format!("{}/objects/{}", self.base_url, random_id(rng)),
            kind: "Note".to_string(),
            published: published.clone(),
            attributed_to: local.id.clone(),
            content: content.to_string(),
            to: to.clone(),
            cc: cc.clone(),
            tag: vec![mention],
        };

        Activity {
            context: ACTIVITYSTREAMS_CONTEXT.to_string(),
            id: format!("{}/activities/{}", self.base_url, random_id(rng)),
            kind: "Create".to_string(),
            actor: local.id.clone(),
            published,
            to,
            cc,
            object,
        }
    }
}

/// 128 random bits, hex-encoded
fn random_id<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `@user@host`, whatever form the address was typed in
fn mention_name(account: &str) -> String {
    let account = account.trim();
    let account = account.strip_prefix("acct:").unwrap_or(account);
    format!("@{}", account.trim_start_matches('@'))
}
