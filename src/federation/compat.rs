//! Server compatibility profiles
//!
//! Implementations disagree on small protocol details: which WebFinger
//! `resource` form they accept, whether a mention tag must carry a
//! `name`, and whether a direct recipient must be cc'd. Each profile
//! pins one answer for all three.

use crate::federation::webfinger::ResourceFormat;

/// How mention tags are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionStyle {
    /// `href` and `name: "@user@host"`
    Named,
    /// `href` only
    HrefOnly,
}

/// A named set of per-server protocol variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProfile {
    pub name: &'static str,
    /// WebFinger resource formats, tried in order; 404 moves to the next
    pub webfinger_formats: &'static [ResourceFormat],
    pub mention_style: MentionStyle,
    /// Put the recipient's actor id in `cc`
    pub cc_recipient: bool,
}

impl ServerProfile {
    /// Works against Mastodon, Pleroma/Akkoma, Misskey and most others.
    pub const STANDARD: ServerProfile = ServerProfile {
        name: "standard",
        webfinger_formats: &[ResourceFormat::Acct, ResourceFormat::Bare],
        mention_style: MentionStyle::Named,
        cc_recipient: true,
    };

    /// Only `acct:` lookups; strict mention names.
    pub const MASTODON: ServerProfile = ServerProfile {
        name: "mastodon",
        webfinger_formats: &[ResourceFormat::Acct],
        mention_style: MentionStyle::Named,
        cc_recipient: true,
    };

    /// Bare `user@host` first, for servers that reject the `acct:` scheme.
    pub const BARE_FIRST: ServerProfile = ServerProfile {
        name: "bare-first",
        webfinger_formats: &[ResourceFormat::Bare, ResourceFormat::Acct],
        mention_style: MentionStyle::HrefOnly,
        cc_recipient: true,
    };

    /// Public post without recipient cc; the mention alone addresses it.
    pub const PUBLIC_ONLY: ServerProfile = ServerProfile {
        name: "public-only",
        webfinger_formats: &[ResourceFormat::Acct, ResourceFormat::Bare],
        mention_style: MentionStyle::Named,
        cc_recipient: false,
    };

    pub const ALL: &'static [ServerProfile] = &[
        Self::STANDARD,
        Self::MASTODON,
        Self::BARE_FIRST,
        Self::PUBLIC_ONLY,
    ];

    /// Look up a profile by its configuration name
    pub fn by_name(name: &str) -> Option<&'static ServerProfile> {
        Self::ALL
            .iter()
            .find(|profile| profile.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl Default for ServerProfile {
    fn default() -> Self {
        Self::STANDARD
    }
}
