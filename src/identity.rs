//! Local identities
//!
//! A local actor is provisioned out-of-band as a directory:
//!
//! ```text
//! <actors_path>/<username>/
//!   actor.json    extra profile properties (name, summary, ...)
//!   public.pem    RSA public key
//!   private.pem   RSA private key (PKCS#8 or PKCS#1)
//!   icon.png      optional avatar
//! ```
//!
//! The published profile and the signing identity are loaded separately;
//! `private.pem` is only read when something is about to be signed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::KeyIdStyle;
use crate::error::AppError;

/// Public half of a local identity, as published in the actor document
#[derive(Debug, Clone)]
pub struct ActorProfile {
    /// Local username
    pub username: String,
    /// Canonical actor URI (`<base_url>/actors/<username>`)
    pub id: String,
    /// Key identifier, published as `publicKey.id`
    pub key_id: String,
    /// RSA public key in PEM format
    pub public_key_pem: String,
    /// Profile properties from `actor.json`
    pub props: Map<String, Value>,
}

impl ActorProfile {
    /// Inbox URL for this actor
    pub fn inbox(&self) -> String {
        format!("{}/inbox", self.id)
    }

    /// Render the ActivityPub actor document
    ///
    /// `actor.json` properties are merged last and win over generated ones.
    pub fn document(&self, base_url: &str) -> Value {
        let mut document = serde_json::json!({
            "@context": [
                "https://www.w3.org/ns/activitystreams",
                "https://w3id.org/security/v1"
            ],
            "id": self.id,
            "type": "Person",
            "preferredUsername": self.username,
            "url": self.id,
            "inbox": self.inbox(),
            "following": format!("{}/following", self.id),
            "followers": format!("{}/followers", self.id),
            "discoverable": true,
            "manuallyApprovesFollowers": true,
            "endpoints": {
                "sharedInbox": format!("{}/inbox", base_url.trim_end_matches('/'))
            },
            "publicKey": {
                "id": self.key_id,
                "owner": self.id,
                "publicKeyPem": self.public_key_pem
            },
            "icon": {
                "type": "Image",
                "mediaType": "image/png",
                "url": format!("{}/icon", self.id)
            }
        });

        if let Value::Object(ref mut fields) = document {
            for (key, value) in &self.props {
                fields.insert(key.clone(), value.clone());
            }
        }

        document
    }
}

/// A locally controlled identity that can sign
///
/// Loaded once per operation and dropped afterwards; the private key is
/// only ever handed to the signer.
#[derive(Clone)]
pub struct LocalActor {
    /// Local username
    pub username: String,
    /// Canonical actor URI
    pub id: String,
    /// Key identifier advertised in Signature headers
    pub key_id: String,
    /// RSA public key in PEM format
    pub public_key_pem: String,
    private_key_pem: String,
}

impl LocalActor {
    pub fn new(
        username: impl Into<String>,
        id: String,
        key_id: String,
        public_key_pem: String,
        private_key_pem: String,
    ) -> Self {
        Self {
            username: username.into(),
            id,
            key_id,
            public_key_pem,
            private_key_pem,
        }
    }

    /// Attach the private key to a loaded profile
    pub fn from_profile(profile: ActorProfile, private_key_pem: String) -> Self {
        Self::new(
            profile.username,
            profile.id,
            profile.key_id,
            profile.public_key_pem,
            private_key_pem,
        )
    }

    pub(crate) fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }
}

impl fmt::Debug for LocalActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalActor")
            .field("username", &self.username)
            .field("id", &self.id)
            .field("key_id", &self.key_id)
            .field("private_key_pem", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Source of local identities
///
/// Implementations may block (file or database reads); async callers go
/// through [`run_blocking`].
#[cfg_attr(test, mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    /// Whether `username` is provisioned
    fn exists(&self, username: &str) -> bool;

    /// Load the public profile of a local actor
    ///
    /// # Errors
    /// - `AppError::NotFound` if no such identity is provisioned
    /// - `AppError::Validation` if the profile properties are malformed
    /// - `AppError::Internal` if the public key cannot be read
    fn load_profile(&self, username: &str) -> Result<ActorProfile, AppError>;

    /// Load a local actor together with its private key
    ///
    /// # Errors
    /// - `AppError::NotFound` if no such identity is provisioned
    /// - `AppError::Signing` if key material cannot be read
    fn load(&self, username: &str) -> Result<LocalActor, AppError>;

    /// Path of the actor's icon, if one is provisioned
    fn icon_path(&self, username: &str) -> Option<PathBuf>;
}

/// Run an identity provider call on the blocking thread pool
pub async fn run_blocking<T, F>(provider: &Arc<dyn IdentityProvider>, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&dyn IdentityProvider) -> Result<T, AppError> + Send + 'static,
{
    let provider = Arc::clone(provider);
    tokio::task::spawn_blocking(move || f(provider.as_ref()))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
}

/// Identity provider backed by `<actors_path>/<username>/` directories
#[derive(Debug, Clone)]
pub struct FileIdentityProvider {
    actors_path: PathBuf,
    base_url: String,
    key_id_style: KeyIdStyle,
}

impl FileIdentityProvider {
    pub fn new(actors_path: impl Into<PathBuf>, base_url: &str, key_id_style: KeyIdStyle) -> Self {
        Self {
            actors_path: actors_path.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id_style,
        }
    }

    /// Canonical actor URI for a username
    pub fn actor_id(&self, username: &str) -> String {
        format!("{}/actors/{}", self.base_url, username)
    }

    fn actor_dir(&self, username: &str) -> Option<PathBuf> {
        is_valid_username(username).then(|| self.actors_path.join(username))
    }

    /// Directory of a provisioned actor
    fn provisioned_dir(&self, username: &str) -> Result<PathBuf, AppError> {
        let dir = self.actor_dir(username).ok_or(AppError::NotFound)?;
        if !dir.join("actor.json").is_file() {
            tracing::debug!(username, path = %dir.display(), "Local actor not provisioned");
            return Err(AppError::NotFound);
        }
        Ok(dir)
    }

    fn read_private_key(path: &Path) -> Result<String, AppError> {
        std::fs::read_to_string(path)
            .map_err(|e| AppError::Signing(format!("Cannot read {}: {}", path.display(), e)))
    }
}

impl IdentityProvider for FileIdentityProvider {
    fn exists(&self, username: &str) -> bool {
        self.provisioned_dir(username).is_ok()
    }

    fn load_profile(&self, username: &str) -> Result<ActorProfile, AppError> {
        let dir = self.provisioned_dir(username)?;

        let props = std::fs::read_to_string(dir.join("actor.json"))
            .map_err(|e| AppError::Internal(e.into()))?;
        let props: Map<String, Value> = serde_json::from_str(&props).map_err(|e| {
            AppError::Validation(format!("Invalid actor.json for {}: {}", username, e))
        })?;

        let public_key_path = dir.join("public.pem");
        let public_key_pem = std::fs::read_to_string(&public_key_path).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Cannot read {}: {}",
                public_key_path.display(),
                e
            ))
        })?;

        let id = self.actor_id(username);
        let key_id = self.key_id_style.key_id_for(&id);

        Ok(ActorProfile {
            username: username.to_string(),
            id,
            key_id,
            public_key_pem,
            props,
        })
    }

    fn load(&self, username: &str) -> Result<LocalActor, AppError> {
        let profile = self.load_profile(username).map_err(|e| match e {
            AppError::Internal(e) => AppError::Signing(e.to_string()),
            other => other,
        })?;
        let private_key_pem =
            Self::read_private_key(&self.actors_path.join(username).join("private.pem"))?;

        Ok(LocalActor::from_profile(profile, private_key_pem))
    }

    fn icon_path(&self, username: &str) -> Option<PathBuf> {
        self.provisioned_dir(username)
            .ok()
            .map(|dir| dir.join("icon.png"))
            .filter(|path| path.is_file())
    }
}

/// Usernames double as directory names.
fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && !username.starts_with('.')
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
