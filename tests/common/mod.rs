//! Common test utilities for E2E tests
#![allow(dead_code)]

pub mod remote;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use fedsend::{AppState, config};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// PEM encoded (private, public) keypair shared by every test actor
pub fn keypair() -> (&'static str, &'static str) {
    static KEYS: OnceLock<(String, String)> = OnceLock::new();
    let (private_key_pem, public_key_pem) = KEYS.get_or_init(|| {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        (
            private_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
            public_key.to_public_key_pem(LineEnding::LF).unwrap(),
        )
    });
    (private_key_pem.as_str(), public_key_pem.as_str())
}

/// Write `<actors_path>/<username>/{actor.json,public.pem,private.pem}`
pub fn provision_actor(actors_path: &Path, username: &str) {
    let (private_key_pem, public_key_pem) = keypair();
    let dir = actors_path.join(username);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("actor.json"),
        format!(r#"{{"name":"{}","summary":"test actor"}}"#, username),
    )
    .unwrap();
    std::fs::write(dir.join("public.pem"), public_key_pem).unwrap();
    std::fs::write(dir.join("private.pem"), private_key_pem).unwrap();
}

/// Configuration for a local instance whose actors live under `root`
///
/// WebFinger runs over plain http so the local mock remote is reachable.
pub fn test_config(root: &Path, base_url: &str) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: base_url.to_string(),
            public_path: root.join("public"),
            actors_path: root.join("actors"),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
        federation: config::FederationConfig {
            profile: "standard".to_string(),
            key_id_style: config::KeyIdStyle::Fragment,
            webfinger_scheme: "http".to_string(),
            request_timeout_secs: 5,
            user_agent: "fedsend/test".to_string(),
        },
    }
}

/// Sending side: a provisioned `alice` and a dispatcher, no listener
pub struct TestSender {
    pub state: AppState,
    pub _temp_dir: TempDir,
}

impl TestSender {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path(), "https://local.example");
        adjust(&mut config);
        provision_actor(&config.server.actors_path, "alice");

        let state = AppState::new(config).unwrap();
        Self {
            state,
            _temp_dir: temp_dir,
        }
    }
}

/// A running fedsend server with the given local actors provisioned
pub struct TestServer {
    pub addr: String,
    pub host: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance with the given local actors
    pub async fn new(usernames: &[&str]) -> Self {
        let temp_dir = TempDir::new().unwrap();

        // Bind first so the public base URL carries the real port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let config = test_config(temp_dir.path(), &addr_str);
        for username in usernames {
            provision_actor(&config.server.actors_path, username);
        }
        std::fs::create_dir_all(&config.server.public_path).unwrap();
        std::fs::write(
            config.server.public_path.join("index.html"),
            "<h1>fedsend</h1>",
        )
        .unwrap();

        fedsend::metrics::init_metrics();
        let state = AppState::new(config).unwrap();
        let app = fedsend::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            addr: addr_str,
            host: addr.to_string(),
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get URL for a path on this server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    pub fn actors_path(&self) -> PathBuf {
        self.state.config.server.actors_path.clone()
    }
}
