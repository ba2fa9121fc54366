//! A remote instance played by a local axum server
//!
//! Serves WebFinger, one actor document (`bob`) and its inbox, and records
//! every request it sees so tests can assert on what was sent.

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// How the remote answers
#[derive(Debug, Clone)]
pub struct Behaviour {
    /// Answer every WebFinger query with 404
    pub webfinger_not_found: bool,
    /// Answer `acct:` WebFinger queries with 404, bare ones normally
    pub acct_not_found: bool,
    /// Omit the self link from the JRD
    pub webfinger_without_self_link: bool,
    /// Inbox advertised in the actor document instead of our own
    pub actor_inbox: Option<&'static str>,
    /// Status returned by the inbox
    pub inbox_status: StatusCode,
    /// Body returned by the inbox
    pub inbox_body: &'static str,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            webfinger_not_found: false,
            acct_not_found: false,
            webfinger_without_self_link: false,
            actor_inbox: None,
            inbox_status: StatusCode::ACCEPTED,
            inbox_body: "",
        }
    }
}

/// A request received by the remote
#[derive(Debug, Clone)]
pub struct Received {
    pub method: Method,
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Received {
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Default)]
struct Recorded {
    webfinger_resources: Vec<String>,
    actor_fetches: Vec<Received>,
    inbox: Vec<Received>,
}

#[derive(Clone)]
struct RemoteState {
    base_url: String,
    behaviour: Behaviour,
    recorded: Arc<Mutex<Recorded>>,
}

impl RemoteState {
    fn actor_id(&self) -> String {
        format!("{}/users/bob", self.base_url)
    }
}

/// Handle to a running mock remote
pub struct MockRemote {
    /// `host:port` of the remote, usable in `bob@<host>`
    pub host: String,
    pub base_url: String,
    state: RemoteState,
}

impl MockRemote {
    pub async fn start(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = listener.local_addr().unwrap().to_string();
        let base_url = format!("http://{}", host);

        let state = RemoteState {
            base_url: base_url.clone(),
            behaviour,
            recorded: Arc::new(Mutex::new(Recorded::default())),
        };

        let app = Router::new()
            .route("/.well-known/webfinger", get(webfinger))
            .route("/users/bob", get(actor))
            .route("/users/bob/inbox", post(inbox))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            host,
            base_url,
            state,
        }
    }

    /// `bob@<host>`
    pub fn account(&self) -> String {
        format!("bob@{}", self.host)
    }

    pub fn actor_id(&self) -> String {
        self.state.actor_id()
    }

    pub fn inbox_url(&self) -> String {
        format!("{}/inbox", self.state.actor_id())
    }

    pub fn webfinger_resources(&self) -> Vec<String> {
        self.state.recorded.lock().unwrap().webfinger_resources.clone()
    }

    pub fn actor_fetches(&self) -> Vec<Received> {
        self.state.recorded.lock().unwrap().actor_fetches.clone()
    }

    pub fn inbox(&self) -> Vec<Received> {
        self.state.recorded.lock().unwrap().inbox.clone()
    }
}

#[derive(Deserialize)]
struct WebFingerQuery {
    resource: String,
}

async fn webfinger(State(state): State<RemoteState>, Query(query): Query<WebFingerQuery>) -> Response {
    state
        .recorded
        .lock()
        .unwrap()
        .webfinger_resources
        .push(query.resource.clone());

    let user = query
        .resource
        .trim_start_matches("acct:")
        .split('@')
        .next()
        .unwrap_or("");
    let acct_refused =
        state.behaviour.acct_not_found && query.resource.starts_with("acct:");
    if state.behaviour.webfinger_not_found || acct_refused || user != "bob" {
        return StatusCode::NOT_FOUND.into_response();
    }

    let mut links = vec![json!({
        "rel": "http://webfinger.net/rel/profile-page",
        "type": "text/html",
        "href": format!("{}/@bob", state.base_url)
    })];
    if !state.behaviour.webfinger_without_self_link {
        links.push(json!({
            "rel": "self",
            "type": "application/activity+json",
            "href": state.actor_id()
        }));
    }

    (
        [(header::CONTENT_TYPE, "application/jrd+json")],
        Json(json!({ "subject": query.resource, "links": links })),
    )
        .into_response()
}

async fn actor(
    State(state): State<RemoteState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.recorded.lock().unwrap().actor_fetches.push(Received {
        method,
        target: uri.to_string(),
        headers,
        body: Bytes::new(),
    });

    let id = state.actor_id();
    let inbox = state
        .behaviour
        .actor_inbox
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}/inbox", id));
    (
        [(header::CONTENT_TYPE, "application/activity+json")],
        Json(json!({
            "@context": "https://www.w3.org/ns/activitystreams",
            "id": id,
            "type": "Person",
            "preferredUsername": "bob",
            "inbox": inbox,
            "endpoints": { "sharedInbox": format!("{}/inbox", state.base_url) }
        })),
    )
        .into_response()
}

async fn inbox(
    State(state): State<RemoteState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.recorded.lock().unwrap().inbox.push(Received {
        method,
        target: uri.to_string(),
        headers,
        body,
    });

    (state.behaviour.inbox_status, state.behaviour.inbox_body).into_response()
}
