//! ActivityPub endpoints
//!
//! - Actor profile (JSON or HTML by `Accept`)
//! - Actor icon
//! - Inbox (activity receiving)

use axum::body::Bytes;
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
};

use crate::AppState;
use crate::error::AppError;
use crate::federation::ACTIVITY_JSON;
use crate::identity::{ActorProfile, run_blocking};
use crate::metrics::ACTIVITIES_RECEIVED;

/// Create ActivityPub router
///
/// Routes:
/// - GET /actors/:username - Actor profile
/// - GET /actors/:username/icon - Actor icon
/// - POST /actors/:username/inbox - Personal inbox
/// - POST /inbox - Shared inbox
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/actors/:username", get(actor))
        .route("/actors/:username/icon", get(actor_icon))
        .route("/actors/:username/inbox", post(inbox))
        .route("/inbox", post(shared_inbox))
}

/// Representation chosen for the actor endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActorFormat {
    Json,
    Html,
}

/// Pick a representation from an `Accept` header
///
/// Highest q-value wins; ties go to the earlier entry. Anything that is
/// not clearly asking for HTML gets JSON.
fn negotiate(accept: Option<&str>) -> ActorFormat {
    let Some(accept) = accept else {
        return ActorFormat::Json;
    };

    let mut best: Option<(f32, ActorFormat)> = None;
    for entry in accept.split(',') {
        let mut params = entry.split(';');
        let media_type = params.next().unwrap_or("").trim().to_ascii_lowercase();
        let quality = params
            .filter_map(|p| p.trim().strip_prefix("q="))
            .find_map(|q| q.trim().parse::<f32>().ok())
            .unwrap_or(1.0);

        let format = match media_type.as_str() {
            "application/activity+json" | "application/ld+json" | "application/json" | "*/*" => {
                ActorFormat::Json
            }
            "text/html" | "application/xhtml+xml" | "text/*" => ActorFormat::Html,
            _ => continue,
        };

        if quality > 0.0 && best.is_none_or(|(q, _)| quality > q) {
            best = Some((quality, format));
        }
    }

    best.map(|(_, format)| format).unwrap_or(ActorFormat::Json)
}

/// GET /actors/:username
///
/// Content-Type: application/activity+json, or text/html for browsers
async fn actor(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let profile = run_blocking(&state.identities, move |p| p.load_profile(&username)).await?;

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok());

    match negotiate(accept) {
        ActorFormat::Json => {
            let document = profile.document(state.config.server.base_url());
            Ok(([(header::CONTENT_TYPE, ACTIVITY_JSON)], Json(document)).into_response())
        }
        ActorFormat::Html => {
            let domain = state.config.server.domain().unwrap_or_default();
            Ok(Html(render_profile_page(&profile, &domain)).into_response())
        }
    }
}

fn render_profile_page(profile: &ActorProfile, domain: &str) -> String {
    let name = profile
        .props
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or(&profile.username);
    let summary = profile
        .props
        .get("summary")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>{name}</title>
  <link rel="alternate" type="application/activity+json" href="{id}" />
</head>
<body>
  <h1>{name}</h1>
  <p>@{username}@{domain}</p>
  <p>{summary}</p>
</body>
</html>"#,
        name = html_escape::encode_text(name),
        id = html_escape::encode_double_quoted_attribute(&profile.id),
        username = html_escape::encode_text(&profile.username),
        domain = html_escape::encode_text(domain),
        summary = html_escape::encode_text(summary),
    )
}

/// GET /actors/:username/icon
async fn actor_icon(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Response, AppError> {
    let path = run_blocking(&state.identities, move |p| {
        p.icon_path(&username).ok_or(AppError::NotFound)
    })
    .await?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

/// POST /actors/:username/inbox
///
/// Accepts and logs the activity. Nothing is stored and signatures are
/// not checked.
async fn inbox(
    State(state): State<AppState>,
    Path(username): Path<String>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let lookup = username.clone();
    let exists = run_blocking(&state.identities, move |p| Ok(p.exists(&lookup))).await?;
    if !exists {
        return Err(AppError::NotFound);
    }

    accept_activity(Some(&username), &body)
}

/// POST /inbox
///
/// Shared inbox for all actors on this instance.
async fn shared_inbox(body: Bytes) -> Result<StatusCode, AppError> {
    accept_activity(None, &body)
}

fn accept_activity(username: Option<&str>, body: &[u8]) -> Result<StatusCode, AppError> {
    let activity: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid JSON: {}", e)))?;

    let field = |name: &str| {
        activity
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    let activity_type = field("type");

    ACTIVITIES_RECEIVED
        .with_label_values(&[if activity_type.is_empty() {
            "unknown"
        } else {
            activity_type.as_str()
        }])
        .inc();

    tracing::info!(
        recipient = username.unwrap_or("shared"),
        activity_type = %activity_type,
        id = %field("id"),
        actor = %field("actor"),
        "Activity received"
    );

    Ok(StatusCode::ACCEPTED)
}
