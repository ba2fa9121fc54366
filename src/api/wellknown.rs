//! Well-known endpoints
//!
//! - /.well-known/webfinger

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::federation::generate_webfinger_response;
use crate::identity::run_blocking;

/// Create well-known router
///
/// Routes:
/// - GET /.well-known/webfinger
pub fn wellknown_router() -> Router<AppState> {
    Router::new().route("/.well-known/webfinger", get(webfinger))
}

/// WebFinger query parameters
#[derive(Debug, Deserialize)]
struct WebFingerQuery {
    resource: Option<String>,
}

/// A `scheme:user@host` resource
#[derive(Debug, PartialEq, Eq)]
struct Resource<'a> {
    scheme: &'a str,
    username: &'a str,
    hostname: &'a str,
}

fn parse_resource(resource: &str) -> Option<Resource<'_>> {
    let (scheme, rest) = resource.split_once(':')?;
    let (username, hostname) = rest.split_once('@')?;
    if scheme.is_empty() || username.is_empty() || hostname.is_empty() {
        return None;
    }
    Some(Resource {
        scheme,
        username,
        hostname,
    })
}

/// GET /.well-known/webfinger
///
/// Responds to WebFinger queries for local actors.
///
/// Query: ?resource=acct:user@domain
///
/// A missing or malformed resource is 406, like a foreign host.
async fn webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebFingerQuery>,
) -> Result<Response, AppError> {
    let unacceptable = || AppError::NotAcceptable("unacceptable webfinger query".to_string());
    let query_resource = query.resource.ok_or_else(unacceptable)?;
    let resource = parse_resource(&query_resource).ok_or_else(unacceptable)?;

    let site_domain = state.config.server.domain();
    if resource.scheme != "acct" || site_domain.as_deref() != Some(resource.hostname) {
        return Err(AppError::NotAcceptable(
            "unacceptable scheme or hostname".to_string(),
        ));
    }

    let username = resource.username.to_string();
    let lookup = username.clone();
    let exists = run_blocking(&state.identities, move |p| Ok(p.exists(&lookup))).await?;
    if !exists {
        return Err(AppError::NotFound);
    }

    let actor_url = format!("{}/actors/{}", state.config.server.base_url(), username);
    let response = generate_webfinger_response(&query_resource, &actor_url);

    Ok((
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::CONTENT_TYPE, "application/jrd+json"),
        ],
        Json(response),
    )
        .into_response())
}
