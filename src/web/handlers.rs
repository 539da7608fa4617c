// src/web/handlers.rs

// request handlers

// dependencies
use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::header::{HOST, RETRY_AFTER, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use tracing::{error, info, warn};

use super::views;
use super::{AppState, ClientIp};
use crate::clock::Clock;
use crate::gate::UnlockOutcome;
use crate::metrics::{self, AccessRequest};
use crate::sanitize::{form_field, sanitize_for_log, validate_query_param};

pub(crate) async fn unlock_page() -> Html<String> {
    Html(views::unlock_page())
}

/// Matched and mismatched secrets get the same page and status.
pub(crate) async fn unlock_submit<C>(
    State(state): State<AppState<C>>,
    ClientIp(ip): ClientIp,
    body: Bytes,
) -> Response
where
    C: Clock + 'static,
{
    let ip = ip.to_string();

    match state.throttle.check(ip.clone()) {
        Ok(decision) if !decision.allowed => {
            warn!(ip = %ip, "unlock throttled");
            let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
            if let Some(secs) = decision.retry_after_secs() {
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(secs));
            }
            return response;
        }
        Ok(_) => {}
        Err(e) => {
            error!(ip = %ip, error = %e, "throttle check failed");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let pass = match form_field(&body, "pass") {
        Ok(pass) => pass.unwrap_or_default(),
        Err(_) => {
            warn!(ip = %ip, "unlock input is not valid UTF-8");
            return (StatusCode::BAD_REQUEST, Html(views::unlock_page())).into_response();
        }
    };

    match state.gate.unlock(&ip, &pass) {
        Ok(UnlockOutcome::Granted | UnlockOutcome::Rejected) => {
            Html(views::unlock_page()).into_response()
        }
        Ok(UnlockOutcome::Invalid) => {
            (StatusCode::BAD_REQUEST, Html(views::unlock_page())).into_response()
        }
        Err(e) => {
            error!(ip = %ip, error = %e, "unlock failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub(crate) async fn access<C>(
    State(state): State<AppState<C>>,
    ClientIp(ip): ClientIp,
    method: Method,
    headers: HeaderMap,
) -> StatusCode
where
    C: Clock + 'static,
{
    let ip = ip.to_string();
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let host = header(HOST);

    metrics::access_checked();
    if let Ok(at) = state.gate.ledger().clock().now() {
        state.recent.push(AccessRequest {
            ip: ip.clone(),
            at,
            user_agent: sanitize_for_log(&header(USER_AGENT)),
            host: sanitize_for_log(&host),
            method: method.to_string(),
        });
    }

    match state.gate.check_access(&ip, &host) {
        Ok(decision) if decision.is_authorized() => StatusCode::OK,
        Ok(_) => StatusCode::UNAUTHORIZED,
        Err(e) => {
            error!(ip = %ip, error = %e, "access check failed");
            StatusCode::UNAUTHORIZED
        }
    }
}

pub(crate) async fn audit<C>(State(state): State<AppState<C>>) -> Html<String>
where
    C: Clock + 'static,
{
    Html(views::audit_page(
        &state.gate.ledger().snapshot(),
        &state.gate.failed_logins(),
        &state.recent.snapshot(),
    ))
}

pub(crate) async fn buckets<C>(
    State(state): State<AppState<C>>,
    ClientIp(caller): ClientIp,
    RawQuery(query): RawQuery,
) -> Response
where
    C: Clock + 'static,
{
    let raw = query.unwrap_or_default();
    let Ok(ip) = form_field(raw.as_bytes(), "ip") else {
        warn!(%caller, "ip parameter in bucket request is not valid UTF-8");
        return StatusCode::BAD_REQUEST.into_response();
    };
    let ip = ip.unwrap_or_default();
    let Some(lookup) = validate_query_param(&ip) else {
        warn!(%caller, "invalid ip parameter in bucket request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    info!(ip = %sanitize_for_log(lookup), "looking up bucket data");
    let record = state.gate.ledger().lookup(lookup).map(|r| r.snapshot());
    Html(views::buckets_page(lookup, record.as_ref())).into_response()
}

pub(crate) async fn metrics_page<C>(State(state): State<AppState<C>>) -> Response
where
    C: Clock + 'static,
{
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
