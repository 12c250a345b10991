//! Authentication and throttling middleware.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::ApiError;
use super::AppState;
use crate::auth::{AuthDecision, RequestThrottle};

/// Client address: first `X-Forwarded-For` hop, else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Token from the `Authorization` header, else the `auth` query parameter.
fn presented_token(request: &Request) -> Option<String> {
    if let Some(value) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    request.uri().query().and_then(|query| {
        super::query::values(Some(query), "auth")
            .into_iter()
            .next()
    })
}

/// Gate `/api/files/*` behind the shared token.
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = client_ip(request.headers(), peer_addr(&request));
    let token = presented_token(&request);

    match state.gate.authorize(&ip, token.as_deref()) {
        AuthDecision::Allowed => next.run(request).await,
        AuthDecision::Banned { minutes_left } => {
            ApiError::Banned { minutes_left }.into_response()
        }
        AuthDecision::Rejected => ApiError::Unauthorized.into_response(),
    }
}

/// Per-IP request budget; streaming endpoints are not counted.
pub async fn throttle(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if RequestThrottle::applies_to(request.uri().path()) {
        let ip = client_ip(request.headers(), peer_addr(&request));
        if !state.throttle.allow(&ip) {
            return ApiError::TooManyRequests.into_response();
        }
    }
    next.run(request).await
}
