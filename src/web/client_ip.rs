// src/web/client_ip.rs

// caller IP resolution behind optional trusted proxies

// dependencies
use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::StatusCode;
use axum::http::request::Parts;
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use tracing::error;

use super::AppState;
use crate::clock::Clock;

/// The caller's address as the gateway sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<C> FromRequestParts<AppState<C>> for ClientIp
where
    C: Clock + 'static,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<C>,
    ) -> Result<Self, Self::Rejection> {
        let ConnectInfo(peer) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                error!("connection info missing, is the server built with connect info?");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok());

        Ok(ClientIp(resolve_client_ip(
            peer.ip(),
            forwarded,
            &state.trusted_proxies,
        )))
    }
}

/// Work out the caller's IP.
///
/// The peer is the caller unless it is a trusted proxy. Then
/// `X-Forwarded-For` is walked right to left and the first untrusted hop is
/// the caller; if every hop is trusted the leftmost one is used.
pub fn resolve_client_ip(peer: IpAddr, forwarded: Option<&str>, trusted: &[IpNet]) -> IpAddr {
    let peer = peer.to_canonical();
    let is_trusted = |ip: IpAddr| trusted.iter().any(|net| net.contains(&ip));

    let Some(forwarded) = forwarded else {
        return peer;
    };
    if !is_trusted(peer) {
        return peer;
    }

    let mut client = peer;
    for hop in forwarded.split(',').rev() {
        let Ok(ip) = hop.trim().parse::<IpAddr>() else {
            break;
        };
        client = ip.to_canonical();
        if !is_trusted(client) {
            break;
        }
    }
    client
}
