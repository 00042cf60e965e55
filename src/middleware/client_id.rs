//! Caller identification
//!
//! Conversation history is keyed by the caller's network address. Behind a
//! reverse proxy the peer address is the proxy, so the first `X-Forwarded-For`
//! entry is used instead when `server.trust_forwarded_for` is set.

use crate::handlers::AppState;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};
use std::convert::Infallible;
use std::net::SocketAddr;

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Identifier used when neither a trusted header nor a peer address is known
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Identifier of the calling client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn first_forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(FORWARDED_FOR_HEADER)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

impl FromRequestParts<AppState> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.config().server.trust_forwarded_for
            && let Some(forwarded) = first_forwarded_for(&parts.headers)
        {
            return Ok(Self(forwarded));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self(peer.unwrap_or_else(|| UNKNOWN_CLIENT.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_first_forwarded_for_takes_first_entry() {
        assert_eq!(
            first_forwarded_for(&headers("203.0.113.7, 10.0.0.1")),
            Some("203.0.113.7".to_string())
        );
    }

    #[test]
    fn test_first_forwarded_for_ignores_blank() {
        assert_eq!(first_forwarded_for(&headers(" , 10.0.0.1")), None);
        assert_eq!(first_forwarded_for(&HeaderMap::new()), None);
    }
}
