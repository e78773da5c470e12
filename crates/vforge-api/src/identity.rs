//! Client identity resolution.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

/// Caller identity used for admission control and job ownership.
///
/// Behind a proxy every replica must agree on who the client is, so the
/// first hop of `X-Forwarded-For` wins. Direct connections fall back to
/// the peer address.
#[derive(Debug, Clone)]
pub struct ClientIdentity(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(forwarded) = parts.headers.get("X-Forwarded-For") {
            if let Ok(value) = forwarded.to_str() {
                if let Some(first) = value.split(',').next() {
                    let first = first.trim();
                    if !first.is_empty() {
                        return Ok(ClientIdentity(first.to_string()));
                    }
                }
            }
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(ClientIdentity(peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn identity_for(request: Request<()>) -> String {
        let (mut parts, _) = request.into_parts();
        let ClientIdentity(id) = ClientIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_first_forwarded_hop_wins() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.2, 10.0.0.1")
            .body(())
            .unwrap();

        assert_eq!(identity_for(request).await, "203.0.113.7");
    }

    #[tokio::test]
    async fn test_falls_back_to_peer_address() {
        let mut request = Request::builder().body(()).unwrap();
        let peer: SocketAddr = "192.0.2.9:51434".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        assert_eq!(identity_for(request).await, "192.0.2.9");
    }

    #[tokio::test]
    async fn test_unknown_when_nothing_available() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(identity_for(request).await, "unknown");
    }

    #[tokio::test]
    async fn test_empty_forwarded_header_is_ignored() {
        let mut request = Request::builder()
            .header("X-Forwarded-For", "  ")
            .body(())
            .unwrap();
        let peer: SocketAddr = "192.0.2.9:51434".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        assert_eq!(identity_for(request).await, "192.0.2.9");
    }
}
