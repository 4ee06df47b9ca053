use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};

use crate::app::AppState;
use crate::auth::validate_jwt;
use crate::error::ApiError;
use crate::security::validator::validate_identifier;
use crate::security::Caller;

/// Resolves the caller identity for every request and stores it as a
/// `Caller` extension. No Authorization header means an anonymous caller;
/// whether that is acceptable is each function's policy decision. A
/// malformed or invalid token is rejected here.
pub async fn identity_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client_addr = client_addr(&headers, peer, &state.trusted_proxies);

    let caller = match extract_bearer(&headers) {
        Ok(None) => Caller::anonymous(),
        Ok(Some(token)) => match token_subject(&token, &state.jwt_secret) {
            Ok(uid) => Caller::authenticated(uid),
            Err(reason) => {
                state.logger.log_failed_auth(None, &reason).await;
                return Err(ApiError::unauthorized("Invalid or expired token").into_response());
            }
        },
        Err(msg) => {
            state.logger.log_failed_auth(None, msg).await;
            return Err(ApiError::unauthorized(msg).into_response());
        }
    };

    let caller = match client_addr {
        Some(addr) => caller.with_client_addr(addr),
        None => caller,
    };

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Bearer token from the Authorization header, None when the header is absent
fn extract_bearer(headers: &HeaderMap) -> Result<Option<String>, &'static str> {
    let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if token.trim().is_empty() => Err("Empty bearer token"),
        Some(token) => Ok(Some(token.trim().to_string())),
        None => Err("Authorization header must use Bearer token format"),
    }
}

/// Verified `sub` of a token. The subject must be a plain identifier so it
/// cannot collide with the anonymous rate-limit buckets.
fn token_subject(token: &str, secret: &str) -> Result<String, String> {
    let claims = validate_jwt(token, secret).map_err(|e| e.to_string())?;
    validate_identifier(&Value::String(claims.sub)).map_err(|e| format!("Invalid token subject: {}", e))
}

/// Socket peer address. X-Forwarded-For is honored only when the peer is a
/// trusted proxy, and then its first hop is the client.
fn client_addr(headers: &HeaderMap, peer: Option<IpAddr>, trusted_proxies: &[IpAddr]) -> Option<String> {
    let peer = peer?;
    if !trusted_proxies.contains(&peer) {
        return Some(peer.to_string());
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .and_then(|hop| hop.parse::<IpAddr>().ok())
        .map(|ip| ip.to_string())
        .or_else(|| Some(peer.to_string()))
}

/// Parse configured proxy addresses, skipping (and reporting) bad entries
pub fn parse_trusted_proxies(entries: &[String]) -> Vec<IpAddr> {
    entries
        .iter()
        .filter_map(|entry| match entry.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!("Ignoring invalid trusted proxy address '{}'", entry);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt, Claims};
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn missing_header_is_anonymous() {
        assert_eq!(extract_bearer(&HeaderMap::new()), Ok(None));
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(
            extract_bearer(&headers("authorization", "Bearer abc.def")),
            Ok(Some("abc.def".to_string()))
        );
    }

    #[test]
    fn rejects_other_schemes_and_empty_tokens() {
        assert!(extract_bearer(&headers("authorization", "Basic dXNlcg==")).is_err());
        assert!(extract_bearer(&headers("authorization", "Bearer   ")).is_err());
    }

    #[test]
    fn forwarded_for_ignored_from_untrusted_peer() {
        let h = headers("x-forwarded-for", "10.9.9.1");
        assert_eq!(client_addr(&h, Some(ip("127.0.0.1")), &[]), Some("127.0.0.1".to_string()));
        assert_eq!(
            client_addr(&h, Some(ip("127.0.0.1")), &[ip("10.0.0.5")]),
            Some("127.0.0.1".to_string())
        );
        assert_eq!(client_addr(&h, None, &[]), None);
    }

    #[test]
    fn forwarded_for_used_behind_trusted_proxy() {
        let trusted = [ip("10.0.0.5")];
        let h = headers("x-forwarded-for", "203.0.113.9, 10.0.0.5");
        assert_eq!(
            client_addr(&h, Some(ip("10.0.0.5")), &trusted),
            Some("203.0.113.9".to_string())
        );

        // garbage or missing header falls back to the proxy address
        let h = headers("x-forwarded-for", "not-an-ip");
        assert_eq!(client_addr(&h, Some(ip("10.0.0.5")), &trusted), Some("10.0.0.5".to_string()));
        assert_eq!(
            client_addr(&HeaderMap::new(), Some(ip("10.0.0.5")), &trusted),
            Some("10.0.0.5".to_string())
        );
    }

    #[test]
    fn parses_trusted_proxy_list() {
        let parsed = parse_trusted_proxies(&["10.0.0.5".into(), "nope".into(), "::1".into()]);
        assert_eq!(parsed, vec![ip("10.0.0.5"), ip("::1")]);
    }

    #[test]
    fn token_subject_must_be_identifier() {
        let good = generate_jwt(&Claims::new("user_1", None, 1), "secret").unwrap();
        assert_eq!(token_subject(&good, "secret"), Ok("user_1".to_string()));

        let spoof = generate_jwt(&Claims::new("anon:0123456789abcdef", None, 1), "secret").unwrap();
        assert!(token_subject(&spoof, "secret").is_err());

        assert!(token_subject(&good, "other").is_err());
    }
}
