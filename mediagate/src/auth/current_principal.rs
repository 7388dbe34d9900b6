use crate::{errors::Error, types::Principal, AppState};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, error, trace};

/// Header carrying the payment provider's shared secret
pub const SERVICE_API_KEY_HEADER: &str = "x-service-api-key";
/// Header carrying the worker fleet's shared secret
pub const INTERNAL_API_KEY_HEADER: &str = "x-internal-api-key";

/// Compare two secrets without short-circuiting on the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Session token from the named cookie, if the request carries a non-empty one
fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Resolve who is calling. Service keys are checked first; a request presenting a key that
/// does not match is rejected outright rather than falling through to the session cookie.
impl FromRequestParts<AppState> for Principal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = &state.config.auth;

        if let Some(key) = header_value(&parts.headers, INTERNAL_API_KEY_HEADER) {
            if constant_time_eq(key.as_bytes(), auth.internal_api_key.as_bytes()) {
                trace!("Authenticated worker via internal API key");
                return Ok(Principal::Worker);
            }
            debug!("Rejected request with invalid internal API key");
            return Err(Error::Unauthenticated {
                message: Some("Invalid internal API key".to_string()),
            });
        }

        if let Some(key) = header_value(&parts.headers, SERVICE_API_KEY_HEADER) {
            if constant_time_eq(key.as_bytes(), auth.service_api_key.as_bytes()) {
                trace!("Authenticated payment provider via service API key");
                return Ok(Principal::PaymentProvider);
            }
            debug!("Rejected request with invalid service API key");
            return Err(Error::Unauthenticated {
                message: Some("Invalid service API key".to_string()),
            });
        }

        let Some(token) = session_token(&parts.headers, &state.config.sessions.cookie_name) else {
            return Err(Error::Unauthenticated { message: None });
        };

        match state.sessions.resolve(&token).await {
            Ok(Some(user_id)) => {
                trace!("Authenticated user {} via session", user_id);
                Ok(Principal::User(user_id))
            }
            Ok(None) => Err(Error::Unauthenticated {
                message: Some("Session is invalid or expired".to_string()),
            }),
            Err(e) => {
                error!("Session lookup failed: {}", e);
                Err(Error::Internal {
                    operation: "resolve session".to_string(),
                })
            }
        }
    }
}
