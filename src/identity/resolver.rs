//! Bearer credential resolution.
//!
//! Every refusal surfaces as the same `AuthError::Unauthorized`; the precise reason
//! (bad header, bad signature, expired, unknown device...) only reaches the debug log.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use thiserror::Error;
use tracing::debug;

use super::device::{DeviceTokenError, DeviceTokenIssuer};
use super::principal::Principal;
use super::request_context::AuthorizationContext;
use super::session::{SessionClaims, SessionTokenIssuer, TokenError, USER_TOKEN_TYPE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Session token of a human user.
    UserOnly,
    /// Active device token.
    DeviceOnly,
    /// Session token first, then device token.
    Either,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthorized")]
    Unauthorized,
    /// The credential could not be checked at all (store failure), as opposed to being wrong.
    #[error("authentication backend failure: {0}")]
    Internal(String),
}

/// Extract `<token>` from `Bearer <token>`. Exactly two space-separated parts, scheme
/// spelled `Bearer`, non-empty token.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || scheme != "Bearer" || token.is_empty() {
        return None;
    }
    Some(token)
}

#[derive(Clone)]
pub struct AuthResolver {
    sessions: Arc<SessionTokenIssuer>,
    devices: DeviceTokenIssuer,
}

impl AuthResolver {
    pub fn new(sessions: Arc<SessionTokenIssuer>, devices: DeviceTokenIssuer) -> Self {
        Self { sessions, devices }
    }

    pub fn sessions(&self) -> &SessionTokenIssuer { &self.sessions }
    pub fn devices(&self) -> &DeviceTokenIssuer { &self.devices }

    /// Resolve from request headers. A missing, repeated or non-UTF-8 `Authorization`
    /// header is refused like any invalid token.
    pub fn resolve_headers(&self, headers: &HeaderMap, mode: AuthMode) -> Result<AuthorizationContext, AuthError> {
        let mut values = headers.get_all(AUTHORIZATION).iter();
        let value = match (values.next(), values.next()) {
            (Some(v), None) => v.to_str().ok(),
            _ => None,
        };
        self.resolve(value, mode)
    }

    pub fn resolve(&self, authorization: Option<&str>, mode: AuthMode) -> Result<AuthorizationContext, AuthError> {
        let Some(token) = authorization.and_then(parse_bearer) else {
            debug!(?mode, "auth refused: missing or malformed authorization header");
            return Err(AuthError::Unauthorized);
        };
        let principal = match mode {
            AuthMode::UserOnly => self.session_principal(token)?,
            AuthMode::DeviceOnly => self.device_principal(token)?,
            AuthMode::Either => match self.session_principal(token) {
                Ok(p) => p,
                Err(AuthError::Unauthorized) => self.device_principal(token)?,
                Err(e) => return Err(e),
            },
        };
        let ctx = AuthorizationContext::new(principal);
        debug!(request_id = %ctx.request_id, kind = ?ctx.kind(), "request authenticated");
        Ok(ctx)
    }

    fn session_principal(&self, token: &str) -> Result<Principal, AuthError> {
        match self.sessions.verify(token) {
            Ok(SessionClaims { user_id, email, user_type, .. }) if user_type == USER_TOKEN_TYPE => {
                Ok(Principal::User { user_id, email })
            }
            Ok(claims) => {
                debug!(user_type = %claims.user_type, "auth refused: session token of wrong type");
                Err(AuthError::Unauthorized)
            }
            Err(e) => {
                let reason = match e {
                    TokenError::Malformed => "malformed",
                    TokenError::InvalidSignature => "invalid_signature",
                    TokenError::Expired => "expired",
                    TokenError::Signing(_) => "signing",
                };
                debug!(reason, "auth refused: session token");
                Err(AuthError::Unauthorized)
            }
        }
    }

    fn device_principal(&self, token: &str) -> Result<Principal, AuthError> {
        match self.devices.authenticate(token) {
            Ok(device) => Ok(Principal::Device { device_id: device.id, owner_id: device.user_id }),
            Err(DeviceTokenError::NotFound) => {
                debug!("auth refused: no active device for token");
                Err(AuthError::Unauthorized)
            }
            Err(e) => Err(AuthError::Internal(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DeviceRegistration;
    use crate::storage::{MemoryStore, Store};

    const SECRET: &[u8] = b"resolver-test-secret-resolver-test";

    fn resolver() -> (AuthResolver, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let sessions = Arc::new(SessionTokenIssuer::new(SECRET));
        (AuthResolver::new(sessions, DeviceTokenIssuer::new(store.clone())), store)
    }

    #[test]
    fn parse_bearer_accepts_only_the_exact_shape() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer abc"), None);
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("Bearer a b"), None);
        assert_eq!(parse_bearer("Bearer  abc"), None);
        assert_eq!(parse_bearer(""), None);
    }

    #[test]
    fn user_mode_accepts_session_tokens_only() {
        let (r, _) = resolver();
        let token = r.sessions().issue(9, "u@x.io").unwrap();
        let ctx = r.resolve(Some(&format!("Bearer {token}")), AuthMode::UserOnly).unwrap();
        assert_eq!(ctx.principal, Principal::User { user_id: 9, email: "u@x.io".into() });
        assert_eq!(ctx.authenticated_user(), Some(9));
        assert!(!ctx.request_id.is_empty());
    }

    #[test]
    fn device_token_is_refused_in_user_mode_and_accepted_in_device_mode() {
        let (r, _) = resolver();
        let device = r.devices().register(Some(4), DeviceRegistration { name: "d".into(), ..Default::default() }).unwrap();
        let header = format!("Bearer {}", device.auth_token);
        assert!(matches!(r.resolve(Some(&header), AuthMode::UserOnly), Err(AuthError::Unauthorized)));
        let ctx = r.resolve(Some(&header), AuthMode::DeviceOnly).unwrap();
        assert_eq!(ctx.principal, Principal::Device { device_id: device.id, owner_id: Some(4) });
        assert_eq!(ctx.authenticated_user(), None);
    }

    #[test]
    fn session_token_is_refused_in_device_mode() {
        let (r, _) = resolver();
        let token = r.sessions().issue(1, "a@b.c").unwrap();
        assert!(matches!(r.resolve(Some(&format!("Bearer {token}")), AuthMode::DeviceOnly), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn either_mode_falls_back_to_device() {
        let (r, _) = resolver();
        let device = r.devices().register(None, DeviceRegistration { name: "d".into(), ..Default::default() }).unwrap();
        let ctx = r.resolve(Some(&format!("Bearer {}", device.auth_token)), AuthMode::Either).unwrap();
        assert_eq!(ctx.authenticated_device(), Some(device.id));

        let token = r.sessions().issue(2, "b@c.d").unwrap();
        let ctx = r.resolve(Some(&format!("Bearer {token}")), AuthMode::Either).unwrap();
        assert_eq!(ctx.authenticated_user(), Some(2));

        assert!(matches!(r.resolve(Some("Bearer nothing-valid"), AuthMode::Either), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn expired_session_does_not_fall_through_to_a_user() {
        let (r, _) = resolver();
        let stale = r.sessions().issue_at(1, "a@b.c", chrono::Utc::now() - chrono::Duration::days(2)).unwrap();
        assert!(matches!(r.resolve(Some(&format!("Bearer {stale}")), AuthMode::Either), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn header_problems_look_like_bad_tokens() {
        let (r, store) = resolver();
        let device = r.devices().register(None, DeviceRegistration { name: "d".into(), ..Default::default() }).unwrap();
        assert!(store.get_device(device.id).is_ok());
        for value in [None, Some("Token x"), Some(device.auth_token.as_str())] {
            assert!(matches!(r.resolve(value, AuthMode::Either), Err(AuthError::Unauthorized)));
        }

        let mut headers = HeaderMap::new();
        let good = format!("Bearer {}", device.auth_token);
        headers.append(AUTHORIZATION, good.parse().unwrap());
        assert!(r.resolve_headers(&headers, AuthMode::DeviceOnly).is_ok());
        headers.append(AUTHORIZATION, good.parse().unwrap());
        assert!(matches!(r.resolve_headers(&headers, AuthMode::DeviceOnly), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn validly_signed_non_user_session_is_refused() {
        let (r, _) = resolver();
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims {
            user_id: 11,
            email: "sensor@x.io".into(),
            user_type: "device".into(),
            exp: now + 3600,
            iat: now,
        };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        // The signature and expiry are fine; only the token type is wrong.
        assert_eq!(r.sessions().verify(&token).unwrap().user_type, "device");

        let header = format!("Bearer {token}");
        assert!(matches!(r.resolve(Some(&header), AuthMode::UserOnly), Err(AuthError::Unauthorized)));
        assert!(matches!(r.resolve(Some(&header), AuthMode::Either), Err(AuthError::Unauthorized)));
        assert!(matches!(r.resolve(Some(&header), AuthMode::DeviceOnly), Err(AuthError::Unauthorized)));
    }

    #[test]
    fn either_mode_moves_on_to_devices_after_a_non_user_session() {
        let (r, store) = resolver();
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims { user_id: 11, email: "s@x.io".into(), user_type: "device".into(), exp: now + 3600, iat: now };
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        let device = store
            .create_device(crate::storage::NewDevice {
                name: "legacy".into(),
                description: None,
                device_type: None,
                location: None,
                user_id: None,
                auth_token: token.clone(),
                is_active: true,
            })
            .unwrap();
        let ctx = r.resolve(Some(&format!("Bearer {token}")), AuthMode::Either).unwrap();
        assert_eq!(ctx.principal, Principal::Device { device_id: device.id, owner_id: None });
    }
}
