use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::session::{SessionTokenIssuer, TokenError};
use crate::security;
use crate::storage::{NewUser, SharedStore, StoreError, User};

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Error)]
pub enum LoginError {
    /// Unknown email, inactive account and wrong password are all this one variant.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, LoginError>;
}

/// Email + password login against the user records in the store.
#[derive(Clone)]
pub struct LocalAuthProvider {
    pub store: SharedStore,
    pub sessions: Arc<SessionTokenIssuer>,
}

impl LocalAuthProvider {
    pub fn new(store: SharedStore, sessions: Arc<SessionTokenIssuer>) -> Self { Self { store, sessions } }
}

impl AuthProvider for LocalAuthProvider {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, LoginError> {
        let user = match self.store.find_user_by_email(&req.email)? {
            Some(u) if u.is_active => u,
            _ => {
                security::verify_dummy(&req.password);
                return Err(LoginError::InvalidCredentials);
            }
        };
        if !security::verify_password(&user.password_hash, &req.password) {
            return Err(LoginError::InvalidCredentials);
        }
        let token = self.sessions.issue(user.id, &user.email)?;
        info!(user_id = user.id, "auth.login");
        Ok(LoginResponse { token, user })
    }
}

/// Make sure an active account exists for `email`. Existing accounts are left untouched.
pub fn ensure_user(store: &SharedStore, name: &str, email: &str, password: &str) -> anyhow::Result<User> {
    if let Some(existing) = store.find_user_by_email(email)? {
        return Ok(existing);
    }
    let password_hash = security::hash_password(password)?;
    let user = store.create_user(NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password_hash,
        is_active: true,
    })?;
    info!(user_id = user.id, "bootstrap user created");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn provider() -> LocalAuthProvider {
        let store: SharedStore = Arc::new(MemoryStore::new());
        LocalAuthProvider::new(store, Arc::new(SessionTokenIssuer::new(b"provider-test-secret-provider-tes")))
    }

    #[test]
    fn login_issues_verifiable_token() {
        let p = provider();
        let user = ensure_user(&p.store, "Test User", "test@example.com", "password123").unwrap();
        let resp = p.login(&LoginRequest { email: "test@example.com".into(), password: "password123".into() }).unwrap();
        let claims = p.sessions.verify(&resp.token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.email, "test@example.com");
    }

    #[test]
    fn wrong_password_and_unknown_email_are_the_same_error() {
        let p = provider();
        ensure_user(&p.store, "T", "test@example.com", "password123").unwrap();
        let wrong = p.login(&LoginRequest { email: "test@example.com".into(), password: "nope".into() }).unwrap_err();
        let unknown = p.login(&LoginRequest { email: "ghost@example.com".into(), password: "nope".into() }).unwrap_err();
        assert!(matches!(wrong, LoginError::InvalidCredentials));
        assert!(matches!(unknown, LoginError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[test]
    fn ensure_user_is_idempotent() {
        let p = provider();
        let a = ensure_user(&p.store, "A", "a@example.com", "pw-one").unwrap();
        let b = ensure_user(&p.store, "A", "a@example.com", "pw-two").unwrap();
        assert_eq!(a.id, b.id);
        assert!(p.login(&LoginRequest { email: "a@example.com".into(), password: "pw-one".into() }).is_ok());
    }
}
