//! Identity: who is calling, and how they proved it.
//! Users authenticate with signed session tokens, devices with opaque stored tokens;
//! `AuthResolver` turns either into a per-request `AuthorizationContext`.

mod principal;
mod session;
mod device;
mod provider;
mod request_context;
mod resolver;

pub use principal::{Principal, PrincipalKind};
pub use session::{SessionClaims, SessionTokenIssuer, TokenError, DEFAULT_SESSION_TTL, USER_TOKEN_TYPE};
pub use device::{DeviceRegistration, DeviceTokenError, DeviceTokenIssuer, DEVICE_TOKEN_BYTES};
pub use provider::{ensure_user, AuthProvider, LocalAuthProvider, LoginError, LoginRequest, LoginResponse};
pub use request_context::AuthorizationContext;
pub use resolver::{parse_bearer, AuthError, AuthMode, AuthResolver};
