use super::principal::{Principal, PrincipalKind};
use crate::storage::{DeviceId, UserId};

/// Outcome of authenticating one request. Built fresh per request and handed to
/// downstream logic by reference; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationContext {
    pub principal: Principal,
    pub request_id: String,
}

impl AuthorizationContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal, request_id: uuid::Uuid::new_v4().to_string() }
    }

    pub fn kind(&self) -> PrincipalKind { self.principal.kind() }

    /// Set only when a human user authenticated this request.
    pub fn authenticated_user(&self) -> Option<UserId> {
        match &self.principal {
            Principal::User { user_id, .. } => Some(*user_id),
            Principal::Device { .. } => None,
        }
    }

    /// Set only when a device authenticated this request.
    pub fn authenticated_device(&self) -> Option<DeviceId> { self.principal.device_id() }
}
