use serde::Serialize;

use crate::storage::{DeviceId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Device,
}

/// Resolved identity of one request.
///
/// A device's `owner_id` is copied from the device record at resolution time. It is an
/// ownership hint for attribution and never proof that the owning user authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    User { user_id: UserId, email: String },
    Device { device_id: DeviceId, owner_id: Option<UserId> },
}

impl Principal {
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::User { .. } => PrincipalKind::User,
            Principal::Device { .. } => PrincipalKind::Device,
        }
    }

    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            Principal::User { .. } => None,
            Principal::Device { device_id, .. } => Some(*device_id),
        }
    }
}
