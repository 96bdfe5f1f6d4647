//! Opaque bearer tokens for unattended devices.
//!
//! A device token has no structure and no expiry. It is valid exactly while an active
//! device record carries it; verification is a store lookup, not a signature check.

use base64::Engine;
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::{Device, NewDevice, SharedStore, StoreError, UserId};

/// Random bytes per token before encoding (256 bits).
pub const DEVICE_TOKEN_BYTES: usize = 32;
const REGISTER_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum DeviceTokenError {
    /// No active device carries the token. Deactivated and deleted devices both land here.
    #[error("no active device for token")]
    NotFound,
    #[error("entropy source failed: {0}")]
    Entropy(String),
    #[error(transparent)]
    Store(StoreError),
}

/// Descriptive fields supplied when registering a device.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct DeviceRegistration {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Clone)]
pub struct DeviceTokenIssuer {
    store: SharedStore,
}

impl DeviceTokenIssuer {
    pub fn new(store: SharedStore) -> Self { Self { store } }

    /// 32 bytes from the OS CSPRNG, base64url without padding (43 chars).
    pub fn generate() -> Result<String, DeviceTokenError> {
        let mut buf = [0u8; DEVICE_TOKEN_BYTES];
        getrandom::getrandom(&mut buf).map_err(|e| DeviceTokenError::Entropy(e.to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
    }

    pub fn authenticate(&self, token: &str) -> Result<Device, DeviceTokenError> {
        if token.is_empty() {
            return Err(DeviceTokenError::NotFound);
        }
        match self.store.find_active_device_by_token(token) {
            Ok(Some(device)) => Ok(device),
            Ok(None) | Err(StoreError::NotFound) => Err(DeviceTokenError::NotFound),
            Err(e) => Err(DeviceTokenError::Store(e)),
        }
    }

    /// Create an active device owned by `owner` with a freshly minted token.
    /// The store's uniqueness constraint is the arbiter; on a collision a new token is drawn.
    pub fn register(&self, owner: Option<UserId>, reg: DeviceRegistration) -> Result<Device, DeviceTokenError> {
        for attempt in 1..=REGISTER_ATTEMPTS {
            let token = Self::generate()?;
            let new = NewDevice {
                name: reg.name.clone(),
                description: reg.description.clone(),
                device_type: reg.device_type.clone(),
                location: reg.location.clone(),
                user_id: owner,
                auth_token: token,
                is_active: true,
            };
            match self.store.create_device(new) {
                Ok(device) => {
                    info!(device_id = device.id, owner = ?owner, "device registered");
                    return Ok(device);
                }
                Err(StoreError::AlreadyExists) => {
                    warn!(attempt, "device token collision, drawing a new token");
                }
                Err(e) => return Err(DeviceTokenError::Store(e)),
            }
        }
        Err(DeviceTokenError::Store(StoreError::AlreadyExists))
    }
}
