//! Persistence collaborator.
//!
//! The authentication and ingestion paths only ever need find/create/update/delete by id,
//! so that is all the `Store` trait exposes. `MemoryStore` is the in-process backend used
//! by the server binary and the tests; any other backend must provide the same guarantees:
//! unique user emails, unique device tokens, and atomic create-or-fail inserts.

use std::sync::Arc;

use thiserror::Error;

pub mod models;
mod memory;

pub use memory::MemoryStore;
pub use models::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("backend error: {0}")]
    Backend(String),
}

pub trait Store: Send + Sync {
    fn create_user(&self, new: NewUser) -> Result<User, StoreError>;
    fn get_user(&self, id: UserId) -> Result<User, StoreError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Fails with `AlreadyExists` when another device already carries `new.auth_token`.
    fn create_device(&self, new: NewDevice) -> Result<Device, StoreError>;
    fn get_device(&self, id: DeviceId) -> Result<Device, StoreError>;
    /// Exact token match restricted to active devices.
    fn find_active_device_by_token(&self, token: &str) -> Result<Option<Device>, StoreError>;
    fn update_device(&self, id: DeviceId, update: DeviceUpdate) -> Result<Device, StoreError>;
    fn delete_device(&self, id: DeviceId) -> Result<(), StoreError>;

    fn create_signal(&self, new: NewSignal) -> Result<Signal, StoreError>;
    fn get_signal(&self, id: SignalId) -> Result<Signal, StoreError>;

    fn create_signal_value(&self, new: NewSignalValue) -> Result<SignalValue, StoreError>;
    fn get_signal_value(&self, id: SignalValueId) -> Result<SignalValue, StoreError>;
}

pub type SharedStore = Arc<dyn Store>;

/// Re-read a stored value together with its signal, the signal's device and the attributed user.
pub fn expand_signal_value(store: &dyn Store, id: SignalValueId) -> Result<SignalValueView, StoreError> {
    let value = store.get_signal_value(id)?;
    let signal = store.get_signal(value.signal_id)?;
    let device = store.get_device(signal.device_id)?;
    let user = match value.user_id {
        Some(uid) => match store.get_user(uid) {
            Ok(u) => Some(u),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(e),
        },
        None => None,
    };
    Ok(SignalValueView { value, signal: SignalView { signal, device }, user })
}
