use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use parking_lot::RwLock;

use super::models::*;
use super::{Store, StoreError};

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    users: BTreeMap<UserId, User>,
    emails: HashMap<String, UserId>,
    devices: BTreeMap<DeviceId, Device>,
    /// auth_token -> device id; the uniqueness constraint on device tokens.
    tokens: HashMap<String, DeviceId>,
    signals: BTreeMap<SignalId, Signal>,
    values: BTreeMap<SignalValueId, SignalValue>,
}

impl Tables {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store. Every mutation runs under a single write lock, so uniqueness
/// checks and the insert that follows them are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn email_key(email: &str) -> String { email.trim().to_lowercase() }

impl Store for MemoryStore {
    fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut t = self.inner.write();
        let key = email_key(&new.email);
        if t.emails.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        let now = Utc::now();
        let id = t.alloc_id();
        let user = User {
            id,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        t.emails.insert(key, id);
        t.users.insert(id, user.clone());
        Ok(user)
    }

    fn get_user(&self, id: UserId) -> Result<User, StoreError> {
        self.inner.read().users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.inner.read();
        Ok(t.emails.get(&email_key(email)).and_then(|id| t.users.get(id)).cloned())
    }

    fn create_device(&self, new: NewDevice) -> Result<Device, StoreError> {
        let mut t = self.inner.write();
        if t.tokens.contains_key(&new.auth_token) {
            return Err(StoreError::AlreadyExists);
        }
        let now = Utc::now();
        let id = t.alloc_id();
        let device = Device {
            id,
            name: new.name,
            description: new.description,
            device_type: new.device_type,
            location: new.location,
            user_id: new.user_id,
            auth_token: new.auth_token,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        t.tokens.insert(device.auth_token.clone(), id);
        t.devices.insert(id, device.clone());
        Ok(device)
    }

    fn get_device(&self, id: DeviceId) -> Result<Device, StoreError> {
        self.inner.read().devices.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn find_active_device_by_token(&self, token: &str) -> Result<Option<Device>, StoreError> {
        let t = self.inner.read();
        Ok(t.tokens
            .get(token)
            .and_then(|id| t.devices.get(id))
            .filter(|d| d.is_active)
            .cloned())
    }

    fn update_device(&self, id: DeviceId, update: DeviceUpdate) -> Result<Device, StoreError> {
        let mut t = self.inner.write();
        let device = t.devices.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = update.name { device.name = name; }
        if let Some(d) = update.description { device.description = Some(d); }
        if let Some(dt) = update.device_type { device.device_type = Some(dt); }
        if let Some(loc) = update.location { device.location = Some(loc); }
        if let Some(active) = update.is_active { device.is_active = active; }
        if let Some(uid) = update.user_id { device.user_id = Some(uid); }
        device.updated_at = Utc::now();
        Ok(device.clone())
    }

    fn delete_device(&self, id: DeviceId) -> Result<(), StoreError> {
        let mut t = self.inner.write();
        let device = t.devices.remove(&id).ok_or(StoreError::NotFound)?;
        t.tokens.remove(&device.auth_token);
        // Signals and their readings go with the device.
        let owned: HashSet<SignalId> = t.signals.values().filter(|s| s.device_id == id).map(|s| s.id).collect();
        for sid in owned.iter() {
            t.signals.remove(sid);
        }
        t.values.retain(|_, v| !owned.contains(&v.signal_id));
        Ok(())
    }

    fn create_signal(&self, new: NewSignal) -> Result<Signal, StoreError> {
        let mut t = self.inner.write();
        if !t.devices.contains_key(&new.device_id) {
            return Err(StoreError::NotFound);
        }
        let id = t.alloc_id();
        let signal = Signal {
            id,
            device_id: new.device_id,
            name: new.name,
            signal_type: new.signal_type,
            direction: new.direction,
            unit: new.unit,
            description: new.description,
            min_value: new.min_value,
            max_value: new.max_value,
            is_active: true,
            created_at: Utc::now(),
        };
        t.signals.insert(id, signal.clone());
        Ok(signal)
    }

    fn get_signal(&self, id: SignalId) -> Result<Signal, StoreError> {
        self.inner.read().signals.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    fn create_signal_value(&self, new: NewSignalValue) -> Result<SignalValue, StoreError> {
        let mut t = self.inner.write();
        if !t.signals.contains_key(&new.signal_id) {
            return Err(StoreError::NotFound);
        }
        let id = t.alloc_id();
        let value = SignalValue {
            id,
            signal_id: new.signal_id,
            user_id: new.user_id,
            timestamp: new.timestamp,
            value: new.value,
            digital_value: new.digital_value,
            metadata: new.metadata,
            created_at: Utc::now(),
        };
        t.values.insert(id, value.clone());
        Ok(value)
    }

    fn get_signal_value(&self, id: SignalValueId) -> Result<SignalValue, StoreError> {
        self.inner.read().values.get(&id).cloned().ok_or(StoreError::NotFound)
    }
}
