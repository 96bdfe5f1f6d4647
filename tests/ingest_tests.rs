//! Ingestion integration tests: existence, device ownership, attribution precedence,
//! type-directed validation and timestamp handling over the in-memory store.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};

use signalhub::identity::{AuthorizationContext, DeviceRegistration, DeviceTokenIssuer, Principal};
use signalhub::ingest::{IngestError, IngestionValidator, SignalValueSubmission};
use signalhub::storage::{Device, MemoryStore, NewSignal, NewUser, SharedStore, Signal, SignalType, Store};

struct Fixture {
    store: SharedStore,
    validator: IngestionValidator,
    owner: u64,
    device: Device,
    other_device: Device,
    temperature: Signal,
    door: Signal,
}

fn fixture() -> Result<Fixture> {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let owner = store
        .create_user(NewUser { name: "Owner".into(), email: "owner@example.com".into(), password_hash: String::new(), is_active: true })?
        .id;
    let devices = DeviceTokenIssuer::new(store.clone());
    let device = devices.register(Some(owner), DeviceRegistration { name: "thermo".into(), ..Default::default() })?;
    let other_device = devices.register(None, DeviceRegistration { name: "intruder".into(), ..Default::default() })?;
    let temperature = store.create_signal(NewSignal {
        device_id: device.id,
        name: "temperature".into(),
        signal_type: SignalType::Analog,
        min_value: Some(-20.0),
        max_value: Some(60.0),
        unit: Some("C".into()),
        ..Default::default()
    })?;
    let door = store.create_signal(NewSignal {
        device_id: device.id,
        name: "door".into(),
        signal_type: SignalType::Digital,
        ..Default::default()
    })?;
    Ok(Fixture { validator: IngestionValidator::new(store.clone()), store, owner, device, other_device, temperature, door })
}

fn as_device(d: &Device) -> AuthorizationContext {
    AuthorizationContext::new(Principal::Device { device_id: d.id, owner_id: d.user_id })
}

fn as_user(id: u64) -> AuthorizationContext {
    AuthorizationContext::new(Principal::User { user_id: id, email: format!("u{id}@example.com") })
}

fn analog(signal: &Signal, value: f64) -> SignalValueSubmission {
    SignalValueSubmission { signal_id: Some(signal.id), value: Some(value), ..Default::default() }
}

#[test]
fn analog_range_is_inclusive_and_type_directed() -> Result<()> {
    let f = fixture()?;
    let ctx = as_device(&f.device);

    let err = f.validator.validate(&ctx, analog(&f.temperature, 61.0)).unwrap_err();
    assert!(matches!(err, IngestError::OutOfRange { .. }), "got {err:?}");
    assert_eq!(err.to_string(), "value 61 is above maximum 60");

    let ok = f.validator.validate(&ctx, analog(&f.temperature, 60.0))?;
    assert_eq!(ok.value, Some(60.0));

    let digital_instead = SignalValueSubmission { signal_id: Some(f.temperature.id), digital_value: Some(true), ..Default::default() };
    assert!(matches!(f.validator.validate(&ctx, digital_instead), Err(IngestError::MissingField("value"))));
    Ok(())
}

#[test]
fn digital_requires_digital_value() -> Result<()> {
    let f = fixture()?;
    let ctx = as_device(&f.device);
    assert!(matches!(f.validator.validate(&ctx, analog(&f.door, 1.0)), Err(IngestError::MissingField("digital_value"))));
    let ok = f.validator.validate(&ctx, SignalValueSubmission { signal_id: Some(f.door.id), digital_value: Some(false), ..Default::default() })?;
    assert_eq!(ok.digital_value, Some(false));
    Ok(())
}

#[test]
fn foreign_device_is_forbidden_even_with_a_bad_payload() -> Result<()> {
    let f = fixture()?;
    let ctx = as_device(&f.other_device);
    assert!(matches!(f.validator.validate(&ctx, analog(&f.temperature, 20.0)), Err(IngestError::Forbidden)));
    // Out of range and missing value still report the ownership problem first.
    assert!(matches!(f.validator.validate(&ctx, analog(&f.temperature, 999.0)), Err(IngestError::Forbidden)));
    let empty = SignalValueSubmission { signal_id: Some(f.temperature.id), ..Default::default() };
    assert!(matches!(f.validator.validate(&ctx, empty), Err(IngestError::Forbidden)));
    Ok(())
}

#[test]
fn unknown_or_missing_signal() -> Result<()> {
    let f = fixture()?;
    let ctx = as_user(f.owner);
    let unknown = SignalValueSubmission { signal_id: Some(9_999), value: Some(1.0), ..Default::default() };
    assert!(matches!(f.validator.validate(&ctx, unknown), Err(IngestError::NotFound)));
    let missing = SignalValueSubmission { value: Some(1.0), ..Default::default() };
    assert!(matches!(f.validator.validate(&ctx, missing), Err(IngestError::MissingField("signal_id"))));
    Ok(())
}

#[test]
fn attribution_precedence() -> Result<()> {
    let f = fixture()?;

    // Device writes fall back to the device's owner.
    let rec = f.validator.validate(&as_device(&f.device), analog(&f.temperature, 1.0))?;
    assert_eq!(rec.user_id, Some(f.owner));

    // An authenticated user with no explicit user_id becomes the reporter, not the owner.
    let rec = f.validator.validate(&as_user(77), analog(&f.temperature, 1.0))?;
    assert_eq!(rec.user_id, Some(77));

    // An explicit user_id wins over both.
    let mut sub = analog(&f.temperature, 1.0);
    sub.user_id = Some(5);
    assert_eq!(f.validator.validate(&as_user(77), sub.clone())?.user_id, Some(5));
    assert_eq!(f.validator.validate(&as_device(&f.device), sub)?.user_id, Some(5));
    Ok(())
}

#[test]
fn ownerless_device_writes_anonymous_readings() -> Result<()> {
    let f = fixture()?;
    let lonely = f.store.create_signal(NewSignal { device_id: f.other_device.id, name: "hum".into(), ..Default::default() })?;
    let rec = f.validator.validate(&as_device(&f.other_device), analog(&lonely, 40.0))?;
    assert_eq!(rec.user_id, None);
    Ok(())
}

#[test]
fn timestamps_default_to_now_and_explicit_ones_are_kept() -> Result<()> {
    let f = fixture()?;
    let ctx = as_device(&f.device);
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let rec = f.validator.validate_at(&ctx, analog(&f.temperature, 1.0), now)?;
    assert_eq!(rec.timestamp, now);

    for explicit in [now - Duration::days(400), now + Duration::days(3)] {
        let mut sub = analog(&f.temperature, 1.0);
        sub.timestamp = Some(explicit);
        assert_eq!(f.validator.validate_at(&ctx, sub, now)?.timestamp, explicit);
    }
    Ok(())
}

#[test]
fn ingest_returns_exactly_what_was_stored() -> Result<()> {
    let f = fixture()?;
    let ctx = as_device(&f.device);
    let mut sub = analog(&f.temperature, 21.5);
    sub.metadata = Some(serde_json::json!({"firmware": "1.2.0"}));
    let view = f.validator.ingest(&ctx, sub)?;

    let stored = f.store.get_signal_value(view.value.id)?;
    assert_eq!(view.value, stored);
    assert_eq!(view.signal.signal.id, f.temperature.id);
    assert_eq!(view.signal.device.id, f.device.id);
    assert_eq!(view.user.as_ref().map(|u| u.id), Some(f.owner));

    let json = serde_json::to_value(&view)?;
    assert_eq!(json["value"], 21.5);
    assert_eq!(json["metadata"]["firmware"], "1.2.0");
    assert!(json["signal"]["device"].get("auth_token").is_none());
    assert!(json["user"].get("password_hash").is_none());
    Ok(())
}

#[test]
fn rejected_submissions_persist_nothing() -> Result<()> {
    let f = fixture()?;
    let ctx = as_device(&f.device);
    assert!(f.validator.ingest(&ctx, analog(&f.temperature, 100.0)).is_err());
    let accepted = f.validator.ingest(&ctx, analog(&f.temperature, 10.0))?;
    // Ids are allocated from a single sequence; a rejected write would have consumed one.
    let previous_max = f.door.id.max(f.temperature.id);
    assert_eq!(accepted.value.id, previous_max + 1);
    Ok(())
}
