//! Telemetry ingestion: decide whether a submitted reading is accepted, who it is
//! attributed to, and what gets stored.
//!
//! Order of checks for one submission:
//! 1. the signal must exist;
//! 2. a device may only write to signals it owns (checked before any payload validation);
//! 3. attribution: explicit `user_id`, else the authenticated user, else the owner of the
//!    signal's device, else nobody;
//! 4. analog readings need `value` inside the declared bounds, digital ones need `digital_value`;
//! 5. a missing timestamp becomes "now"; explicit timestamps are stored as given.
//!
//! Rejections are final and nothing is written for them.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::identity::{AuthorizationContext, Principal};
use crate::storage::{
    expand_signal_value, NewSignalValue, SharedStore, Signal, SignalId, SignalType, SignalValueView, StoreError, UserId,
};

/// Untrusted reading as posted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalValueSubmission {
    #[serde(default)]
    pub signal_id: Option<SignalId>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub digital_value: Option<bool>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeLimit {
    Minimum(f64),
    Maximum(f64),
}

impl std::fmt::Display for RangeLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeLimit::Minimum(min) => write!(f, "below minimum {}", min),
            RangeLimit::Maximum(max) => write!(f, "above maximum {}", max),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Signal not found")]
    NotFound,
    #[error("Device ID mismatch")]
    Forbidden,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("value {value} is {limit}")]
    OutOfRange { value: f64, limit: RangeLimit },
    #[error(transparent)]
    Store(StoreError),
}

#[derive(Clone)]
pub struct IngestionValidator {
    store: SharedStore,
}

impl IngestionValidator {
    pub fn new(store: SharedStore) -> Self { Self { store } }

    /// Validate, persist, and return the stored record re-read with its relations.
    pub fn ingest(&self, ctx: &AuthorizationContext, sub: SignalValueSubmission) -> Result<SignalValueView, IngestError> {
        let record = self.validate(ctx, sub)?;
        let signal_id = record.signal_id;
        let stored = self.store.create_signal_value(record).map_err(IngestError::Store)?;
        info!(
            request_id = %ctx.request_id,
            signal_id,
            value_id = stored.id,
            user_id = ?stored.user_id,
            "signal value accepted"
        );
        expand_signal_value(self.store.as_ref(), stored.id).map_err(|e| {
            warn!(request_id = %ctx.request_id, value_id = stored.id, error = %e, "signal value stored but could not be re-read");
            IngestError::Store(e)
        })
    }

    pub fn validate(&self, ctx: &AuthorizationContext, sub: SignalValueSubmission) -> Result<NewSignalValue, IngestError> {
        self.validate_at(ctx, sub, Utc::now())
    }

    /// Run every check without writing anything; `now` stands in for the acceptance instant.
    pub fn validate_at(
        &self,
        ctx: &AuthorizationContext,
        sub: SignalValueSubmission,
        now: DateTime<Utc>,
    ) -> Result<NewSignalValue, IngestError> {
        let result = self.check(ctx, sub, now);
        if let Err(e) = &result {
            debug!(request_id = %ctx.request_id, reason = %e, "signal value rejected");
        }
        result
    }

    fn check(&self, ctx: &AuthorizationContext, sub: SignalValueSubmission, now: DateTime<Utc>) -> Result<NewSignalValue, IngestError> {
        let signal_id = match sub.signal_id {
            Some(id) if id != 0 => id,
            _ => return Err(IngestError::MissingField("signal_id")),
        };
        let signal = match self.store.get_signal(signal_id) {
            Ok(s) => s,
            Err(StoreError::NotFound) => return Err(IngestError::NotFound),
            Err(e) => return Err(IngestError::Store(e)),
        };

        if let Principal::Device { device_id, .. } = &ctx.principal {
            if *device_id != signal.device_id {
                return Err(IngestError::Forbidden);
            }
        }

        let user_id = match (sub.user_id, ctx.authenticated_user()) {
            (Some(explicit), _) => Some(explicit),
            (None, Some(authenticated)) => Some(authenticated),
            (None, None) => self.device_owner(&signal)?,
        };

        check_value(&signal, sub.value, sub.digital_value)?;

        Ok(NewSignalValue {
            signal_id,
            user_id,
            timestamp: sub.timestamp.unwrap_or(now),
            value: sub.value,
            digital_value: sub.digital_value,
            metadata: sub.metadata,
        })
    }

    fn device_owner(&self, signal: &Signal) -> Result<Option<UserId>, IngestError> {
        self.store
            .get_device(signal.device_id)
            .map(|d| d.user_id)
            .map_err(IngestError::Store)
    }
}

fn check_value(signal: &Signal, value: Option<f64>, digital_value: Option<bool>) -> Result<(), IngestError> {
    match signal.signal_type {
        SignalType::Analog => {
            let Some(v) = value else { return Err(IngestError::MissingField("value")) };
            if let Some(min) = signal.min_value {
                if v < min {
                    return Err(IngestError::OutOfRange { value: v, limit: RangeLimit::Minimum(min) });
                }
            }
            if let Some(max) = signal.max_value {
                if v > max {
                    return Err(IngestError::OutOfRange { value: v, limit: RangeLimit::Maximum(max) });
                }
            }
            Ok(())
        }
        SignalType::Digital => match digital_value {
            Some(_) => Ok(()),
            None => Err(IngestError::MissingField("digital_value")),
        },
    }
}
