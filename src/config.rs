//! Process configuration, read once from the environment at startup.
//!
//! | variable                       | default   |
//! |--------------------------------|-----------|
//! | `SIGNALHUB_HTTP_PORT`          | 8080      |
//! | `SIGNALHUB_BIND`               | 0.0.0.0   |
//! | `SIGNALHUB_JWT_SECRET`         | required unless dev mode |
//! | `SIGNALHUB_DEV_MODE`           | false     |
//! | `SIGNALHUB_SESSION_TTL_SECS`   | 86400     |
//! | `SIGNALHUB_BOOTSTRAP_EMAIL`    | unset     |
//! | `SIGNALHUB_BOOTSTRAP_PASSWORD` | unset     |

use std::env;
use std::time::Duration;

use anyhow::{bail, Result};
use base64::Engine;

use crate::identity::DEFAULT_SESSION_TTL;

pub const MIN_SECRET_LEN: usize = 32;
/// Upper bound for `SIGNALHUB_SESSION_TTL_SECS` (365 days).
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Clone)]
pub struct Config {
    pub bind: String,
    pub http_port: u16,
    pub jwt_secret: Vec<u8>,
    pub session_ttl: Duration,
    pub bootstrap: Option<(String, String)>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("http_port", &self.http_port)
            .field("session_ttl", &self.session_ttl)
            .field("bootstrap_email", &self.bootstrap.as_ref().map(|(e, _)| e))
            .finish_non_exhaustive()
    }
}

fn parse_port_env(name: &str) -> Option<u16> {
    match env::var(name) {
        Ok(val) => val.parse::<u16>().ok(),
        Err(_) => None,
    }
}

fn parse_bool_env(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(v) => {
            let s = v.to_lowercase();
            match s.as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
        }
        Err(_) => None,
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dev_mode = parse_bool_env("SIGNALHUB_DEV_MODE").unwrap_or(false);
        let jwt_secret = match non_empty_env("SIGNALHUB_JWT_SECRET") {
            Some(s) => s.into_bytes(),
            None if dev_mode => {
                tracing::warn!("SIGNALHUB_JWT_SECRET unset; using a random per-process key, sessions will not survive a restart");
                random_secret()?
            }
            None => bail!("SIGNALHUB_JWT_SECRET must be set (or SIGNALHUB_DEV_MODE=true)"),
        };
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("SIGNALHUB_JWT_SECRET must be at least {} bytes", MIN_SECRET_LEN);
        }
        let session_ttl = parse_session_ttl(env::var("SIGNALHUB_SESSION_TTL_SECS").ok().as_deref())?;
        let bootstrap = match (non_empty_env("SIGNALHUB_BOOTSTRAP_EMAIL"), non_empty_env("SIGNALHUB_BOOTSTRAP_PASSWORD")) {
            (Some(e), Some(p)) => Some((e, p)),
            _ => None,
        };
        Ok(Self {
            bind: non_empty_env("SIGNALHUB_BIND").unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: parse_port_env("SIGNALHUB_HTTP_PORT").unwrap_or(8080),
            jwt_secret,
            session_ttl,
            bootstrap,
        })
    }
}

/// Unset, empty, unparsable or zero values fall back to the default lifetime.
fn parse_session_ttl(raw: Option<&str>) -> Result<Duration> {
    let Some(secs) = raw.and_then(|s| s.trim().parse::<u64>().ok()).filter(|s| *s > 0) else {
        return Ok(DEFAULT_SESSION_TTL);
    };
    let ttl = Duration::from_secs(secs);
    if ttl > MAX_SESSION_TTL {
        bail!("SIGNALHUB_SESSION_TTL_SECS must be at most {} seconds", MAX_SESSION_TTL.as_secs());
    }
    Ok(ttl)
}

fn random_secret() -> Result<Vec<u8>> {
    let mut buf = [0u8; 48];
    getrandom::getrandom(&mut buf).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    // Kept as text so it behaves exactly like a configured secret.
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf).into_bytes())
}
