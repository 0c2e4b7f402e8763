//! Configuration values shared by the promptpos crates.
//!
//! # Environment Variable Resolution
//!
//! [`LiteralOrEnv`] lets a configuration string either carry the value itself
//! or point at an environment variable holding it:
//!
//! ```json
//! {
//!   "api_base": "https://pos.example.com/api",   // Literal value
//!   "token_store": "$POS_TOKEN_STORE",           // Simple env var
//!   "api_key": "${POS_API_KEY}"                  // Braced env var
//! }
//! ```
//!
//! Secrets and per-terminal paths stay out of the config file that way.

use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use crate::session::{ACCESS_TOKEN_TTL, REFRESH_LEAD};

/// A value given literally or as a `$VAR` / `${VAR}` reference, resolved while deserializing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Name of the referenced variable, if `raw` uses `$VAR` or `${VAR}` syntax.
fn env_reference(raw: &str) -> Option<&str> {
    if let Some(braced) = raw.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        return Some(braced);
    }
    let name = raw.strip_prefix('$')?;
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(name)
}

/// Resolves `raw` against the process environment and parses it.
pub fn resolve<T>(raw: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = match env_reference(raw) {
        Some(name) => std::env::var(name).map_err(|_| {
            format!("Environment variable '{name}' not found (referenced as '{raw}')")
        })?,
        None => raw.to_string(),
    };
    value
        .parse::<T>()
        .map_err(|e| format!("Failed to parse value: {e}"))
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        resolve(&raw).map(LiteralOrEnv).map_err(serde::de::Error::custom)
    }
}

impl<T: Serialize> Serialize for LiteralOrEnv<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// Timing of the member session.
///
/// ```json
/// { "access_token_ttl_secs": 900, "refresh_lead_secs": 120 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTiming {
    /// Lifetime assumed for a freshly issued access token.
    #[serde(
        rename = "access_token_ttl_secs",
        with = "duration_secs",
        default = "session_timing_defaults::access_token_ttl"
    )]
    pub access_token_ttl: Duration,
    /// How long before expiry the proactive refresh fires.
    #[serde(
        rename = "refresh_lead_secs",
        with = "duration_secs",
        default = "session_timing_defaults::refresh_lead"
    )]
    pub refresh_lead: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            access_token_ttl: ACCESS_TOKEN_TTL,
            refresh_lead: REFRESH_LEAD,
        }
    }
}

mod session_timing_defaults {
    use super::*;

    pub fn access_token_ttl() -> Duration {
        ACCESS_TOKEN_TTL
    }

    pub fn refresh_lead() -> Duration {
        REFRESH_LEAD
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
