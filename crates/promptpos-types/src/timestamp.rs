//! Epoch-millisecond timestamps.
//!
//! Access token expiry is persisted next to the tokens as milliseconds since the
//! Unix epoch, so [`UnixMillis`] is the unit the session machinery computes in.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Milliseconds since the Unix epoch (1970-01-01T00:00:00Z).
///
/// # Serialization
///
/// Serialized as a stringified integer, matching how the value sits in the
/// token store.
///
/// ```json
/// "1699999999000"
/// ```
///
/// # Example
///
/// ```
/// use promptpos_types::timestamp::UnixMillis;
/// use std::time::Duration;
///
/// let issued = UnixMillis::from_millis(1_000);
/// let expires = issued + Duration::from_secs(15 * 60);
/// assert_eq!(expires.as_millis(), 901_000);
/// assert_eq!(expires.saturating_duration_since(issued), Duration::from_secs(900));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixMillis(u64);

impl Serialize for UnixMillis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixMillis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<UnixMillis>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))
    }
}

impl FromStr for UnixMillis {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(UnixMillis)
    }
}

impl Display for UnixMillis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<Duration> for UnixMillis {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        UnixMillis(self.0.saturating_add(millis))
    }
}

impl UnixMillis {
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the current system time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set to a time before the Unix epoch.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_millis();
        Self(u64::try_from(now).unwrap_or(u64::MAX))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time from `earlier` until `self`, zero if `earlier` is later.
    pub fn saturating_duration_since(&self, earlier: UnixMillis) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}
