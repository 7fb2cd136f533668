//! Cache entries and their persisted encoding.

use chrono::DateTime;
use handy_core::clock::add_duration;
use handy_core::{CacheError, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A cached value with its lifetime.
///
/// Timestamps are held at millisecond precision so that an entry reads back
/// from the persistent tier exactly as it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub written_at: Timestamp,
    pub expires_at: Timestamp,
}

impl<T> CacheEntry<T> {
    /// A TTL with a sub-millisecond part is rounded up to the next whole
    /// millisecond, so both tiers agree on `expires_at`.
    pub fn new(key: impl Into<String>, value: T, now: Timestamp, ttl: Duration) -> Self {
        let written_at = truncate_to_millis(now);
        Self {
            key: key.into(),
            value,
            written_at,
            expires_at: add_duration(written_at, ceil_to_millis(ttl)),
        }
    }

    /// Expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn to_persisted(&self) -> PersistedEntry<&T> {
        PersistedEntry {
            data: &self.value,
            timestamp: self.written_at.timestamp_millis(),
            expiry: self.expires_at.timestamp_millis(),
        }
    }
}

impl CacheEntry<Value> {
    /// Rebuild an entry from its persisted form.
    ///
    /// Fails with [`CacheError::Corrupt`] when the timestamps are out of
    /// range or the entry would never have been valid.
    pub fn from_persisted(
        key: impl Into<String>,
        persisted: PersistedEntry<Value>,
    ) -> Result<Self, CacheError> {
        let key = key.into();
        let corrupt = |reason: &str| CacheError::Corrupt {
            key: key.clone(),
            reason: reason.to_string(),
        };
        let written_at = DateTime::from_timestamp_millis(persisted.timestamp)
            .ok_or_else(|| corrupt("timestamp out of range"))?;
        let expires_at = DateTime::from_timestamp_millis(persisted.expiry)
            .ok_or_else(|| corrupt("expiry out of range"))?;
        if expires_at <= written_at {
            return Err(corrupt("expiry not after timestamp"));
        }
        Ok(Self {
            key,
            value: persisted.data,
            written_at,
            expires_at,
        })
    }

    /// Decode the JSON payload into `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, CacheError> {
        T::deserialize(&self.value).map_err(|e| CacheError::Corrupt {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }
}

/// Persisted form of an entry: `{ "data": ..., "timestamp": ms, "expiry": ms }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry<T> {
    pub data: T,
    /// Write time, epoch milliseconds.
    pub timestamp: i64,
    /// Expiry time, epoch milliseconds.
    pub expiry: i64,
}

impl<T: Serialize> PersistedEntry<T> {
    pub fn encode(&self, key: &str) -> Result<String, CacheError> {
        serde_json::to_string(self).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

impl PersistedEntry<Value> {
    pub fn decode(key: &str, raw: &str) -> Result<Self, CacheError> {
        serde_json::from_str(raw).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

fn truncate_to_millis(at: Timestamp) -> Timestamp {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

fn ceil_to_millis(ttl: Duration) -> Duration {
    let millis = ttl.as_nanos().div_ceil(1_000_000);
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let entry = CacheEntry::new("k", json!("v"), t0(), Duration::from_millis(1000));
        assert!(!entry.is_expired(t0()));
        assert!(!entry.is_expired(t0() + chrono::Duration::milliseconds(999)));
        assert!(entry.is_expired(t0() + chrono::Duration::milliseconds(1000)));
    }

    #[test]
    fn test_written_at_truncated_to_millis() {
        let now = t0() + chrono::Duration::nanoseconds(1_500_700);
        let entry = CacheEntry::new("k", json!(1), now, Duration::from_secs(1));
        assert_eq!(entry.written_at.timestamp_subsec_nanos(), 1_000_000);
    }

    #[test]
    fn test_sub_millisecond_ttl_rounds_up() {
        let entry = CacheEntry::new("k", json!(1), t0(), Duration::from_micros(1_500));
        assert_eq!(entry.expires_at, t0() + chrono::Duration::milliseconds(2));

        let entry = CacheEntry::new("k", json!(1), t0(), Duration::from_nanos(1));
        assert_eq!(entry.expires_at, t0() + chrono::Duration::milliseconds(1));

        let raw = entry.to_persisted().encode("k").expect("encode");
        let persisted = PersistedEntry::decode("k", &raw).expect("decode");
        let restored = CacheEntry::from_persisted("k", persisted).expect("still valid");
        assert_eq!(restored, entry);
    }

    #[test]
    fn test_persisted_wire_shape() {
        let entry = CacheEntry::new("k", json!({"name": "x"}), t0(), Duration::from_secs(60));
        let raw = entry.to_persisted().encode("k").expect("encode");
        let value: Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(value["data"], json!({"name": "x"}));
        assert_eq!(value["timestamp"], json!(t0().timestamp_millis()));
        assert_eq!(value["expiry"], json!(t0().timestamp_millis() + 60_000));
    }

    #[test]
    fn test_from_persisted_rejects_inverted_lifetime() {
        let persisted = PersistedEntry {
            data: json!(1),
            timestamp: 2_000,
            expiry: 1_000,
        };
        let err = CacheEntry::from_persisted("k", persisted).expect_err("should be corrupt");
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[test]
    fn test_decode_garbage_is_corrupt() {
        let err = PersistedEntry::decode("k", "not json").expect_err("should fail");
        assert!(matches!(err, CacheError::Corrupt { key, .. } if key == "k"));

        let err = PersistedEntry::decode("k", r#"{"data":1}"#).expect_err("missing fields");
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[test]
    fn test_decode_type_mismatch_is_corrupt() {
        let entry = CacheEntry::new("k", json!("text"), t0(), Duration::from_secs(1));
        assert!(matches!(entry.decode::<u32>(), Err(CacheError::Corrupt { .. })));
        assert_eq!(entry.decode::<String>().expect("string"), "text");
    }
}
