//! On-disk record types (§3.1-3.3, §6.3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version written by this implementation.
pub const SCHEMA_VERSION: u32 = 1;

/// Cap on serialized `metadata` size. Not part of spec.md; see SPEC_FULL.md §C.
pub const MAX_METADATA_BYTES: usize = 4096;

/// A lock record, persisted at `<root>/locks/<name>.json`.
///
/// Unknown fields are preserved in `extra` and re-emitted on every rewrite
/// (renewal), so a forward-compatible reader never loses data it doesn't
/// understand — mirrors the teacher's `InboxMessage::unknown_fields`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockRecord {
    pub version: u32,
    pub name: String,
    pub lock_id: String,
    pub owner: String,
    pub host: String,
    pub pid: u32,
    pub acquired_ts: DateTime<Utc>,
    pub ttl_sec: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl LockRecord {
    pub fn new(
        name: &str,
        lock_id: String,
        owner: String,
        host: String,
        pid: u32,
        acquired_ts: DateTime<Utc>,
        ttl_sec: u64,
        metadata: Option<HashMap<String, String>>,
    ) -> Self {
        let expires_at = if ttl_sec > 0 {
            Some(acquired_ts + chrono::Duration::seconds(ttl_sec as i64))
        } else {
            None
        };
        Self {
            version: SCHEMA_VERSION,
            name: name.to_string(),
            lock_id,
            owner,
            host,
            pid,
            acquired_ts,
            ttl_sec,
            expires_at,
            metadata,
            extra: HashMap::new(),
        }
    }

    /// True iff `ttl_sec > 0` and `now` is past `expires_at` — §3.1.
    pub fn is_ttl_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => now > exp,
            None => false,
        }
    }

    /// Rewrite the record for a renewal or re-entrant refresh: same
    /// `lock_id`, fresh timestamps, caller-supplied ttl/metadata — §4.5.1/§4.5.3.
    pub fn renewed(&self, now: DateTime<Utc>, ttl_sec: u64, metadata: Option<HashMap<String, String>>) -> Self {
        let mut r = self.clone();
        r.acquired_ts = now;
        r.ttl_sec = ttl_sec;
        r.expires_at = if ttl_sec > 0 {
            Some(now + chrono::Duration::seconds(ttl_sec as i64))
        } else {
            None
        };
        if metadata.is_some() {
            r.metadata = metadata;
        }
        r
    }
}

/// A freeze record, persisted at `<root>/freezes/<name>.json` — §3.2.
/// Same shape as `LockRecord`; freezes always carry a positive TTL.
pub type FreezeRecord = LockRecord;

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-27T10:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn round_trip_serialize_parse() {
        let r = LockRecord::new("build", "abc123".into(), "alice".into(), "m1".into(), 42, now(), 300, None);
        let json = serde_json::to_string(&r).unwrap();
        let back: LockRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }

    #[test]
    fn ttl_zero_never_expires() {
        let r = LockRecord::new("build", "id".into(), "alice".into(), "m1".into(), 1, now(), 0, None);
        assert!(r.expires_at.is_none());
        assert!(!r.is_ttl_expired(now() + chrono::Duration::days(365)));
    }

    #[test]
    fn expires_at_equals_acquired_plus_ttl() {
        let r = LockRecord::new("build", "id".into(), "alice".into(), "m1".into(), 1, now(), 300, None);
        assert_eq!(r.expires_at, Some(now() + chrono::Duration::seconds(300)));
        assert!(!r.is_ttl_expired(now() + chrono::Duration::seconds(299)));
        assert!(r.is_ttl_expired(now() + chrono::Duration::seconds(301)));
    }

    #[test]
    fn renew_preserves_lock_id_and_advances_expiry() {
        let r = LockRecord::new("build", "id-1".into(), "alice".into(), "m1".into(), 1, now(), 300, None);
        let later = now() + chrono::Duration::seconds(100);
        let renewed = r.renewed(later, 300, None);
        assert_eq!(renewed.lock_id, r.lock_id);
        assert!(renewed.expires_at.unwrap() > r.expires_at.unwrap());
    }

    #[test]
    fn unknown_fields_preserved_on_round_trip() {
        let json = r#"{"version":1,"name":"build","lock_id":"x","owner":"a","host":"h",
            "pid":1,"acquired_ts":"2026-01-27T10:00:00Z","ttl_sec":0,"future_field":"kept"}"#;
        let r: LockRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.extra.get("future_field").unwrap(), "kept");
        let out = serde_json::to_string(&r).unwrap();
        assert!(out.contains("future_field"));
    }
}
