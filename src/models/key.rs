//! Subscription key data model and API request/response types.
//!
//! This module defines:
//! - `Plan`: the closed set of subscription durations
//! - `KeyRecord`: the persisted per-key record
//! - `KeyDetails`: enriched read-only projection (expired/days_left/status)
//! - `SubscriptionInfo`: what the authorization gate returns
//! - Request/response bodies for the HTTP endpoints

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Fixed serialization pattern for every timestamp in the store file.
///
/// Timestamps are persisted as plain strings like `2025-01-15 10:30:00`,
/// with no timezone suffix. All times are UTC.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The full record set: key identifier -> record.
///
/// A `BTreeMap` keeps iteration order deterministic (lexicographic by key
/// id), which matters because `check_subscription` takes the *first* owned
/// active record it encounters.
pub type KeyMap = BTreeMap<String, KeyRecord>;

/// Subscription plan - a named duration class.
///
/// The set is closed: any other plan string is rejected at parse time
/// with `AppError::InvalidPlan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Plan {
    /// Initial validity window granted by this plan.
    ///
    /// Monthly is a fixed 30 days and yearly a fixed 365 days; no
    /// calendar-month arithmetic.
    pub fn duration(self) -> Duration {
        match self {
            Plan::Daily => Duration::days(1),
            Plan::Weekly => Duration::weeks(1),
            Plan::Monthly => Duration::days(30),
            Plan::Yearly => Duration::days(365),
        }
    }
}

impl FromStr for Plan {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Plan::Daily),
            "weekly" => Ok(Plan::Weekly),
            "monthly" => Ok(Plan::Monthly),
            "yearly" => Ok(Plan::Yearly),
            other => Err(AppError::InvalidPlan(other.to_string())),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Plan::Daily => "daily",
            Plan::Weekly => "weekly",
            Plan::Monthly => "monthly",
            Plan::Yearly => "yearly",
        };
        f.write_str(name)
    }
}

/// One persisted subscription key record.
///
/// # Store File
///
/// Serializes into the JSON store file as:
///
/// ```json
/// {
///   "plan": "monthly",
///   "created_at": "2025-01-15 10:30:00",
///   "expire_at": "2025-02-14 10:30:00",
///   "active": true,
///   "owner_id": null,
///   "used_at": null
/// }
/// ```
///
/// # Lifecycle
///
/// Created unowned and active -> activated at most once (binding
/// `owner_id` and stamping `used_at`) -> expires naturally or is banned
/// (`active = false`) -> possibly extended, the only path that turns
/// `active` back on after expiry. Records are never deleted, only flagged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Duration class this key was issued under
    pub plan: Plan,

    /// When the key was issued
    #[serde(with = "ts_format")]
    pub created_at: NaiveDateTime,

    /// Moment after which the key no longer grants access
    ///
    /// Always `created_at` + plan duration at issue time; pushed forward
    /// (or backward) by extension.
    #[serde(with = "ts_format")]
    pub expire_at: NaiveDateTime,

    /// Whether the key currently grants access
    ///
    /// `false` means administratively banned or auto-deactivated after
    /// expiry. Flipping this off instead of deleting preserves history.
    pub active: bool,

    /// User the key is bound to; `None` until first activation
    ///
    /// Once set, only the same user may activate again. The binding is
    /// for the lifetime of the key.
    pub owner_id: Option<i64>,

    /// Timestamp of the first successful activation
    #[serde(default, with = "ts_format_opt")]
    pub used_at: Option<NaiveDateTime>,
}

impl KeyRecord {
    /// Build a fresh, unowned, active record for `plan` issued at `now`.
    pub fn new(plan: Plan, now: NaiveDateTime) -> Self {
        Self {
            plan,
            created_at: now,
            expire_at: now + plan.duration(),
            active: true,
            owner_id: None,
            used_at: None,
        }
    }

    /// Whether `now` is strictly past the expiry moment.
    pub fn is_expired(&self, now: NaiveDateTime) -> bool {
        now > self.expire_at
    }

    /// Whole days of validity remaining, 0 once expired.
    pub fn days_left(&self, now: NaiveDateTime) -> i64 {
        if now < self.expire_at {
            (self.expire_at - now).num_days()
        } else {
            0
        }
    }

    /// Current status as seen at `now`. Never persisted.
    pub fn status(&self, now: NaiveDateTime) -> KeyStatus {
        if !self.active {
            KeyStatus::Banned
        } else if self.is_expired(now) {
            KeyStatus::Expired
        } else if self.owner_id.is_none() {
            KeyStatus::Unused
        } else {
            KeyStatus::Active
        }
    }
}

/// Derived key status, computed fresh on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// `active = false`, whether banned by an operator or swept
    Banned,
    /// Still flagged active but past its expiry moment
    Expired,
    /// Valid but never activated by anyone
    Unused,
    /// Valid and bound to an owner
    Active,
}

/// Read-only projection of a record enriched with the derived fields.
///
/// This is what the info/list endpoints return. The derived fields are
/// evaluated at request time and never written back to the store.
#[derive(Debug, Clone, Serialize)]
pub struct KeyDetails {
    /// Plan the key was issued under
    pub plan: Plan,

    /// Issue timestamp
    #[serde(with = "ts_format")]
    pub created_at: NaiveDateTime,

    /// Expiry timestamp
    #[serde(with = "ts_format")]
    pub expire_at: NaiveDateTime,

    /// Persisted active flag (may still be true for an expired key that
    /// no sweep or activation attempt has touched yet)
    pub active: bool,

    /// Bound owner, if any
    pub owner_id: Option<i64>,

    /// First activation timestamp, if any
    #[serde(with = "ts_format_opt")]
    pub used_at: Option<NaiveDateTime>,

    /// Derived: whether the expiry moment has passed
    pub expired: bool,

    /// Derived: whole days of validity remaining
    pub days_left: i64,

    /// Derived: banned / expired / unused / active
    pub status: KeyStatus,
}

impl KeyDetails {
    /// Project a stored record into its enriched view as of `now`.
    pub fn from_record(record: &KeyRecord, now: NaiveDateTime) -> Self {
        Self {
            plan: record.plan,
            created_at: record.created_at,
            expire_at: record.expire_at,
            active: record.active,
            owner_id: record.owner_id,
            used_at: record.used_at,
            expired: record.is_expired(now),
            days_left: record.days_left(now),
            status: record.status(now),
        }
    }
}

/// What the authorization gate hands back for a subscribed user.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    /// The key granting the subscription
    pub key: String,

    /// Plan of that key
    pub plan: Plan,

    /// When access runs out
    #[serde(with = "ts_format")]
    pub expire_at: NaiveDateTime,

    /// Whole days of validity remaining (0 on the final day)
    pub days_left: i64,
}

/// Request body for issuing a new key.
///
/// The plan arrives as a string and is validated against the closed
/// plan set, so an unknown plan surfaces as `invalid_plan` rather than
/// a deserialization failure.
///
/// ```json
/// {
///   "plan": "monthly",
///   "custom_key": "VIP-CUSTOMER-1"  // optional
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct IssueKeyRequest {
    /// One of: daily, weekly, monthly, yearly
    pub plan: String,

    /// Caller-chosen identifier; generated (time-based) when omitted
    #[serde(default)]
    pub custom_key: Option<String>,
}

/// Response body after issuing a key.
#[derive(Debug, Serialize)]
pub struct IssueKeyResponse {
    /// The newly issued key identifier
    pub key: String,
}

/// Request body for activating a key.
///
/// ```json
/// {
///   "key": "KEY1736937000",
///   "user_id": 42
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ActivateKeyRequest {
    /// Key identifier to activate
    pub key: String,

    /// User the key should bind to
    pub user_id: i64,
}

/// Response body after a successful activation.
#[derive(Debug, Serialize)]
pub struct ActivateKeyResponse {
    /// Human-readable confirmation including the expiry
    pub message: String,

    /// When the activated subscription runs out
    #[serde(with = "ts_format")]
    pub expire_at: NaiveDateTime,
}

/// Request body for extending a key.
///
/// `days` may be negative; shortening below the current moment is
/// allowed and leaves the key expired-but-active until the next sweep
/// or activation attempt.
#[derive(Debug, Deserialize)]
pub struct ExtendKeyRequest {
    /// Days to add to the current expiry (not to now)
    pub days: i64,
}

/// Generic confirmation body for ban/unban/extend.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable confirmation
    pub message: String,
}

/// Response body for a sweep run.
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    /// Number of records newly flipped to inactive
    pub deactivated: usize,
}

/// Serde adapter for the fixed `YYYY-MM-DD HH:MM:SS` timestamp strings.
mod ts_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(de::Error::custom)
    }
}

/// Same as [`ts_format`] but for nullable timestamps (`used_at`).
mod ts_format_opt {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(
        dt: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match dt {
            Some(dt) => serializer.serialize_some(&dt.format(TIMESTAMP_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
                .map(Some)
                .map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}
