//! Key service - Core lifecycle logic for subscription keys.
//!
//! This service is the single source of truth for key records. It
//! handles:
//! - Key issuance with collision-checked identifiers
//! - One-time owner binding on activation
//! - Expiry detection (including the deactivate-on-read paths)
//! - Ban / unban / extension
//! - The batch expiry sweep
//!
//! # Transaction Model
//!
//! Persistence is whole-file: every mutation loads the full record set,
//! applies its change and writes the full set back. A process-wide mutex
//! serializes those load-mutate-persist sequences so the request path
//! and the background sweeper cannot interleave half-applied writes.
//! Across processes the guarantee stays "last writer wins".

use chrono::{Duration, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::AppError;
use crate::models::key::{KeyDetails, KeyMap, KeyRecord, Plan, SubscriptionInfo};
use crate::store::KeyRepository;

/// Current wall-clock time, naive UTC. The store format truncates to
/// seconds on write.
fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Owns all key records and enforces the key state machine.
pub struct KeyService {
    repo: Box<dyn KeyRepository>,

    // One logical transaction at a time. The guard is held for the whole
    // load-mutate-persist sequence, never across an await point.
    tx: Mutex<()>,
}

impl KeyService {
    pub fn new(repo: Box<dyn KeyRepository>) -> Self {
        Self {
            repo,
            tx: Mutex::new(()),
        }
    }

    /// Issue a new key for `plan`.
    ///
    /// With `custom_key` the caller picks the identifier and gets
    /// `DuplicateKey` if it is taken. Without it a time-based identifier
    /// is generated and collision-checked before use.
    ///
    /// The new record is active, unowned and expires exactly one plan
    /// duration after creation.
    pub fn issue(&self, plan: Plan, custom_key: Option<String>) -> Result<String, AppError> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys = self.repo.load();

        let key_id = match custom_key {
            Some(id) => {
                if keys.contains_key(&id) {
                    return Err(AppError::DuplicateKey);
                }
                id
            }
            None => generate_key_id(&keys),
        };

        let created_at = now();
        keys.insert(key_id.clone(), KeyRecord::new(plan, created_at));
        self.repo.save(&keys)?;

        tracing::info!(key = %key_id, %plan, "Issued key");
        Ok(key_id)
    }

    /// Activate `key_id` for `user_id`, binding the key on first use.
    ///
    /// Re-activation by the same user succeeds and re-stamps `used_at`;
    /// any other user gets `KeyOwnedByOther`.
    ///
    /// # Side Effect
    ///
    /// Finding the key past its expiry deactivates it on the spot and
    /// persists that, so the attempt returns `KeyExpired` once and
    /// `KeyBanned` from then on.
    ///
    /// Returns the expiry timestamp on success.
    pub fn activate(&self, key_id: &str, user_id: i64) -> Result<NaiveDateTime, AppError> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys = self.repo.load();

        let mut record = keys.get(key_id).cloned().ok_or(AppError::KeyNotFound)?;
        if !record.active {
            return Err(AppError::KeyBanned);
        }

        let current = now();
        if record.is_expired(current) {
            record.active = false;
            keys.insert(key_id.to_string(), record);
            self.repo.save(&keys)?;
            tracing::info!(key = %key_id, "Deactivated expired key on activation attempt");
            return Err(AppError::KeyExpired);
        }

        if let Some(owner) = record.owner_id {
            if owner != user_id {
                return Err(AppError::KeyOwnedByOther);
            }
        }

        record.owner_id = Some(user_id);
        record.used_at = Some(current);
        let expire_at = record.expire_at;
        keys.insert(key_id.to_string(), record);
        self.repo.save(&keys)?;

        tracing::info!(key = %key_id, user_id, "Activated key");
        Ok(expire_at)
    }

    /// The authorization gate: does `user_id` hold a live subscription?
    ///
    /// Scans for the first record owned by the user with `active = true`
    /// (iteration order is lexicographic by key id; a user owning
    /// several keys is *not* disambiguated by recency - known
    /// limitation, kept as-is). An expired match is deactivated and
    /// persisted before refusing, so the next check takes the
    /// no-subscription path.
    pub fn check_subscription(&self, user_id: i64) -> Result<SubscriptionInfo, AppError> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys = self.repo.load();

        let found = keys
            .iter()
            .find(|(_, record)| record.owner_id == Some(user_id) && record.active)
            .map(|(key_id, record)| (key_id.clone(), record.clone()));

        let Some((key_id, record)) = found else {
            return Err(AppError::NoActiveSubscription);
        };

        let current = now();
        if record.is_expired(current) {
            // Lazy deactivation: the gate doubles as a reconciler.
            if let Some(stored) = keys.get_mut(&key_id) {
                stored.active = false;
            }
            self.repo.save(&keys)?;
            tracing::info!(key = %key_id, user_id, "Deactivated expired subscription on check");
            return Err(AppError::SubscriptionExpired);
        }

        Ok(SubscriptionInfo {
            key: key_id,
            plan: record.plan,
            expire_at: record.expire_at,
            days_left: record.days_left(current),
        })
    }

    /// Read-only projection of one key with the derived fields.
    pub fn key_info(&self, key_id: &str) -> Result<KeyDetails, AppError> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let keys = self.repo.load();
        let record = keys.get(key_id).ok_or(AppError::KeyNotFound)?;
        Ok(KeyDetails::from_record(record, now()))
    }

    /// Ban a key unconditionally.
    pub fn ban(&self, key_id: &str) -> Result<(), AppError> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys = self.repo.load();

        let record = keys.get_mut(key_id).ok_or(AppError::KeyNotFound)?;
        record.active = false;
        self.repo.save(&keys)?;

        tracing::info!(key = %key_id, "Banned key");
        Ok(())
    }

    /// Lift a ban, unless the key has already expired.
    ///
    /// An expired key stays refused (`CannotUnbanExpired`) and entirely
    /// untouched; extension is the only way to resurrect it.
    pub fn unban(&self, key_id: &str) -> Result<(), AppError> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys = self.repo.load();

        let record = keys.get_mut(key_id).ok_or(AppError::KeyNotFound)?;
        if record.is_expired(now()) {
            return Err(AppError::CannotUnbanExpired);
        }
        record.active = true;
        self.repo.save(&keys)?;

        tracing::info!(key = %key_id, "Unbanned key");
        Ok(())
    }

    /// Push the expiry by `days` (negative shortens, no floor) and force
    /// the key active.
    ///
    /// The shift is relative to the *current* expiry, not to now, and
    /// this is the only operation that reactivates an expired or banned
    /// key. Returns the new expiry timestamp.
    pub fn extend(&self, key_id: &str, days: i64) -> Result<NaiveDateTime, AppError> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys = self.repo.load();

        let delta = Duration::try_days(days)
            .ok_or_else(|| AppError::InvalidRequest("days is out of range".to_string()))?;

        let record = keys.get_mut(key_id).ok_or(AppError::KeyNotFound)?;
        record.expire_at = record
            .expire_at
            .checked_add_signed(delta)
            .ok_or_else(|| AppError::InvalidRequest("days is out of range".to_string()))?;
        record.active = true;
        let expire_at = record.expire_at;
        self.repo.save(&keys)?;

        tracing::info!(key = %key_id, days, "Extended key");
        Ok(expire_at)
    }

    /// Every key with its derived view, keyed by identifier.
    pub fn list_all(&self) -> BTreeMap<String, KeyDetails> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let keys = self.repo.load();
        let current = now();
        keys.iter()
            .map(|(key_id, record)| (key_id.clone(), KeyDetails::from_record(record, current)))
            .collect()
    }

    /// Keys owned by `user_id`, with their derived views.
    pub fn list_for_user(&self, user_id: i64) -> BTreeMap<String, KeyDetails> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let keys = self.repo.load();
        let current = now();
        keys.iter()
            .filter(|(_, record)| record.owner_id == Some(user_id))
            .map(|(key_id, record)| (key_id.clone(), KeyDetails::from_record(record, current)))
            .collect()
    }

    /// Deactivate every active record whose expiry has passed.
    ///
    /// Persists once at the end and returns the number of records
    /// changed. A second run right after returns 0.
    pub fn sweep_expired(&self) -> Result<usize, AppError> {
        let _guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys = self.repo.load();
        let current = now();

        let mut swept = 0;
        for record in keys.values_mut() {
            if record.active && record.is_expired(current) {
                record.active = false;
                swept += 1;
            }
        }
        self.repo.save(&keys)?;

        Ok(swept)
    }
}

/// Generate a fresh time-based key identifier.
///
/// `KEY<unix-seconds>` normally; if two keys are issued within the same
/// second a random suffix breaks the tie. Always collision-checked
/// against the current record set before use.
fn generate_key_id(keys: &KeyMap) -> String {
    let timestamp = Utc::now().timestamp();
    let candidate = format!("KEY{timestamp}");
    if !keys.contains_key(&candidate) {
        return candidate;
    }

    loop {
        let suffix: u16 = rand::random();
        let candidate = format!("KEY{timestamp}{suffix:04X}");
        if !keys.contains_key(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonFileStore;
    use tempfile::TempDir;

    /// Service over a throwaway store file. The TempDir must outlive the
    /// service or the file vanishes mid-test.
    fn service(dir: &TempDir) -> KeyService {
        let store = JsonFileStore::new(dir.path().join("keys.json")).unwrap();
        KeyService::new(Box::new(store))
    }

    /// Shove a key's expiry into the past through the public API.
    /// extend() also forces active = true, which every caller here wants.
    fn expire(service: &KeyService, key_id: &str, days_ago: i64) {
        service.extend(key_id, -days_ago).unwrap();
    }

    #[test]
    fn issue_derives_expiry_from_plan_duration() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        for (plan, days) in [
            (Plan::Daily, 1),
            (Plan::Weekly, 7),
            (Plan::Monthly, 30),
            (Plan::Yearly, 365),
        ] {
            let key = svc.issue(plan, None).unwrap();
            let info = svc.key_info(&key).unwrap();
            assert_eq!(info.expire_at - info.created_at, Duration::days(days));
            assert!(info.active);
            assert_eq!(info.owner_id, None);
            assert_eq!(info.used_at, None);
        }
    }

    #[test]
    fn issue_rejects_duplicate_custom_key_without_touching_the_original() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        svc.issue(Plan::Monthly, Some("VIP".to_string())).unwrap();
        let before = svc.key_info("VIP").unwrap();

        let err = svc.issue(Plan::Daily, Some("VIP".to_string())).unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey));

        let after = svc.key_info("VIP").unwrap();
        assert_eq!(after.plan, Plan::Monthly);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.expire_at, before.expire_at);
    }

    #[test]
    fn generated_ids_are_unique_within_one_second() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        // Issuing quickly lands several keys in the same unix second;
        // the collision check must still hand out distinct ids.
        let mut ids = std::collections::BTreeSet::new();
        for _ in 0..5 {
            assert!(ids.insert(svc.issue(Plan::Daily, None).unwrap()));
        }
    }

    #[test]
    fn activation_binds_owner_and_is_idempotent_for_the_same_user() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let key = svc.issue(Plan::Weekly, None).unwrap();

        svc.activate(&key, 42).unwrap();
        let info = svc.key_info(&key).unwrap();
        assert_eq!(info.owner_id, Some(42));
        assert!(info.used_at.is_some());

        // Same user again: fine.
        svc.activate(&key, 42).unwrap();

        // Different user: refused, binding unchanged.
        let err = svc.activate(&key, 43).unwrap_err();
        assert!(matches!(err, AppError::KeyOwnedByOther));
        assert_eq!(svc.key_info(&key).unwrap().owner_id, Some(42));
    }

    #[test]
    fn activating_unknown_or_banned_keys_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        assert!(matches!(
            svc.activate("NOPE", 1).unwrap_err(),
            AppError::KeyNotFound
        ));

        let key = svc.issue(Plan::Daily, None).unwrap();
        svc.ban(&key).unwrap();
        assert!(matches!(
            svc.activate(&key, 1).unwrap_err(),
            AppError::KeyBanned
        ));
    }

    #[test]
    fn expired_key_deactivates_on_activation_and_stays_banned() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let key = svc.issue(Plan::Daily, None).unwrap();
        expire(&svc, &key, 3);

        // First attempt: expiry detected, record flipped inactive.
        assert!(matches!(
            svc.activate(&key, 42).unwrap_err(),
            AppError::KeyExpired
        ));
        assert!(!svc.key_info(&key).unwrap().active);

        // From now on it reads as banned, not expired.
        assert!(matches!(
            svc.activate(&key, 42).unwrap_err(),
            AppError::KeyBanned
        ));
    }

    #[test]
    fn unban_refuses_expired_keys_and_leaves_them_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let key = svc.issue(Plan::Daily, None).unwrap();
        expire(&svc, &key, 2);

        // Still flagged active (nothing has observed the expiry yet).
        assert!(svc.key_info(&key).unwrap().active);

        let err = svc.unban(&key).unwrap_err();
        assert!(matches!(err, AppError::CannotUnbanExpired));
        assert!(svc.key_info(&key).unwrap().active);
    }

    #[test]
    fn unban_restores_a_banned_unexpired_key() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let key = svc.issue(Plan::Monthly, None).unwrap();

        svc.ban(&key).unwrap();
        assert!(!svc.key_info(&key).unwrap().active);

        svc.unban(&key).unwrap();
        assert!(svc.key_info(&key).unwrap().active);
    }

    #[test]
    fn extend_resurrects_a_banned_expired_key_from_its_prior_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let key = svc.issue(Plan::Daily, None).unwrap();
        expire(&svc, &key, 5);
        svc.ban(&key).unwrap();

        let prior = svc.key_info(&key).unwrap().expire_at;
        let new_expire = svc.extend(&key, 30).unwrap();

        // Pushed from the prior expiry, not from now.
        assert_eq!(new_expire, prior + Duration::days(30));
        let info = svc.key_info(&key).unwrap();
        assert!(info.active);
        assert_eq!(info.expire_at, new_expire);
    }

    #[test]
    fn unknown_keys_report_not_found_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        for err in [
            svc.ban("MISSING").unwrap_err(),
            svc.unban("MISSING").unwrap_err(),
            svc.extend("MISSING", 1).unwrap_err(),
            svc.key_info("MISSING").unwrap_err(),
        ] {
            assert!(matches!(err, AppError::KeyNotFound));
        }
    }

    #[test]
    fn sweep_deactivates_exactly_the_expired_active_keys() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let live = svc.issue(Plan::Monthly, None).unwrap();
        let dead1 = svc.issue(Plan::Daily, None).unwrap();
        let dead2 = svc.issue(Plan::Weekly, None).unwrap();
        let banned = svc.issue(Plan::Daily, None).unwrap();
        expire(&svc, &dead1, 2);
        expire(&svc, &dead2, 10);
        expire(&svc, &banned, 2);
        svc.ban(&banned).unwrap(); // already inactive, must not be counted

        assert_eq!(svc.sweep_expired().unwrap(), 2);
        assert!(svc.key_info(&live).unwrap().active);
        assert!(!svc.key_info(&dead1).unwrap().active);
        assert!(!svc.key_info(&dead2).unwrap().active);

        // Idempotent: nothing left to flip.
        assert_eq!(svc.sweep_expired().unwrap(), 0);
    }

    #[test]
    fn check_subscription_full_lifecycle_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);
        let key = svc.issue(Plan::Daily, None).unwrap();

        // Issued but not activated: nobody is subscribed.
        assert!(matches!(
            svc.check_subscription(42).unwrap_err(),
            AppError::NoActiveSubscription
        ));

        svc.activate(&key, 42).unwrap();
        let info = svc.check_subscription(42).unwrap();
        assert_eq!(info.key, key);
        assert_eq!(info.plan, Plan::Daily);
        assert_eq!(info.days_left, 0); // expires within the day

        // Past expiry the gate refuses and reconciles the record.
        expire(&svc, &key, 2);
        assert!(matches!(
            svc.check_subscription(42).unwrap_err(),
            AppError::SubscriptionExpired
        ));
        assert!(!svc.key_info(&key).unwrap().active);

        // The record is now inactive, so the generic refusal follows.
        assert!(matches!(
            svc.check_subscription(42).unwrap_err(),
            AppError::NoActiveSubscription
        ));
    }

    #[test]
    fn check_subscription_takes_the_first_owned_active_record() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        // Lexicographic iteration order: A-KEY before B-KEY.
        svc.issue(Plan::Daily, Some("A-KEY".to_string())).unwrap();
        svc.issue(Plan::Yearly, Some("B-KEY".to_string())).unwrap();
        svc.activate("A-KEY", 7).unwrap();
        svc.activate("B-KEY", 7).unwrap();

        // The daily key wins even though the yearly one lives longer.
        let info = svc.check_subscription(7).unwrap();
        assert_eq!(info.key, "A-KEY");
        assert_eq!(info.plan, Plan::Daily);
    }

    #[test]
    fn listings_carry_the_derived_view() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(&dir);

        let mine = svc.issue(Plan::Weekly, None).unwrap();
        svc.issue(Plan::Daily, Some("OTHER".to_string())).unwrap();
        svc.activate(&mine, 42).unwrap();
        svc.activate("OTHER", 99).unwrap();

        let all = svc.list_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&mine].status, crate::models::key::KeyStatus::Active);
        assert!(!all[&mine].expired);

        let owned = svc.list_for_user(42);
        assert_eq!(owned.len(), 1);
        assert!(owned.contains_key(&mine));
    }

    #[test]
    fn state_survives_a_service_restart() {
        let dir = tempfile::tempdir().unwrap();
        let key = {
            let svc = service(&dir);
            let key = svc.issue(Plan::Monthly, None).unwrap();
            svc.activate(&key, 42).unwrap();
            key
        };

        // New service over the same file sees the binding.
        let svc = service(&dir);
        assert_eq!(svc.key_info(&key).unwrap().owner_id, Some(42));
        assert_eq!(svc.check_subscription(42).unwrap().key, key);
    }
}
