//! Process-wide tunables (`spec.md` §5, §6).
//!
//! Settings are stored as plain atomics, one per field, the same way
//! `cognitod::metrics::Metrics` keeps its hot-path counters: readers on the
//! per-call path take an immutable [`SettingsSnapshot`] without locking,
//! writers (the admin/control-surface path) publish new values with a
//! single atomic store per field. There is no cross-field atomicity
//! requirement here — each tunable is independent — so this is simpler than
//! a full `ArcSwap<Settings>` publish and avoids an allocation per update.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::EngineError;

const ORDER: Ordering = Ordering::Relaxed;

/// Default minimum `train_count` to become eligible for promotion.
pub const DEFAULT_NORMAL_WAIT: u64 = 128 * 7;
/// Default numerator of the steadiness ratio.
pub const DEFAULT_NORMAL_FACTOR: u64 = 32;
/// Default denominator of the steadiness ratio.
pub const DEFAULT_NORMAL_FACTOR_DEN: u64 = 33;
/// Default anomaly count that demotes a profile out of NORMAL.
pub const DEFAULT_ANOMALY_LIMIT: u64 = 30;
/// Default per-task LFC threshold that resets a task's profile to TRAINING.
pub const DEFAULT_TOLERIZE_LIMIT: u64 = 30;

pub struct Settings {
    monitoring: AtomicBool,
    enforcing: AtomicBool,
    log_sequences: AtomicBool,
    normal_wait: AtomicU64,
    normal_factor: AtomicU64,
    normal_factor_den: AtomicU64,
    anomaly_limit: AtomicU64,
    tolerize_limit: AtomicU64,
}

/// An immutable read of every tunable, taken without locking.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SettingsSnapshot {
    pub monitoring: bool,
    pub enforcing: bool,
    pub log_sequences: bool,
    pub normal_wait: u64,
    pub normal_factor: u64,
    pub normal_factor_den: u64,
    pub anomaly_limit: u64,
    pub tolerize_limit: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitoring: AtomicBool::new(true),
            enforcing: AtomicBool::new(false),
            log_sequences: AtomicBool::new(false),
            normal_wait: AtomicU64::new(DEFAULT_NORMAL_WAIT),
            normal_factor: AtomicU64::new(DEFAULT_NORMAL_FACTOR),
            normal_factor_den: AtomicU64::new(DEFAULT_NORMAL_FACTOR_DEN),
            anomaly_limit: AtomicU64::new(DEFAULT_ANOMALY_LIMIT),
            tolerize_limit: AtomicU64::new(DEFAULT_TOLERIZE_LIMIT),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            monitoring: self.monitoring.load(ORDER),
            enforcing: self.enforcing.load(ORDER),
            log_sequences: self.log_sequences.load(ORDER),
            normal_wait: self.normal_wait.load(ORDER),
            normal_factor: self.normal_factor.load(ORDER),
            normal_factor_den: self.normal_factor_den.load(ORDER),
            anomaly_limit: self.anomaly_limit.load(ORDER),
            tolerize_limit: self.tolerize_limit.load(ORDER),
        }
    }

    pub fn set_monitoring(&self, value: bool) {
        self.monitoring.store(value, ORDER);
    }

    pub fn set_enforcing(&self, value: bool) {
        self.enforcing.store(value, ORDER);
    }

    pub fn set_log_sequences(&self, value: bool) {
        self.log_sequences.store(value, ORDER);
    }

    /// Apply a named tunable update from the control surface. Mirrors
    /// `spec.md` §6's recognized-options list: the five numeric tunables
    /// plus the three boolean ones (`MONITORING`, `ENFORCING`,
    /// `LOG_SEQUENCES`), which accept only `{0,1}`. Unknown names,
    /// negative values, and out-of-range boolean values are rejected
    /// without touching any other setting.
    pub fn set_tunable(&self, name: &str, value: i64) -> Result<(), EngineError> {
        if value < 0 {
            return Err(EngineError::TunableOutOfRange {
                name: leak_static(name),
                value,
            });
        }
        let value = value as u64;
        match name {
            "NORMAL_WAIT" => self.normal_wait.store(value, ORDER),
            "NORMAL_FACTOR" => self.normal_factor.store(value, ORDER),
            "NORMAL_FACTOR_DEN" => self.normal_factor_den.store(value, ORDER),
            "ANOMALY_LIMIT" => self.anomaly_limit.store(value, ORDER),
            "TOLERIZE_LIMIT" => self.tolerize_limit.store(value, ORDER),
            "MONITORING" if value <= 1 => self.monitoring.store(value == 1, ORDER),
            "ENFORCING" if value <= 1 => self.enforcing.store(value == 1, ORDER),
            "LOG_SEQUENCES" if value <= 1 => self.log_sequences.store(value == 1, ORDER),
            _ => {
                return Err(EngineError::TunableOutOfRange {
                    name: leak_static(name),
                    value: value as i64,
                });
            }
        }
        Ok(())
    }
}

// `EngineError::TunableOutOfRange` carries a `&'static str` because it is
// meant to be constructed from the fixed set of recognized tunable names
// above; the control surface only ever passes one of those literals in
// practice, so this never actually leaks attacker-controlled strings.
fn leak_static(name: &str) -> &'static str {
    match name {
        "NORMAL_WAIT" => "NORMAL_WAIT",
        "NORMAL_FACTOR" => "NORMAL_FACTOR",
        "NORMAL_FACTOR_DEN" => "NORMAL_FACTOR_DEN",
        "ANOMALY_LIMIT" => "ANOMALY_LIMIT",
        "TOLERIZE_LIMIT" => "TOLERIZE_LIMIT",
        "MONITORING" => "MONITORING",
        "ENFORCING" => "ENFORCING",
        "LOG_SEQUENCES" => "LOG_SEQUENCES",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_canonical_values() {
        let settings = Settings::new();
        let snap = settings.snapshot();
        assert!(snap.monitoring);
        assert!(!snap.enforcing);
        assert!(!snap.log_sequences);
    }

    #[test]
    fn set_tunable_rejects_negative_values() {
        let settings = Settings::new();
        let err = settings.set_tunable("ANOMALY_LIMIT", -1).unwrap_err();
        assert!(matches!(err, EngineError::TunableOutOfRange { .. }));
    }

    #[test]
    fn set_tunable_rejects_unknown_names() {
        let settings = Settings::new();
        let err = settings.set_tunable("NOT_A_REAL_SETTING", 5).unwrap_err();
        assert!(matches!(err, EngineError::TunableOutOfRange { .. }));
    }

    #[test]
    fn set_tunable_updates_snapshot() {
        let settings = Settings::new();
        settings.set_tunable("ANOMALY_LIMIT", 3).unwrap();
        assert_eq!(settings.snapshot().anomaly_limit, 3);
    }

    #[test]
    fn set_tunable_reaches_the_three_boolean_settings() {
        let settings = Settings::new();
        settings.set_tunable("MONITORING", 0).unwrap();
        settings.set_tunable("ENFORCING", 1).unwrap();
        settings.set_tunable("LOG_SEQUENCES", 1).unwrap();
        let snap = settings.snapshot();
        assert!(!snap.monitoring);
        assert!(snap.enforcing);
        assert!(snap.log_sequences);
    }

    #[test]
    fn set_tunable_rejects_out_of_range_booleans() {
        let settings = Settings::new();
        let err = settings.set_tunable("ENFORCING", 2).unwrap_err();
        assert!(matches!(err, EngineError::TunableOutOfRange { .. }));
        // Rejected update must not have touched the setting.
        assert!(!settings.snapshot().enforcing);
    }
}
