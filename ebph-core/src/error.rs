use ebph_common::ProfileKey;
use thiserror::Error;

/// Error kinds from `spec.md` §7. None of these are fatal to the engine:
/// every per-call path that can produce one of these either drops the
/// input and counts it, or rejects an admin request without touching
/// engine state.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A per-call event arrived while `MONITORING` is disabled. Dropped
    /// silently by callers; kept as a variant so tests can assert on it.
    #[error("monitoring is disabled")]
    NotMonitoring,

    /// The registry has no profile for this key and no executable identity
    /// was supplied to create one. Should not occur if the event source is
    /// correct.
    #[error("no profile for key {0}")]
    UnknownProfile(ProfileKey),

    /// No task state exists for this tid. Callers synthesize one with an
    /// all-`EMPTY` window rather than erroring on the hot path; this
    /// variant exists for the synthesis decision to be observable.
    #[error("no task state for tid {0}")]
    UnknownTask(u32),

    /// I/O failure or magic mismatch while saving/loading a profile.
    #[error("persistence error for profile {key}: {reason}")]
    PersistenceError { key: ProfileKey, reason: String },

    /// A tunable was rejected by the control surface (negative or
    /// unrecognized). Core state is left unchanged.
    #[error("tunable {name} out of range: {value}")]
    TunableOutOfRange { name: &'static str, value: i64 },
}
