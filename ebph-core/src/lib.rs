//! The ebpH per-executable sequence profile engine.
//!
//! This crate implements the seven components in `spec.md` §2 (Lookahead
//! Pair Table, Sequence Window, Training/Test Counters, Profile State
//! Machine, Per-Task Anomaly Engine, Event Bus, Profile Registry) plus the
//! settings and persistence machinery those components depend on.
//! [`engine::Engine`] is the crate's single entry point for the per-call
//! hot path; everything else here is a component it drives.

pub mod engine;
pub mod error;
pub mod events;
pub mod lpt;
pub mod persistence;
pub mod profile;
pub mod registry;
pub mod settings;
pub mod task;
pub mod window;

pub use engine::{Decision, Engine};
pub use error::EngineError;
pub use events::{EventBus, EventBusHandle, EventRecord};
pub use profile::Profile;
pub use registry::{ProfileRegistry, TaskTable};
pub use settings::{Settings, SettingsSnapshot};
pub use task::TaskState;
