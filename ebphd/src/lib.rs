//! Daemon shell around `ebph-core`: config loading, logging bootstrap, the
//! tick-tier loop, an `EventSource` trait plus an in-process replay source,
//! and the admin-command dispatcher. The real in-kernel event producer,
//! HTTP control surface, and admin CLI are out of scope (`spec.md` §1) —
//! this crate only supplies what's needed to run `ebph-core` as a process.

pub mod admin;
pub mod config;
pub mod event_source;
pub mod tick;

pub use admin::AdminCommand;
pub use config::Config;
pub use event_source::{EventSource, ReplayEventSource, TaskEvent};
