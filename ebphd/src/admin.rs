//! Admin-command dispatcher (`spec.md` §6 control-surface shape).
//!
//! `normalize` / `sensitize` / `tolerize` / `set` map directly onto the
//! `ebph_core::Engine` transitions in `spec.md` §4.D; the real HTTP/CLI
//! surface these commands would arrive over is explicitly out of scope
//! (`spec.md` §1), so this is just the in-process shape it would forward
//! into, consumed from a `tokio::sync::mpsc` channel by the tick task.

use ebph_common::ProfileKey;
use ebph_core::Engine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    SetTunable { name: String, value: i64 },
    Normalize(ProfileKey),
    Sensitize(ProfileKey),
    Tolerize(ProfileKey),
}

/// Apply one admin command. Fire-and-forget (`spec.md` §5): rejections are
/// logged, never propagated back to a caller, since the control surface
/// that submitted the command is out of scope here.
pub fn dispatch(engine: &Engine, cmd: AdminCommand) {
    let result = match cmd {
        AdminCommand::SetTunable { name, value } => engine.set_tunable(&name, value),
        AdminCommand::Normalize(key) => engine.normalize(key),
        AdminCommand::Sensitize(key) => engine.sensitize(key),
        AdminCommand::Tolerize(key) => engine.tolerize(key),
    };
    if let Err(err) = result {
        log::warn!("admin command rejected: {err}");
    }
}
