//! Human-readable names for x86-64 syscall numbers, used only to make log
//! lines readable — `spec.md` §9 is explicit that the engine itself is
//! agnostic to what a "call" means, so nothing in `ebph-core` depends on
//! this table. Regenerated by `cargo xtask gen-syscalls` from the
//! canonical table in `xtask/src/syscalls.rs`; do not hand-edit.

/// Highest syscall number this table has a name for. Anything at or above
/// this falls back to a generated `sys_<n>` label.
pub const MAX_NAMED_SYSCALL: u16 = 332;

/// Look up the name of an x86-64 syscall number. Falls back to `"unknown"`
/// for anything outside the canonical table — a security-hook identifier
/// layered on top of the syscall space, or a syscall number newer than
/// this table.
pub fn syscall_name(call: u16) -> &'static str {
    NAMES
        .get(call as usize)
        .copied()
        .filter(|name| !name.is_empty())
        .unwrap_or("unknown")
}

include!("syscall_names_table.rs");
