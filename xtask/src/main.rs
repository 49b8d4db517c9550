use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::PathBuf;

mod syscalls;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: cargo xtask <command>");
        eprintln!("Commands:");
        eprintln!("  gen-syscalls    Regenerate ebph-common's syscall name table");
        std::process::exit(1);
    }

    match args[1].as_str() {
        "gen-syscalls" => gen_syscalls(),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            std::process::exit(1);
        }
    }
}

/// Render `syscalls::SYSCALLS` into `ebph-common/src/syscall_names_table.rs`.
/// Run this after editing `syscalls.rs`; the output is checked in so
/// `ebph-common` never needs this crate as a build dependency.
fn gen_syscalls() -> Result<()> {
    let mut out = String::new();
    writeln!(
        out,
        "// @generated by `cargo xtask gen-syscalls` from xtask/src/syscalls.rs. Do not edit by hand."
    )?;
    writeln!(
        out,
        "const NAMES: [&str; {}] = [",
        syscalls::SYSCALLS.len()
    )?;
    for name in syscalls::SYSCALLS {
        writeln!(out, "    {name:?},")?;
    }
    writeln!(out, "];")?;

    let dest = workspace_root()?.join("ebph-common/src/syscall_names_table.rs");
    std::fs::write(&dest, out).with_context(|| format!("writing {}", dest.display()))?;
    println!(
        "wrote {} ({} syscalls)",
        dest.display(),
        syscalls::SYSCALLS.len()
    );
    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(PathBuf::from)
        .context("xtask has no parent directory")
}
