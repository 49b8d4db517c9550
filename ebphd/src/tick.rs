//! The tick tier (`spec.md` §5): a single cooperative consumer that drains
//! the Event Bus and performs periodic maintenance — profile persistence
//! and admin commands — on an interval, mirroring the batch-drain shape of
//! `cognitod::runtime::sequencer::SequencerConsumer`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ebph_core::events::{EventBus, EventRecord};
use ebph_core::Engine;
use tokio::sync::mpsc;

use crate::admin::{self, AdminCommand};

/// How often pending events are drained from the bus, independent of the
/// (usually much longer) profile-save interval.
const DRAIN_INTERVAL: Duration = Duration::from_millis(200);
const DRAIN_BATCH: usize = 256;

/// Run the tick loop until the process is asked to shut down. Never
/// returns under normal operation; `main` races it against a ctrl-c
/// future.
pub async fn run(
    engine: Arc<Engine>,
    mut bus: EventBus,
    mut admin_rx: mpsc::Receiver<AdminCommand>,
    profiles_dir: PathBuf,
    save_interval: Duration,
) {
    if let Err(err) = std::fs::create_dir_all(&profiles_dir) {
        log::warn!(
            "could not create profiles directory {}: {err}",
            profiles_dir.display()
        );
    }

    let mut drain_tick = tokio::time::interval(DRAIN_INTERVAL);
    let mut save_tick = tokio::time::interval(save_interval);

    loop {
        tokio::select! {
            _ = drain_tick.tick() => {
                for event in bus.poll_batch(DRAIN_BATCH) {
                    log_event(&event);
                }
                let dropped = bus.dropped_count();
                if dropped > 0 {
                    log::debug!("event bus has dropped {dropped} events total");
                }
            }
            _ = save_tick.tick() => {
                persist_all(&engine, &profiles_dir);
            }
            Some(cmd) = admin_rx.recv() => {
                admin::dispatch(&engine, cmd);
            }
        }
    }
}

/// Mirror each emitted event to `log` at the level SPEC_FULL §7 assigns it:
/// lifecycle/profile events at info, anomalies at warn (an audit-style
/// line), new sequences at debug (training-only chatter), tolerize-limit
/// at warn since it signals a profile repeatedly failing to stay NORMAL.
fn log_event(event: &EventRecord) {
    match event {
        EventRecord::NewProfile { key, pathname } => {
            log::info!("new_profile key={key} pathname={pathname}");
        }
        EventRecord::Anomaly {
            key,
            pid,
            syscall,
            misses,
            task_count,
        } => {
            let name = ebph_common::syscall_name(*syscall);
            log::warn!(
                "anomaly key={key} pid={pid} syscall={syscall} ({name}) misses={misses} task_count={task_count}"
            );
        }
        EventRecord::NewSequence {
            key,
            pid,
            profile_count,
            task_count,
            ..
        } => {
            log::debug!(
                "new_sequence key={key} pid={pid} profile_count={profile_count} task_count={task_count}"
            );
        }
        EventRecord::StartNormal {
            key,
            pid,
            train_count,
            last_mod_count,
            sequences,
            ..
        } => {
            log::info!(
                "start_normal key={key} pid={pid:?} train_count={train_count} last_mod_count={last_mod_count} sequences={sequences}"
            );
        }
        EventRecord::StopNormal {
            key,
            pid,
            anomalies,
            anomaly_limit,
            ..
        } => {
            log::info!(
                "stop_normal key={key} pid={pid:?} anomalies={anomalies} anomaly_limit={anomaly_limit}"
            );
        }
        EventRecord::TolerizeLimit { key, pid, lfc } => {
            log::warn!("tolerize_limit key={key} pid={pid} lfc={lfc}");
        }
    }
}

/// Save every profile currently known to the registry. Save failures are
/// reported per profile and skipped (`spec.md` §7 `PersistenceError`);
/// they never abort the rest of the sweep.
fn persist_all(engine: &Engine, dir: &Path) {
    for key in engine.registry().keys() {
        let Some(profile) = engine.registry().get_mut(key) else {
            continue;
        };
        let path = dir.join(format!("{key}.profile"));
        if let Err(err) = ebph_core::persistence::save_profile(&profile, &path) {
            log::warn!("failed to persist profile {key}: {err}");
        }
    }
}
