//! Per-Task Anomaly Engine (`spec.md` §4.E) wired to the Profile State
//! Machine (§4.D), Profile Registry (§4.G) and Event Bus (§4.F). This is
//! the crate's single entry point for the per-call hot path: everything
//! else in `ebph-core` is a component this module drives.

use ebph_common::{CallNumber, EMPTY_CALL, ProfileKey, ProfileStatus};

use crate::error::EngineError;
use crate::events::{EventBusHandle, EventRecord};
use crate::registry::{ProfileRegistry, TaskTable};
use crate::settings::Settings;

/// Outcome of the Event Source's synchronous permit/deny request
/// (`spec.md` §4.E "Enforcement output").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permit,
    Deny,
}

pub struct Engine {
    call_space: usize,
    registry: ProfileRegistry,
    tasks: TaskTable,
    settings: Settings,
    bus: EventBusHandle,
}

impl Engine {
    pub fn new(call_space: usize, bus: EventBusHandle) -> Self {
        Self {
            call_space,
            registry: ProfileRegistry::new(),
            tasks: TaskTable::new(),
            settings: Settings::new(),
            bus,
        }
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn call_space(&self) -> usize {
        self.call_space
    }

    /// Task start (`spec.md` §3 Lifecycles): create a fresh Task State and
    /// bump the owning profile's live-task count, creating the profile
    /// first (and emitting `new_profile`) if this is the first time it's
    /// been observed.
    pub fn task_start(&self, tid: u32, pid: u32, profile_key: ProfileKey, exe_path: &str) {
        let (mut profile, created) = self
            .registry
            .get_or_create(profile_key, exe_path, self.call_space);
        profile.inc_live_tasks();
        drop(profile);
        if created {
            self.bus.publish(EventRecord::NewProfile {
                key: profile_key,
                pathname: exe_path.to_string(),
            });
        }
        self.tasks.get_or_synthesize(tid, pid, profile_key);
    }

    /// Task fork (`spec.md` §3 Lifecycles): the child inherits the
    /// parent's window and shares its profile.
    pub fn task_fork(&self, parent_tid: u32, child_tid: u32, child_pid: u32) {
        if !self.tasks.fork(parent_tid, child_tid, child_pid) {
            return;
        }
        // `fork` already inserted the child; this lookup can't synthesize.
        let (child, _) = self
            .tasks
            .get_or_synthesize(child_tid, child_pid, ProfileKey::new(0));
        let profile_key = child.profile_key;
        drop(child);
        if let Some(mut profile) = self.registry.get_mut(profile_key) {
            profile.inc_live_tasks();
        }
    }

    /// Task exit (`spec.md` §3 Lifecycles): destroy its Task State and
    /// release its hold on the profile's live-task count.
    pub fn task_exit(&self, tid: u32) {
        if let Some(task) = self.tasks.remove(tid) {
            if let Some(mut profile) = self.registry.get_mut(task.profile_key) {
                profile.dec_live_tasks();
            }
        }
    }

    /// Process one intercepted call for `tid` (`spec.md` §4.E). Returns
    /// the enforcement decision the Event Source should act on, or an
    /// `EngineError` for the drop cases in `spec.md` §7.
    ///
    /// `exe_path` is only consulted if `profile_key` hasn't been observed
    /// before; pass `None` when the caller has no fresh identity to offer
    /// (e.g. a call for an already-known profile) — `spec.md` §7
    /// `UnknownProfile`.
    pub fn process_call(
        &self,
        tid: u32,
        pid: u32,
        profile_key: ProfileKey,
        call: CallNumber,
        exe_path: Option<&str>,
    ) -> Result<Decision, EngineError> {
        let settings = self.settings.snapshot();
        if !settings.monitoring {
            return Err(EngineError::NotMonitoring);
        }

        if !self.registry.contains(profile_key) {
            match exe_path {
                Some(path) => {
                    self.task_start(tid, pid, profile_key, path);
                }
                None => return Err(EngineError::UnknownProfile(profile_key)),
            }
        }

        let (mut task, synthesized) = self.tasks.get_or_synthesize(tid, pid, profile_key);
        if synthesized {
            // `spec.md` §7 `UnknownTask`: no Task State existed for this
            // `tid` yet. We still synthesize one with an all-`EMPTY`
            // window and proceed rather than dropping the call, but the
            // condition is worth surfacing to the tick-tier log.
            log::debug!("{}", EngineError::UnknownTask(tid));
        }
        let mut profile = self
            .registry
            .get_mut(profile_key)
            .ok_or(EngineError::UnknownProfile(profile_key))?;

        let priors = *task.window.priors();
        let mut decision = Decision::Permit;

        match profile.status {
            ProfileStatus::Training => {
                let outcome = profile.train_on_call(call, &priors);
                if outcome.new_sequence && settings.log_sequences {
                    let mut sequence = [EMPTY_CALL; ebph_common::WINDOW_SIZE];
                    sequence[0] = call;
                    sequence[1..].copy_from_slice(&priors);
                    self.bus.publish(EventRecord::NewSequence {
                        key: profile_key,
                        pid,
                        sequence,
                        profile_count: profile.live_tasks,
                        task_count: task.count(),
                    });
                }
                task.record_call_outcome(false);
            }
            ProfileStatus::Normal => {
                let outcome = profile.test_call(call, &priors);
                let anomalous = outcome.misses > 0;
                if anomalous {
                    decision = if settings.enforcing {
                        Decision::Deny
                    } else {
                        Decision::Permit
                    };
                    self.bus.publish(EventRecord::Anomaly {
                        key: profile_key,
                        pid,
                        syscall: call,
                        misses: outcome.misses,
                        task_count: task.count(),
                    });
                }
                task.record_call_outcome(anomalous);
            }
        }

        let lfc = task.lfc();

        if profile.should_promote(&settings) {
            let train_count = profile.train_count;
            let last_mod_count = profile.last_mod_count;
            let sequences = profile.sequences;
            profile.promote_to_normal();
            self.bus.publish(EventRecord::StartNormal {
                key: profile_key,
                pid: Some(pid),
                in_task: true,
                task_count: task.count(),
                train_count,
                last_mod_count,
                profile_count: profile.live_tasks,
                sequences,
            });
        }

        if profile.status == ProfileStatus::Normal {
            if lfc as u64 >= settings.tolerize_limit {
                profile.tolerize();
                task.clear_locality_frame();
                self.bus.publish(EventRecord::TolerizeLimit {
                    key: profile_key,
                    pid,
                    lfc,
                });
            } else if profile.anomalies >= settings.anomaly_limit {
                let anomalies = profile.anomalies;
                profile.tolerize();
                self.bus.publish(EventRecord::StopNormal {
                    key: profile_key,
                    pid: Some(pid),
                    in_task: true,
                    task_count: task.count(),
                    anomalies,
                    anomaly_limit: settings.anomaly_limit,
                });
            }
        }

        task.window.shift(call);

        Ok(decision)
    }

    /// Explicit `sensitize` admin command (`spec.md` §4.D, §6): clears
    /// both LPTs and all counters.
    pub fn sensitize(&self, key: ProfileKey) -> Result<(), EngineError> {
        let mut profile = self
            .registry
            .get_mut(key)
            .ok_or(EngineError::UnknownProfile(key))?;
        profile.sensitize();
        Ok(())
    }

    /// Explicit `tolerize` admin command: clears `train_lpt` and counters
    /// but retains `test_lpt`.
    pub fn tolerize(&self, key: ProfileKey) -> Result<(), EngineError> {
        let mut profile = self
            .registry
            .get_mut(key)
            .ok_or(EngineError::UnknownProfile(key))?;
        profile.tolerize();
        Ok(())
    }

    /// Explicit `normalize` admin command: forces the snapshot-and-enforce
    /// transition regardless of maturity/steadiness.
    pub fn normalize(&self, key: ProfileKey) -> Result<(), EngineError> {
        let mut profile = self
            .registry
            .get_mut(key)
            .ok_or(EngineError::UnknownProfile(key))?;
        let train_count = profile.train_count;
        let last_mod_count = profile.last_mod_count;
        let sequences = profile.sequences;
        let live_tasks = profile.live_tasks;
        profile.promote_to_normal();
        drop(profile);
        self.bus.publish(EventRecord::StartNormal {
            key,
            pid: None,
            in_task: false,
            task_count: 0,
            train_count,
            last_mod_count,
            profile_count: live_tasks,
            sequences,
        });
        Ok(())
    }

    /// `set SETTING value` admin command (`spec.md` §6, §7
    /// `TunableOutOfRange`).
    pub fn set_tunable(&self, name: &str, value: i64) -> Result<(), EngineError> {
        self.settings.set_tunable(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;

    fn engine(call_space: usize) -> (Engine, EventBus) {
        let bus = EventBus::new(256);
        let engine = Engine::new(call_space, bus.handle());
        (engine, bus)
    }

    /// A training sequence that actually reaches promotion, for scenarios
    /// 2-6 below (`spec.md` §8). A period-3 repeating pattern `[0,1,2,0,1,2,…]`:
    /// with `LOOKAHEAD_DEPTH` = 8, the last never-seen-before lookahead pair
    /// this pattern can produce is recorded by the 11th call, after which
    /// `last_mod_count` climbs every call while `train_count` does too. The
    /// steadiness ratio `last_mod_count / train_count` only crosses the
    /// scenario's canonical `NORMAL_FACTOR`/`NORMAL_FACTOR_DEN` = 3/4 at the
    /// 44th call (`last_mod_count=33, train_count=44`); feeding all-`EMPTY`
    /// priors, as the isolated `Profile` unit tests do, makes every call
    /// look "no new pair" from the first call onward and reaches the same
    /// ratio almost immediately — that shortcut doesn't reflect any real
    /// call sequence, so the engine-level scenarios below use this instead.
    /// `len` must be exactly 44 for the scenarios that need the profile to
    /// promote on the loop's last call with no leftover NORMAL-mode calls
    /// inside the loop itself.
    fn period3_training_sequence(len: usize) -> Vec<u16> {
        (0..len).map(|i| (i % 3) as u16).collect()
    }

    // Scenario 1 (`spec.md` §8): fresh profile, first W-1 calls produce no
    // anomaly.
    #[test]
    fn fresh_profile_first_calls_produce_no_anomaly() {
        let (engine, mut bus) = engine(8);
        let key = ProfileKey::new(1);
        for call in [0u16, 1, 2, 0, 1, 2, 0, 1] {
            let decision = engine
                .process_call(1, 1, key, call, Some("/bin/t1"))
                .unwrap();
            assert_eq!(decision, Decision::Permit);
        }
        let events = bus.poll_batch(32);
        let new_profiles = events
            .iter()
            .filter(|e| matches!(e, EventRecord::NewProfile { .. }))
            .count();
        let anomalies = events
            .iter()
            .filter(|e| matches!(e, EventRecord::Anomaly { .. }))
            .count();
        assert_eq!(new_profiles, 1);
        assert_eq!(anomalies, 0);

        let profile = engine.registry().get_mut(key).unwrap();
        assert_eq!(profile.train_count, 8);
        assert!(profile.sequences >= 1);
    }

    // Scenario 2: promotion to NORMAL once mature and steady.
    #[test]
    fn promotes_to_normal_once_mature_and_steady() {
        let (engine, mut bus) = engine(8);
        let key = ProfileKey::new(2);
        engine.set_tunable("NORMAL_WAIT", 4).unwrap();
        engine.set_tunable("NORMAL_FACTOR", 3).unwrap();
        engine.set_tunable("NORMAL_FACTOR_DEN", 4).unwrap();

        for call in period3_training_sequence(44) {
            engine
                .process_call(1, 1, key, call, Some("/bin/t2"))
                .unwrap();
        }

        let events = bus.poll_batch(64);
        let start_normals = events
            .iter()
            .filter(|e| matches!(e, EventRecord::StartNormal { .. }))
            .count();
        assert_eq!(start_normals, 1);
        assert_eq!(
            engine.registry().get_mut(key).unwrap().status,
            ProfileStatus::Normal
        );
    }

    // Scenario 3: anomaly detection after promotion.
    #[test]
    fn detects_anomaly_after_promotion() {
        let (engine, mut bus) = engine(8);
        let key = ProfileKey::new(3);
        engine.set_tunable("NORMAL_WAIT", 4).unwrap();
        engine.set_tunable("NORMAL_FACTOR", 3).unwrap();
        engine.set_tunable("NORMAL_FACTOR_DEN", 4).unwrap();

        for call in period3_training_sequence(44) {
            engine
                .process_call(1, 1, key, call, Some("/bin/t3"))
                .unwrap();
        }
        bus.poll_batch(64);

        let decision = engine.process_call(1, 1, key, 5, None).unwrap();
        assert_eq!(decision, Decision::Permit); // ENFORCING defaults to false

        let events = bus.poll_batch(16);
        let anomaly = events
            .iter()
            .find_map(|e| match e {
                EventRecord::Anomaly { misses, .. } => Some(*misses),
                _ => None,
            })
            .expect("expected an anomaly event");
        assert!(anomaly >= 1);

        let profile = engine.registry().get_mut(key).unwrap();
        assert_eq!(profile.anomalies, 1);
        assert_eq!(profile.normal_count, 1);
    }

    // Scenario 4: tolerize by LFC.
    #[test]
    fn tolerize_limit_demotes_and_keeps_test_lpt() {
        let (engine, mut bus) = engine(16);
        let key = ProfileKey::new(4);
        engine.set_tunable("NORMAL_WAIT", 4).unwrap();
        engine.set_tunable("NORMAL_FACTOR", 3).unwrap();
        engine.set_tunable("NORMAL_FACTOR_DEN", 4).unwrap();
        engine.set_tunable("TOLERIZE_LIMIT", 4).unwrap();

        for call in period3_training_sequence(44) {
            engine
                .process_call(1, 1, key, call, Some("/bin/t4"))
                .unwrap();
        }
        bus.poll_batch(64);

        for novel in [10u16, 11, 12, 13] {
            engine.process_call(1, 1, key, novel, None).unwrap();
        }

        let events = bus.poll_batch(64);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, EventRecord::TolerizeLimit { .. }))
        );
        let profile = engine.registry().get_mut(key).unwrap();
        assert_eq!(profile.status, ProfileStatus::Training);
        assert!(!profile.test_lpt.is_all_zero());
        assert_eq!(profile.train_count, 0);
    }

    // Scenario 5: anomaly-limit demotion, LFC kept below the tolerize
    // threshold by spacing anomalies with clean calls.
    #[test]
    fn anomaly_limit_demotes_with_stop_normal_event() {
        let (engine, mut bus) = engine(32);
        let key = ProfileKey::new(5);
        engine.set_tunable("NORMAL_WAIT", 4).unwrap();
        engine.set_tunable("NORMAL_FACTOR", 3).unwrap();
        engine.set_tunable("NORMAL_FACTOR_DEN", 4).unwrap();
        engine.set_tunable("ANOMALY_LIMIT", 3).unwrap();
        engine.set_tunable("TOLERIZE_LIMIT", 100).unwrap();

        for call in period3_training_sequence(44) {
            engine
                .process_call(1, 1, key, call, Some("/bin/t5"))
                .unwrap();
        }
        bus.poll_batch(64);

        for novel in [20u16, 21, 22] {
            engine.process_call(1, 1, key, novel, None).unwrap();
            // Flush the locality frame with clean repeats so LFC never
            // reaches TOLERIZE_LIMIT before the anomaly limit does.
            for _ in 0..8 {
                engine.process_call(1, 1, key, 0, None).unwrap();
            }
        }

        let events = bus.poll_batch(256);
        let stop_normal = events.iter().find_map(|e| match e {
            EventRecord::StopNormal {
                anomalies,
                anomaly_limit,
                ..
            } => Some((*anomalies, *anomaly_limit)),
            _ => None,
        });
        assert_eq!(stop_normal, Some((3, 3)));
    }

    // Scenario 6: persistence round trip reproduces the same anomaly.
    #[test]
    fn persisted_and_reloaded_profile_reproduces_the_same_anomaly() {
        use tempfile::tempdir;

        let (engine, mut bus) = engine(8);
        let key = ProfileKey::new(6);
        engine.set_tunable("NORMAL_WAIT", 4).unwrap();
        engine.set_tunable("NORMAL_FACTOR", 3).unwrap();
        engine.set_tunable("NORMAL_FACTOR_DEN", 4).unwrap();

        for call in period3_training_sequence(44) {
            engine
                .process_call(1, 1, key, call, Some("/bin/t6"))
                .unwrap();
        }
        bus.poll_batch(64);

        // First anomaly, from the freshly promoted profile.
        let first_decision = engine.process_call(1, 1, key, 5, None).unwrap();
        assert_eq!(first_decision, Decision::Permit);
        let first_misses = bus
            .poll_batch(8)
            .into_iter()
            .find_map(|e| match e {
                EventRecord::Anomaly { misses, .. } => Some(misses),
                _ => None,
            })
            .expect("expected an anomaly on the first call to `5`");

        let dir = tempdir().unwrap();
        let path = dir.path().join("p6.bin");
        {
            let profile = engine.registry().get_mut(key).unwrap();
            crate::persistence::save_profile(&profile, &path).unwrap();
        }
        let reloaded = crate::persistence::load_profile(&path, 8).unwrap();

        let (engine2, mut bus2) = engine(8);
        {
            let (mut profile, _) = engine2.registry().get_or_create(key, "/bin/t6", 8);
            *profile = reloaded;
        }
        // Rebuild the same task window the original task had when it first
        // saw call `5` (persistence covers the profile only, not the
        // in-flight task window — `spec.md` §6) by replaying the same
        // prefix, then present the identical call against the reloaded
        // `test_lpt` snapshot: the miss count must match exactly.
        for call in period3_training_sequence(44) {
            engine2.process_call(1, 1, key, call, None).unwrap();
        }
        bus2.poll_batch(64);
        let second_decision = engine2.process_call(1, 1, key, 5, None).unwrap();
        assert_eq!(second_decision, Decision::Permit);
        let second_misses = bus2.poll_batch(8).into_iter().find_map(|e| match e {
            EventRecord::Anomaly { misses, .. } => Some(misses),
            _ => None,
        });
        assert_eq!(second_misses, Some(first_misses));
    }

    #[test]
    fn unknown_profile_without_exe_path_is_rejected() {
        let (engine, _bus) = engine(8);
        let err = engine
            .process_call(1, 1, ProfileKey::new(404), 0, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownProfile(_)));
    }

    #[test]
    fn an_unregistered_tid_for_a_known_profile_is_synthesized_not_rejected() {
        let (engine, _bus) = engine(8);
        let key = ProfileKey::new(9);
        // Task 1 establishes the profile; task 2's tid has never gone
        // through `task_start`, only `process_call` — the synthesis path
        // `spec.md` §7 `UnknownTask` describes.
        engine.task_start(1, 1, key, "/bin/t9");
        let decision = engine.process_call(2, 2, key, 0, None).unwrap();
        assert_eq!(decision, Decision::Permit);
        assert!(engine.tasks().len() >= 2);
    }

    #[test]
    fn monitoring_disabled_drops_the_call() {
        let (engine, _bus) = engine(8);
        engine.settings().set_monitoring(false);
        let err = engine
            .process_call(1, 1, ProfileKey::new(1), 0, Some("/bin/true"))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotMonitoring));
    }

    #[test]
    fn enforcing_denies_on_anomaly() {
        let (engine, mut bus) = engine(8);
        let key = ProfileKey::new(7);
        engine.set_tunable("NORMAL_WAIT", 4).unwrap();
        engine.set_tunable("NORMAL_FACTOR", 3).unwrap();
        engine.set_tunable("NORMAL_FACTOR_DEN", 4).unwrap();
        for call in [0u16, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2, 0, 1, 2, 0] {
            engine
                .process_call(1, 1, key, call, Some("/bin/t7"))
                .unwrap();
        }
        bus.poll_batch(64);

        engine.settings().set_enforcing(true);
        let decision = engine.process_call(1, 1, key, 5, None).unwrap();
        assert_eq!(decision, Decision::Deny);
    }

    #[test]
    fn task_exit_releases_the_profiles_live_task_count() {
        let (engine, _bus) = engine(8);
        let key = ProfileKey::new(8);
        engine.task_start(1, 1, key, "/bin/t8");
        assert_eq!(engine.registry().get_mut(key).unwrap().live_tasks, 1);
        engine.task_exit(1);
        assert_eq!(engine.registry().get_mut(key).unwrap().live_tasks, 0);
    }
}
