//! Profile (`spec.md` §3, §4.C, §4.D): the detection model for one
//! executable — its two lookahead-pair tables, training/test counters, and
//! the TRAINING/NORMAL state machine. `FROZEN` is folded into `NORMAL`
//! here (see `ebph_common::ProfileStatus`); the snapshot-and-enforce step
//! that `spec.md` calls "entry to FROZEN" happens at the same instant we
//! flip `status` to `Normal`, so no enforcement ever precedes it.

use ebph_common::{CallNumber, ProfileKey, ProfileStatus, LOOKAHEAD_DEPTH};

use crate::lpt::LookaheadPairTable;
use crate::settings::SettingsSnapshot;

pub struct Profile {
    pub key: ProfileKey,
    pub exe_path: String,
    pub status: ProfileStatus,
    pub train_count: u64,
    pub last_mod_count: u64,
    pub normal_count: u64,
    pub anomalies: u64,
    pub sequences: u64,
    pub train_lpt: LookaheadPairTable,
    pub test_lpt: LookaheadPairTable,
    /// Number of tasks currently bound to this profile. Not part of
    /// `spec.md`'s Profile attribute list, but tracked so the `profile_count`
    /// field on `start_normal`/`stop_normal` events (`spec.md` §4.F) can be
    /// filled in without scanning the task table on every call.
    pub live_tasks: u64,
}

/// Outcome of feeding one call's lookahead pairs to a profile in TRAINING.
pub struct TrainOutcome {
    pub new_sequence: bool,
}

/// Outcome of testing one call's lookahead pairs against a frozen snapshot.
pub struct TestOutcome {
    pub misses: u32,
}

impl Profile {
    pub fn new(key: ProfileKey, exe_path: impl Into<String>, call_space: usize) -> Self {
        Self {
            key,
            exe_path: exe_path.into(),
            status: ProfileStatus::Training,
            train_count: 0,
            last_mod_count: 0,
            normal_count: 0,
            anomalies: 0,
            sequences: 0,
            train_lpt: LookaheadPairTable::new(call_space),
            test_lpt: LookaheadPairTable::new(call_space),
            live_tasks: 0,
        }
    }

    pub fn inc_live_tasks(&mut self) {
        self.live_tasks = self.live_tasks.saturating_add(1);
    }

    pub fn dec_live_tasks(&mut self) {
        self.live_tasks = self.live_tasks.saturating_sub(1);
    }

    /// `spec.md` §4.C maturity predicate: enough training calls observed.
    pub fn is_mature(&self, settings: &SettingsSnapshot) -> bool {
        self.train_count >= settings.normal_wait
    }

    /// `spec.md` §4.C steadiness predicate: novelty has settled down.
    pub fn is_steady(&self, settings: &SettingsSnapshot) -> bool {
        self.last_mod_count.saturating_mul(settings.normal_factor_den)
            >= self.train_count.saturating_mul(settings.normal_factor)
    }

    pub fn should_promote(&self, settings: &SettingsSnapshot) -> bool {
        self.status == ProfileStatus::Training && self.is_mature(settings) && self.is_steady(settings)
    }

    /// Record one call's lookahead pairs during TRAINING (`spec.md` §4.E
    /// step 2, TRAINING branch). `priors[d]` is the call `d + 1` steps
    /// before `curr`; `ebph_common::EMPTY_CALL` entries are skipped.
    pub fn train_on_call(
        &mut self,
        curr: CallNumber,
        priors: &[CallNumber; LOOKAHEAD_DEPTH],
    ) -> TrainOutcome {
        let mut any_new = false;
        for (d, &prev) in priors.iter().enumerate() {
            if prev == ebph_common::EMPTY_CALL {
                continue;
            }
            if self.train_lpt.record(curr, prev, d) {
                any_new = true;
            }
        }
        if any_new {
            self.sequences += 1;
            self.last_mod_count = 0;
        } else {
            self.last_mod_count = self.last_mod_count.saturating_add(1);
        }
        self.train_count = self.train_count.saturating_add(1);
        TrainOutcome {
            new_sequence: any_new,
        }
    }

    /// Test one call's lookahead pairs against the frozen snapshot
    /// (`spec.md` §4.E step 2, FROZEN/NORMAL branch).
    pub fn test_call(
        &mut self,
        curr: CallNumber,
        priors: &[CallNumber; LOOKAHEAD_DEPTH],
    ) -> TestOutcome {
        let mut misses = 0u32;
        for (d, &prev) in priors.iter().enumerate() {
            if prev == ebph_common::EMPTY_CALL {
                continue;
            }
            if !self.test_lpt.test(curr, prev, d) {
                misses += 1;
            }
        }
        if misses > 0 {
            self.anomalies += 1;
        }
        self.normal_count = self.normal_count.saturating_add(1);
        TestOutcome { misses }
    }

    /// TRAINING → NORMAL: snapshot `train_lpt` into `test_lpt` and start
    /// enforcing. Used both for the maturity/steadiness-gated promotion and
    /// for an explicit `normalize` admin command (`spec.md` §4.D).
    pub fn promote_to_normal(&mut self) {
        self.train_lpt.copy_into(&mut self.test_lpt);
        self.status = ProfileStatus::Normal;
    }

    /// Any → TRAINING via explicit sensitize: clears both LPTs and every
    /// counter (`spec.md` §4.D, §9 — the spec resolves its own
    /// ambiguity here by choosing to also clear `test_lpt`).
    pub fn sensitize(&mut self) {
        self.train_lpt.clear_all();
        self.test_lpt.clear_all();
        self.reset_training_counters();
        self.status = ProfileStatus::Training;
    }

    /// NORMAL → TRAINING via explicit tolerize or tolerize-limit
    /// exceedance: clears `train_lpt` and counters but retains `test_lpt`,
    /// so enforcement-level knowledge survives a quiet retraining period.
    pub fn tolerize(&mut self) {
        self.train_lpt.clear_all();
        self.reset_training_counters();
        self.status = ProfileStatus::Training;
    }

    fn reset_training_counters(&mut self) {
        self.train_count = 0;
        self.last_mod_count = 0;
        self.anomalies = 0;
        self.normal_count = 0;
        self.sequences = 0;
    }

    pub fn call_space(&self) -> usize {
        self.train_lpt.call_space()
    }
}
