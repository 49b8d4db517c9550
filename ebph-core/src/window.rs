//! Sequence Window (`spec.md` §4.B): the per-task ring of the last `W` call
//! numbers used to derive `(current, prior)` pairs.
//!
//! Resolves an internal inconsistency in `spec.md` §4.E between the prose
//! ("oldest drops" on shift) and the indexing formula given there
//! (`T.window[d+1]`, which would read the about-to-be-dropped slot on the
//! last iteration rather than leave it untouched). We index prior calls as
//! `window[d]` for `d in [0, LOOKAHEAD_DEPTH)` *before* the shift — this is
//! the only indexing under which "the call `d+1` steps before `c`" and "the
//! slot that drops on shift is never read as a prior" are both true at
//! once. See `DESIGN.md` for the full note.

use ebph_common::{CallNumber, EMPTY_CALL, LOOKAHEAD_DEPTH, WINDOW_SIZE};

#[derive(Clone)]
pub struct SequenceWindow {
    /// Ring of recent call numbers, newest at index 0.
    slots: [CallNumber; WINDOW_SIZE],
    /// Calls this task has contributed to its profile, saturating.
    count: u64,
}

impl Default for SequenceWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceWindow {
    pub fn new() -> Self {
        Self {
            slots: [EMPTY_CALL; WINDOW_SIZE],
            count: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The prior calls relevant to the call about to be processed, nearest
    /// first: `priors()[d]` occurred `d + 1` steps before the incoming call.
    /// Valid before `shift` is invoked for that call.
    pub fn priors(&self) -> &[CallNumber; LOOKAHEAD_DEPTH] {
        // SAFETY-free: LOOKAHEAD_DEPTH == WINDOW_SIZE - 1 by construction in
        // ebph-common, so this slice-to-array conversion always succeeds.
        self.slots[..LOOKAHEAD_DEPTH].try_into().unwrap()
    }

    /// Shift the window right by one: the oldest slot (index `WINDOW_SIZE -
    /// 1`) drops, `call` becomes the new `window[0]`. Increments `count`,
    /// saturating at `u64::MAX`.
    pub fn shift(&mut self, call: CallNumber) {
        for i in (1..WINDOW_SIZE).rev() {
            self.slots[i] = self.slots[i - 1];
        }
        self.slots[0] = call;
        self.count = self.count.saturating_add(1);
    }

    pub fn most_recent(&self) -> CallNumber {
        self.slots[0]
    }

    /// A fresh window inherited by a forked child: same recent-call history
    /// as the parent, but the per-task contribution counter restarts at
    /// zero since it tracks *this* task's own calls.
    pub fn inherit_from(parent: &SequenceWindow) -> Self {
        Self {
            slots: parent.slots,
            count: 0,
        }
    }
}
