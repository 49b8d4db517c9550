//! Per-task state (`spec.md` §3 Task State, §4.B, §4.E step 3): the window
//! feeding the anomaly engine plus the locality-frame ring used to compute
//! LFC.

use ebph_common::LOCALITY_FRAME_SIZE;

use crate::window::SequenceWindow;

/// A ring of the last `L` anomaly flags for one task, giving O(1) LFC
/// maintenance instead of a full popcount on every call: we track the
/// running count and adjust it by the bit leaving and the bit entering.
#[derive(Clone)]
struct LocalityFrame {
    bits: [bool; LOCALITY_FRAME_SIZE],
    cursor: usize,
    anomalous_count: u32,
}

impl LocalityFrame {
    fn new() -> Self {
        Self {
            bits: [false; LOCALITY_FRAME_SIZE],
            cursor: 0,
            anomalous_count: 0,
        }
    }

    /// Push `anomalous` as the newest flag, evicting the oldest. Returns
    /// the popcount of the ring after the push.
    fn push(&mut self, anomalous: bool) -> u32 {
        let leaving = self.bits[self.cursor];
        if leaving {
            self.anomalous_count -= 1;
        }
        self.bits[self.cursor] = anomalous;
        if anomalous {
            self.anomalous_count += 1;
        }
        self.cursor = (self.cursor + 1) % LOCALITY_FRAME_SIZE;
        self.anomalous_count
    }

    fn count(&self) -> u32 {
        self.anomalous_count
    }

    fn clear(&mut self) {
        self.bits = [false; LOCALITY_FRAME_SIZE];
        self.cursor = 0;
        self.anomalous_count = 0;
    }
}

pub struct TaskState {
    pub tid: u32,
    pub pid: u32,
    pub profile_key: ebph_common::ProfileKey,
    pub window: SequenceWindow,
    locality_frame: LocalityFrame,
}

impl TaskState {
    pub fn new(tid: u32, pid: u32, profile_key: ebph_common::ProfileKey) -> Self {
        Self {
            tid,
            pid,
            profile_key,
            window: SequenceWindow::new(),
            locality_frame: LocalityFrame::new(),
        }
    }

    /// Task state created for a fork: inherits the parent's window so
    /// in-flight sequences aren't lost across the fork boundary, per
    /// `spec.md` §3 Lifecycles. The locality frame starts clean — LFC is a
    /// property of *this* task's recent history.
    pub fn fork_from(parent: &TaskState, child_tid: u32, child_pid: u32) -> Self {
        Self {
            tid: child_tid,
            pid: child_pid,
            profile_key: parent.profile_key,
            window: SequenceWindow::inherit_from(&parent.window),
            locality_frame: LocalityFrame::new(),
        }
    }

    pub fn count(&self) -> u64 {
        self.window.count()
    }

    /// Push this call's anomaly flag and return the resulting LFC, which by
    /// construction equals the number of anomalous calls among this task's
    /// last `LOCALITY_FRAME_SIZE` calls (`spec.md` §8 universal property).
    pub fn record_call_outcome(&mut self, anomalous: bool) -> u32 {
        self.locality_frame.push(anomalous)
    }

    pub fn lfc(&self) -> u32 {
        self.locality_frame.count()
    }

    /// Reset the locality frame. Used when a tolerize-limit demotion fires,
    /// so the freshly-retrained profile doesn't immediately re-trigger on
    /// stale anomaly flags still aging out of the ring.
    pub fn clear_locality_frame(&mut self) {
        self.locality_frame.clear();
    }
}
