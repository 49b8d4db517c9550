//! Event Source contract (`spec.md` §6, SPEC_FULL §4.I).
//!
//! The production in-kernel attach/probe machinery that intercepts calls
//! is explicitly out of scope (`spec.md` §1); this module only defines the
//! shape a real producer would satisfy, plus one concrete, in-process
//! implementation — [`ReplayEventSource`] — used by the demo binary and by
//! integration tests that want to drive the engine with a fixed call
//! sequence instead of a kernel probe.

use ebph_common::{CallNumber, ProfileKey};

/// One record delivered by the Event Source: either a task lifecycle
/// transition or an intercepted call, per `spec.md` §6's contract
/// (`{profile_key, tid, pid, call_number, exe_path_if_new}` plus task
/// create/exit events).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Start {
        tid: u32,
        pid: u32,
        profile_key: ProfileKey,
        exe_path: String,
    },
    Fork {
        parent_tid: u32,
        child_tid: u32,
        child_pid: u32,
    },
    Exit {
        tid: u32,
    },
    Call {
        tid: u32,
        pid: u32,
        profile_key: ProfileKey,
        call: CallNumber,
    },
}

/// A producer of [`TaskEvent`]s. `poll` is called from the per-call tier
/// (`spec.md` §5) and must not block — a real implementation would drain a
/// ring buffer shared with the kernel; [`ReplayEventSource`] just walks a
/// fixed sequence.
pub trait EventSource: Send {
    fn poll(&mut self) -> Vec<TaskEvent>;
}

/// Drives one task through a fixed call sequence, then exits it. Used by
/// the `ebphd` demo binary and by integration tests standing in for the
/// real kernel producer (`spec.md` §1's "only their contracts appear
/// here").
pub struct ReplayEventSource {
    tid: u32,
    pid: u32,
    profile_key: ProfileKey,
    exe_path: String,
    calls: std::vec::IntoIter<CallNumber>,
    started: bool,
    exited: bool,
}

impl ReplayEventSource {
    pub fn new(
        tid: u32,
        pid: u32,
        profile_key: ProfileKey,
        exe_path: impl Into<String>,
        calls: Vec<CallNumber>,
    ) -> Self {
        Self {
            tid,
            pid,
            profile_key,
            exe_path: exe_path.into(),
            calls: calls.into_iter(),
            started: false,
            exited: false,
        }
    }
}

impl EventSource for ReplayEventSource {
    fn poll(&mut self) -> Vec<TaskEvent> {
        if self.exited {
            return Vec::new();
        }

        let mut events = Vec::with_capacity(2);
        if !self.started {
            self.started = true;
            events.push(TaskEvent::Start {
                tid: self.tid,
                pid: self.pid,
                profile_key: self.profile_key,
                exe_path: self.exe_path.clone(),
            });
        }

        match self.calls.next() {
            Some(call) => events.push(TaskEvent::Call {
                tid: self.tid,
                pid: self.pid,
                profile_key: self.profile_key,
                call,
            }),
            None => {
                self.exited = true;
                events.push(TaskEvent::Exit { tid: self.tid });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_emits_start_then_the_first_call() {
        let mut source =
            ReplayEventSource::new(1, 1, ProfileKey::new(1), "/bin/t1", vec![0, 1, 2]);
        let events = source.poll();
        assert_eq!(
            events,
            vec![
                TaskEvent::Start {
                    tid: 1,
                    pid: 1,
                    profile_key: ProfileKey::new(1),
                    exe_path: "/bin/t1".to_string(),
                },
                TaskEvent::Call {
                    tid: 1,
                    pid: 1,
                    profile_key: ProfileKey::new(1),
                    call: 0,
                },
            ]
        );
    }

    #[test]
    fn exhausted_sequence_emits_exit_once_then_nothing() {
        let mut source = ReplayEventSource::new(1, 1, ProfileKey::new(1), "/bin/t1", vec![0]);
        source.poll(); // start + call 0
        let exit_poll = source.poll();
        assert_eq!(exit_poll, vec![TaskEvent::Exit { tid: 1 }]);
        assert!(source.poll().is_empty());
    }
}
