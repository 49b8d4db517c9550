//! Event Bus (`spec.md` §4.F): the engine's one-way notification channel
//! to the host process. Bounded and lossy by design, the same way
//! `cognitod::runtime::sequencer::SequencerConsumer` drains a bounded ring
//! rather than blocking producers on a slow consumer — a wedged or absent
//! listener must never stall anomaly detection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ebph_common::{CallNumber, ProfileKey, WINDOW_SIZE};
use tokio::sync::mpsc;

/// One notification emitted by the engine. Field lists follow `spec.md`
/// §4.F; these are observability records, never control input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRecord {
    NewProfile {
        key: ProfileKey,
        pathname: String,
    },
    Anomaly {
        key: ProfileKey,
        pid: u32,
        syscall: CallNumber,
        misses: u32,
        task_count: u64,
    },
    /// Training only, and only when `LOG_SEQUENCES` is set (`spec.md` §6).
    NewSequence {
        key: ProfileKey,
        pid: u32,
        sequence: [CallNumber; WINDOW_SIZE],
        profile_count: u64,
        task_count: u64,
    },
    StartNormal {
        key: ProfileKey,
        pid: Option<u32>,
        in_task: bool,
        task_count: u64,
        train_count: u64,
        last_mod_count: u64,
        profile_count: u64,
        sequences: u64,
    },
    StopNormal {
        key: ProfileKey,
        pid: Option<u32>,
        in_task: bool,
        task_count: u64,
        anomalies: u64,
        anomaly_limit: u64,
    },
    /// Rate-limited to ~10/s per core at the presentation layer
    /// (`spec.md` §4.F); the core itself emits one per qualifying call and
    /// does not rate-limit — see `spec.md` §9.
    TolerizeLimit {
        key: ProfileKey,
        pid: u32,
        lfc: u32,
    },
}

/// A bounded MPSC channel plus a running count of events dropped because
/// the channel was full. Producers use `try_send` and never await — a full
/// channel means the consumer is behind, and the engine's hot path cannot
/// wait for it.
pub struct EventBus {
    sender: mpsc::Sender<EventRecord>,
    receiver: mpsc::Receiver<EventRecord>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn handle(&self) -> EventBusHandle {
        EventBusHandle {
            sender: self.sender.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Drain up to `max` pending events without blocking, mirroring
    /// `SequencerConsumer::poll_batch`.
    pub fn poll_batch(&mut self, max: usize) -> Vec<EventRecord> {
        let mut batch = Vec::with_capacity(max.min(64));
        while batch.len() < max {
            match self.receiver.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
        batch
    }

    pub async fn recv(&mut self) -> Option<EventRecord> {
        self.receiver.recv().await
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A cloneable producer handle for the engine's hot path.
#[derive(Clone)]
pub struct EventBusHandle {
    sender: mpsc::Sender<EventRecord>,
    dropped: Arc<AtomicU64>,
}

impl EventBusHandle {
    /// Publish an event, counting (not blocking) if the bus is saturated.
    pub fn publish(&self, event: EventRecord) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_batch_drains_up_to_max_without_blocking() {
        let mut bus = EventBus::new(8);
        let handle = bus.handle();
        for i in 0..5 {
            handle.publish(EventRecord::NewSequence {
                key: ProfileKey::new(1),
                pid: 1,
                sequence: [0; WINDOW_SIZE],
                profile_count: i,
                task_count: 1,
            });
        }
        let batch = bus.poll_batch(3);
        assert_eq!(batch.len(), 3);
        let rest = bus.poll_batch(10);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn full_channel_counts_a_drop_instead_of_blocking() {
        let mut bus = EventBus::new(1);
        let handle = bus.handle();
        handle.publish(EventRecord::NewProfile {
            key: ProfileKey::new(1),
            pathname: "/bin/true".into(),
        });
        handle.publish(EventRecord::NewProfile {
            key: ProfileKey::new(1),
            pathname: "/bin/true".into(),
        });
        assert_eq!(bus.dropped_count(), 1);
        let batch = bus.poll_batch(10);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn handle_survives_the_bus_moving() {
        // A handle must stay valid even if the `EventBus` it came from is
        // later moved (e.g. returned out of a constructor) — regression
        // guard for an earlier version that kept a raw pointer into the
        // bus's counter instead of a shared `Arc`.
        let bus = EventBus::new(4);
        let handle = bus.handle();
        let mut bus = bus;
        handle.publish(EventRecord::NewProfile {
            key: ProfileKey::new(1),
            pathname: "/bin/true".into(),
        });
        assert_eq!(bus.poll_batch(1).len(), 1);
    }
}
