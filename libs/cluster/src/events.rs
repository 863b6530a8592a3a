//! Event Log
//!
//! Bounded in-memory log of recorded cluster events. The discovery
//! worker and the deployment store both record through the [`EventSink`]
//! trait; queries filter by kind or by the topology version a discovery
//! event was stamped with.

use parking_lot::Mutex;
use std::collections::VecDeque;
use types::{Event, EventKind};

pub use types::EventSink;

pub const DFLT_EVENT_LOG_CAPACITY: usize = 10_000;

/// No-op sink for embedders that do not keep an event log.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn record(&self, _event: Event) {}
}

/// Bounded event log, eldest-evicted.
#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<VecDeque<Event>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Events matching a predicate, oldest first.
    pub fn query(&self, pred: impl Fn(&Event) -> bool) -> Vec<Event> {
        self.entries.lock().iter().filter(|e| pred(e)).cloned().collect()
    }

    pub fn by_kind(&self, kind: EventKind) -> Vec<Event> {
        self.query(|e| e.kind() == kind)
    }

    /// Discovery events stamped with a topology version at or above
    /// `version`.
    pub fn since_version(&self, version: u64) -> Vec<Event> {
        self.query(|e| match e {
            Event::Discovery(d) => d.topology_version >= version,
            Event::Deployment(_) => false,
        })
    }
}

impl EventSink for EventLog {
    fn record(&self, event: Event) {
        let mut entries = self.entries.lock();
        entries.push_back(event);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }
}
