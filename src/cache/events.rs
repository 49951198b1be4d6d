//! Event Log Module
//!
//! Append-only record of every load, write, update and eviction performed by
//! the cache.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::cache::record::RecordSnapshot;

// == Eviction Reason ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// The record outlived the configured expiry time
    Expiry,
    /// The record was chosen by the eviction policy to make room
    Replacement,
}

// == Event Kind ==
/// What happened to the record carried by an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind<K, V> {
    /// Value fetched from the data source
    Load,
    /// Value acknowledged by the data source
    Write,
    /// Value replaced by a `set`; carries the replaced record
    Update { previous: RecordSnapshot<K, V> },
    /// Record dropped from the cache
    Eviction { reason: EvictionReason },
}

// == Event ==
#[derive(Debug, Clone, Serialize)]
pub struct Event<K, V> {
    pub id: Uuid,
    /// Logical time from the cache timer
    pub timestamp: u64,
    /// Wall-clock time the event was appended
    pub recorded_at: DateTime<Utc>,
    pub record: RecordSnapshot<K, V>,
    pub kind: EventKind<K, V>,
}

impl<K, V> Event<K, V> {
    pub fn new(record: RecordSnapshot<K, V>, kind: EventKind<K, V>, timestamp: u64) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp,
            recorded_at: Utc::now(),
            record,
            kind,
        }
    }

    pub fn key(&self) -> &K {
        &self.record.key
    }

    pub fn is_load(&self) -> bool {
        matches!(self.kind, EventKind::Load)
    }

    pub fn is_write(&self) -> bool {
        matches!(self.kind, EventKind::Write)
    }

    pub fn is_update(&self) -> bool {
        matches!(self.kind, EventKind::Update { .. })
    }

    /// Reason of an eviction event, None for every other kind.
    pub fn eviction_reason(&self) -> Option<EvictionReason> {
        match self.kind {
            EventKind::Eviction { reason } => Some(reason),
            _ => None,
        }
    }
}

// == Event Summary ==
/// Per-kind event counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub loads: u64,
    pub writes: u64,
    pub updates: u64,
    pub expiry_evictions: u64,
    pub replacement_evictions: u64,
}

impl EventSummary {
    pub fn evictions(&self) -> u64 {
        self.expiry_evictions + self.replacement_evictions
    }

    fn record<K, V>(&mut self, kind: &EventKind<K, V>) {
        match kind {
            EventKind::Load => self.loads += 1,
            EventKind::Write => self.writes += 1,
            EventKind::Update { .. } => self.updates += 1,
            EventKind::Eviction {
                reason: EvictionReason::Expiry,
            } => self.expiry_evictions += 1,
            EventKind::Eviction {
                reason: EvictionReason::Replacement,
            } => self.replacement_evictions += 1,
        }
    }
}

// == Event Log ==
/// Append-only, concurrently appendable sequence of events.
///
/// Readers get a consistent prefix; appends racing with a read may or may
/// not be part of it.
#[derive(Debug)]
pub struct EventLog<K, V> {
    events: RwLock<Vec<Event<K, V>>>,
}

impl<K, V> EventLog<K, V> {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    // == Append ==
    pub(crate) fn append(&self, event: Event<K, V>) {
        self.events.write().push(event);
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    // == Summary ==
    pub fn summary(&self) -> EventSummary {
        let mut summary = EventSummary::default();
        for event in self.events.read().iter() {
            summary.record(&event.kind);
        }
        summary
    }
}

impl<K: Clone, V: Clone> EventLog<K, V> {
    /// Snapshot of every event appended so far.
    pub fn events(&self) -> Vec<Event<K, V>> {
        self.events.read().clone()
    }

    /// Events appended at or after position `offset`.
    pub fn since(&self, offset: usize) -> Vec<Event<K, V>> {
        self.events
            .read()
            .get(offset..)
            .map(<[_]>::to_vec)
            .unwrap_or_default()
    }
}

impl<K: Serialize, V: Serialize> EventLog<K, V> {
    /// Serializes the whole log as a JSON array.
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&*self.events.read())
    }
}

impl<K, V> Default for EventLog<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
