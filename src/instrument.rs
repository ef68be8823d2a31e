use std::collections::HashMap;
use std::sync::Arc;

use crate::timing::NoteEvent;

/// How long a sequenced note is held before its note-off.
pub const NOTE_DURATION_MS: u64 = 100;

/// Receives notes and controller changes for one output. Implementations
/// never block the caller and report their own failures.
pub trait InstrumentSink: Send + Sync {
    fn play(&self, pitch: u8, velocity: u8, duration_ms: u64);
    fn control_change(&self, cc: u8, value: u8);
}

#[derive(Clone)]
pub struct ModTarget {
    pub sink: Arc<dyn InstrumentSink>,
    pub cc: u8,
}

#[derive(Clone)]
pub struct RackEntry {
    pub instrument: Arc<dyn InstrumentSink>,
    pub mod1: Option<ModTarget>,
    pub mod2: Option<ModTarget>,
}

impl RackEntry {
    pub fn new(instrument: Arc<dyn InstrumentSink>) -> Self {
        Self {
            instrument,
            mod1: None,
            mod2: None,
        }
    }
}

/// Output sinks keyed by track name.
#[derive(Clone, Default)]
pub struct Rack {
    entries: HashMap<String, RackEntry>,
}

impl Rack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, track: impl Into<String>, entry: RackEntry) {
        self.entries.insert(track.into(), entry);
    }

    pub fn get(&self, track: &str) -> Option<&RackEntry> {
        self.entries.get(track)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sends `note` and its modulation values to the outputs of `track`.
    /// Returns false when the track has no instrument.
    pub fn trigger(&self, track: &str, note: &NoteEvent) -> bool {
        let Some(entry) = self.entries.get(track) else {
            return false;
        };

        entry.instrument.play(note.pitch, note.velocity, NOTE_DURATION_MS);

        if let (Some(target), Some(value)) = (&entry.mod1, note.mod1) {
            target.sink.control_change(target.cc, value);
        }
        if let (Some(target), Some(value)) = (&entry.mod2, note.mod2) {
            target.sink.control_change(target.cc, value);
        }

        true
    }
}
