use serde::{Deserialize, Serialize};

pub const DEFAULT_RATE: u32 = 4;
pub const DEFAULT_DURATION: &str = "8n";

/// A single triggered step. A rest is represented as `None` in
/// [`Sequence::steps`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    #[serde(default = "default_duration")]
    pub duration: String,
    #[serde(default)]
    pub mod1: Option<u8>,
    #[serde(default)]
    pub mod2: Option<u8>,
}

fn default_duration() -> String {
    DEFAULT_DURATION.to_string()
}

fn default_rate() -> u32 {
    DEFAULT_RATE
}

impl NoteEvent {
    pub fn new(pitch: u8, velocity: u8) -> Self {
        Self {
            pitch,
            velocity,
            duration: default_duration(),
            mod1: None,
            mod2: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    /// Steps per quarter note; the tick divisor is `ppq / rate`.
    #[serde(default = "default_rate")]
    pub rate: u32,
    pub steps: Vec<Option<NoteEvent>>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, rate: u32, steps: Vec<Option<NoteEvent>>) -> Self {
        Self {
            name: name.into(),
            rate,
            steps,
        }
    }

    /// Four rests at the default rate. Played whenever a scene names a
    /// sequence the track does not have (yet).
    pub fn silent() -> Self {
        Self::new("", DEFAULT_RATE, vec![None; 4])
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn active_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.is_some()).count()
    }

    /// Ticks between two steps at the given resolution, never below one.
    pub fn clock_divisor(&self, ppq: u32) -> u64 {
        (ppq / self.rate.max(1)).max(1) as u64
    }
}
