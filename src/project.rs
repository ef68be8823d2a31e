use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::timing::{FollowForest, GeneratorSpec, Sequence};

pub const DEFAULT_PPQ: u32 = 48;
pub const PERFORMANCE_FILE: &str = "performance.ron";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("failed to serialize: {0}")]
    Serialize(#[from] ron::Error),
    #[error("{what} is {value}, expected a MIDI value in 0..=127")]
    MidiValue { what: String, value: u8 },
    #[error("{what} is {value}, expected a MIDI channel in 1..=16")]
    Channel { what: String, value: u8 },
    #[error("{what} must be at least 1")]
    NotPositive { what: String },
    #[error("sequence '{sequence}' of track '{track}' has no steps")]
    EmptySequence { track: String, sequence: String },
    #[error("scene '{scene}' lists track '{track}' more than once")]
    DuplicateSceneTrack { scene: String, track: String },
    #[error("track '{track}' in scene '{scene}' follows '{follow}', which is not in the scene")]
    UnknownFollow {
        scene: String,
        track: String,
        follow: String,
    },
    #[error("scene '{scene}' has a follow cycle through {tracks:?}")]
    FollowCycle { scene: String, tracks: Vec<String> },
    #[error("performance has no scenes")]
    NoScenes,
}

fn default_ppq() -> u32 {
    DEFAULT_PPQ
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Controller {
    pub device: String,
    pub channel: u8,
    /// Default pulses per quarter note, overridden per scene.
    #[serde(default = "default_ppq")]
    pub ppq: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modulation {
    pub device: String,
    pub channel: u8,
    pub cc: u8,
}

/// Output settings for the track of the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub device: String,
    pub channel: u8,
    #[serde(default)]
    pub mod1: Option<Modulation>,
    #[serde(default)]
    pub mod2: Option<Modulation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneTrack {
    pub name: String,
    #[serde(default)]
    pub play: Vec<String>,
    #[serde(default)]
    pub follow: Option<String>,
    #[serde(default)]
    pub master: bool,
}

impl SceneTrack {
    pub fn is_root(&self) -> bool {
        self.follow.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    pub repeat: usize,
    #[serde(default)]
    pub ppq: Option<Vec<u32>>,
    pub tracks: Vec<SceneTrack>,
}

impl Scene {
    /// The first track flagged as master.
    pub fn master(&self) -> Option<&SceneTrack> {
        self.tracks.iter().find(|t| t.master)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub controller: Controller,
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    pub scenes: Vec<Scene>,
    /// Scene to stay on regardless of the scene index.
    #[serde(default, rename = "loop")]
    pub loop_scene: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub generator: GeneratorSpec,
    #[serde(default)]
    pub sequences: Vec<Sequence>,
}

impl Track {
    pub fn sequence(&self, name: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.name == name)
    }

    /// Replaces the sequence with the same name, or appends it.
    pub fn put_sequence(&mut self, sequence: Sequence) {
        match self.sequences.iter_mut().find(|s| s.name == sequence.name) {
            Some(existing) => *existing = sequence,
            None => self.sequences.push(sequence),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for sequence in &self.sequences {
            if sequence.rate == 0 {
                return Err(ConfigError::NotPositive {
                    what: format!("rate of sequence '{}'", sequence.name),
                });
            }
            if sequence.is_empty() {
                return Err(ConfigError::EmptySequence {
                    track: self.name.clone(),
                    sequence: sequence.name.clone(),
                });
            }
            for (i, note) in sequence.steps.iter().enumerate() {
                let Some(note) = note else { continue };
                let what = |field: &str| format!("{field} of step {i} in '{}'", sequence.name);
                check_midi(what("pitch"), note.pitch)?;
                check_midi(what("velocity"), note.velocity)?;
                if let Some(value) = note.mod1 {
                    check_midi(what("mod1"), value)?;
                }
                if let Some(value) = note.mod2 {
                    check_midi(what("mod2"), value)?;
                }
            }
        }

        for pitch in &self.generator.notes {
            check_midi(format!("generator note of '{}'", self.name), *pitch)?;
        }

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let track: Track = read_ron(path)?;
        track.validate()?;
        Ok(track)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        write_ron(path, self)
    }
}

impl Performance {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_channel("controller channel".to_string(), self.controller.channel)?;
        if self.controller.ppq == 0 {
            return Err(ConfigError::NotPositive {
                what: "controller ppq".to_string(),
            });
        }

        for instrument in &self.instruments {
            check_channel(format!("channel of '{}'", instrument.name), instrument.channel)?;
            for modulation in [&instrument.mod1, &instrument.mod2].into_iter().flatten() {
                check_channel(
                    format!("modulation channel of '{}'", instrument.name),
                    modulation.channel,
                )?;
                check_midi(format!("modulation cc of '{}'", instrument.name), modulation.cc)?;
            }
        }

        if self.scenes.is_empty() {
            return Err(ConfigError::NoScenes);
        }

        for scene in &self.scenes {
            if scene.repeat == 0 {
                return Err(ConfigError::NotPositive {
                    what: format!("repeat of scene '{}'", scene.name),
                });
            }
            if scene.ppq.iter().flatten().any(|ppq| *ppq == 0) {
                return Err(ConfigError::NotPositive {
                    what: format!("ppq of scene '{}'", scene.name),
                });
            }
            FollowForest::build(scene)?;
        }

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let performance: Performance = read_ron(path)?;
        performance.validate()?;
        Ok(performance)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        write_ron(path, self)
    }

    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.name == name)
    }

    pub fn instrument(&self, name: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.name == name)
    }
}

/// Path of the track file played by `instrument` inside `dir`.
pub fn track_path(dir: &Path, instrument: &str) -> PathBuf {
    dir.join(format!("{instrument}.ron"))
}

fn check_midi(what: String, value: u8) -> Result<(), ConfigError> {
    if value > 127 {
        return Err(ConfigError::MidiValue { what, value });
    }
    Ok(())
}

fn check_channel(what: String, value: u8) -> Result<(), ConfigError> {
    if !(1..=16).contains(&value) {
        return Err(ConfigError::Channel { what, value });
    }
    Ok(())
}

fn read_ron<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_ron<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let text = ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())?;
    fs::write(path, text).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
