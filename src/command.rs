use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::engine::EngineCommand;

pub const DEFAULT_VELOCITY: u8 = 100;

pub const HELP: &str = "\
commands:
  generate <track> <sequence>      regenerate a sequence from the track's generator
  play <track> <pitch> [velocity]  trigger a note on the track's instrument
  loop <scene> | loop off          stay on one scene, or resume the scene order
  status                           show the scheduler state
  help                             show this message
  exit                             quit";

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate { track: String, sequence: String },
    Play { track: String, pitch: u8, velocity: u8 },
    Loop(Option<String>),
    Status,
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("{what} must be a number in 0..=127, got '{value}'")]
    MidiValue { what: &'static str, value: String },
}

impl Command {
    /// The engine command this line asks for, if it goes to the engine.
    pub fn to_engine(&self) -> Option<EngineCommand> {
        match self {
            Command::Generate { track, sequence } => Some(EngineCommand::Generate {
                track: track.clone(),
                sequence: sequence.clone(),
            }),
            Command::Play {
                track,
                pitch,
                velocity,
            } => Some(EngineCommand::Play {
                track: track.clone(),
                pitch: *pitch,
                velocity: *velocity,
            }),
            Command::Loop(scene) => Some(EngineCommand::LoopScene(scene.clone())),
            Command::Status => Some(EngineCommand::Status),
            Command::Help => None,
            Command::Exit => Some(EngineCommand::Shutdown),
        }
    }
}

fn midi_value(what: &'static str, value: &str) -> Result<u8, CommandError> {
    value
        .parse::<u8>()
        .ok()
        .filter(|v| *v <= 127)
        .ok_or_else(|| CommandError::MidiValue {
            what,
            value: value.to_string(),
        })
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Err(CommandError::Empty);
        };

        match (name, args) {
            ("generate", [track, sequence]) => Ok(Command::Generate {
                track: track.to_string(),
                sequence: sequence.to_string(),
            }),
            ("generate", _) => Err(CommandError::Usage("generate <track> <sequence>")),
            ("play", [track, pitch, rest @ ..]) if rest.len() <= 1 => Ok(Command::Play {
                track: track.to_string(),
                pitch: midi_value("pitch", pitch)?,
                velocity: match rest.first() {
                    Some(velocity) => midi_value("velocity", velocity)?,
                    None => DEFAULT_VELOCITY,
                },
            }),
            ("play", _) => Err(CommandError::Usage("play <track> <pitch> [velocity]")),
            ("loop", ["off"]) => Ok(Command::Loop(None)),
            ("loop", [scene]) => Ok(Command::Loop(Some(scene.to_string()))),
            ("loop", _) => Err(CommandError::Usage("loop <scene> | loop off")),
            ("status", []) => Ok(Command::Status),
            ("help", _) => Ok(Command::Help),
            ("exit" | "quit", []) => Ok(Command::Exit),
            _ => Err(CommandError::Unknown(name.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Generate { track, sequence } => write!(f, "generate {track} {sequence}"),
            Command::Play {
                track,
                pitch,
                velocity,
            } => write!(f, "play {track} {pitch} {velocity}"),
            Command::Loop(Some(scene)) => write!(f, "loop {scene}"),
            Command::Loop(None) => write!(f, "loop off"),
            Command::Status => write!(f, "status"),
            Command::Help => write!(f, "help"),
            Command::Exit => write!(f, "exit"),
        }
    }
}
