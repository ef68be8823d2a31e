pub mod command;
pub mod engine;
pub mod events;
pub mod instrument;
pub mod midi;
pub mod project;
pub mod store;
pub mod timing;

pub use command::{Command, CommandError};
pub use engine::{Engine, EngineCommand, EngineHandle, EngineUpdate, spawn_engine};
pub use instrument::{InstrumentSink, Rack, RackEntry};
pub use project::{ConfigError, Performance, Track};
pub use store::{ConfigStore, Snapshot};
