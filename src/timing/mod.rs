mod follow;
mod generator;
mod player;
mod scheduler;
mod sequence;
mod tempo;

pub use follow::FollowForest;
pub use generator::{
    DEFAULT_PITCH, GenerationError, GeneratorKind, GeneratorSpec, MAX_CC_VALUE, MAX_VELOCITY,
    MIN_CC_VALUE, MIN_VELOCITY, generate, random_note,
};
pub use player::StepPlayer;
pub use scheduler::{PerformanceState, Scheduler, SchedulerState, SchedulerStatus, TickReport};
pub use sequence::{DEFAULT_DURATION, DEFAULT_RATE, NoteEvent, Sequence};
pub use tempo::{MIDI_CLOCK_PPQ, TempoTracker};
