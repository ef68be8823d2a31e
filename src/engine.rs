use crossbeam::channel::{Receiver, Sender};
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::ClockEvent;
use crate::instrument::{NOTE_DURATION_MS, Rack};
use crate::project::{ConfigError, Performance};
use crate::store::{ConfigStore, Snapshot};
use crate::timing::{
    DEFAULT_RATE, GenerationError, Scheduler, SchedulerStatus, Sequence, TempoTracker, generate,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Clock { event: ClockEvent, timestamp_us: u64 },
    Generate { track: String, sequence: String },
    Play { track: String, pitch: u8, velocity: u8 },
    LoopScene(Option<String>),
    Status,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineUpdate {
    SceneChanged { name: String },
    Tempo { bpm: u32 },
    Generated { track: String, sequence: String, active: usize, length: usize },
    Status(SchedulerStatus),
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("track '{0}' is not loaded")]
    UnknownTrack(String),
    #[error("no instrument is connected for track '{0}'")]
    NoInstrument(String),
    #[error("scene '{0}' is not in the performance")]
    UnknownScene(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type RackBuilder = Box<dyn FnMut(&Performance) -> Rack + Send>;

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
}

pub fn spawn_engine(store: ConfigStore, rack_builder: RackBuilder) -> EngineHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    std::thread::spawn(move || {
        let mut engine = Engine::new(store, rack_builder, StdRng::from_entropy());
        engine_thread(&mut engine, command_rx, update_tx);
    });

    EngineHandle {
        command_tx,
        update_rx,
    }
}

fn engine_thread(
    engine: &mut Engine,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
) {
    while let Ok(command) = command_rx.recv() {
        if command == EngineCommand::Shutdown {
            break;
        }
        for update in engine.handle(command) {
            let _ = update_tx.send(update);
        }
    }
    info!("engine stopped");
}

/// Owns the scheduler and everything it plays through. Commands are handled
/// one at a time, so a tick is always finished before the next one starts.
pub struct Engine {
    store: ConfigStore,
    scheduler: Scheduler,
    tempo: TempoTracker,
    rng: StdRng,
    rack: Rack,
    rack_generation: Option<u64>,
    rack_builder: RackBuilder,
    scene: Option<String>,
}

impl Engine {
    pub fn new(store: ConfigStore, rack_builder: RackBuilder, rng: StdRng) -> Self {
        Self {
            store,
            scheduler: Scheduler::new(),
            tempo: TempoTracker::new(),
            rng,
            rack: Rack::new(),
            rack_generation: None,
            rack_builder,
            scene: None,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn handle(&mut self, command: EngineCommand) -> Vec<EngineUpdate> {
        let mut updates = Vec::new();

        match command {
            EngineCommand::Clock {
                event,
                timestamp_us,
            } => self.clock(event, timestamp_us, &mut updates),
            EngineCommand::Generate { track, sequence } => {
                match self.generate(&track, &sequence) {
                    Ok((active, length)) => updates.push(EngineUpdate::Generated {
                        track,
                        sequence,
                        active,
                        length,
                    }),
                    Err(e) => updates.push(failure(e)),
                }
            }
            EngineCommand::Play {
                track,
                pitch,
                velocity,
            } => {
                if let Err(e) = self.play(&track, pitch, velocity) {
                    updates.push(failure(e));
                }
            }
            EngineCommand::LoopScene(scene) => {
                if let Err(e) = self.loop_scene(scene) {
                    updates.push(failure(e));
                }
            }
            EngineCommand::Status => {
                let config = self.store.snapshot();
                updates.push(EngineUpdate::Status(self.scheduler.status(&config)));
            }
            EngineCommand::Shutdown => {}
        }

        updates
    }

    fn clock(&mut self, event: ClockEvent, timestamp_us: u64, updates: &mut Vec<EngineUpdate>) {
        match event {
            ClockEvent::Tick => {
                if let Some(bpm) = self.tempo.tick(timestamp_us) {
                    updates.push(EngineUpdate::Tempo { bpm });
                }

                let config = self.store.snapshot();
                self.refresh_rack(&config);

                let report = self.scheduler.on_tick(&config, &self.rack);
                if !report.fired.is_empty() {
                    debug!(fired = ?report.fired, "tick");
                }

                let scene = match report.advanced_to {
                    Some(_) => self.scheduler.status(&config).scene,
                    None => report.scene,
                };
                if scene.is_some() && scene != self.scene {
                    self.scene = scene.clone();
                    if let Some(name) = scene {
                        updates.push(EngineUpdate::SceneChanged { name });
                    }
                }
            }
            ClockEvent::Start | ClockEvent::Continue => self.scheduler.on_transport_start(),
            ClockEvent::Stop => {
                self.scheduler.on_transport_stop();
                self.tempo.clear();
            }
        }
    }

    fn refresh_rack(&mut self, config: &Snapshot) {
        let generation = config.performance_generation();
        if self.rack_generation == Some(generation) {
            return;
        }
        if let Some(performance) = config.performance() {
            self.rack = (self.rack_builder)(performance);
            self.rack_generation = Some(generation);
            info!(instruments = self.rack.len(), "instrument rack ready");
        }
    }

    /// Regenerates one sequence of `track` from its stored generator settings
    /// and writes the track back to disk. Returns the number of notes and the
    /// sequence length.
    pub fn generate(&mut self, track: &str, sequence: &str) -> Result<(usize, usize), EngineError> {
        let config = self.store.snapshot();
        let mut updated = config
            .track(track)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTrack(track.to_string()))?;

        let steps = generate(&updated.generator, &mut self.rng)?;
        let rate = updated.sequence(sequence).map_or(DEFAULT_RATE, |s| s.rate);
        let generated = Sequence::new(sequence, rate, steps);
        let counts = (generated.active_steps(), generated.len());

        info!(
            track,
            sequence,
            kind = %updated.generator.kind,
            active = counts.0,
            length = counts.1,
            "generated sequence"
        );
        updated.put_sequence(generated);
        self.store.save_track(updated)?;

        Ok(counts)
    }

    pub fn play(&mut self, track: &str, pitch: u8, velocity: u8) -> Result<(), EngineError> {
        let config = self.store.snapshot();
        self.refresh_rack(&config);

        let entry = self
            .rack
            .get(track)
            .ok_or_else(|| EngineError::NoInstrument(track.to_string()))?;
        entry.instrument.play(pitch, velocity, NOTE_DURATION_MS);
        Ok(())
    }

    pub fn loop_scene(&mut self, scene: Option<String>) -> Result<(), EngineError> {
        if let Some(name) = &scene {
            let known = self.store.snapshot().scenes().iter().any(|s| &s.name == name);
            if !known {
                return Err(EngineError::UnknownScene(name.clone()));
            }
            info!("looping scene '{}'", name);
        } else {
            info!("scene loop off");
        }
        self.store.set_loop_scene(scene);
        Ok(())
    }
}

fn failure(error: EngineError) -> EngineUpdate {
    warn!("{}", error);
    EngineUpdate::Error {
        message: error.to_string(),
    }
}
