use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{FollowForest, Sequence, StepPlayer};
use crate::instrument::Rack;
use crate::project::{DEFAULT_PPQ, Performance, Scene};
use crate::store::Snapshot;

/// Counters for one performance run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformanceState {
    pub clock_count: u64,
    pub scene_index: usize,
    pub stop_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No performance has been loaded yet.
    Idle,
    Playing,
}

/// What happened during one clock tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scene: Option<String>,
    pub fired: Vec<String>,
    /// Scene index moved to, if the master track finished its repeats.
    pub advanced_to: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub performance: PerformanceState,
    pub scene: Option<String>,
    pub players: Vec<(String, StepPlayer)>,
}

struct Walk<'a> {
    config: &'a Snapshot,
    rack: &'a Rack,
    scene: &'a Scene,
    forest: &'a FollowForest,
    ppq: u32,
    clock_count: u64,
}

pub struct Scheduler {
    state: PerformanceState,
    mode: SchedulerState,
    players: HashMap<String, StepPlayer>,
    forests: Option<(Arc<Performance>, Option<Arc<Vec<FollowForest>>>)>,
    silent: Sequence,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: PerformanceState::default(),
            mode: SchedulerState::Idle,
            players: HashMap::new(),
            forests: None,
            silent: Sequence::silent(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.mode
    }

    pub fn performance_state(&self) -> PerformanceState {
        self.state
    }

    pub fn player(&self, track: &str) -> Option<&StepPlayer> {
        self.players.get(track)
    }

    pub fn on_transport_start(&mut self) {
        self.state.stop_count = 0;
        info!("clock start");
    }

    /// A first stop pauses; a second one in a row rewinds the performance.
    pub fn on_transport_stop(&mut self) {
        self.state.stop_count += 1;
        if self.state.stop_count <= 1 {
            info!("clock stop");
        } else {
            info!("clock reset");
            self.reset();
        }
    }

    pub fn reset(&mut self) {
        self.state.scene_index = 0;
        self.state.clock_count = 0;
        self.reset_players();
    }

    fn reset_players(&mut self) {
        self.players.values_mut().for_each(StepPlayer::reset);
    }

    /// Follow forests for the scenes of the current performance, rebuilt
    /// whenever a different performance is seen.
    fn forests(&mut self, config: &Snapshot) -> Option<Arc<Vec<FollowForest>>> {
        let performance = config.shared_performance()?;
        if let Some((built, forests)) = &self.forests {
            if Arc::ptr_eq(built, performance) {
                return forests.clone();
            }
        }

        let forests: Result<Vec<_>, _> = config.scenes().iter().map(FollowForest::build).collect();
        let forests = match forests {
            Ok(forests) => Some(Arc::new(forests)),
            Err(e) => {
                error!("performance not playable: {}", e);
                None
            }
        };

        self.forests = Some((performance.clone(), forests.clone()));
        forests
    }

    fn scene_index(&self, config: &Snapshot) -> usize {
        let scenes = config.scenes();
        config
            .loop_scene()
            .and_then(|name| scenes.iter().position(|s| s.name == name))
            .unwrap_or(self.state.scene_index % scenes.len())
    }

    /// Resolution for this tick. A scene's ppq list is stepped through once
    /// per completed pass of its master track.
    fn ppq(&self, config: &Snapshot, scene: &Scene) -> u32 {
        let default = config.controller().map_or(DEFAULT_PPQ, |c| c.ppq);

        let (Some(list), Some(master)) = (&scene.ppq, scene.master()) else {
            return default;
        };
        if list.is_empty() {
            return default;
        }

        let start_count = self.players.get(&master.name).map_or(0, |p| p.start_count);
        list[start_count % list.len()]
    }

    pub fn on_tick(&mut self, config: &Snapshot, rack: &Rack) -> TickReport {
        if config.scenes().is_empty() {
            return TickReport::default();
        }
        let Some(forests) = self.forests(config) else {
            return TickReport::default();
        };

        if self.mode == SchedulerState::Idle {
            info!("performance ready, playing");
            self.mode = SchedulerState::Playing;
        }

        let index = self.scene_index(config);
        let (Some(scene), Some(forest)) = (config.scenes().get(index), forests.get(index)) else {
            return TickReport::default();
        };

        let walk = Walk {
            config,
            rack,
            scene,
            forest,
            ppq: self.ppq(config, scene),
            clock_count: self.state.clock_count,
        };

        let mut report = TickReport {
            scene: Some(scene.name.clone()),
            ..TickReport::default()
        };

        for &root in walk.forest.roots() {
            self.play_track(&walk, root, false, &mut report.fired);
        }

        let ready = scene.master().is_some_and(|master| {
            self.players
                .get(&master.name)
                .is_some_and(|p| p.start_count >= scene.repeat)
        });

        if ready {
            self.state.scene_index += 1;
            self.reset_players();
            report.advanced_to = Some(self.state.scene_index);
            info!(
                scene = %scene.name,
                next = self.state.scene_index,
                "scene complete"
            );
        }

        self.state.clock_count += 1;
        report
    }

    fn play_track(&mut self, walk: &Walk, index: usize, launch: bool, fired: &mut Vec<String>) {
        let scene_track = &walk.scene.tracks[index];
        let name = &scene_track.name;

        let did_fire = match walk.config.track(name) {
            None => {
                debug!("track '{}' not loaded, skipping", name);
                false
            }
            Some(track) => {
                let player = self.players.entry(name.clone()).or_default();
                if launch {
                    player.launch();
                }

                let play = &scene_track.play;
                let sequence = if play.is_empty() {
                    None
                } else {
                    track.sequence(&play[player.loop_count % play.len()])
                };
                let sequence = sequence.unwrap_or(&self.silent);

                match player.advance(walk.clock_count, walk.ppq, sequence, scene_track.is_root()) {
                    Some(note) => walk.rack.trigger(name, note),
                    None => false,
                }
            }
        };

        if did_fire {
            fired.push(name.clone());
        }

        for &child in walk.forest.children(index) {
            self.play_track(walk, child, did_fire, fired);
        }
    }

    pub fn status(&self, config: &Snapshot) -> SchedulerStatus {
        let scene = if config.scenes().is_empty() {
            None
        } else {
            Some(config.scenes()[self.scene_index(config)].name.clone())
        };

        let mut players: Vec<(String, StepPlayer)> =
            self.players.iter().map(|(name, p)| (name.clone(), *p)).collect();
        players.sort_by(|a, b| a.0.cmp(&b.0));

        SchedulerStatus {
            state: self.mode,
            performance: self.state,
            scene,
            players,
        }
    }
}
