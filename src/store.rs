use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::project::{
    ConfigError, Controller, Instrument, PERFORMANCE_FILE, Performance, Scene, Track, track_path,
};

/// Immutable view of the loaded configuration. The engine reads one per
/// tick, so updates published mid-tick only take effect on the next one.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    performance: Option<Arc<Performance>>,
    performance_generation: u64,
    tracks: HashMap<String, Arc<Track>>,
    loop_override: Option<String>,
}

impl Snapshot {
    pub fn performance(&self) -> Option<&Performance> {
        self.performance.as_deref()
    }

    /// The performance as published; snapshots built from the same
    /// publication share the pointer.
    pub fn shared_performance(&self) -> Option<&Arc<Performance>> {
        self.performance.as_ref()
    }

    /// Bumped whenever a new performance file is published.
    pub fn performance_generation(&self) -> u64 {
        self.performance_generation
    }

    pub fn scenes(&self) -> &[Scene] {
        self.performance().map(|p| p.scenes.as_slice()).unwrap_or_default()
    }

    pub fn instruments(&self) -> &[Instrument] {
        self.performance().map(|p| p.instruments.as_slice()).unwrap_or_default()
    }

    pub fn controller(&self) -> Option<&Controller> {
        self.performance().map(|p| &p.controller)
    }

    pub fn tracks(&self) -> &HashMap<String, Arc<Track>> {
        &self.tracks
    }

    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks.get(name).map(Arc::as_ref)
    }

    /// A scene set with `loop` on the command line wins over the one in the
    /// performance file.
    pub fn loop_scene(&self) -> Option<&str> {
        self.loop_override
            .as_deref()
            .or_else(|| self.performance().and_then(|p| p.loop_scene.as_deref()))
    }

    pub fn with_performance(mut self, performance: impl Into<Arc<Performance>>) -> Self {
        self.performance = Some(performance.into());
        self.performance_generation += 1;
        self
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.insert(track.name.clone(), Arc::new(track));
        self
    }

    pub fn with_loop_scene(mut self, scene: Option<String>) -> Self {
        self.loop_override = scene;
        self
    }
}

/// Loads and publishes the performance and track files of one directory.
#[derive(Clone)]
pub struct ConfigStore {
    dir: PathBuf,
    current: Arc<ArcSwap<Snapshot>>,
    writer: Arc<Mutex<()>>,
    listeners: Arc<Mutex<Vec<Sender<Arc<Performance>>>>>,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Arc::new(ArcSwap::from_pointee(Snapshot::default())),
            writer: Arc::new(Mutex::new(())),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    fn publish(&self, update: impl FnOnce(Snapshot) -> Snapshot) {
        let _guard = self.writer.lock();
        let next = update(Snapshot::clone(&self.current.load()));
        self.current.store(Arc::new(next));
    }

    pub fn put_performance(&self, performance: Performance) {
        let performance = Arc::new(performance);
        self.publish(|snapshot| snapshot.with_performance(performance.clone()));
        self.listeners
            .lock()
            .retain(|tx| tx.send(performance.clone()).is_ok());
    }

    /// Receives every performance published from now on, including the
    /// first one if nothing has loaded yet.
    pub fn subscribe(&self) -> Receiver<Arc<Performance>> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.listeners.lock().push(tx);
        rx
    }

    pub fn put_track(&self, track: Track) {
        self.publish(|snapshot| snapshot.with_track(track));
    }

    pub fn set_loop_scene(&self, scene: Option<String>) {
        self.publish(|snapshot| snapshot.with_loop_scene(scene));
    }

    /// Reads the performance file, then the track file of every instrument
    /// it names. Missing track files only delay those tracks.
    pub fn load_all(&self) -> Result<(), ConfigError> {
        let performance = Performance::load(&self.dir.join(PERFORMANCE_FILE))?;
        let names: Vec<String> = performance.instruments.iter().map(|i| i.name.clone()).collect();

        info!(
            scenes = performance.scenes.len(),
            instruments = names.len(),
            "loaded performance"
        );
        self.put_performance(performance);

        for name in names {
            if let Err(e) = self.load_track(&name) {
                warn!("track '{}' not ready: {}", name, e);
            }
        }

        Ok(())
    }

    pub fn load_track(&self, instrument: &str) -> Result<(), ConfigError> {
        let track = Track::load(&track_path(&self.dir, instrument))?;
        debug!(track = %track.name, sequences = track.sequences.len(), "loaded track");
        self.put_track(track);
        Ok(())
    }

    /// Writes `track` to its file and publishes it.
    pub fn save_track(&self, track: Track) -> Result<(), ConfigError> {
        track.validate()?;
        track.save(&track_path(&self.dir, &track.name))?;
        self.put_track(track);
        Ok(())
    }

    /// Re-reads whichever file `path` is. Invalid files leave the previous
    /// state in place.
    pub fn reload(&self, path: &Path) -> Result<(), ConfigError> {
        if path.file_name().is_some_and(|name| name == PERFORMANCE_FILE) {
            let known: Vec<String> = self.snapshot().tracks.keys().cloned().collect();
            let performance = Performance::load(path)?;
            let missing: Vec<String> = performance
                .instruments
                .iter()
                .map(|i| i.name.clone())
                .filter(|name| !known.contains(name))
                .collect();

            info!("reloaded performance");
            self.put_performance(performance);

            for name in missing {
                if let Err(e) = self.load_track(&name) {
                    warn!("track '{}' not ready: {}", name, e);
                }
            }
            return Ok(());
        }

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(());
        };

        let snapshot = self.snapshot();
        if snapshot.performance().is_some_and(|p| p.instrument(stem).is_some()) {
            self.load_track(stem)?;
            info!("reloaded track '{}'", stem);
        }

        Ok(())
    }

    /// Reloads files in the config directory as they change. The watcher
    /// stops when the returned value is dropped.
    pub fn watch(&self) -> notify::Result<RecommendedWatcher> {
        let store = self.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    for path in event.paths.iter().filter(|p| is_config_file(p)) {
                        if let Err(e) = store.reload(path) {
                            error!("rejected {}: {}", path.display(), e);
                        }
                    }
                }
                Err(e) => error!("watch error: {}", e),
            },
            Config::default(),
        )?;

        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        info!("watching {}", self.dir.display());

        Ok(watcher)
    }
}

fn is_config_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "ron")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{GeneratorSpec, Sequence};
    use std::fs;

    const PERFORMANCE: &str = r#"(
        controller: (device: "clock", channel: 1),
        instruments: [(name: "kick", device: "synth", channel: 10)],
        scenes: [(name: "intro", repeat: 1, tracks: [(name: "kick", play: ["A"], master: true)])],
    )"#;

    fn kick() -> Track {
        Track {
            name: "kick".to_string(),
            generator: GeneratorSpec::default(),
            sequences: vec![Sequence::new("A", 4, vec![None; 4])],
        }
    }

    #[test]
    fn load_all_without_track_file_keeps_performance() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PERFORMANCE_FILE), PERFORMANCE).unwrap();

        let store = ConfigStore::new(dir.path());
        store.load_all().unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.scenes().len(), 1);
        assert_eq!(snapshot.performance_generation(), 1);
        assert!(snapshot.track("kick").is_none());
    }

    #[test]
    fn save_track_publishes_and_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PERFORMANCE_FILE), PERFORMANCE).unwrap();
        let store = ConfigStore::new(dir.path());
        store.load_all().unwrap();

        store.save_track(kick()).unwrap();

        assert!(store.snapshot().track("kick").is_some());
        assert_eq!(Track::load(&track_path(dir.path(), "kick")).unwrap(), kick());
    }

    #[test]
    fn invalid_reload_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PERFORMANCE_FILE);
        fs::write(&path, PERFORMANCE).unwrap();
        let store = ConfigStore::new(dir.path());
        store.load_all().unwrap();

        fs::write(&path, "(controller: (device: \"clock\", channel: 99), scenes: [])").unwrap();
        assert!(store.reload(&path).is_err());
        assert_eq!(store.snapshot().performance_generation(), 1);
    }

    #[test]
    fn reload_picks_up_track_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PERFORMANCE_FILE), PERFORMANCE).unwrap();
        let store = ConfigStore::new(dir.path());
        store.load_all().unwrap();

        let path = track_path(dir.path(), "kick");
        kick().save(&path).unwrap();
        store.reload(&path).unwrap();

        assert_eq!(store.snapshot().track("kick").unwrap().sequences.len(), 1);
    }

    #[test]
    fn subscribers_see_performance_that_arrives_after_startup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let performances = store.subscribe();

        assert!(store.load_all().is_err());
        assert!(performances.try_recv().is_err());

        let path = dir.path().join(PERFORMANCE_FILE);
        fs::write(&path, PERFORMANCE).unwrap();
        store.reload(&path).unwrap();

        let performance = performances.try_recv().unwrap();
        assert_eq!(performance.controller.device, "clock");
        assert!(Arc::ptr_eq(
            &performance,
            store.snapshot().shared_performance().unwrap()
        ));
    }

    #[test]
    fn dropped_subscribers_are_forgotten() {
        let store = ConfigStore::new("unused");
        drop(store.subscribe());
        let kept = store.subscribe();

        store.put_performance(ron::from_str(PERFORMANCE).unwrap());

        assert_eq!(store.listeners.lock().len(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn loop_override_wins_over_file() {
        let performance: Performance = ron::from_str(PERFORMANCE).unwrap();
        let snapshot = Snapshot::default().with_performance(performance);
        assert_eq!(snapshot.loop_scene(), None);

        let snapshot = snapshot.with_loop_scene(Some("intro".to_string()));
        assert_eq!(snapshot.loop_scene(), Some("intro"));
    }
}
