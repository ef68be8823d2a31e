use cmdseq::engine::RackBuilder;
use cmdseq::midi::{self, ClockInput, MidiOutputs, NoteOffTimer};
use cmdseq::{Command, ConfigStore, EngineCommand, EngineUpdate, Performance, spawn_engine};
use std::io::BufRead;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dir = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    std::fs::create_dir_all(&dir)?;
    let store = ConfigStore::new(&dir);
    let performances = store.subscribe();
    if let Err(e) = store.load_all() {
        error!("{}; waiting for performance.ron in {}", e, dir);
    }
    let _watcher = store.watch()?;

    match midi::port_names() {
        Ok((inputs, outputs)) => info!(?inputs, ?outputs, "MIDI ports"),
        Err(e) => warn!("could not list MIDI ports: {}", e),
    }

    let mut outputs = MidiOutputs::new(NoteOffTimer::spawn());
    let rack_builder: RackBuilder =
        Box::new(move |performance: &Performance| outputs.build_rack(performance));
    let engine = spawn_engine(store.clone(), rack_builder);

    let commands = engine.command_tx.clone();
    std::thread::spawn(move || {
        let mut clock = ClockInput::new(commands);
        for performance in performances {
            if let Err(e) = clock.follow(&performance.controller) {
                error!("clock input: {}", e);
            }
        }
    });

    let updates = engine.update_rx.clone();
    std::thread::spawn(move || {
        for update in updates {
            match update {
                EngineUpdate::SceneChanged { name } => info!("scene: {}", name),
                EngineUpdate::Tempo { bpm } => info!("tempo: {} bpm", bpm),
                EngineUpdate::Generated {
                    track,
                    sequence,
                    active,
                    length,
                } => println!("{track}/{sequence}: {active} of {length} steps"),
                EngineUpdate::Status(status) => {
                    println!(
                        "{:?} scene={} tick={} scene_index={} stops={}",
                        status.state,
                        status.scene.as_deref().unwrap_or("-"),
                        status.performance.clock_count,
                        status.performance.scene_index,
                        status.performance.stop_count,
                    );
                    for (name, player) in status.players {
                        println!(
                            "  {name}: step={} loop={} start={}",
                            player.step_index, player.loop_count, player.start_count
                        );
                    }
                }
                EngineUpdate::Error { message } => eprintln!("error: {message}"),
            }
        }
    });

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(Command::Help) => println!("{}", cmdseq::command::HELP),
            Ok(command) => {
                let Some(engine_command) = command.to_engine() else {
                    continue;
                };
                let shutdown = engine_command == EngineCommand::Shutdown;
                if engine.command_tx.send(engine_command).is_err() {
                    error!("engine is gone");
                    break;
                }
                if shutdown {
                    break;
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    info!("bye");
    Ok(())
}
