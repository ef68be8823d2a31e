use crossbeam::channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection};
use tracing::{info, trace};

use super::{CLIENT_NAME, MidiError, find_port};
use crate::engine::EngineCommand;
use crate::events::ClockEvent;
use crate::project::Controller;

/// Listens to the controller port and forwards clock pulses and transport
/// messages to the engine in arrival order. The connection closes when the
/// returned value is dropped.
pub fn connect_clock(
    device: &str,
    channel: u8,
    commands: Sender<EngineCommand>,
) -> Result<MidiInputConnection<()>, MidiError> {
    let mut midi_in = MidiInput::new(CLIENT_NAME)?;
    midi_in.ignore(Ignore::SysexAndActiveSense);

    let ports = midi_in.ports();
    let port = find_port(&ports, |p| midi_in.port_name(p).unwrap_or_default(), device).ok_or_else(
        || MidiError::NoSuchPort {
            direction: "input",
            device: device.to_string(),
        },
    )?;
    let port_name = midi_in.port_name(&port).unwrap_or_default();

    let connection = midi_in
        .connect(
            &port,
            "cmdseq-clock",
            move |timestamp_us, message, _| match ClockEvent::from_bytes(message) {
                Some(event) => {
                    let _ = commands.send(EngineCommand::Clock {
                        event,
                        timestamp_us,
                    });
                }
                None => {
                    if message.first().is_some_and(|s| s & 0x0F == channel.saturating_sub(1)) {
                        trace!("controller message {:02X?}", message);
                    }
                }
            },
            (),
        )
        .map_err(|e| MidiError::Connect {
            port: port_name.clone(),
            reason: e.to_string(),
        })?;

    info!("clock input: {}", port_name);
    Ok(connection)
}

/// The clock connection for the controller of the current performance.
/// Reconnects when a newly published performance moves the controller to
/// another device or channel.
pub struct ClockInput {
    commands: Sender<EngineCommand>,
    connected: Option<(Controller, MidiInputConnection<()>)>,
}

impl ClockInput {
    pub fn new(commands: Sender<EngineCommand>) -> Self {
        Self {
            commands,
            connected: None,
        }
    }

    pub fn controller(&self) -> Option<&Controller> {
        self.connected.as_ref().map(|(controller, _)| controller)
    }

    pub fn follow(&mut self, controller: &Controller) -> Result<(), MidiError> {
        if !needs_reconnect(self.controller(), controller) {
            return Ok(());
        }

        if let Some((previous, connection)) = self.connected.take() {
            info!("closing clock input '{}'", previous.device);
            connection.close();
        }

        let connection =
            connect_clock(&controller.device, controller.channel, self.commands.clone())?;
        self.connected = Some((controller.clone(), connection));
        Ok(())
    }
}

/// A ppq change alone keeps the connection.
fn needs_reconnect(current: Option<&Controller>, next: &Controller) -> bool {
    current.is_none_or(|c| c.device != next.device || c.channel != next.channel)
}
