mod clock;
mod output;

pub use clock::{ClockInput, connect_clock};
pub use output::{ChannelSink, MidiOutputs, NoteOffTimer, OutputPort};

use thiserror::Error;

pub const CLIENT_NAME: &str = "cmdseq";

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to initialise MIDI: {0}")]
    Init(#[from] midir::InitError),
    #[error("no MIDI {direction} port matches '{device}'")]
    NoSuchPort {
        direction: &'static str,
        device: String,
    },
    #[error("failed to connect to '{port}': {reason}")]
    Connect { port: String, reason: String },
}

/// Names of the input and output ports currently visible.
pub fn port_names() -> Result<(Vec<String>, Vec<String>), MidiError> {
    let midi_in = midir::MidiInput::new(CLIENT_NAME)?;
    let midi_out = midir::MidiOutput::new(CLIENT_NAME)?;

    let inputs = midi_in
        .ports()
        .iter()
        .map(|p| midi_in.port_name(p).unwrap_or_default())
        .collect();
    let outputs = midi_out
        .ports()
        .iter()
        .map(|p| midi_out.port_name(p).unwrap_or_default())
        .collect();

    Ok((inputs, outputs))
}

/// Port whose name contains `device`, the first one if `device` is empty.
fn find_port<P: Clone>(ports: &[P], name_of: impl Fn(&P) -> String, device: &str) -> Option<P> {
    ports
        .iter()
        .find(|p| name_of(p).contains(device))
        .cloned()
}
