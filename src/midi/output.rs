use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use midir::{MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::{CLIENT_NAME, MidiError, find_port};
use crate::events::MidiMessage;
use crate::instrument::{InstrumentSink, ModTarget, Rack, RackEntry};
use crate::project::{Instrument, Performance};

/// An open output connection, shared by every sink on that device.
pub struct OutputPort {
    name: String,
    connection: Mutex<MidiOutputConnection>,
}

impl OutputPort {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Failures are logged and dropped.
    pub fn send(&self, message: MidiMessage) {
        let bytes = message.to_bytes();
        if let Err(e) = self.connection.lock().send(&bytes) {
            warn!("failed to send {:02X?} to {}: {}", bytes, self.name, e);
        }
    }
}

type Action = Box<dyn FnOnce() + Send>;

struct Pending {
    due: Instant,
    seq: u64,
    action: Action,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the heap pops the earliest deadline first.
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Runs deferred actions (note-offs) on its own thread so the caller never
/// waits for them. Clones share the same thread, which exits once every
/// clone is dropped and the remaining actions have run.
#[derive(Clone)]
pub struct NoteOffTimer {
    tx: Sender<(Instant, Action)>,
}

impl NoteOffTimer {
    pub fn spawn() -> Self {
        let (tx, rx) = channel::unbounded();
        std::thread::spawn(move || timer_thread(rx));
        Self { tx }
    }

    pub fn schedule(&self, delay: Duration, action: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send((Instant::now() + delay, Box::new(action)));
    }
}

fn timer_thread(rx: Receiver<(Instant, Action)>) {
    let mut queue: BinaryHeap<Pending> = BinaryHeap::new();
    let mut seq = 0;

    loop {
        let received = match queue.peek() {
            Some(next) => {
                let wait = next.due.saturating_duration_since(Instant::now());
                rx.recv_timeout(wait)
            }
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok((due, action)) => {
                seq += 1;
                queue.push(Pending { due, seq, action });
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                while let Some(pending) = queue.pop() {
                    std::thread::sleep(pending.due.saturating_duration_since(Instant::now()));
                    (pending.action)();
                }
                return;
            }
        }

        let now = Instant::now();
        while queue.peek().is_some_and(|p| p.due <= now) {
            if let Some(pending) = queue.pop() {
                (pending.action)();
            }
        }
    }
}

/// Plays on one channel of an output port.
pub struct ChannelSink {
    port: Arc<OutputPort>,
    channel: u8,
    timer: NoteOffTimer,
}

impl ChannelSink {
    pub fn new(port: Arc<OutputPort>, channel: u8, timer: NoteOffTimer) -> Self {
        Self {
            port,
            channel,
            timer,
        }
    }
}

impl InstrumentSink for ChannelSink {
    fn play(&self, pitch: u8, velocity: u8, duration_ms: u64) {
        let channel = self.channel;
        self.port.send(MidiMessage::NoteOn {
            channel,
            pitch,
            velocity,
        });

        let port = self.port.clone();
        self.timer.schedule(Duration::from_millis(duration_ms), move || {
            port.send(MidiMessage::NoteOff { channel, pitch });
        });
    }

    fn control_change(&self, cc: u8, value: u8) {
        self.port.send(MidiMessage::ControlChange {
            channel: self.channel,
            cc,
            value,
        });
    }
}

/// Output connections by configured device name, opened on first use.
pub struct MidiOutputs {
    ports: HashMap<String, Arc<OutputPort>>,
    timer: NoteOffTimer,
}

impl MidiOutputs {
    pub fn new(timer: NoteOffTimer) -> Self {
        Self {
            ports: HashMap::new(),
            timer,
        }
    }

    pub fn open(&mut self, device: &str) -> Result<Arc<OutputPort>, MidiError> {
        if let Some(port) = self.ports.get(device) {
            return Ok(port.clone());
        }

        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let ports = midi_out.ports();
        let port = find_port(&ports, |p| midi_out.port_name(p).unwrap_or_default(), device)
            .ok_or_else(|| MidiError::NoSuchPort {
                direction: "output",
                device: device.to_string(),
            })?;
        let name = midi_out.port_name(&port).unwrap_or_default();

        let connection = midi_out
            .connect(&port, "cmdseq-out")
            .map_err(|e| MidiError::Connect {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        info!("output '{}' -> {}", device, name);
        let port = Arc::new(OutputPort {
            name,
            connection: Mutex::new(connection),
        });
        self.ports.insert(device.to_string(), port.clone());
        Ok(port)
    }

    fn sink(&mut self, device: &str, channel: u8) -> Result<Arc<dyn InstrumentSink>, MidiError> {
        let port = self.open(device)?;
        Ok(Arc::new(ChannelSink::new(port, channel, self.timer.clone())))
    }

    fn entry(&mut self, instrument: &Instrument) -> Result<RackEntry, MidiError> {
        let mut entry = RackEntry::new(self.sink(&instrument.device, instrument.channel)?);

        if let Some(modulation) = &instrument.mod1 {
            entry.mod1 = Some(ModTarget {
                sink: self.sink(&modulation.device, modulation.channel)?,
                cc: modulation.cc,
            });
        }
        if let Some(modulation) = &instrument.mod2 {
            entry.mod2 = Some(ModTarget {
                sink: self.sink(&modulation.device, modulation.channel)?,
                cc: modulation.cc,
            });
        }

        Ok(entry)
    }

    /// Sinks for every instrument of `performance`. Instruments whose device
    /// is missing are left out and stay silent.
    pub fn build_rack(&mut self, performance: &Performance) -> Rack {
        let mut rack = Rack::new();
        for instrument in &performance.instruments {
            match self.entry(instrument) {
                Ok(entry) => rack.insert(instrument.name.clone(), entry),
                Err(e) => warn!("instrument '{}' unavailable: {}", instrument.name, e),
            }
        }
        rack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_runs_actions_in_deadline_order() {
        let (tx, rx) = channel::unbounded();
        let timer = NoteOffTimer::spawn();

        let late = tx.clone();
        timer.schedule(Duration::from_millis(40), move || {
            let _ = late.send("late");
        });
        let early = tx.clone();
        timer.schedule(Duration::from_millis(5), move || {
            let _ = early.send("early");
        });

        let timeout = Duration::from_secs(2);
        assert_eq!(rx.recv_timeout(timeout), Ok("early"));
        assert_eq!(rx.recv_timeout(timeout), Ok("late"));
    }

    #[test]
    fn dropping_timer_flushes_pending_actions() {
        let (tx, rx) = channel::unbounded();
        let timer = NoteOffTimer::spawn();
        timer.schedule(Duration::from_millis(10), move || {
            let _ = tx.send(());
        });
        drop(timer);

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(()));
    }
}
