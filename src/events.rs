pub const TIMING_CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;

/// Transport messages received from the clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Tick,
    Start,
    Continue,
    Stop,
}

impl ClockEvent {
    /// Realtime messages only; everything else is not a clock event.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes.first()? {
            &TIMING_CLOCK => Some(ClockEvent::Tick),
            &START => Some(ClockEvent::Start),
            &CONTINUE => Some(ClockEvent::Continue),
            &STOP => Some(ClockEvent::Stop),
            _ => None,
        }
    }
}

/// Channel voice messages sent to instruments. Channels are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiMessage {
    pub fn to_bytes(self) -> [u8; 3] {
        match self {
            MidiMessage::NoteOn {
                channel,
                pitch,
                velocity,
            } => [0x90 | status_channel(channel), pitch & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff { channel, pitch } => {
                [0x80 | status_channel(channel), pitch & 0x7F, 0]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                [0xB0 | status_channel(channel), cc & 0x7F, value & 0x7F]
            }
        }
    }
}

fn status_channel(channel: u8) -> u8 {
    channel.saturating_sub(1) & 0x0F
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_realtime_bytes() {
        assert_eq!(ClockEvent::from_bytes(&[0xF8]), Some(ClockEvent::Tick));
        assert_eq!(ClockEvent::from_bytes(&[0xFA]), Some(ClockEvent::Start));
        assert_eq!(ClockEvent::from_bytes(&[0xFB]), Some(ClockEvent::Continue));
        assert_eq!(ClockEvent::from_bytes(&[0xFC]), Some(ClockEvent::Stop));
        assert_eq!(ClockEvent::from_bytes(&[0x90, 60, 100]), None);
        assert_eq!(ClockEvent::from_bytes(&[]), None);
    }

    #[test]
    fn encodes_channel_messages() {
        let on = MidiMessage::NoteOn {
            channel: 10,
            pitch: 36,
            velocity: 100,
        };
        assert_eq!(on.to_bytes(), [0x99, 36, 100]);

        let off = MidiMessage::NoteOff {
            channel: 1,
            pitch: 36,
        };
        assert_eq!(off.to_bytes(), [0x80, 36, 0]);

        let cc = MidiMessage::ControlChange {
            channel: 16,
            cc: 74,
            value: 64,
        };
        assert_eq!(cc.to_bytes(), [0xBF, 74, 64]);
    }
}
