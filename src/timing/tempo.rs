use std::collections::VecDeque;

/// MIDI clock pulses per quarter note, fixed by the protocol.
pub const MIDI_CLOCK_PPQ: u64 = 24;
const HISTORY: usize = 36;

/// Rolling BPM estimate from the spacing of incoming clock pulses.
#[derive(Debug, Clone, Default)]
pub struct TempoTracker {
    last_tick_us: Option<u64>,
    intervals: VecDeque<u64>,
    bpm: Option<u32>,
}

impl TempoTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bpm(&self) -> Option<u32> {
        self.bpm
    }

    /// Records a pulse at `timestamp_us` and returns the new estimate when
    /// its rounded value changed.
    pub fn tick(&mut self, timestamp_us: u64) -> Option<u32> {
        let last = self.last_tick_us.replace(timestamp_us)?;
        let interval = timestamp_us.checked_sub(last).filter(|d| *d > 0)?;

        self.intervals.push_back(interval);
        if self.intervals.len() > HISTORY {
            self.intervals.pop_front();
        }

        let mean = self.intervals.iter().sum::<u64>() as f64 / self.intervals.len() as f64;
        let beat_us = mean * MIDI_CLOCK_PPQ as f64;
        let bpm = (60_000_000.0 / beat_us).round() as u32;

        if self.bpm == Some(bpm) {
            return None;
        }
        self.bpm = Some(bpm);
        Some(bpm)
    }

    /// Forgets the pulse history, e.g. after the transport stopped.
    pub fn clear(&mut self) {
        self.last_tick_us = None;
        self.intervals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_steady_clock() {
        // 120 BPM: a quarter note every 500 ms, 24 pulses per quarter.
        let interval = 500_000 / MIDI_CLOCK_PPQ;
        let mut tempo = TempoTracker::new();

        assert_eq!(tempo.tick(0), None);
        assert_eq!(tempo.tick(interval), Some(120));
        for i in 2..48 {
            assert_eq!(tempo.tick(i * interval), None);
        }
        assert_eq!(tempo.bpm(), Some(120));
    }

    #[test]
    fn follows_tempo_change() {
        let mut tempo = TempoTracker::new();
        let mut now = 0;
        for _ in 0..40 {
            tempo.tick(now);
            now += 500_000 / MIDI_CLOCK_PPQ;
        }
        for _ in 0..40 {
            tempo.tick(now);
            now += 250_000 / MIDI_CLOCK_PPQ;
        }
        assert_eq!(tempo.bpm(), Some(240));
    }

    #[test]
    fn ignores_out_of_order_timestamps() {
        let mut tempo = TempoTracker::new();
        tempo.tick(1_000);
        assert_eq!(tempo.tick(500), None);
        assert_eq!(tempo.bpm(), None);
    }
}
