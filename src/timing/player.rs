use super::{NoteEvent, Sequence};

/// Playback position of one track. Owned by the scheduler, one per track
/// name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepPlayer {
    pub step_index: usize,
    pub loop_count: usize,
    pub start_count: usize,
}

impl StepPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Starts a fresh pass on the next sequence of the track's play list.
    pub fn launch(&mut self) {
        self.loop_count += 1;
        self.step_index = 0;
        self.start_count = 0;
    }

    /// Steps through `sequence` on every `ppq / rate`th tick.
    ///
    /// With `should_loop` unset the player stops after one full pass and
    /// only consumes ticks until it is launched again. Returns the note to
    /// emit, if the current step is not a rest.
    pub fn advance<'a>(
        &mut self,
        clock_count: u64,
        ppq: u32,
        sequence: &'a Sequence,
        should_loop: bool,
    ) -> Option<&'a NoteEvent> {
        if clock_count % sequence.clock_divisor(ppq) != 0 {
            return None;
        }

        if !should_loop && self.start_count != 0 {
            return None;
        }

        let length = sequence.len();
        if length == 0 {
            return None;
        }

        let current = self.step_index % length;
        let event = sequence.steps[current].as_ref();

        self.step_index = (current + 1) % length;
        if self.step_index == 0 {
            self.loop_count += 1;
            self.start_count += 1;
        }

        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_step(length: usize, rate: u32) -> Sequence {
        Sequence::new("all", rate, vec![Some(NoteEvent::new(60, 100)); length])
    }

    #[test]
    fn fires_every_divisor_ticks() {
        let seq = every_step(4, 4);
        let mut player = StepPlayer::new();

        let fired: Vec<u64> = (0..48)
            .filter(|tick| player.advance(*tick, 48, &seq, true).is_some())
            .collect();

        assert_eq!(fired, vec![0, 12, 24, 36]);
    }

    #[test]
    fn full_pass_bumps_counters_once() {
        let seq = every_step(4, 4);
        let mut player = StepPlayer::new();

        for tick in 0..48 {
            player.advance(tick, 48, &seq, true);
        }

        assert_eq!(
            player,
            StepPlayer {
                step_index: 0,
                loop_count: 1,
                start_count: 1,
            }
        );
    }

    #[test]
    fn rests_advance_without_firing() {
        let seq = Sequence::new("gap", 4, vec![Some(NoteEvent::new(60, 100)), None]);
        let mut player = StepPlayer::new();

        assert!(player.advance(0, 4, &seq, true).is_some());
        assert!(player.advance(1, 4, &seq, true).is_none());
        assert_eq!(player.step_index, 0);
        assert_eq!(player.loop_count, 1);
    }

    #[test]
    fn one_shot_stops_after_a_pass_until_launched() {
        let seq = every_step(2, 4);
        let mut player = StepPlayer::new();

        assert!(player.advance(0, 4, &seq, false).is_some());
        assert!(player.advance(1, 4, &seq, false).is_some());
        for tick in 2..10 {
            assert!(player.advance(tick, 4, &seq, false).is_none());
        }
        assert_eq!(player.start_count, 1);

        player.launch();
        assert_eq!(player.loop_count, 2);
        assert!(player.advance(10, 4, &seq, false).is_some());
    }

    #[test]
    fn step_index_wraps_to_shorter_sequence() {
        let long = every_step(8, 4);
        let short = every_step(3, 4);
        let mut player = StepPlayer::new();

        for tick in 0..5 {
            player.advance(tick, 4, &long, true);
        }
        assert_eq!(player.step_index, 5);

        assert!(player.advance(5, 4, &short, true).is_some());
        assert_eq!(player.step_index, 0);
    }

    #[test]
    fn reset_is_idempotent() {
        let seq = every_step(3, 4);
        let mut player = StepPlayer::new();
        for tick in 0..7 {
            player.advance(tick, 4, &seq, true);
        }

        player.reset();
        let once = player;
        player.reset();

        assert_eq!(player, once);
        assert_eq!(player, StepPlayer::default());
    }
}
