use crate::bar::Sequence;

/// What a single tick turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatEvent {
    /// First beat of a bar
    pub accent: bool,
    /// 1-indexed beat within the bar
    pub beat_in_bar: u32,
    /// 1-indexed pass through the bar
    pub repetition: u64,
    /// Index of the bar this tick belongs to
    pub bar_index: usize,
    /// This tick finished the bar's last repeat; the next tick starts the following bar
    pub bar_completed: bool,
}

/// Where the sequencer currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequencerState {
    pub bar_index: usize,
    /// Ticks played in the current bar minus one; `None` until the first tick
    pub beats_elapsed: Option<u64>,
}

/// Position across a bar sequence. Holds no copy of the bars: each
/// `advance` reads the sequence it is handed.
#[derive(Debug, Default)]
pub struct BeatSequencer {
    state: SequencerState,
}

impl BeatSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to bar 0, before its first beat
    pub fn reset(&mut self) {
        self.state = SequencerState::default();
    }

    pub fn position(&self) -> SequencerState {
        self.state
    }

    /// Index of the bar the next tick will belong to
    pub fn upcoming_bar(&self, sequence: &Sequence) -> usize {
        if self.state.bar_index < sequence.len() {
            self.state.bar_index
        } else {
            0
        }
    }

    /// Classify the next tick and move the position on
    pub fn advance(&mut self, sequence: &Sequence) -> BeatEvent {
        debug_assert!(!sequence.is_empty(), "sequence must hold at least one bar");

        // The sequence may have shrunk since the last tick.
        if self.state.bar_index >= sequence.len() {
            log::trace!("bar {} no longer exists, back to bar 0", self.state.bar_index);
            self.state.bar_index = 0;
        }

        let elapsed = self.state.beats_elapsed.map_or(0, |n| n + 1);
        self.state.beats_elapsed = Some(elapsed);

        let bar_index = self.state.bar_index;
        let bar = sequence.bars()[bar_index];
        let beats = u64::from(bar.beats_per_bar);
        let in_bar = elapsed % beats;

        // `>=` rather than `==` so a bar shortened mid-play still hands over.
        let bar_completed = sequence.len() > 1 && elapsed + 1 >= bar.total_beats();
        if bar_completed {
            self.state.bar_index = (bar_index + 1) % sequence.len();
            self.state.beats_elapsed = None;
            log::trace!("bar {} done, next bar {}", bar_index, self.state.bar_index);
        }

        BeatEvent {
            accent: in_bar == 0,
            beat_in_bar: in_bar as u32 + 1,
            repetition: elapsed / beats + 1,
            bar_index,
            bar_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::{BarSpec, Subdivision};
    use pretty_assertions::assert_eq;

    fn bar(beats: u32, repeat: u32) -> BarSpec {
        BarSpec::new(beats, Subdivision::Quarter, repeat).unwrap()
    }

    fn run(seq: &Sequence, ticks: usize) -> Vec<BeatEvent> {
        let mut sequencer = BeatSequencer::new();
        (0..ticks).map(|_| sequencer.advance(seq)).collect()
    }

    #[test]
    fn test_single_bar_accents_first_beat() {
        let seq = Sequence::single(bar(4, 1));
        let events = run(&seq, 12);

        let accents: Vec<bool> = events.iter().map(|e| e.accent).collect();
        assert_eq!(
            accents,
            [true, false, false, false].repeat(3)
        );
        let beats: Vec<u32> = events.iter().map(|e| e.beat_in_bar).collect();
        assert_eq!(beats, [1, 2, 3, 4].repeat(3));
        assert!(events.iter().all(|e| e.bar_index == 0 && !e.bar_completed));
        assert_eq!(events[11].repetition, 3);
    }

    #[test]
    fn test_two_bars_with_repeats() {
        let seq = Sequence::new(vec![bar(3, 2), bar(4, 1)]).unwrap();
        let events = run(&seq, 11);

        let bars: Vec<usize> = events.iter().map(|e| e.bar_index).collect();
        assert_eq!(bars, vec![0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 0]);

        let beats: Vec<u32> = events.iter().map(|e| e.beat_in_bar).collect();
        assert_eq!(beats, vec![1, 2, 3, 1, 2, 3, 1, 2, 3, 4, 1]);

        let reps: Vec<u64> = events.iter().map(|e| e.repetition).collect();
        assert_eq!(reps, vec![1, 1, 1, 2, 2, 2, 1, 1, 1, 1, 1]);

        let completed: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.bar_completed)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(completed, vec![5, 9]);
        assert!(events[10].accent);
    }

    #[test]
    fn test_reset_starts_at_bar_zero_beat_one() {
        let seq = Sequence::new(vec![bar(2, 1), bar(5, 1)]).unwrap();
        let mut sequencer = BeatSequencer::new();
        for _ in 0..4 {
            sequencer.advance(&seq);
        }
        assert_eq!(sequencer.position().bar_index, 1);

        sequencer.reset();
        assert_eq!(sequencer.position(), SequencerState::default());

        let event = sequencer.advance(&seq);
        assert_eq!(event.beat_in_bar, 1);
        assert!(event.accent);
        assert_eq!(event.bar_index, 0);
    }

    #[test]
    fn test_sentinel_distinguishes_not_started() {
        let seq = Sequence::single(bar(4, 1));
        let mut sequencer = BeatSequencer::new();
        assert_eq!(sequencer.position().beats_elapsed, None);
        sequencer.advance(&seq);
        assert_eq!(sequencer.position().beats_elapsed, Some(0));
    }

    #[test]
    fn test_shrunk_sequence_wraps_to_first_bar() {
        let long = Sequence::new(vec![bar(1, 1), bar(1, 1), bar(1, 1)]).unwrap();
        let mut sequencer = BeatSequencer::new();
        sequencer.advance(&long);
        sequencer.advance(&long);
        assert_eq!(sequencer.position().bar_index, 2);

        let short = Sequence::new(vec![bar(3, 1), bar(2, 1)]).unwrap();
        assert_eq!(sequencer.upcoming_bar(&short), 0);
        let event = sequencer.advance(&short);
        assert_eq!(event.bar_index, 0);
        assert!(event.accent);
    }

    #[test]
    fn test_shortened_bar_still_hands_over() {
        let seq = Sequence::new(vec![bar(8, 1), bar(2, 1)]).unwrap();
        let mut sequencer = BeatSequencer::new();
        for _ in 0..5 {
            sequencer.advance(&seq);
        }

        let edited = Sequence::new(vec![bar(3, 1), bar(2, 1)]).unwrap();
        let event = sequencer.advance(&edited);
        assert!(event.bar_completed);
        assert_eq!(sequencer.advance(&edited).bar_index, 1);
    }

    #[test]
    fn test_accent_follows_current_bar() {
        let seq = Sequence::new(vec![bar(2, 1), bar(3, 2)]).unwrap();
        let accents: Vec<bool> = run(&seq, 8).iter().map(|e| e.accent).collect();
        assert_eq!(
            accents,
            vec![true, false, true, false, false, true, false, false]
        );
    }
}
