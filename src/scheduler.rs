use crate::bar::Sequence;
use crate::clock::interval_millis;
use crate::error::Result;
use crate::sequencer::{BeatEvent, BeatSequencer};

/// One scheduled tick: at this offset, this beat.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBeat {
    /// Milliseconds after the first tick
    pub at_millis: f64,
    pub event: BeatEvent,
}

/// The first `ticks` ticks of `sequence` at `bpm`, each bar timed by its own subdivision.
pub fn build_schedule(sequence: &Sequence, bpm: f64, ticks: usize) -> Result<Vec<ScheduledBeat>> {
    let mut sequencer = BeatSequencer::new();
    let mut beats = Vec::with_capacity(ticks);
    let mut at_millis = 0.0_f64;

    for _ in 0..ticks {
        let event = sequencer.advance(sequence);
        let bar = sequence.bars()[event.bar_index];
        let interval = interval_millis(bpm, bar.subdivision.value())?;
        beats.push(ScheduledBeat { at_millis, event });
        at_millis += interval;
    }

    Ok(beats)
}
