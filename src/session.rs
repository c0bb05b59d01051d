use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::bar::{Sequence, Subdivision};
use crate::clock::{TapTempo, TempoClock, note_interval};
use crate::sequencer::{BeatEvent, BeatSequencer, SequencerState};

/// Consumer of classified ticks (audio, display, tests)
pub trait BeatSink: Send + 'static {
    fn beat(&mut self, event: &BeatEvent);
}

struct Shared<S> {
    sequence: Sequence,
    tempo: f64,
    sequencer: BeatSequencer,
    sink: S,
}

impl<S: BeatSink> Shared<S> {
    /// Advance one tick and report how long its note lasts
    fn tick(&mut self) -> Option<Duration> {
        let event = self.sequencer.advance(&self.sequence);
        self.sink.beat(&event);

        let played = self.sequence.bars()[event.bar_index];
        note_interval(self.tempo, played.subdivision).ok()
    }

    fn upcoming_subdivision(&self) -> Subdivision {
        let index = self.sequencer.upcoming_bar(&self.sequence);
        self.sequence.bars()[index].subdivision
    }
}

/// The commands a front end sends to the metronome.
///
/// Ticks run on the clock thread and commands on the caller's thread; both
/// take the same lock, which is never held while the clock stops.
pub struct Metronome<S> {
    shared: Arc<Mutex<Shared<S>>>,
    clock: TempoClock,
    taps: TapTempo,
}

impl<S: BeatSink> Metronome<S> {
    pub fn new(sequence: Sequence, tempo: f64, sink: S) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                sequence,
                tempo,
                sequencer: BeatSequencer::new(),
                sink,
            })),
            clock: TempoClock::new(),
            taps: TapTempo::default(),
        }
    }

    pub fn with_tap_tempo(mut self, taps: TapTempo) -> Self {
        self.taps = taps;
        self
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_running()
    }

    pub fn tempo(&self) -> f64 {
        self.shared.lock().tempo
    }

    pub fn sequence(&self) -> Sequence {
        self.shared.lock().sequence.clone()
    }

    pub fn position(&self) -> SequencerState {
        self.shared.lock().sequencer.position()
    }

    /// Run `f` against the sink while no tick can interleave
    #[cfg(test)]
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.shared.lock().sink)
    }

    /// Start from bar 0 when stopped; stop when playing
    pub fn on_start_stop(&mut self) {
        if self.clock.is_running() {
            self.clock.stop();
            self.shared.lock().sequencer.reset();
            log::debug!("playback stopped");
        } else {
            self.shared.lock().sequencer.reset();
            self.schedule(false);
            if !self.clock.is_running() {
                log::debug!("playback not started at {} bpm", self.tempo());
            }
        }
    }

    /// Takes effect immediately while playing; never starts playback
    pub fn on_tempo_changed(&mut self, bpm: f64) {
        self.shared.lock().tempo = bpm;
        if self.clock.is_running() {
            self.schedule(true);
            if !self.clock.is_running() {
                // A non-positive tempo while playing leaves nothing to schedule.
                self.shared.lock().sequencer.reset();
            }
        }
    }

    /// Replace the bar list; read on the next tick. While playing, a new
    /// subdivision for the upcoming bar restarts the clock at once.
    pub fn on_bars_changed(&mut self, sequence: Sequence) {
        let resubdivided = {
            let mut shared = self.shared.lock();
            let before = shared.upcoming_subdivision();
            shared.sequence = sequence;
            before != shared.upcoming_subdivision()
        };
        if resubdivided && self.clock.is_running() {
            log::debug!("upcoming bar changed subdivision, restarting clock");
            self.schedule(true);
        }
    }

    /// Returns the tempo derived from this tap, if any
    pub fn on_tap(&mut self, now: Instant) -> Option<f64> {
        let bpm = self.taps.tap(now)?;
        self.on_tempo_changed(bpm);
        Some(bpm)
    }

    fn schedule(&mut self, restart: bool) {
        let (tempo, subdivision) = {
            let shared = self.shared.lock();
            (shared.tempo, shared.upcoming_subdivision())
        };
        let shared = Arc::clone(&self.shared);
        let on_tick = move || shared.lock().tick();
        if restart {
            self.clock.restart(tempo, subdivision, on_tick);
        } else {
            self.clock.start(tempo, subdivision, on_tick);
        }
    }
}

impl<S> Drop for Metronome<S> {
    fn drop(&mut self) {
        self.clock.stop();
    }
}
