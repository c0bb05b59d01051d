use std::ops::RangeInclusive;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::bar::Subdivision;
use crate::error::{Error, Result};

fn check_tempo(bpm: f64) -> Result<f64> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(bpm)
    } else {
        Err(Error::InvalidTempo(bpm))
    }
}

/// Milliseconds between ticks for `bpm` quarter notes per minute
/// counted in `subdivision` notes (given as 1, 2, 4, 8, 16 or 32).
pub fn interval_millis(bpm: f64, subdivision: u32) -> Result<f64> {
    let subdivision = Subdivision::from_value(subdivision)?;
    let bpm = check_tempo(bpm)?;
    Ok(60_000.0 / (bpm * subdivision.rate()))
}

/// Typed form of [`interval_millis`] for the timer
pub fn note_interval(bpm: f64, subdivision: Subdivision) -> Result<Duration> {
    let bpm = check_tempo(bpm)?;
    Ok(Duration::from_secs_f64(60.0 / (bpm * subdivision.rate())))
}

struct Running {
    // Dropping the sender wakes the worker and ends it.
    cancel: Sender<()>,
    worker: JoinHandle<()>,
}

/// Fires a callback every tick interval on its own thread.
///
/// The callback may return `Some(interval)` to change the wait before the
/// following tick.
#[derive(Default)]
pub struct TempoClock {
    running: Option<Running>,
}

impl TempoClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Tick once right away, then every interval. Does nothing when the
    /// tempo is not positive or the clock is already running.
    pub fn start<F>(&mut self, bpm: f64, subdivision: Subdivision, mut on_tick: F)
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        if self.running.is_some() {
            log::debug!("clock already running, start ignored");
            return;
        }
        let interval = match note_interval(bpm, subdivision) {
            Ok(interval) => interval,
            Err(e) => {
                log::debug!("not starting clock: {}", e);
                return;
            }
        };

        let next = on_tick().unwrap_or(interval);
        let (cancel, cancelled) = mpsc::channel::<()>();
        let worker = thread::spawn(move || {
            let mut interval = next;
            let mut deadline = Instant::now() + interval;
            loop {
                let wait = deadline.saturating_duration_since(Instant::now());
                match cancelled.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some(changed) = on_tick() {
                            interval = changed;
                        }
                        deadline += interval;
                        // Fell a whole tick behind: skip ahead rather than burst.
                        let now = Instant::now();
                        if deadline < now {
                            deadline = now + interval;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        log::debug!(
            "clock started: {:.1} bpm in 1/{} notes, {:.1} ms",
            bpm,
            subdivision.value(),
            interval.as_secs_f64() * 1000.0
        );
        self.running = Some(Running { cancel, worker });
    }

    /// Cancel the trigger and wait for its thread to finish
    pub fn stop(&mut self) {
        if let Some(Running { cancel, worker }) = self.running.take() {
            drop(cancel);
            if worker.join().is_err() {
                log::error!("clock thread panicked");
            }
            log::debug!("clock stopped");
        }
    }

    pub fn restart<F>(&mut self, bpm: f64, subdivision: Subdivision, on_tick: F)
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        self.stop();
        self.start(bpm, subdivision, on_tick);
    }
}

impl Drop for TempoClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tempo implied by two taps
pub fn bpm_between(prev: Instant, now: Instant) -> Option<f64> {
    let secs = now.checked_duration_since(prev)?.as_secs_f64();
    let bpm = 60.0 / secs;
    bpm.is_finite().then_some(bpm)
}

/// Derives a tempo from the gap between consecutive taps
#[derive(Debug, Clone)]
pub struct TapTempo {
    last_tap: Option<Instant>,
    range: RangeInclusive<f64>,
}

impl TapTempo {
    pub fn new(range: RangeInclusive<f64>) -> Self {
        Self {
            last_tap: None,
            range,
        }
    }

    /// Register a tap. The first tap only arms the tracker.
    pub fn tap(&mut self, now: Instant) -> Option<f64> {
        let prev = self.last_tap.replace(now)?;
        let bpm = bpm_between(prev, now)?;
        Some(bpm.clamp(*self.range.start(), *self.range.end()))
    }
}

impl Default for TapTempo {
    fn default() -> Self {
        Self::new(30.0..=300.0)
    }
}
