use anyhow::Context;
use clap::ValueEnum;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;

/// Pitch of an ordinary beat
pub const LOW_HZ: f64 = 880.0;
/// Pitch of the first beat of a bar
pub const HIGH_HZ: f64 = 1760.0;
/// Length of one beep in seconds
pub const BEEP_SECS: f64 = 0.1;
/// Level the decay ramps down to by the end of a beep
const DECAY_FLOOR: f64 = 0.00001;

/// Oscillator shape of the beep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// One sample at `phase` (in cycles, wrapped to 0..1), range -1..=1
    pub fn sample(self, phase: f64) -> f64 {
        let phase = phase.fract();
        match self {
            Waveform::Sine => (phase * 2.0 * std::f64::consts::PI).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        }
    }
}

/// A beep for the audio thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beep {
    pub accented: bool,
    pub volume: f32,
    pub waveform: Waveform,
}

impl Beep {
    pub fn frequency(&self) -> f64 {
        if self.accented { HIGH_HZ } else { LOW_HZ }
    }
}

/// One beep being rendered
struct Voice {
    waveform: Waveform,
    step: f64,
    phase: f64,
    gain: f64,
    decay: f64,
    samples_remaining: usize,
}

impl Voice {
    fn new(beep: Beep, sample_rate: f64) -> Self {
        let samples = (BEEP_SECS * sample_rate).max(1.0) as usize;
        let volume = f64::from(beep.volume.clamp(0.0, 1.0));
        // Per-sample factor taking the gain from `volume` to the floor.
        let decay = if volume > DECAY_FLOOR {
            (DECAY_FLOOR / volume).powf(1.0 / samples as f64)
        } else {
            1.0
        };
        Self {
            waveform: beep.waveform,
            step: beep.frequency() / sample_rate,
            phase: 0.0,
            gain: volume,
            decay,
            samples_remaining: samples,
        }
    }

    fn next_sample(&mut self) -> Option<f32> {
        if self.samples_remaining == 0 {
            return None;
        }
        let value = self.waveform.sample(self.phase) * self.gain;
        self.phase = (self.phase + self.step).fract();
        self.gain *= self.decay;
        self.samples_remaining -= 1;
        Some(value as f32)
    }
}

/// Output stream that plays beeps sent to it.
///
/// The stream lives as long as the engine; hand [`AudioEngine::sender`]
/// to whichever thread produces beeps.
pub struct AudioEngine {
    _stream: cpal::Stream,
    beeps: mpsc::Sender<Beep>,
}

impl AudioEngine {
    /// Open the default output device
    pub fn new() -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no output audio device available")?;

        let config = device
            .default_output_config()
            .context("failed to get default output config")?;

        let sample_rate = config.sample_rate() as f64;
        let channels = usize::from(config.channels()).max(1);

        let (beeps, incoming) = mpsc::channel::<Beep>();
        let mut voice: Option<Voice> = None;

        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // A new beep cuts off whatever is still ringing.
                    while let Ok(beep) = incoming.try_recv() {
                        voice = Some(Voice::new(beep, sample_rate));
                    }

                    for frame in data.chunks_mut(channels) {
                        let value = match voice.as_mut().and_then(Voice::next_sample) {
                            Some(value) => value,
                            None => {
                                voice = None;
                                0.0
                            }
                        };
                        for sample in frame.iter_mut() {
                            *sample = value;
                        }
                    }
                },
                move |err| {
                    log::error!("audio stream error: {}", err);
                },
                None,
            )
            .context("failed to build output stream")?;

        stream.play().context("failed to play stream")?;
        log::debug!("audio output open: {} Hz, {} channel(s)", sample_rate, channels);

        Ok(Self {
            _stream: stream,
            beeps,
        })
    }

    pub fn sender(&self) -> mpsc::Sender<Beep> {
        self.beeps.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beep(accented: bool, volume: f32) -> Beep {
        Beep {
            accented,
            volume,
            waveform: Waveform::Sine,
        }
    }

    #[test]
    fn test_accent_is_an_octave_up() {
        assert_eq!(beep(false, 0.5).frequency(), 880.0);
        assert_eq!(beep(true, 0.5).frequency(), 1760.0);
    }

    #[test]
    fn test_waveform_shapes() {
        assert!(Waveform::Sine.sample(0.0).abs() < 1e-12);
        assert!((Waveform::Sine.sample(0.25) - 1.0).abs() < 1e-12);
        assert_eq!(Waveform::Square.sample(0.1), 1.0);
        assert_eq!(Waveform::Square.sample(0.6), -1.0);
        assert_eq!(Waveform::Sawtooth.sample(0.0), -1.0);
        assert_eq!(Waveform::Sawtooth.sample(0.5), 0.0);
        assert_eq!(Waveform::Triangle.sample(0.5), 1.0);
        assert_eq!(Waveform::Triangle.sample(0.0), -1.0);
        assert_eq!(Waveform::Triangle.sample(1.25), Waveform::Triangle.sample(0.25));
    }

    #[test]
    fn test_voice_length_and_decay() {
        let mut voice = Voice::new(beep(true, 1.0), 48_000.0);
        let samples: Vec<f32> = std::iter::from_fn(|| voice.next_sample()).collect();
        assert_eq!(samples.len(), 4_800);

        let peak = |s: &[f32]| s.iter().fold(0.0f32, |acc, x| acc.max(x.abs()));
        assert!(peak(&samples[..100]) > 0.9);
        assert!(peak(&samples[4_700..]) < 0.001);
    }

    #[test]
    fn test_silent_voice() {
        let mut voice = Voice::new(beep(false, 0.0), 44_100.0);
        assert!(std::iter::from_fn(|| voice.next_sample()).all(|s| s == 0.0));
    }

    #[test]
    fn test_waveform_names() {
        assert_eq!(Waveform::from_str("sawtooth", true), Ok(Waveform::Sawtooth));
        assert!(Waveform::from_str("noise", true).is_err());
    }
}
