use std::io::{self, Write};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};

use crate::bar::{BarSpec, Sequence};
use crate::clock::{TapTempo, interval_millis};
use crate::sequencer::BeatEvent;
use crate::session::{BeatSink, Metronome};
use crate::synth::{AudioEngine, Beep, Waveform};

/// Settings the live mode starts with
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub sequence: Sequence,
    pub tempo: f64,
    pub volume: f32,
    pub waveform: Waveform,
    pub taps: TapTempo,
}

/// Sends each beat to the audio thread and to the screen
struct LiveSink {
    beeps: mpsc::Sender<Beep>,
    display: mpsc::Sender<BeatEvent>,
    volume: f32,
    waveform: Waveform,
}

impl BeatSink for LiveSink {
    fn beat(&mut self, event: &BeatEvent) {
        let beep = Beep {
            accented: event.accent,
            volume: self.volume,
            waveform: self.waveform,
        };
        if self.beeps.send(beep).is_err() {
            log::warn!("audio thread gone, beat {} not played", event.beat_in_bar);
        }
        if self.display.send(*event).is_err() {
            log::warn!("display gone, beat {} not shown", event.beat_in_bar);
        }
    }
}

const MIN_TEMPO: f64 = 1.0;

/// Run the interactive metronome until Esc or q
pub fn run(config: LiveConfig) -> anyhow::Result<()> {
    let engine = AudioEngine::new()?;
    let (display_tx, display_rx) = mpsc::channel::<BeatEvent>();
    let sink = LiveSink {
        beeps: engine.sender(),
        display: display_tx,
        volume: config.volume,
        waveform: config.waveform,
    };
    let mut metronome =
        Metronome::new(config.sequence, config.tempo, sink).with_tap_tempo(config.taps);

    let mut stdout = io::stdout();

    terminal::enable_raw_mode().context("failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("alternate screen")?;

    print_banner(&mut stdout);
    let mut screen = Screen::default();
    screen.draw(&mut stdout, &metronome);

    let result = event_loop(&mut metronome, &mut stdout, &display_rx, &mut screen);

    // Silence before tearing the terminal down.
    if metronome.is_playing() {
        metronome.on_start_stop();
    }
    drop(metronome);

    let _ = execute!(stdout, LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();

    result
}

fn event_loop(
    metronome: &mut Metronome<LiveSink>,
    stdout: &mut io::Stdout,
    beats: &mpsc::Receiver<BeatEvent>,
    screen: &mut Screen,
) -> anyhow::Result<()> {
    loop {
        let mut redraw = false;
        while let Ok(beat) = beats.try_recv() {
            screen.last_beat = Some(beat);
            redraw = true;
        }
        if redraw {
            screen.draw(stdout, metronome);
        }

        if !event::poll(Duration::from_millis(15)).context("event poll error")? {
            continue;
        }

        let key = match event::read().context("event read error")? {
            Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            }) => code,
            _ => continue,
        };

        screen.message = None;
        match key {
            KeyCode::Esc | KeyCode::Char('q') => return Ok(()),
            KeyCode::Char(' ') => {
                metronome.on_start_stop();
                if !metronome.is_playing() {
                    screen.last_beat = None;
                }
            }
            KeyCode::Char('t') => {
                if metronome.on_tap(Instant::now()).is_none() {
                    screen.message = Some("tap again to set the tempo".into());
                }
            }
            KeyCode::Char('+') | KeyCode::Char('=') => nudge(metronome, 1.0),
            KeyCode::Char('-') => nudge(metronome, -1.0),
            KeyCode::Up => nudge(metronome, 5.0),
            KeyCode::Down => nudge(metronome, -5.0),
            KeyCode::Char('a') => {
                let mut sequence = metronome.sequence();
                if sequence.duplicate(sequence.len() - 1).is_ok() {
                    metronome.on_bars_changed(sequence);
                }
            }
            KeyCode::Char(']') => edit_last_bar(metronome, |bar| {
                bar.subdivision = bar.subdivision.faster()?;
                Some(())
            }),
            KeyCode::Char('[') => edit_last_bar(metronome, |bar| {
                bar.subdivision = bar.subdivision.slower()?;
                Some(())
            }),
            KeyCode::Char('.') => edit_last_bar(metronome, |bar| {
                bar.beats_per_bar = bar.beats_per_bar.checked_add(1)?;
                Some(())
            }),
            KeyCode::Char(',') => edit_last_bar(metronome, |bar| {
                bar.beats_per_bar = bar.beats_per_bar.checked_sub(1).filter(|&n| n > 0)?;
                Some(())
            }),
            KeyCode::Char('r') => {
                let mut sequence = metronome.sequence();
                match sequence.remove(sequence.len() - 1) {
                    Ok(_) => metronome.on_bars_changed(sequence),
                    Err(e) => screen.message = Some(e.to_string()),
                }
            }
            _ => continue,
        }
        screen.draw(stdout, metronome);
    }
}

/// Apply `change` to the last bar; a `None` leaves the bars as they were
fn edit_last_bar(
    metronome: &mut Metronome<LiveSink>,
    change: impl FnOnce(&mut BarSpec) -> Option<()>,
) {
    let mut sequence = metronome.sequence();
    let last = sequence.len() - 1;
    let mut bar = sequence.bars()[last];
    if change(&mut bar).is_some() && sequence.replace(last, bar).is_ok() {
        metronome.on_bars_changed(sequence);
    }
}

fn nudge(metronome: &mut Metronome<LiveSink>, delta: f64) {
    let tempo = (metronome.tempo() + delta).max(MIN_TEMPO);
    metronome.on_tempo_changed(tempo.round());
}

fn print_banner(stdout: &mut io::Stdout) {
    let banner = "\x1b[2J\x1b[H\
climetro - live metronome\r\n\
─────────────────────────────────────────\r\n\
\r\n\
  Start / stop:   space\r\n\
  Tap tempo:      t\r\n\
  Tempo:          + / -  (Up / Down: 5 bpm)\r\n\
  Bars:           a  copy last bar    r  remove last bar\r\n\
  Last bar:       [ / ]  note value   , / .  beats\r\n\
  Quit:           Esc or q\r\n\
\r\n";
    let _ = write!(stdout, "{}", banner);
}

#[derive(Default)]
struct Screen {
    last_beat: Option<BeatEvent>,
    message: Option<String>,
}

impl Screen {
    fn draw(&self, stdout: &mut io::Stdout, metronome: &Metronome<LiveSink>) {
        let tempo = metronome.tempo();
        let sequence = metronome.sequence();
        let first = sequence.first();
        let interval = interval_millis(tempo, first.subdivision.value())
            .map(|ms| format!("{:.0} ms", ms))
            .unwrap_or_else(|_| "---".to_string());

        let state = if metronome.is_playing() { "playing" } else { "stopped" };
        let position = match self.last_beat {
            Some(beat) => format_beat(&beat, &sequence),
            None => format!(
                "Ready at bar {}/{}",
                metronome.position().bar_index + 1,
                sequence.len()
            ),
        };

        let _ = write!(
            stdout,
            "\x1b[12;1H\x1b[2K  Tempo: {:.0} bpm ({})  |  {}\r\n\x1b[2K  Bars: {}\r\n\x1b[2K  {}\r\n\x1b[2K  {}\r",
            tempo,
            interval,
            state,
            sequence,
            position,
            self.message.as_deref().unwrap_or(""),
        );
        let _ = stdout.flush();
    }
}

fn format_beat(beat: &BeatEvent, sequence: &Sequence) -> String {
    let marker = if beat.accent { "●" } else { "○" };
    let repeats = sequence
        .get(beat.bar_index)
        .filter(|_| sequence.len() > 1)
        .map(|bar| format!("/{}", bar.repeat_count))
        .unwrap_or_default();
    format!(
        "{}  Bar {}/{}  pass {}{}  beat {}",
        marker,
        beat.bar_index + 1,
        sequence.len(),
        beat.repetition,
        repeats,
        beat.beat_in_bar
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_bars;
    use pretty_assertions::assert_eq;

    fn beat(bar_index: usize, repetition: u64, beat_in_bar: u32) -> BeatEvent {
        BeatEvent {
            accent: beat_in_bar == 1,
            beat_in_bar,
            repetition,
            bar_index,
            bar_completed: false,
        }
    }

    #[test]
    fn test_format_beat_in_sequence() {
        let seq = parse_bars("3/4*2 5/8").unwrap();
        assert_eq!(format_beat(&beat(0, 2, 1), &seq).as_str(), "●  Bar 1/2  pass 2/2  beat 1");
        assert_eq!(format_beat(&beat(1, 1, 4), &seq).as_str(), "○  Bar 2/2  pass 1/1  beat 4");
    }

    #[test]
    fn test_sink_survives_closed_channels() {
        let (beeps, beep_rx) = mpsc::channel();
        let (display, display_rx) = mpsc::channel();
        drop(beep_rx);
        drop(display_rx);
        let mut sink = LiveSink {
            beeps,
            display,
            volume: 0.5,
            waveform: Waveform::Sine,
        };
        sink.beat(&beat(0, 1, 1));
    }

    #[test]
    fn test_format_beat_single_bar() {
        let seq = parse_bars("4/4").unwrap();
        assert_eq!(format_beat(&beat(0, 7, 3), &seq).as_str(), "○  Bar 1/1  pass 7  beat 3");
    }
}
