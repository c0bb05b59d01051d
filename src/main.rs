mod bar;
mod clock;
mod error;
mod parser;
mod repl;
mod scheduler;
mod sequencer;
mod session;
mod synth;

use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use crate::bar::Sequence;
use crate::clock::TapTempo;
use crate::synth::Waveform;

#[derive(Parser)]
#[command(name = "climetro", about = "Command-line metronome with bar sequences")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the metronome interactively
    Play {
        #[command(flatten)]
        bars: BarArgs,

        /// Beep volume (0.0 to 1.0)
        #[arg(long)]
        volume: Option<f32>,

        /// Beep waveform
        #[arg(long, value_enum)]
        waveform: Option<Waveform>,

        /// Slowest tempo tap tempo will set (BPM)
        #[arg(long, default_value_t = 30.0)]
        tap_min: f64,

        /// Fastest tempo tap tempo will set (BPM)
        #[arg(long, default_value_t = 300.0)]
        tap_max: f64,
    },

    /// Print the beats a sequence plays, without sound
    Count {
        #[command(flatten)]
        bars: BarArgs,

        /// Number of ticks to print
        #[arg(long, default_value_t = 16)]
        ticks: usize,
    },

    /// Print the time between ticks
    Interval {
        /// Tempo in quarter notes per minute
        #[arg(long)]
        tempo: f64,

        /// Note value of one tick (1, 2, 4, 8, 16 or 32)
        #[arg(long, default_value_t = 4)]
        subdivision: u32,
    },
}

#[derive(Args)]
struct BarArgs {
    /// Path to a .bars file
    #[arg(long)]
    file: Option<PathBuf>,

    /// Bars to play, e.g. "4/4*2 3/8" (overrides the file)
    #[arg(long)]
    bars: Option<String>,

    /// Tempo in quarter notes per minute (overrides the file)
    #[arg(long)]
    tempo: Option<f64>,
}

const DEFAULT_TEMPO: f64 = 120.0;
const DEFAULT_VOLUME: f32 = 0.5;

/// Sequence, tempo and file settings after flags are applied
struct Resolved {
    sequence: Sequence,
    tempo: f64,
    settings: parser::Settings,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Play {
            bars,
            volume,
            waveform,
            tap_min,
            tap_max,
        } => {
            let resolved = resolve(&bars);
            if tap_min <= 0.0 || tap_min > tap_max {
                fail("tap range must satisfy 0 < --tap-min <= --tap-max");
            }
            let config = repl::LiveConfig {
                sequence: resolved.sequence,
                tempo: resolved.tempo,
                volume: volume
                    .or(resolved.settings.volume)
                    .unwrap_or(DEFAULT_VOLUME)
                    .clamp(0.0, 1.0),
                waveform: waveform.or(resolved.settings.waveform).unwrap_or_default(),
                taps: TapTempo::new(tap_min..=tap_max),
            };

            if let Err(e) = repl::run(config) {
                eprintln!("Live mode error: {:#}", e);
                std::process::exit(1);
            }
        }
        Command::Count { bars, ticks } => {
            let resolved = resolve(&bars);
            print_schedule(&resolved, ticks);
        }
        Command::Interval { tempo, subdivision } => match clock::interval_millis(tempo, subdivision) {
            Ok(ms) => println!("{:.3} ms", ms),
            Err(e) => fail(&e.to_string()),
        },
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn resolve(args: &BarArgs) -> Resolved {
    let settings = match &args.file {
        Some(path) => {
            let input = fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading {}: {}", path.display(), e);
                std::process::exit(1);
            });
            parser::parse(&input).unwrap_or_else(|e| {
                eprintln!("Parse error in {}: {}", path.display(), e);
                std::process::exit(1);
            })
        }
        None => parser::Settings::default(),
    };

    let sequence = match &args.bars {
        Some(text) => parser::parse_bars(text).unwrap_or_else(|e| {
            eprintln!("Invalid --bars: {}", e.message);
            std::process::exit(1);
        }),
        None => settings.sequence.clone().unwrap_or_default(),
    };
    let tempo = args.tempo.or(settings.tempo).unwrap_or(DEFAULT_TEMPO);

    Resolved {
        sequence,
        tempo,
        settings,
    }
}

fn print_schedule(resolved: &Resolved, ticks: usize) {
    println!("Tempo: {} BPM", resolved.tempo);
    println!("Bars: {}", resolved.sequence);
    println!();

    let schedule = scheduler::build_schedule(&resolved.sequence, resolved.tempo, ticks)
        .unwrap_or_else(|e| fail(&e.to_string()));

    for beat in &schedule {
        let event = &beat.event;
        println!(
            "  {:>9.1} ms  bar {}  pass {}  beat {}{}{}",
            beat.at_millis,
            event.bar_index + 1,
            event.repetition,
            event.beat_in_bar,
            if event.accent { "  accent" } else { "" },
            if event.bar_completed { "  |" } else { "" },
        );
    }
}
