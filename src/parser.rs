use clap::ValueEnum;

use crate::bar::{BarSpec, Sequence, Subdivision};
use crate::synth::Waveform;

/// Parse errors with location info
#[derive(Debug, PartialEq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// Everything a `.bars` file can set. Unset keys stay `None` so command
/// line flags can fill them in.
#[derive(Debug, Default, PartialEq)]
pub struct Settings {
    pub tempo: Option<f64>,
    pub volume: Option<f32>,
    pub waveform: Option<Waveform>,
    pub sequence: Option<Sequence>,
}

/// Parse one bar written as `beats/subdivision`, optionally `*repeat`
pub fn parse_bar(item: &str) -> Result<BarSpec, String> {
    let (signature, repeat) = match item.split_once('*') {
        Some((left, right)) => {
            let repeat = right
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid repeat count in '{}'", item))?;
            (left.trim(), repeat)
        }
        None => (item.trim(), 1),
    };

    let (beats, note) = signature
        .split_once('/')
        .ok_or_else(|| format!("expected beats/subdivision, got '{}'", item))?;
    let beats: u32 = beats
        .trim()
        .parse()
        .map_err(|_| format!("invalid beat count in '{}'", item))?;
    let note: u32 = note
        .trim()
        .parse()
        .map_err(|_| format!("invalid subdivision in '{}'", item))?;

    let subdivision = Subdivision::from_value(note).map_err(|e| e.to_string())?;
    BarSpec::new(beats, subdivision, repeat).map_err(|e| e.to_string())
}

// Splits on commas and whitespace, keeping `4/4 * 2` together.
fn bar_items(line: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let tokens = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty());
    for token in tokens {
        match items.last_mut() {
            Some(last) if last.ends_with('*') || token.starts_with('*') => last.push_str(token),
            _ => items.push(token.to_string()),
        }
    }
    items
}

/// Parse a bar list such as `4/4*2 3/8, 7/16`
pub fn parse_bars(text: &str) -> Result<Sequence, ParseError> {
    let mut bars = Vec::new();
    for item in bar_items(text) {
        bars.push(parse_bar(&item).map_err(|message| ParseError { line: 1, message })?);
    }
    Sequence::new(bars).map_err(|e| ParseError {
        line: 1,
        message: e.to_string(),
    })
}

/// Parse a `.bars` file
///
/// Format (comments with #):
/// ```text
/// tempo: 96
/// volume: 0.8
/// waveform: square
///
/// 4/4 * 2
/// 3/8
/// 7/16*3 5/8
/// ```
pub fn parse(input: &str) -> Result<Settings, ParseError> {
    let mut settings = Settings::default();
    let mut bars = Vec::new();

    for (line_idx, line) in input.lines().enumerate() {
        let line_num = line_idx + 1;
        let trimmed = line.trim();

        // Skip empty lines and comments
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = trimmed.split_once(':') {
            let value = value.trim();
            let error = |message: String| ParseError {
                line: line_num,
                message,
            };
            match key.trim() {
                "tempo" => {
                    let tempo: f64 = value
                        .parse()
                        .map_err(|_| error(format!("invalid tempo: {}", value)))?;
                    settings.tempo = Some(tempo);
                }
                "volume" => {
                    let volume: f32 = value
                        .parse()
                        .map_err(|_| error(format!("invalid volume: {}", value)))?;
                    if !(0.0..=1.0).contains(&volume) {
                        return Err(error("volume must be between 0 and 1".into()));
                    }
                    settings.volume = Some(volume);
                }
                "waveform" => {
                    let waveform = Waveform::from_str(value, true)
                        .map_err(|_| error(format!("unknown waveform: {}", value)))?;
                    settings.waveform = Some(waveform);
                }
                other => return Err(error(format!("unknown key '{}'", other))),
            }
            continue;
        }

        for item in bar_items(trimmed) {
            let bar = parse_bar(&item).map_err(|message| ParseError {
                line: line_num,
                message,
            })?;
            bars.push(bar);
        }
    }

    if !bars.is_empty() {
        // Non-empty, so this cannot fail.
        settings.sequence = Sequence::new(bars).ok();
    }

    Ok(settings)
}
