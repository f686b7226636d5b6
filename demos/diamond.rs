//! Print a tonality diamond and render a chord and an arpeggio to WAV.
//!
//! ```text
//! cargo run --example diamond -- --odd-limit 7 --output diamond.wav
//! cargo run --example diamond -- --custom "4 5 6 7" --label-mode rows
//! ```

use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use tonality_diamond::prelude::*;

const BLOCK: usize = 256;

#[derive(Parser)]
#[command(name = "diamond")]
#[command(about = "Tonality diamond printer and renderer")]
struct Cli {
    /// Odd limit (even values are decremented)
    #[arg(long, default_value = "9")]
    odd_limit: String,

    /// Prime limit; empty for none
    #[arg(long, default_value = "")]
    prime_limit: String,

    /// Custom value list, overriding the limits (e.g. "3,4,5,6,7")
    #[arg(long)]
    custom: Option<String>,

    /// Label mode: reduced, rows or normalized
    #[arg(long, default_value = "normalized")]
    label_mode: String,

    /// Frequency of 1/1 in Hz
    #[arg(long, default_value_t = 392.0)]
    reference_hz: f64,

    /// Oscillator: sine, square, sawtooth or triangle
    #[arg(long, default_value = "sine")]
    waveform: String,

    /// Render sample rate (Hz)
    #[arg(long, default_value_t = 44100)]
    sample_rate: u32,

    /// WAV file to write
    #[arg(long, default_value = "diamond.wav")]
    output: PathBuf,

    /// Print the diamond without rendering audio
    #[arg(long)]
    print_only: bool,

    /// Load settings from a JSON config file instead of the flags above
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_label_mode(name: &str) -> LabelMode {
    match name {
        "reduced" | "raw" => LabelMode::Reduced,
        "rows" => LabelMode::Rows,
        "normalized" => LabelMode::Normalized,
        other => {
            warn!("unknown label mode {:?}, using normalized", other);
            LabelMode::Normalized
        }
    }
}

fn config_from_cli(cli: &Cli) -> Result<DiamondConfig, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.config {
        let json = std::fs::read_to_string(path)?;
        return Ok(DiamondConfig::from_json(&json)?);
    }

    let mut config = DiamondConfig {
        reference_hz: cli.reference_hz,
        label_mode: parse_label_mode(&cli.label_mode),
        grid: match &cli.custom {
            Some(text) => GridParams::custom(text.as_str()),
            None => GridParams::limit_from_text(&cli.odd_limit, &cli.prime_limit),
        },
        ..DiamondConfig::default()
    };
    config.voice.waveform = Waveform::from_name(&cli.waveform).unwrap_or_else(|| {
        warn!("unknown waveform {:?}, using sine", cli.waveform);
        Waveform::Sine
    });
    Ok(config)
}

fn print_diamond(session: &DiamondSession<SynthBackend>) {
    let diamond = session.diamond();
    let width = 8;

    print!("{:>width$}", "");
    for header in session.headers().iter().filter(|h| h.axis.axis == Axis::Column) {
        print!("{:>width$}", header.value);
    }
    println!();

    for row in 0..diamond.size() {
        if let Some(header) = diamond.header(AxisRef::row(row)) {
            print!("{:>width$}", header.value);
        }
        for col in 0..diamond.size() {
            if let Some(cell) = session.cell(CellRef::new(row, col)) {
                print!("{:>width$}", cell.label);
            }
        }
        println!();
    }

    println!();
    for (prime, hue) in diamond.hues().iter() {
        println!("  prime {:>3}  hue {:>6.1}", prime, hue);
    }
}

/// Render until `until` seconds of engine time, firing gesture timers on
/// block boundaries
fn render_until(session: &mut DiamondSession<SynthBackend>, samples: &mut Vec<f32>, until: f64) {
    let mut block = [0.0f32; BLOCK];
    loop {
        let now = session.voices().backend().current_time();
        if now >= until {
            break;
        }
        session.advance(now);
        session.backend_mut().render(&mut block);
        samples.extend_from_slice(&block);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = config_from_cli(&cli)?;
    let backend = SynthBackend::new(cli.sample_rate as f64);
    let mut session = DiamondSession::new(config, backend);

    info!("grid: {:?}", session.diamond().grid().values());
    print_diamond(&session);

    if cli.print_only || session.diamond().is_empty() {
        return Ok(());
    }

    if !session.interact() {
        if let Some(notice) = session.notice() {
            warn!("{}", notice);
        }
        return Ok(());
    }

    let mut samples = Vec::new();

    // Chord on the second row header, released by its own timer
    let row = AxisRef::row(1.min(session.diamond().size() - 1));
    let pitches = session.chord(row, false, 0.0);
    info!("chord: {} pitches", pitches);
    render_until(&mut session, &mut samples, 1.5);

    // Double-click the second column header a quarter second apart
    let column = AxisRef::column(1.min(session.diamond().size() - 1));
    let start = session.voices().backend().current_time();
    session.header_click(column, start);
    render_until(&mut session, &mut samples, start + 0.25);
    session.header_click(column, start + 0.25);
    info!("arpeggio on column {}", column.index);

    // Let the arpeggio run out and the tails fade
    let mut now = start + 0.25;
    while session.gestures().pending_timers() > 0 || session.voices().releasing_count() > 0 {
        now += 0.25;
        render_until(&mut session, &mut samples, now);
    }
    render_until(&mut session, &mut samples, now + 0.25);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: cli.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&cli.output, spec)?;
    for sample in &samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    info!(
        "wrote {:.2}s to {}",
        samples.len() as f64 / cli.sample_rate as f64,
        cli.output.display()
    );
    Ok(())
}
