//! IBM Music Feature Card offline renderer.
//!
//! Builds a card from a configuration, optionally streams a raw MIDI file
//! into its MIDI input from a producer thread, runs the firmware for the
//! requested duration and writes the audio to a 16-bit stereo WAV file.

mod args;
mod host;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use args::CliArgs;
use host::OfflineHost;
use imfc::{CardConfig, MidiInput, MusicCard, MIDI_QUEUE_CAPACITY};
use log::{info, warn};

/// Frames rendered per host time slice (timers fire between slices).
const SLICE_MS: u32 = 1;

/// Bytes handed to the MIDI input per attempt.
const MIDI_CHUNK: usize = 16;

fn main() -> Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    if args.show_help {
        CliArgs::print_help();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => CardConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => CardConfig::default(),
    };
    if let Some(rom) = &args.rom {
        config.firmware = Some(rom.clone());
    }
    if let Some(rate) = args.rate {
        config.sample_rate = rate;
    }
    config.validate()?;

    let mut card = MusicCard::from_config(config);
    if !card.is_enabled() {
        warn!("card has no firmware; output will be silent");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let producer = match &args.midi {
        Some(path) => {
            let data = std::fs::read(path)
                .with_context(|| format!("reading MIDI stream {}", path.display()))?;
            info!("streaming {} MIDI bytes from {}", data.len(), path.display());
            Some(spawn_midi_producer(
                card.midi_input(),
                data,
                Arc::clone(&stop),
            ))
        }
        None => None,
    };

    let samples = render(&mut card, args.seconds);

    stop.store(true, Ordering::Relaxed);
    if let Some(handle) = producer {
        let sent = handle
            .join()
            .map_err(|_| anyhow::anyhow!("MIDI producer thread panicked"))?;
        info!("MIDI producer delivered {sent} bytes");
    }

    write_wav(&args.out, &samples, card.sample_rate())?;
    info!(
        "wrote {} frames at {} Hz to {}",
        samples.len() / 2,
        card.sample_rate(),
        args.out.display()
    );
    Ok(())
}

/// Run the card for `seconds`, firing host timers between slices.
fn render(card: &mut MusicCard, seconds: f64) -> Vec<i16> {
    let rate = card.sample_rate();
    let total_frames = (seconds * rate as f64).round() as usize;
    let slice_frames = ((rate * SLICE_MS) / 1000).max(1) as usize;

    let mut host = OfflineHost::new();
    let mut samples = Vec::with_capacity(total_frames * 2);
    let mut rendered = 0usize;
    let mut instructions = 0u64;

    while rendered < total_frames {
        let frames = slice_frames.min(total_frames - rendered);
        samples.extend_from_slice(card.render(frames, &mut host));
        instructions += card.stats().instructions;
        rendered += frames;

        host.advance_to(rendered as f64 * 1000.0 / rate as f64);
        while let Some((timer, resume)) = host.next_due() {
            card.timer_expired(timer, &mut host);
            host.advance_to(resume);
        }
    }

    info!(
        "{} Z80 steps, {} host IRQs over {:.3} s",
        instructions,
        host.irq_raised(),
        host.now_ms() / 1000.0
    );
    samples
}

/// Feed `data` into the card's MIDI FIFO, waiting whenever it is full.
fn spawn_midi_producer(
    input: MidiInput,
    data: Vec<u8>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut sent = 0;
        while sent < data.len() && !stop.load(Ordering::Relaxed) {
            if input.pending() >= MIDI_QUEUE_CAPACITY {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            let end = (sent + MIDI_CHUNK).min(data.len());
            sent += input.enqueue(&data[sent..end]);
        }
        sent
    })
}

fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
