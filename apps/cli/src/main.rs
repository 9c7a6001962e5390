use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fretwise_audio::{
    AudioContextManager, CpalBackend, HttpFetcher, NullFetcher, PlayOptions, PlaybackBus,
    SampleCache, SignalMixer,
};
use fretwise_domain::ChannelId;
use fretwise_metronome::{BeatScheduler, MetronomeConfig, Subdivision};
use fretwise_tuner::{MicCapture, TuningSession};

#[derive(Parser, Debug)]
#[command(author, version, about = "Guitar practice tools for the terminal")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the metronome.
    Metronome {
        #[arg(long, default_value_t = 120.0)]
        bpm: f32,
        /// Beats per measure.
        #[arg(long, default_value_t = 4)]
        beats: u32,
        /// Clicks per beat: 1, 2 or 4.
        #[arg(long, default_value_t = 1)]
        subdivision: u32,
        /// How long to run, in seconds.
        #[arg(long, default_value_t = 16.0)]
        seconds: f64,
    },
    /// Listen on the default microphone and report tuning.
    Tuner {
        /// How long to listen, in seconds.
        #[arg(long, default_value_t = 30.0)]
        seconds: f64,
        /// Cents of deviation still counted as in tune.
        #[arg(long, default_value_t = 5)]
        tolerance: i32,
    },
    /// Fetch a sample by URL and play it once.
    Play {
        /// Sample path, e.g. /samples/chords/a_major.wav
        url: String,
        #[arg(long, default_value = "http://localhost:3000")]
        base_url: String,
        /// Mixer channel: chords, scales, metronome or effects.
        #[arg(long, default_value = "chords")]
        channel: String,
    },
    /// Initialize the engine and print its state as JSON.
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Args::parse().command {
        Command::Metronome {
            bpm,
            beats,
            subdivision,
            seconds,
        } => run_metronome(bpm, beats, subdivision, seconds).await,
        Command::Tuner { seconds, tolerance } => run_tuner(seconds, tolerance).await,
        Command::Play {
            url,
            base_url,
            channel,
        } => run_play(&url, &base_url, &channel).await,
        Command::Probe => run_probe(),
    }
}

fn open_context() -> Result<AudioContextManager> {
    let backend = CpalBackend::new().context("opening the output device")?;
    let mut ctx = AudioContextManager::new(Box::new(backend));
    ctx.unlock_audio().context("starting the audio engine")?;
    Ok(ctx)
}

async fn run_metronome(bpm: f32, beats: u32, subdivision: u32, seconds: f64) -> Result<()> {
    let subdivision = Subdivision::from_per_beat(subdivision)
        .ok_or_else(|| anyhow!("subdivision must be 1, 2 or 4"))?;

    let ctx = open_context()?;
    let handle = ctx.handle()?;
    let mixer = SignalMixer::new(handle.clone());
    let cache = SampleCache::new(Arc::new(NullFetcher));
    let bus = Arc::new(PlaybackBus::new(handle.clone(), &mixer, cache.clone()));

    let mut scheduler = BeatScheduler::new(
        handle,
        bus.clone(),
        cache,
        MetronomeConfig {
            bpm,
            beats_per_measure: beats,
            subdivision,
            ..Default::default()
        },
    );
    scheduler.subscribe_beats(|event| {
        if event.subdivision == 0 {
            let marker = if event.accented { "●" } else { "○" };
            println!("{marker} beat {}", event.beat + 1);
        }
    });
    scheduler.start();
    info!(bpm, beats, "metronome running");

    let scheduler = Arc::new(Mutex::new(scheduler));
    let driver = tokio::spawn(BeatScheduler::run(scheduler.clone()));

    tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    scheduler.lock().expect("scheduler poisoned").stop();
    driver.await?;
    bus.fade_out_all(fretwise_audio::DEFAULT_FADE_OUT).await;
    Ok(())
}

async fn run_tuner(seconds: f64, tolerance: i32) -> Result<()> {
    let mut capture = MicCapture::start().context("opening the microphone")?;
    let mut session = TuningSession::new(capture.sample_rate());
    session.set_tolerance_cents(tolerance);
    session.subscribe(|state| match (state.note, state.octave, state.frequency) {
        (Some(note), Some(octave), Some(frequency)) => {
            let verdict = if state.is_in_tune { "in tune" } else { "off" };
            println!(
                "{note}{octave}  {frequency:7.2} Hz  {:+4} cents  [{verdict}]",
                state.cents
            );
        }
        _ => println!("listening..."),
    });
    session.start();

    let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(seconds);
    let mut buffer = Vec::new();
    while tokio::time::Instant::now() < deadline {
        capture.read_into(&mut buffer);
        session.ingest(&buffer);
        buffer.clear();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    session.stop();
    Ok(())
}

async fn run_play(url: &str, base_url: &str, channel: &str) -> Result<()> {
    let channel = parse_channel(channel)?;
    let ctx = open_context()?;
    let handle = ctx.handle()?;
    let mixer = SignalMixer::new(handle.clone());
    let cache = SampleCache::new(Arc::new(HttpFetcher::new(base_url)));
    let bus = PlaybackBus::new(handle, &mixer, cache.clone());

    let asset = cache
        .load_sample(url)
        .await
        .with_context(|| format!("loading {url}"))?;
    info!(url, duration = asset.duration, "sample loaded");
    if !bus.play_buffer(asset.clone(), channel, PlayOptions::default()) {
        return Err(anyhow!("playback was refused"));
    }
    tokio::time::sleep(Duration::from_secs_f64(asset.duration as f64 + 0.3)).await;
    Ok(())
}

fn run_probe() -> Result<()> {
    let mut ctx = open_context()?;
    println!("{}", serde_json::to_string_pretty(&ctx.snapshot())?);
    ctx.dispose();
    Ok(())
}

fn parse_channel(name: &str) -> Result<ChannelId> {
    ChannelId::ALL
        .into_iter()
        .find(|id| id.as_str() == name)
        .ok_or_else(|| anyhow!("unknown channel '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_round_trip() {
        for id in ChannelId::ALL {
            assert_eq!(parse_channel(id.as_str()).unwrap(), id);
        }
        assert!(parse_channel("drums").is_err());
    }
}
