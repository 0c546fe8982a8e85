use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cub_device::config::AudioConfig;
use cub_device::voice::{
    AudioInput, AudioPlayback, CpalInput, DeepgramStreaming, GoogleTts, Speaker, SpeechOutput,
};
use cub_device::{
    AnswerClient, AnswerService, Config, HttpProbe, Supervisor, Watchdog, indicator,
};

/// Cub - always-on voice question answering device
#[derive(Parser)]
#[command(name = "cub", version, about)]
struct Cli {
    /// Path to a TOML config file (default: ~/.config/cub/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the activation phrase
    #[arg(long)]
    activation_phrase: Option<String>,

    /// Never drive GPIO status lights
    #[arg(long)]
    no_gpio: bool,

    /// Don't echo live transcripts to the console
    #[arg(short, long)]
    quiet: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Synthesize and speak text
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Look up one question in the answer service
    Ask {
        /// Question text
        question: String,
    },
    /// Probe network connectivity once
    CheckNetwork,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,cub_device=info",
        1 => "info,cub_device=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(phrase) = cli.activation_phrase {
        config.activation_phrase = phrase;
    }
    if cli.no_gpio {
        config.indicator.enabled = false;
    }

    match cli.command {
        Some(Command::TestMic { duration }) => test_mic(config.audio, duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::Say { text }) => say(config, &text).await,
        Some(Command::Ask { question }) => ask(config, &question).await,
        Some(Command::CheckNetwork) => check_network(config).await,
        None => run_device(config, cli.quiet).await,
    }
}

/// Run the device loop until interrupted
#[allow(clippy::future_not_send)]
async fn run_device(config: Config, quiet: bool) -> anyhow::Result<()> {
    config.validate()?;

    tracing::info!(
        phrase = %config.activation_phrase,
        rate = config.audio.rate,
        chunk_size = config.audio.chunk_size,
        "starting cub"
    );
    tracing::debug!(?config, "loaded configuration");

    let lights = indicator::detect(config.indicator.enabled, config.indicator.pins);

    // Leave the lights off if anything panics
    let panic_lights = Arc::clone(&lights);
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_lights.reset();
        default_hook(info);
    }));

    let answers = Arc::new(AnswerClient::new(config.answer)?);
    let transcriber = Arc::new(DeepgramStreaming::new(config.stt, config.audio.rate)?);
    let speech = Arc::new(Speaker::new(
        GoogleTts::new(config.tts)?,
        AudioPlayback::new(),
        config.cooldown,
    ));
    let watchdog = Watchdog::new(HttpProbe::new(config.probe_url)?, Arc::clone(&lights));

    let mut supervisor = Supervisor::new(
        CpalInput::new(config.audio),
        watchdog,
        transcriber,
        answers,
        speech,
        lights,
        config.activation_phrase,
    );
    if quiet {
        supervisor = supervisor.quiet();
    }

    supervisor.run().await?;
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(audio: AudioConfig, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let input = CpalInput::new(audio);
    let (microphone, mut receiver) = input.open()?;

    println!("Sample rate: {} Hz, chunk size: {}", audio.rate, audio.chunk_size);
    println!("---");

    for i in 0..duration {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut pcm = Vec::new();
        while let Ok(Some(batch)) = tokio::time::timeout_at(deadline, receiver.next_batch()).await {
            pcm.extend_from_slice(&batch);
        }

        let energy = calculate_rms(&pcm);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] bytes: {:6} | RMS: {:.4} | [{}]",
            i + 1,
            pcm.len(),
            energy,
            meter
        );
    }

    drop(microphone);

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If bytes stayed at 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy of 16-bit PCM
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(pcm: &[u8]) -> f32 {
    let samples: Vec<f32> = pcm
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect();
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    tokio::task::spawn_blocking(move || {
        AudioPlayback::play_samples_blocking(samples, sample_rate)
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Speak text through TTS and the speakers
async fn say(config: Config, text: &str) -> anyhow::Result<()> {
    println!("Speaking: \"{text}\"");
    let speaker = Speaker::new(GoogleTts::new(config.tts)?, AudioPlayback::new(), Duration::ZERO);
    speaker.speak(text).await?;
    Ok(())
}

/// Print the answer service's best match for a question
async fn ask(config: Config, question: &str) -> anyhow::Result<()> {
    let client = AnswerClient::new(config.answer)?;
    let record = client.lookup(question).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Run a single reachability probe
async fn check_network(config: Config) -> anyhow::Result<()> {
    let probe = HttpProbe::new(config.probe_url.clone())?;
    let watchdog = Watchdog::new(probe, Arc::new(cub_device::NoopIndicator));
    match watchdog.check_once().await {
        Ok(()) => println!("network reachable ({})", config.probe_url),
        Err(e) => println!("network unreachable ({}): {e}", config.probe_url),
    }
    Ok(())
}
