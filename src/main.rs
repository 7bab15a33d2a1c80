use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use homevoice::turn::{Services, TurnOrchestrator};
use homevoice::voice::{
    AudioSink, AudioSource, MicrophoneSource, SpeakerPlayback, apply_mic_gain,
    rms_energy,
};
use homevoice::{Config, Daemon};

/// Homevoice - wake-word voice assistant for Home Assistant
#[derive(Parser)]
#[command(name = "homevoice", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/homevoice/config.toml)
    #[arg(short, long, env = "HOMEVOICE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Send one typed request through the assistant, without the microphone
    Ask {
        /// What to say to the assistant
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity, RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info",
        1 => "info,homevoice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
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
    let config_path = cli.config.as_deref();

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(config_path, duration).await,
            Command::TestSpeaker => test_speaker(config_path).await,
            Command::TestTts { text } => test_tts(config_path, &text).await,
            Command::Ask { text } => ask(config_path, text).await,
        };
    }

    let config = Config::load(config_path)?;
    tracing::debug!(?config, "loaded configuration");

    let daemon = Daemon::new(config)?;
    tracing::info!("say \"{}\" to start", daemon.wake_word());

    // Run until interrupted
    daemon
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

/// Print per-second RMS energy to help tune the silence threshold
#[allow(clippy::future_not_send)]
async fn test_mic(config_path: Option<&std::path::Path>, duration: u64) -> anyhow::Result<()> {
    let (capture, _) = Config::load_audio(config_path)?;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    if let Some(gain) = &capture.gain {
        apply_mic_gain(gain).await;
    }

    let mut source = MicrophoneSource::open(&capture)?;
    let format = source.format();
    let blocks_per_second = format.blocks_for(Duration::from_secs(1));

    println!(
        "Sample rate: {} Hz, {} channel(s), silence threshold {}",
        format.sample_rate, format.channels, capture.silence_threshold
    );
    println!("---");

    for i in 0..duration {
        let mut energies = Vec::with_capacity(blocks_per_second);
        while energies.len() < blocks_per_second {
            let block = source.read_block().await?;
            energies.push(rms_energy(block.samples()));
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = energies.iter().sum::<f32>() / energies.len() as f32;
        let peak = energies.iter().copied().fold(0.0f32, f32::max);

        // Visual meter, 100 energy units per character
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (mean / 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);
        let marker = if mean < capture.silence_threshold { "silent" } else { "speech" };

        println!(
            "[{:2}s] RMS: {:7.1} | Peak: {:7.1} | [{}] {}",
            i + 1,
            mean,
            peak,
            meter,
            marker
        );
    }

    println!("\n---");
    println!("Speech should read well above the silence threshold, room noise below it.");
    println!("If RMS stayed near 0, check:");
    println!("  1. Run: arecord -l (to list devices)");
    println!("  2. Set capture.device or HOMEVOICE_INPUT_DEVICE");
    println!("  3. Raise the mixer gain ([capture.gain] in the config file)");

    Ok(())
}

/// Play the wake cue
#[allow(clippy::future_not_send)]
async fn test_speaker(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let (_, playback) = Config::load_audio(config_path)?;

    println!(
        "Testing speaker output, you should hear a {} Hz cue\n",
        playback.cue_frequency
    );

    let mut sink = SpeakerPlayback::open(&playback)?;
    sink.play_cue().await?;

    println!("---");
    println!("If you heard the cue, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: aplay -l (to list devices)");
    println!("  2. Set playback.device or HOMEVOICE_OUTPUT_DEVICE");

    Ok(())
}

/// Synthesize and play a phrase
#[allow(clippy::future_not_send)]
async fn test_tts(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    let services = Services::from_config(&config)?;
    let mut sink = SpeakerPlayback::open(&config.playback)?;

    let audio = services.tts.synthesize(text).await?;
    println!("Received {} bytes of audio", audio.len());
    sink.play_encoded(&audio).await?;

    println!("\nTTS test complete!");
    Ok(())
}

/// Run one typed request through dialog, directives and speech
#[allow(clippy::future_not_send)]
async fn ask(config_path: Option<&std::path::Path>, text: String) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let services = Services::from_config(&config)?;
    let mut sink = SpeakerPlayback::open(&config.playback)?;
    let mut orchestrator = TurnOrchestrator::new(&config, services);

    let report = orchestrator.respond_once(text, &mut sink).await;

    println!(
        "directives: {} ok, {} failed, {} skipped; ended: {:?}",
        report.directives.succeeded, report.directives.failed, report.directives.skipped, report.end
    );
    Ok(())
}
