use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medassist_capture::{
    write_pcm_wav, AudioFile, AudioLevelSample, CaptureManager, CaptureObserver, Config,
    ErrorKind, FilePlatform, RecordingArtifact, SimulatedPlatform,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "medassist-capture")]
#[command(author, version, about = "Microphone and camera capture lifecycle manager")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/medassist-capture")]
    config: String,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from an audio file played back as a live microphone
    Record {
        /// Audio file to use as microphone input
        #[arg(short, long)]
        input: PathBuf,

        /// Seconds to record (defaults to the file length)
        #[arg(short, long)]
        seconds: Option<u64>,

        /// Write the recording here as WAV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a full capture lifecycle against simulated devices
    Simulate {
        #[arg(short, long, default_value = "3")]
        seconds: u64,
    },

    /// List the cameras of the simulated platform
    Cameras,

    /// Print the effective configuration
    ShowConfig,
}

/// Observer that reports to the log
struct LogObserver;

impl CaptureObserver for LogObserver {
    fn on_recording_complete(&self, artifact: Option<RecordingArtifact>) {
        match artifact {
            Some(artifact) => info!(
                "Recording delivered: {} bytes of {}",
                artifact.data().len(),
                artifact.mime_type()
            ),
            None => info!("Recording cleared"),
        }
    }

    fn on_level_update(&self, sample: AudioLevelSample) {
        debug!("Level {:.2}", sample.value());
    }

    fn on_error(&self, kind: ErrorKind, message: String) {
        warn!("{}: {}", kind, message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("medassist_capture={},warn", log_level))),
        )
        .with_target(false)
        .init();

    let config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Record {
            input,
            seconds,
            output,
        } => record(config, input, seconds, output).await,
        Command::Simulate { seconds } => simulate(config, seconds).await,
        Command::Cameras => cameras(config).await,
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn record(
    config: Config,
    input: PathBuf,
    seconds: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let audio = AudioFile::open(&input)?;
    let platform = Arc::new(FilePlatform::new(audio));
    let seconds = seconds.unwrap_or_else(|| platform.duration().as_secs_f64().ceil() as u64);

    let manager = CaptureManager::new(platform, &config, Arc::new(LogObserver));

    manager.start_recording().await?;
    info!("Recording {} for {}s", input.display(), seconds);

    for _ in 0..seconds {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let recorder = manager.recorder();
        info!(
            "{}s level {:.2} ({})",
            recorder.elapsed_seconds().await,
            recorder.latest_level().await.value(),
            recorder
                .quality()
                .await
                .map(|q| q.label())
                .unwrap_or("idle")
        );
    }

    let artifact = manager.stop_recording().await?;

    if let Some(path) = &output {
        write_pcm_wav(&artifact, path)
            .with_context(|| format!("Failed to save recording to {}", path.display()))?;
    }

    let report = manager.shutdown().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "artifact": artifact,
            "output": output.map(|p| p.display().to_string()),
            "leaked_tracks_stopped": report.tracks_stopped,
        }))?
    );

    Ok(())
}

async fn simulate(config: Config, seconds: u64) -> Result<()> {
    let platform = Arc::new(SimulatedPlatform::with_default_devices());
    platform.set_level(90);

    let manager = CaptureManager::new(platform.clone(), &config, Arc::new(LogObserver));

    manager.start_recording().await?;
    for second in 0..seconds {
        for part in 0..10 {
            platform.emit_chunk(format!("chunk-{}-{};", second, part).into_bytes());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
    let artifact = manager.stop_recording().await?;

    let catalog = manager.enumerate_video_devices().await?;
    manager.open_camera(None).await?;
    let selector = manager.switch_camera().await?;
    let frame = manager.capture_still().await?;

    let report = manager.shutdown().await;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "artifact": artifact,
            "cameras": catalog,
            "switched_to": selector,
            "frame": { "width": frame.width, "height": frame.height, "bytes": frame.data.len() },
            "leaked_tracks_stopped": report.tracks_stopped,
        }))?
    );

    Ok(())
}

async fn cameras(config: Config) -> Result<()> {
    let platform = Arc::new(SimulatedPlatform::with_default_devices());
    let manager = CaptureManager::new(platform, &config, Arc::new(LogObserver));

    let catalog = manager.enumerate_video_devices().await?;
    println!("{}", serde_json::to_string_pretty(&catalog)?);
    Ok(())
}
