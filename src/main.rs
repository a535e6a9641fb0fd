use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use reelcap::config::RecorderConfig;
use reelcap::recording::{Completion, CompletionStatus, Recorder, RecordingState, WorkerMode};
use reelcap::TestPattern;

const SURFACE_WIDTH: u32 = 640;
const SURFACE_HEIGHT: u32 = 360;

/// Records an animated test pattern to a GIF through the capture-to-encode pipeline
#[derive(Parser, Debug)]
#[command(name = "reelcap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, env = "REELCAP_CONFIG")]
    config: Option<PathBuf>,

    /// Frames per second sampled from the surface
    #[arg(long)]
    fps: Option<u32>,

    /// Seconds of frames kept per recording
    #[arg(long)]
    seconds: Option<f32>,

    /// Where the encoder runs
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Simulated render rate driving the ticks
    #[arg(long, default_value_t = 60)]
    render_fps: u32,

    /// Output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Stop early after this many frames
    #[arg(long)]
    stop_after: Option<usize>,

    /// Sleep between ticks instead of simulating time
    #[arg(long)]
    realtime: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Cooperative,
    Threaded,
}

impl From<ModeArg> for WorkerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Cooperative => WorkerMode::Cooperative,
            ModeArg::Threaded => WorkerMode::Threaded,
        }
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    session: String,
    path: PathBuf,
    status: &'static str,
    error: Option<String>,
    frames: usize,
    encode_ms: u64,
    wall_ms: u64,
    mode: &'static str,
}

impl Summary {
    fn new(completion: &Completion, mode: WorkerMode, wall: Duration) -> Self {
        let (status, error) = match &completion.status {
            CompletionStatus::Saved => ("saved", None),
            CompletionStatus::Failed(err) => ("failed", Some(err.to_string())),
            CompletionStatus::Cancelled => ("cancelled", None),
        };
        Self {
            session: completion.session.to_string(),
            path: completion.path.clone(),
            status,
            error,
            frames: completion.frames_encoded,
            encode_ms: completion.elapsed.as_millis() as u64,
            wall_ms: wall.as_millis() as u64,
            mode: mode.display_name(),
        }
    }
}

fn load_config(cli: &Cli) -> Result<RecorderConfig> {
    let mut config = match &cli.config {
        Some(path) => RecorderConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RecorderConfig::load().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring unreadable config, using defaults");
            RecorderConfig::default()
        }),
    };

    let rec = &mut config.recording;
    if let Some(fps) = cli.fps {
        rec.fps = fps;
    }
    if let Some(seconds) = cli.seconds {
        rec.buffer_secs = seconds;
    }
    if let Some(mode) = cli.mode {
        rec.worker = mode.into();
    }
    if let Some(width) = cli.width {
        rec.width = width;
    }
    if let Some(dir) = cli.output.as_ref().and_then(|p| p.parent()) {
        if !dir.as_os_str().is_empty() {
            config.output.directory = dir.to_path_buf();
        }
    }
    config.sanitize();
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.ensure_output_dir()?;

    let mode = config.recording.worker;
    let stop_after = match (cli.stop_after, config.recording.unbounded) {
        (Some(frames), _) => Some(frames),
        (None, true) => Some(config.recording.max_frames()),
        (None, false) => None,
    };

    let mut recorder = Recorder::new(config, TestPattern::new(SURFACE_WIDTH, SURFACE_HEIGHT));
    if let Some(name) = cli.output.as_ref().and_then(|p| p.file_name()) {
        recorder.set_file_name(name);
    }
    tracing::info!(
        max_frames = ?recorder.max_frames(),
        memory_mb = recorder.estimated_memory_mb(),
        "recording test pattern"
    );

    let delta = Duration::from_secs_f64(1.0 / f64::from(cli.render_fps.max(1)));
    let wall = Instant::now();
    recorder.begin();

    while recorder.state() != RecordingState::Idle {
        if let Some(limit) = stop_after {
            if recorder.is_recording() && recorder.frames_sampled() >= limit {
                recorder.stop();
            }
        }
        if recorder.tick(delta).is_some() {
            break;
        }
        if cli.realtime {
            thread::sleep(delta);
        } else if recorder.state() == RecordingState::Finalizing && mode == WorkerMode::Threaded {
            thread::sleep(Duration::from_millis(1));
        }
    }

    let completion = recorder
        .take_completion()
        .ok_or_else(|| anyhow!("recording ended without a completion"))?;
    let summary = Summary::new(&completion, mode, wall.elapsed());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} {} frames to {} ({} ms encode, {} ms total, {})",
            summary.status,
            summary.frames,
            summary.path.display(),
            summary.encode_ms,
            summary.wall_ms,
            summary.mode
        );
    }

    match completion.status {
        CompletionStatus::Failed(err) => Err(anyhow!(err).context("recording failed")),
        _ => Ok(()),
    }
}
