//! Face watch: gated face detection and analysis on a live preview.

use anyhow::{Context, Result};
use clap::Parser;
use face_watch::config::{Config, SinkKind, EXAMPLE_CONFIG};
use face_watch::dispatcher::ResultSink;
use face_watch::geometry::{DetectionBox, Dimensions, Size};
use face_watch::overlay::CanvasSurface;
use face_watch::pipeline::{Collaborators, EventOutcome, Pipeline};
use face_watch::sink::{JsonLinesSink, LogSink, NullSink};
use face_watch::source::DeviceInfo;
use face_watch::synthetic::{FaceScript, SyntheticAnalyzer, SyntheticDetector, SyntheticSource};
use face_watch::Error;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Capture tick period in milliseconds (66-200)
    #[arg(short, long = "interval-ms")]
    interval_ms: Option<u64>,

    /// Index of the capture device to use
    #[arg(long)]
    device: Option<usize>,

    /// Stop after this many seconds (runs until Ctrl-C when omitted)
    #[arg(long = "run-secs")]
    run_secs: Option<u64>,

    /// Face service subscription key
    #[arg(long = "face-key")]
    face_key: Option<String>,

    /// Emotion service subscription key
    #[arg(long = "emotion-key")]
    emotion_key: Option<String>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Print an example configuration file and exit
    #[arg(long = "print-config")]
    print_config: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {path}");
            Config::from_file(path).with_context(|| format!("Failed to load config file {path}"))?
        }
        None => Config::default(),
    };

    if let Some(interval) = args.interval_ms {
        config.capture.tick_interval_ms = interval;
    }
    if let Some(device) = args.device {
        config.capture.device_index = device;
    }
    if let Some(key) = &args.face_key {
        config.analysis.face_key.clone_from(key);
    }
    if let Some(key) = &args.emotion_key {
        config.analysis.emotion_key.clone_from(key);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn make_sink(kind: SinkKind) -> Arc<dyn ResultSink> {
    match kind {
        SinkKind::Stdout => Arc::new(JsonLinesSink::new(std::io::stdout())),
        SinkKind::Log => Arc::new(LogSink),
        SinkKind::None => Arc::new(NullSink),
    }
}

/// Demo collaborators: a face drifts across the frame, now and then joined by a second one
fn synthetic_collaborators(config: &Config) -> Collaborators {
    let size = Dimensions::new(config.capture.stream_width, config.capture.stream_height);
    let side = size.height / 4;
    let mut frames: Vec<Vec<DetectionBox>> = (0..20u32)
        .map(|step| {
            let x = size.width.saturating_sub(side) * step / 20;
            let mut faces = vec![DetectionBox::new(x, size.height / 3, side, side)];
            if step % 5 == 4 {
                faces.push(DetectionBox::new(size.width.saturating_sub(side + x / 2), size.height / 2, side / 2, side / 2));
            }
            faces
        })
        .collect();
    frames.extend(std::iter::repeat(Vec::new()).take(5));

    Collaborators {
        source: Box::new(SyntheticSource::front_camera(size)),
        detector: Box::new(SyntheticDetector::new(FaceScript::repeating(frames))),
        analyzer: Arc::new(SyntheticAnalyzer::default()),
        sink: make_sink(config.sink.kind),
    }
}

fn select_device(devices: &[DeviceInfo], index: usize) -> face_watch::Result<DeviceInfo> {
    devices.get(index).cloned().ok_or_else(|| {
        Error::ConfigError(format!(
            "Device index {index} out of range, {} device(s) available",
            devices.len()
        ))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Face Watch {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let device_index = config.capture.device_index;
    let collaborators = synthetic_collaborators(&config);
    let surface = CanvasSurface::new(Size::new(800.0, 600.0));

    let mut pipeline = Pipeline::new(config, collaborators, surface)?;
    let mut events = pipeline
        .take_events()
        .context("Pipeline event channel already taken")?;

    let devices = pipeline.initialize().await?;
    pipeline.start(&select_device(&devices, device_index)?).await?;

    let deadline = async {
        match args.run_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                info!("Run time elapsed");
                break;
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Listening for Ctrl-C failed: {e}");
                }
                info!("Interrupted");
                break;
            }
            Some(event) = events.recv() => {
                if let EventOutcome::Restarted(reason) = pipeline.handle_event(event).await? {
                    warn!("Pipeline restarted after {reason}");
                    let devices = pipeline.initialize().await?;
                    pipeline.start(&select_device(&devices, device_index)?).await?;
                }
            }
        }
    }

    if let Some(stats) = pipeline.scheduler_stats() {
        info!(
            "{} tick(s): {} cycle(s), {} dropped, {} failed",
            stats.ticks, stats.started, stats.dropped, stats.failed
        );
    }
    info!("{} result set(s) dispatched", pipeline.dispatcher().dispatched());
    pipeline.close().await;

    Ok(())
}
