use anyhow::{Context, Result};
use attend_core::{
    AttendanceLedger, CsvLedgerStore, EuclideanMatcher, GalleryBuilder, GalleryStore, OnnxExtractor,
    RecognitionConfig, RecognitionLoop, RunSummary,
};
use attend_hw::Camera;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod display;

use config::Config;
use display::ConsoleDisplay;

#[derive(Parser)]
#[command(name = "attend", about = "Face-recognition attendance from a camera")]
struct Cli {
    /// Config file (default: ./attend.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the face gallery from <dataset>/<person>/<image>
    Encode {
        /// Dataset root directory
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Gallery file to write
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Recognize faces from the camera and record attendance
    Run {
        /// Capture device index (/dev/videoN)
        #[arg(long)]
        device: Option<usize>,
        /// Maximum match distance (lower = stricter)
        #[arg(long)]
        tolerance: Option<f32>,
        /// Run detection on every Nth frame
        #[arg(long)]
        cadence: Option<u32>,
        /// Write the latest annotated frame to this image file
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// List capture devices
    Devices {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Encode { dataset, output } => {
            if let Some(d) = dataset {
                config.dataset_dir = d;
            }
            if let Some(o) = output {
                config.gallery_path = o;
            }
            tokio::task::spawn_blocking(move || encode(&config)).await??;
        }
        Commands::Run {
            device,
            tolerance,
            cadence,
            snapshot,
        } => {
            config.camera_index = device.unwrap_or(config.camera_index);
            config.tolerance = tolerance.unwrap_or(config.tolerance);
            config.cadence = cadence.unwrap_or(config.cadence);
            if snapshot.is_some() {
                config.snapshot_path = snapshot;
            }

            let stop = Arc::new(AtomicBool::new(false));
            watch_ctrl_c(stop.clone());
            watch_stdin(stop.clone());

            let (summary, total) = tokio::task::spawn_blocking(move || run(&config, stop)).await??;
            println!(
                "Done. {} frames, {} recognized faces, {} new attendees ({} in ledger).",
                summary.frames_captured, summary.faces_recognized, summary.attendees_recorded, total
            );
        }
        Commands::Devices { json } => {
            let devices = Camera::list_devices();
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("No capture devices found");
            } else {
                for d in devices {
                    println!("{}  {}  ({}, {})", d.index, d.name, d.driver, d.path);
                }
            }
        }
    }

    Ok(())
}

fn encode(config: &Config) -> Result<()> {
    let mut extractor = OnnxExtractor::load(&config.model_dir).context("failed to load face models")?;
    let store = GalleryStore::new(&config.gallery_path);

    let out = GalleryBuilder::new(&mut extractor, &store).build(&config.dataset_dir)?;

    println!(
        "Encodings saved to {} ({} added, {} without a face, {} failed)",
        store.path().display(),
        out.added,
        out.skipped,
        out.failed
    );
    Ok(())
}

fn run(config: &Config, stop: Arc<AtomicBool>) -> Result<(RunSummary, usize)> {
    let rec_config = RecognitionConfig::new(config.tolerance, config.cadence, config.scale)?;

    let store = GalleryStore::new(&config.gallery_path);
    // Fail on a missing gallery before loading the models.
    store.ensure_present()?;
    let mut extractor = OnnxExtractor::load(&config.model_dir).context("failed to load face models")?;
    let mut ledger = AttendanceLedger::new(CsvLedgerStore::new(&config.ledger_path));
    let mut display = ConsoleDisplay::new(stop, config.snapshot_path.clone());

    let index = config.camera_index;
    let summary = RecognitionLoop::new(rec_config, &mut extractor, EuclideanMatcher, &mut display, &mut ledger)
        .run(&store, || {
            let camera = Camera::open(index)?;
            println!("Starting camera {index}. Press 'q' then Enter, or Ctrl-C, to quit.");
            Ok::<_, attend_hw::CameraError>(camera)
        })?;
    let total = ledger.records()?.len();
    Ok((summary, total))
}

fn watch_ctrl_c(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            stop.store(true, Ordering::Relaxed);
        }
    });
}

/// A line consisting of `q` on stdin stops the loop.
fn watch_stdin(stop: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("attend-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().eq_ignore_ascii_case("q") {
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "stdin watcher unavailable; use Ctrl-C to stop");
    }
}
