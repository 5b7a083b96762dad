//! Headless NodeWeave host.
//!
//! Loads a graph document from a file store, ticks the frame scheduler until
//! the force layout converges (or the tick budget runs out) and saves the
//! laid-out document back.

use clap::Parser;
use nodeweave_core::storage::{FileStorage, StorageError};
use nodeweave_core::{Canvas, CanvasConfig, ConfigError, FrameScheduler, LayoutState, Storage};
use std::path::PathBuf;
use thiserror::Error;

/// Lay out a NodeWeave graph document with the force-directed engine
#[derive(Parser, Debug)]
#[command(name = "nodeweave", version, about)]
struct Cli {
    /// Directory holding `<ID>.json` documents
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    store: PathBuf,

    /// Document to lay out
    #[arg(short, long, value_name = "ID")]
    input: String,

    /// Document to write the result to (defaults to overwriting the input)
    #[arg(short, long, value_name = "ID")]
    output: Option<String>,

    /// JSON file overriding canvas settings
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Give up after this many ticks
    #[arg(long, value_name = "TICKS", default_value_t = 5000)]
    max_ticks: u64,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => CanvasConfig::load(path)?,
        None => CanvasConfig::default(),
    };

    let storage = FileStorage::new(&cli.store)?;
    let canvas = Canvas::with_scene(storage.load_scene(&cli.input)?, config)?;
    log::info!(
        "Loaded {} nodes and {} edges from {}",
        canvas.scene().node_count(),
        canvas.scene().edge_count(),
        storage.document_path(&cli.input).display()
    );

    let mut scheduler = FrameScheduler::new(canvas);
    scheduler.layout_start();
    let mut ticks = 0;
    while ticks < cli.max_ticks && scheduler.canvas().layout_state() == LayoutState::Running {
        let report = scheduler.tick();
        ticks += 1;
        if ticks % 250 == 0 {
            if let Some(step) = &report.layout {
                log::info!("Tick {ticks}: energy {:.4}", step.energy);
            }
        }
    }

    let stats = scheduler.stats();
    log::info!(
        "Frame times: avg {:.3}ms, worst {:.3}ms, {} of {} over budget",
        stats.average().as_secs_f64() * 1000.0,
        stats.worst().as_secs_f64() * 1000.0,
        stats.over_budget(),
        stats.frames()
    );
    match scheduler.canvas().layout_state() {
        LayoutState::Converged => log::info!("Layout converged after {ticks} ticks"),
        state => log::warn!(
            "Layout still {state:?} after {ticks} ticks (energy {:.4})",
            scheduler.canvas().layout().energy()
        ),
    }

    let output = cli.output.as_deref().unwrap_or(&cli.input);
    storage.save_scene(output, scheduler.canvas().scene())?;
    log::info!("Saved document to: {}", storage.document_path(output).display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Cli::parse()) {
        log::error!("{err}");
        std::process::exit(1);
    }
}
