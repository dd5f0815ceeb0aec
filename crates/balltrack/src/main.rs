use anyhow::{bail, Result};
use gpu_stage::{SoftwareStage, StageGeometry};
use tracing::info;

use balltrack::source::RawReplaySource;
use balltrack::{pipeline, telemetry, TrackerConfig};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = TrackerConfig::from_args(&args)?;
    telemetry::init(config.verbose)?;

    let Some(replay) = config.replay.clone() else {
        bail!("no frame source; pass --replay <raw-rgba-file>");
    };

    let geometry = StageGeometry::default();
    let mut source =
        RawReplaySource::open(&replay, geometry.source_width, geometry.source_height)?;
    let mut stage = SoftwareStage::new();

    info!(fifo = %config.fifo_path.display(), fps = config.fps, "tracker starting");
    pipeline::run(config, &mut stage, &mut source)?;

    if let Some(metrics) = telemetry::render_metrics() {
        info!("final metrics:\n{metrics}");
    }
    Ok(())
}
