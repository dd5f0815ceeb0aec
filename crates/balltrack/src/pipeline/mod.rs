//! Render-side pipeline: frame ingestion, the GPU schedule, and the lifetime
//! of the analysis thread.

pub mod exchange;
pub mod scheduler;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use gpu_stage::{ComputeStage, StageGeometry};
use metrics::gauge;
use tracing::{info, warn};

use crate::analysis;
use crate::config::TrackerConfig;
use crate::pipeline::exchange::{exchange, POOL_SIZE};
use crate::pipeline::scheduler::{FrameScheduler, ScheduleError};
use crate::snapshot::SharedOverlay;
use crate::source::FrameSource;

static RUNNING: AtomicBool = AtomicBool::new(true);
static CTRLC: Once = Once::new();

fn install_ctrlc() {
    CTRLC.call_once(|| {
        if let Err(err) = ctrlc::set_handler(|| {
            RUNNING.store(false, Ordering::SeqCst);
        }) {
            warn!(%err, "could not install the interrupt handler");
        }
    });
}

/// Run the tracker until the source ends or an interrupt arrives.
///
/// The calling thread becomes the render thread: it uploads frames, drives
/// the GPU schedule and measures the frame rate. Detection and events run on
/// the analysis thread, fed through the buffer exchange.
pub fn run(
    config: TrackerConfig,
    stage: &mut dyn ComputeStage,
    source: &mut dyn FrameSource,
) -> Result<()> {
    install_ctrlc();

    let geometry = StageGeometry::default();
    let (width, height) = source.dimensions();
    if (width, height) != (geometry.source_width, geometry.source_height) {
        bail!(
            "source is {width}x{height}, pipeline expects {}x{}",
            geometry.source_width,
            geometry.source_height
        );
    }

    let source_image = stage
        .create_image(width, height)
        .context("allocating the source image")?;
    let mut scheduler = FrameScheduler::new(stage, geometry, config.field_interval)
        .context("allocating pipeline images")?;

    let (producer, consumer) = exchange(POOL_SIZE, geometry.readback_len());
    let overlay = SharedOverlay::new();
    let fps_bits = Arc::new(AtomicU32::new(config.fps.to_bits()));
    let analysis_handle = analysis::spawn(
        consumer,
        config.clone(),
        geometry,
        overlay.clone(),
        fps_bits.clone(),
    )?;

    let frame_budget = Duration::from_secs_f32(1.0 / config.fps);
    let mut fps = config.fps;
    let mut last_frame = Instant::now();
    let mut frames = 0u64;

    let result = loop {
        if !RUNNING.load(Ordering::SeqCst) {
            info!("interrupted, shutting down");
            break Ok(());
        }
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(frames, "source exhausted");
                break Ok(());
            }
            Err(err) => break Err(err).context("reading the next frame"),
        };

        if let Err(err) = stage.upload(source_image, frame) {
            break Err(err).context("uploading the frame");
        }
        match scheduler.advance(stage, source_image, &producer) {
            Ok(()) => {}
            Err(ScheduleError::Disconnected) => {
                warn!("analysis thread went away, stopping");
                break Ok(());
            }
            Err(ScheduleError::Stage(err)) => break Err(err).context("running the GPU schedule"),
        }
        frames += 1;

        // Replay sources deliver as fast as the disk allows; pace them to
        // the nominal rate so the time-based event windows stay meaningful.
        let elapsed = last_frame.elapsed();
        if elapsed < frame_budget {
            std::thread::sleep(frame_budget - elapsed);
        }
        let instant_fps = 1.0 / last_frame.elapsed().as_secs_f32().max(1e-6);
        last_frame = Instant::now();

        fps = 0.9 * fps + 0.1 * instant_fps;
        fps_bits.store(fps.to_bits(), Ordering::Relaxed);
        gauge!("balltrack_fps").set(fps as f64);
    };

    // Dropping the producer disconnects the exchange, which is the analysis
    // thread's stop signal.
    drop(producer);
    if analysis_handle.join().is_err() {
        warn!("analysis thread panicked during shutdown");
    }
    result
}
