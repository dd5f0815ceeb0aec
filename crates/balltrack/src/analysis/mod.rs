//! Analysis thread: consumes readout buffers, maintains the field and ball
//! state, and emits game events.

pub mod ball;
pub mod field;
pub mod tracker;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use gpu_stage::StageGeometry;
use metrics::{counter, gauge};
use tracing::{info, warn};

use crate::config::TrackerConfig;
use crate::data::FieldRect;
use crate::events::{Notifier, TimeseriesSink};
use crate::pipeline::exchange::{BufferKind, Consumer};
use crate::snapshot::SharedOverlay;
use crate::analysis::tracker::TrackerState;

/// Spawn the analysis thread. It runs until the producer side of `consumer`
/// is dropped.
///
/// `fps` carries the measured frame rate from the render loop as f32 bits;
/// the tracker's time windows follow it.
pub fn spawn(
    consumer: Consumer,
    config: TrackerConfig,
    geometry: StageGeometry,
    overlay: SharedOverlay,
    fps: Arc<AtomicU32>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("analysis".into())
        .spawn(move || run(consumer, config, geometry, overlay, fps))
        .context("failed to spawn analysis thread")
}

fn run(
    consumer: Consumer,
    config: TrackerConfig,
    geometry: StageGeometry,
    overlay: SharedOverlay,
    fps: Arc<AtomicU32>,
) {
    let width = geometry.sample_width();
    let height = geometry.sample_height();

    let notifier = Notifier::new(config.fifo_path.clone());
    let mut timeseries = match &config.timeseries_path {
        Some(path) => match TimeseriesSink::create(path) {
            Ok(sink) => Some(sink),
            Err(err) => {
                warn!(%err, "running without the time series sink");
                None
            }
        },
        None => None,
    };

    let mut field_rect = FieldRect::default();
    let mut tracker = TrackerState::new(config.clone());
    let mut frames = 0u64;

    while let Some(buffer) = consumer.take() {
        match buffer.kind {
            BufferKind::Field => {
                if let Some(measured) = field::measure(&buffer.data, width, height, &config) {
                    field_rect.blend(measured, config.field_alpha);
                    overlay.set_field(field_rect);
                }
                counter!("balltrack_field_updates_total").increment(1);
            }
            BufferKind::Ball => {
                frames += 1;
                tracker.set_fps(f32::from_bits(fps.load(Ordering::Relaxed)));

                let detection = ball::detect(&buffer.data, width, height, &field_rect, &config);
                if let Some(detection) = detection {
                    overlay.push_trail(detection.screen, frames);
                    gauge!("balltrack_ball_x").set(detection.field.x as f64);
                    gauge!("balltrack_ball_y").set(detection.field.y as f64);
                }

                let out = tracker.update(detection.map(|d| d.field));
                for event in &out.events {
                    notifier.notify(event);
                }
                if out.flush_history {
                    if let Some(sink) = timeseries.as_mut() {
                        sink.append_window(tracker.history());
                    }
                }
            }
        }
    }

    if let Some(sink) = timeseries.as_mut() {
        sink.append_window(tracker.unflushed_history());
    }
    info!(frames, "analysis thread stopped");
}
