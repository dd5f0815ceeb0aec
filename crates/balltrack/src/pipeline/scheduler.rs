//! Per-frame GPU schedule.
//!
//! Instead of running filter, downsample and readback back to back on one
//! frame, the three steps run side by side on consecutive frames:
//!
//! ```text
//! source     -> filter[write]
//! filter[read] -> readout[write]
//! readout[read] -> readback
//! (then swap read/write)
//! ```
//!
//! Each pass only depends on data written a frame earlier, so the driver can
//! overlap the passes instead of stalling on one frame's dependency chain.
//! The source data reaches the analysis thread with a fixed latency of
//! [`PIPELINE_FILL_FRAMES`] frames; until the pipeline has filled there is no
//! valid readout and readback is suppressed.
//!
//! The field path does not need per-frame updates and runs on a slow
//! countdown instead: filter at 2, downsample at 1, readback at 0, then the
//! countdown resets to the configured interval.

use gpu_stage::{ComputeStage, ImageId, StageError, StageGeometry, Target, Transform};
use tracing::trace;

use crate::pipeline::exchange::{BufferKind, Producer, SubmitError};

/// Frames before the first ball readout holds valid data.
pub const PIPELINE_FILL_FRAMES: i64 = 3;

pub struct FrameScheduler {
    geometry: StageGeometry,
    /// Ping-pong pair for the ball hue filter.
    filter: [ImageId; 2],
    /// Ping-pong pair for the downsampled ball readout.
    readout: [ImageId; 2],
    filter_field: ImageId,
    readout_field: ImageId,
    /// Index into the pairs currently being written; the other half is read.
    write: usize,
    /// Starts negative so readback stays suppressed during pipeline fill.
    frame: i64,
    field_countdown: u32,
    field_interval: u32,
}

/// Why a frame could not be scheduled.
#[derive(Debug)]
pub enum ScheduleError {
    Stage(StageError),
    /// The analysis side is gone; the pipeline should shut down.
    Disconnected,
}

impl From<StageError> for ScheduleError {
    fn from(err: StageError) -> Self {
        ScheduleError::Stage(err)
    }
}

impl From<SubmitError<StageError>> for ScheduleError {
    fn from(err: SubmitError<StageError>) -> Self {
        match err {
            SubmitError::Disconnected => ScheduleError::Disconnected,
            SubmitError::Fill(err) => ScheduleError::Stage(err),
        }
    }
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::Stage(err) => write!(f, "stage error: {err}"),
            ScheduleError::Disconnected => f.write_str("analysis thread disconnected"),
        }
    }
}

impl std::error::Error for ScheduleError {}

impl FrameScheduler {
    /// Allocate all intermediate images on `stage`.
    pub fn new(
        stage: &mut dyn ComputeStage,
        geometry: StageGeometry,
        field_interval: u32,
    ) -> Result<Self, StageError> {
        let filter = [
            stage.create_image(geometry.filter_width, geometry.filter_height)?,
            stage.create_image(geometry.filter_width, geometry.filter_height)?,
        ];
        let readout = [
            stage.create_image(geometry.readout_width, geometry.readout_height)?,
            stage.create_image(geometry.readout_width, geometry.readout_height)?,
        ];
        let filter_field = stage.create_image(geometry.filter_width, geometry.filter_height)?;
        let readout_field = stage.create_image(geometry.readout_width, geometry.readout_height)?;

        Ok(Self {
            geometry,
            filter,
            readout,
            filter_field,
            readout_field,
            write: 0,
            frame: -PIPELINE_FILL_FRAMES,
            field_countdown: field_interval,
            field_interval,
        })
    }

    pub fn geometry(&self) -> StageGeometry {
        self.geometry
    }

    /// Issue the GPU passes for one camera frame and hand finished readouts
    /// to the exchange.
    pub fn advance(
        &mut self,
        stage: &mut dyn ComputeStage,
        source: ImageId,
        producer: &Producer,
    ) -> Result<(), ScheduleError> {
        self.frame += 1;

        // Field path, amortized over the update interval.
        match self.field_countdown {
            2 => {
                stage.apply(Transform::HueFilterField, source, Target::Image(self.filter_field))?;
            }
            1 => {
                stage.apply(
                    Transform::Downsample,
                    self.filter_field,
                    Target::Image(self.readout_field),
                )?;
            }
            0 => {
                let image = self.readout_field;
                producer.submit(BufferKind::Field, |buf| stage.readback(image, buf))?;
                self.field_countdown = self.field_interval;
            }
            _ => {}
        }
        self.field_countdown -= 1;

        // Last frame's write textures become this frame's read textures.
        self.write = 1 - self.write;
        let read = 1 - self.write;

        stage.apply(
            Transform::HueFilterBall,
            source,
            Target::Image(self.filter[self.write]),
        )?;
        stage.apply(
            Transform::Downsample,
            self.filter[read],
            Target::Image(self.readout[self.write]),
        )?;
        if self.frame > 0 {
            let image = self.readout[read];
            producer.submit(BufferKind::Ball, |buf| stage.readback(image, buf))?;
        } else {
            trace!(frame = self.frame, "pipeline still filling, readback suppressed");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::exchange::exchange;
    use gpu_stage::PACK_FACTOR;

    /// Records every call instead of computing anything.
    struct RecordingStage {
        next_id: u32,
        passes: Vec<(Transform, ImageId, Target)>,
        readbacks: Vec<ImageId>,
    }

    impl RecordingStage {
        fn new() -> Self {
            Self {
                next_id: 0,
                passes: Vec::new(),
                readbacks: Vec::new(),
            }
        }
    }

    impl ComputeStage for RecordingStage {
        fn create_image(&mut self, _width: u32, _height: u32) -> Result<ImageId, StageError> {
            let id = ImageId(self.next_id);
            self.next_id += 1;
            Ok(id)
        }

        fn upload(&mut self, _image: ImageId, _rgba: &[u8]) -> Result<(), StageError> {
            Ok(())
        }

        fn apply(
            &mut self,
            transform: Transform,
            source: ImageId,
            dest: Target,
        ) -> Result<(), StageError> {
            self.passes.push((transform, source, dest));
            Ok(())
        }

        fn readback(&mut self, image: ImageId, _out: &mut [u8]) -> Result<(), StageError> {
            self.readbacks.push(image);
            Ok(())
        }
    }

    fn small_geometry() -> StageGeometry {
        StageGeometry {
            source_width: 64,
            source_height: 36,
            filter_width: 64 / PACK_FACTOR as u32,
            filter_height: 36,
            readout_width: 2,
            readout_height: 4,
        }
    }

    #[test]
    fn readback_suppressed_during_pipeline_fill() {
        let mut stage = RecordingStage::new();
        let geometry = small_geometry();
        let source = stage.create_image(geometry.source_width, geometry.source_height).unwrap();
        let mut scheduler = FrameScheduler::new(&mut stage, geometry, 20).unwrap();
        let (producer, consumer) = exchange(4, geometry.readback_len());

        for _ in 0..PIPELINE_FILL_FRAMES {
            scheduler.advance(&mut stage, source, &producer).unwrap();
        }
        assert!(stage.readbacks.is_empty());
        assert!(consumer.try_take().is_none());

        scheduler.advance(&mut stage, source, &producer).unwrap();
        assert_eq!(stage.readbacks.len(), 1);
        let loan = consumer.try_take().unwrap();
        assert_eq!(loan.kind, BufferKind::Ball);
    }

    #[test]
    fn ball_passes_ping_pong_between_frames() {
        let mut stage = RecordingStage::new();
        let geometry = small_geometry();
        let source = stage.create_image(geometry.source_width, geometry.source_height).unwrap();
        let mut scheduler = FrameScheduler::new(&mut stage, geometry, 20).unwrap();
        let (producer, _consumer) = exchange(4, geometry.readback_len());

        scheduler.advance(&mut stage, source, &producer).unwrap();
        scheduler.advance(&mut stage, source, &producer).unwrap();

        let filters: Vec<_> = stage
            .passes
            .iter()
            .filter(|(t, _, _)| *t == Transform::HueFilterBall)
            .map(|(_, _, dest)| *dest)
            .collect();
        assert_eq!(filters.len(), 2);
        assert_ne!(filters[0], filters[1], "hue filter must alternate targets");

        // The downsample pass must read the texture the hue filter wrote on
        // the previous frame, not this frame's target.
        let downsamples: Vec<_> = stage
            .passes
            .iter()
            .filter(|(t, _, _)| *t == Transform::Downsample)
            .map(|(_, src, _)| Target::Image(*src))
            .collect();
        assert_eq!(downsamples[1], filters[0]);
    }

    #[test]
    fn field_readback_runs_on_the_configured_cadence() {
        let mut stage = RecordingStage::new();
        let geometry = small_geometry();
        let source = stage.create_image(geometry.source_width, geometry.source_height).unwrap();
        let interval = 6;
        let mut scheduler = FrameScheduler::new(&mut stage, geometry, interval).unwrap();
        let (producer, consumer) = exchange(4, geometry.readback_len());

        let mut field_frames = Vec::new();
        for frame in 0..40 {
            scheduler.advance(&mut stage, source, &producer).unwrap();
            while let Some(loan) = consumer.try_take() {
                if loan.kind == BufferKind::Field {
                    field_frames.push(frame);
                }
            }
        }

        assert!(field_frames.len() >= 2);
        for pair in field_frames.windows(2) {
            assert_eq!(pair[1] - pair[0], interval as i32);
        }
    }
}
