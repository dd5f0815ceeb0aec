//! Ball detection.
//!
//! The ball-hue readout is bright where the frame matches the ball color.
//! Detection finds the brightest sample inside the field rectangle and
//! refines it to a weighted centroid over a small window, which gives
//! sub-sample resolution on a 160x90 grid. A detection only counts when both
//! the peak and the summed window weight clear their thresholds, so a lone
//! bright sample from a hand or a shirt does not register as the ball.

use crate::config::TrackerConfig;
use crate::data::{FieldRect, Point};

/// Half-size of the centroid window around the peak, in samples.
const CENTROID_RADIUS: i64 = 5;

/// Slack added around the field rectangle, in samples. The rectangle is an
/// averaged estimate and the ball is wider than one sample.
const FIELD_MARGIN: f32 = 1.5;

/// A confirmed ball position in both coordinate systems.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    /// Screen coordinates, [-1,1] on both axes.
    pub screen: Point,
    /// Field coordinates, [0,1] with x=0 at the left goal.
    pub field: Point,
}

/// Locate the ball in one readout buffer, constrained to `field`.
pub fn detect(
    samples: &[u8],
    width: usize,
    height: usize,
    field: &FieldRect,
    config: &TrackerConfig,
) -> Option<Detection> {
    debug_assert_eq!(samples.len(), width * height);

    let x_lo = to_sample(field.xmin, width) - FIELD_MARGIN;
    let x_hi = to_sample(field.xmax, width) + FIELD_MARGIN;
    let y_lo = to_sample(field.ymin, height) - FIELD_MARGIN;
    let y_hi = to_sample(field.ymax, height) + FIELD_MARGIN;

    let x_lo = (x_lo.max(0.0) as usize).min(width);
    let x_hi = (x_hi.max(0.0) as usize + 1).min(width);
    let y_lo = (y_lo.max(0.0) as usize).min(height);
    let y_hi = (y_hi.max(0.0) as usize + 1).min(height);

    let mut peak = 0u8;
    let mut peak_x = 0i64;
    let mut peak_y = 0i64;
    for y in y_lo..y_hi {
        for x in x_lo..x_hi {
            let value = samples[y * width + x];
            if value > peak {
                peak = value;
                peak_x = x as i64;
                peak_y = y as i64;
            }
        }
    }
    if peak <= config.ball_peak_threshold {
        return None;
    }

    // Weighted centroid over the window around the peak.
    let mut weight = 0u64;
    let mut wx = 0u64;
    let mut wy = 0u64;
    for y in (peak_y - CENTROID_RADIUS).max(y_lo as i64)..(peak_y + CENTROID_RADIUS + 1).min(y_hi as i64) {
        for x in (peak_x - CENTROID_RADIUS).max(x_lo as i64)..(peak_x + CENTROID_RADIUS + 1).min(x_hi as i64)
        {
            let value = samples[y as usize * width + x as usize] as u64;
            weight += value;
            wx += value * x as u64;
            wy += value * y as u64;
        }
    }
    if weight <= config.ball_weight_threshold as u64 {
        return None;
    }

    // Half-sample offset puts the position at the sample center.
    let cx = wx as f32 / weight as f32 + 0.5;
    let cy = wy as f32 / weight as f32 + 0.5;

    let screen = Point::new(
        2.0 * cx / width as f32 - 1.0,
        2.0 * cy / height as f32 - 1.0,
    );
    let field_pos = Point::new(
        ((screen.x - field.xmin) / field.width()).clamp(0.0, 1.0),
        ((screen.y - field.ymin) / field.height()).clamp(0.0, 1.0),
    );

    Some(Detection {
        screen,
        field: field_pos,
    })
}

fn to_sample(screen: f32, extent: usize) -> f32 {
    0.5 * (screen + 1.0) * extent as f32
}
