//! Field rectangle detection.
//!
//! Works on the downsampled field-hue readout: project the intensities onto
//! both axes, then find where each projection rises above half of its mean.
//! Stray bright pixels outside the table barely move a whole row or column
//! sum, so the projections are far more stable than any per-pixel scan.

use tracing::debug;

use crate::config::TrackerConfig;
use crate::data::FieldRect;

/// Measure the field bounding box from one readout buffer.
///
/// `samples` is the unpacked intensity array, `width` x `height`, row-major
/// with row 0 at the top of the image. Returns `None` when the frame has no
/// usable field signal, for example while the camera is still adjusting.
pub fn measure(
    samples: &[u8],
    width: usize,
    height: usize,
    config: &TrackerConfig,
) -> Option<FieldRect> {
    debug_assert_eq!(samples.len(), width * height);

    let floor = config.field_noise_floor as u64;
    let mut col_sums = vec![0u64; width];
    let mut row_sums = vec![0u64; height];
    let mut total = 0u64;

    for (row, line) in samples.chunks_exact(width).enumerate() {
        for (col, &sample) in line.iter().enumerate() {
            let value = sample as u64;
            if value > floor {
                col_sums[col] += value;
                row_sums[row] += value;
                total += value;
            }
        }
    }

    if total == 0 {
        debug!("no field signal above the noise floor");
        return None;
    }

    // A column inside the field carries roughly total/width; half of that
    // separates field columns from background columns.
    let (col_lo, col_hi) = crossing(&col_sums, total / (2 * width as u64))?;
    let (row_lo, row_hi) = crossing(&row_sums, total / (2 * height as u64))?;

    let rect = FieldRect {
        xmin: to_screen(col_lo, width),
        xmax: to_screen(col_hi, width),
        ymin: to_screen(row_lo, height),
        ymax: to_screen(row_hi, height),
    };

    // The green felt stops at the inner walls; widen to include the goal
    // mouths and the rail the felt bound misses.
    Some(rect.widened(config.field_bar_factor))
}

/// First and last index whose sum exceeds `bound`, with a one-sample margin
/// on the low side and the exclusive edge plus margin on the high side.
fn crossing(sums: &[u64], bound: u64) -> Option<(usize, usize)> {
    let first = sums.iter().position(|&s| s > bound)?;
    let last = sums.iter().rposition(|&s| s > bound)?;
    Some((first.saturating_sub(1), (last + 2).min(sums.len())))
}

fn to_screen(index: usize, extent: usize) -> f32 {
    2.0 * index as f32 / extent as f32 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = 160;
    const H: usize = 90;

    /// Frame with a bright axis-aligned block and darkness elsewhere.
    fn frame_with_block(x0: usize, x1: usize, y0: usize, y1: usize, value: u8) -> Vec<u8> {
        let mut samples = vec![0u8; W * H];
        for y in y0..y1 {
            for x in x0..x1 {
                samples[y * W + x] = value;
            }
        }
        samples
    }

    #[test]
    fn finds_a_centered_field() {
        let config = TrackerConfig::default();
        let samples = frame_with_block(20, 140, 10, 80, 200);
        let rect = measure(&samples, W, H, &config).unwrap();

        // Expected bounds before widening, in screen coordinates.
        let xmin = 2.0 * 19.0 / W as f32 - 1.0;
        let xmax = 2.0 * 142.0 / W as f32 - 1.0;
        assert!(rect.xmin < xmin + 0.01 && rect.xmin > xmin - 0.15);
        assert!(rect.xmax > xmax - 0.01 && rect.xmax < xmax + 0.15);
        assert!(rect.ymin < rect.ymax);
    }

    #[test]
    fn dark_frame_yields_nothing() {
        let config = TrackerConfig::default();
        let samples = vec![0u8; W * H];
        assert!(measure(&samples, W, H, &config).is_none());
    }

    #[test]
    fn noise_below_the_floor_is_ignored() {
        let config = TrackerConfig::default();
        let mut samples = frame_with_block(40, 120, 20, 70, 200);
        // Faint glow in a corner far outside the field.
        for y in 0..5 {
            for x in 0..5 {
                samples[y * W + x] = config.field_noise_floor;
            }
        }
        let clean = measure(&frame_with_block(40, 120, 20, 70, 200), W, H, &config).unwrap();
        let noisy = measure(&samples, W, H, &config).unwrap();
        assert_eq!(clean, noisy);
    }

    #[test]
    fn single_bright_speck_does_not_become_a_field() {
        let config = TrackerConfig::default();
        let mut samples = frame_with_block(30, 130, 15, 75, 180);
        samples[2 * W + 2] = 255;
        let rect = measure(&samples, W, H, &config).unwrap();
        // The speck's column sum is far below half the mean column sum.
        assert!(rect.xmin > -0.9);
        assert!(rect.ymin > -0.9);
    }
}
