//! Shared geometry types passed between pipeline stages.

use std::fmt;

/// A 2D point. Screen coordinates live in [-1,1]x[-1,1] (y-up), field
/// coordinates in [0,1]x[0,1] with x=0 at the left goal.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box of the playable area in screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldRect {
    pub xmin: f32,
    pub xmax: f32,
    pub ymin: f32,
    pub ymax: f32,
}

impl Default for FieldRect {
    /// Conservative startup guess; converges to the measured field within a
    /// handful of field updates.
    fn default() -> Self {
        Self {
            xmin: -0.8,
            xmax: 0.8,
            ymin: -0.8,
            ymax: 0.8,
        }
    }
}

impl FieldRect {
    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    /// Clamp to the normalized range and keep min strictly below max.
    pub fn clamped(mut self) -> Self {
        self.xmin = self.xmin.clamp(-1.0, 1.0);
        self.xmax = self.xmax.clamp(-1.0, 1.0);
        self.ymin = self.ymin.clamp(-1.0, 1.0);
        self.ymax = self.ymax.clamp(-1.0, 1.0);
        if self.xmax <= self.xmin {
            self.xmax = (self.xmin + f32::EPSILON).min(1.0);
            self.xmin = self.xmax - f32::EPSILON;
        }
        if self.ymax <= self.ymin {
            self.ymax = (self.ymin + f32::EPSILON).min(1.0);
            self.ymin = self.ymax - f32::EPSILON;
        }
        self
    }

    /// Exponential time average: keeps `alpha` of the current rectangle and
    /// takes `1 - alpha` of the measurement. The field fluctuates per update
    /// otherwise.
    pub fn blend(&mut self, measured: FieldRect, alpha: f32) {
        let beta = 1.0 - alpha;
        self.xmin = alpha * self.xmin + beta * measured.xmin;
        self.xmax = alpha * self.xmax + beta * measured.xmax;
        self.ymin = alpha * self.ymin + beta * measured.ymin;
        self.ymax = alpha * self.ymax + beta * measured.ymax;
        *self = self.clamped();
    }

    /// Widen about the center by `factor` on both axes. Used to include the
    /// white bars that sit just outside the green felt.
    pub fn widened(self, factor: f32) -> Self {
        let fplus = 0.5 * (1.0 + factor);
        let fmin = 0.5 * (1.0 - factor);
        Self {
            xmin: fmin * self.xmax + fplus * self.xmin,
            xmax: fplus * self.xmax + fmin * self.xmin,
            ymin: fmin * self.ymax + fplus * self.ymin,
            ymax: fplus * self.ymax + fmin * self.ymin,
        }
        .clamped()
    }
}

/// Which goal mouth an event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

/// One entry of the ball position history.
#[derive(Clone, Copy, Debug, Default)]
pub struct BallSample {
    /// Field coordinates, [0,1]x[0,1].
    pub pos: Point,
    /// Frame the position was captured at.
    pub frame: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_converges_to_constant_measurement() {
        let mut rect = FieldRect::default();
        let measured = FieldRect {
            xmin: -0.95,
            xmax: 0.95,
            ymin: -0.6,
            ymax: 0.6,
        };
        for _ in 0..200 {
            rect.blend(measured, 0.8);
            assert!(rect.xmin >= -1.0 && rect.xmax <= 1.0);
            assert!(rect.xmin < rect.xmax && rect.ymin < rect.ymax);
        }
        assert!((rect.xmin - measured.xmin).abs() < 1e-3);
        assert!((rect.xmax - measured.xmax).abs() < 1e-3);
        assert!((rect.ymin - measured.ymin).abs() < 1e-3);
        assert!((rect.ymax - measured.ymax).abs() < 1e-3);
    }

    #[test]
    fn blend_never_overshoots_bounds() {
        let mut rect = FieldRect::default();
        let measured = FieldRect {
            xmin: -2.0,
            xmax: 2.0,
            ymin: -2.0,
            ymax: 2.0,
        };
        for _ in 0..100 {
            rect.blend(measured, 0.9);
        }
        assert!(rect.xmin >= -1.0 && rect.xmax <= 1.0);
        assert!(rect.ymin >= -1.0 && rect.ymax <= 1.0);
    }

    #[test]
    fn widened_grows_about_center() {
        let rect = FieldRect {
            xmin: -0.5,
            xmax: 0.5,
            ymin: -0.5,
            ymax: 0.5,
        };
        let wide = rect.widened(1.143);
        assert!(wide.xmin < rect.xmin && wide.xmax > rect.xmax);
        assert!((wide.width() - rect.width() * 1.143).abs() < 1e-5);
    }
}
