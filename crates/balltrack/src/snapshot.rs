//! Overlay state shared between the analysis thread and the render thread.

use std::sync::{Arc, Mutex};

use crate::data::{FieldRect, Point};

/// How many recent positions the overlay trail keeps.
pub const TRAIL_LEN: usize = 64;

/// Everything a renderer needs to draw the debug overlay for one frame.
#[derive(Clone, Debug)]
pub struct OverlaySnapshot {
    pub field: FieldRect,
    /// Recent ball positions in screen coordinates, oldest first.
    pub trail: Vec<Point>,
    /// Frame of the newest trail entry.
    pub frame: u64,
}

impl Default for OverlaySnapshot {
    fn default() -> Self {
        Self {
            field: FieldRect::default(),
            trail: Vec::with_capacity(TRAIL_LEN),
            frame: 0,
        }
    }
}

/// Single-writer, many-reader snapshot handle. The analysis thread replaces
/// the snapshot, renderers clone it out; the lock is held only for the copy.
#[derive(Clone, Default)]
pub struct SharedOverlay {
    inner: Arc<Mutex<OverlaySnapshot>>,
}

impl SharedOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more trail point without rebuilding the whole snapshot.
    pub fn push_trail(&self, point: Point, frame: u64) {
        if let Ok(mut guard) = self.inner.lock() {
            if guard.trail.len() == TRAIL_LEN {
                guard.trail.remove(0);
            }
            guard.trail.push(point);
            guard.frame = frame;
        }
    }

    pub fn set_field(&self, field: FieldRect) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.field = field;
        }
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_is_bounded() {
        let overlay = SharedOverlay::new();
        for i in 0..(2 * TRAIL_LEN as u64) {
            overlay.push_trail(Point::new(0.0, 0.0), i);
        }
        let snap = overlay.snapshot();
        assert_eq!(snap.trail.len(), TRAIL_LEN);
        assert_eq!(snap.frame, 2 * TRAIL_LEN as u64 - 1);
    }

    #[test]
    fn field_updates_are_visible_to_readers() {
        let overlay = SharedOverlay::new();
        let reader = overlay.clone();
        let field = FieldRect {
            xmin: -0.9,
            xmax: 0.9,
            ymin: -0.5,
            ymax: 0.5,
        };
        overlay.set_field(field);
        assert_eq!(reader.snapshot().field, field);
    }
}
