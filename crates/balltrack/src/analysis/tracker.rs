//! Ball trajectory tracking and event detection.
//!
//! Consumes one ball position (or absence) per analysed frame and turns the
//! trajectory into game events. All decisions run on field coordinates, so
//! camera placement only matters to the detectors.
//!
//! Goals are detected by disappearance: a ball that vanishes inside a goal
//! mouth and stays gone for a run of frames has been swallowed by the goal.
//! Saves and fast balls are armed as pending events first and only emitted
//! once a debounce window passes without a goal, since a shot that ends in
//! the net should report as a goal and nothing else.

use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::data::{BallSample, Point, Side};
use crate::events::Event;

/// Ball position history length. Also the flush granularity of the
/// diagnostic time series.
pub const HISTORY_LEN: usize = 256;

/// Which team defends each bar, indexed by bar number 1..=8 from the left
/// goal. Index 0 is unused. Blue defends the left goal.
const BAR_TEAMS: [Team; 9] = [
    Team::Blue, // placeholder, bar numbers start at 1
    Team::Blue,
    Team::Blue,
    Team::Red,
    Team::Blue,
    Team::Red,
    Team::Blue,
    Team::Red,
    Team::Red,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Team {
    Blue,
    Red,
}

impl Team {
    /// The team whose goal mouth sits on `side`.
    fn defending(side: Side) -> Team {
        match side {
            Side::Left => Team::Blue,
            Side::Right => Team::Red,
        }
    }
}

/// A debounced event waiting to be emitted or superseded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pending {
    Inactive,
    Armed { since: u64 },
}

impl Pending {
    /// Start the debounce clock. A timer that is already running keeps its
    /// original start, otherwise a ball that stays fast would postpone the
    /// event forever.
    fn arm(&mut self, frame: u64) {
        if matches!(self, Pending::Inactive) {
            *self = Pending::Armed { since: frame };
        }
    }

    fn disarm(&mut self) {
        *self = Pending::Inactive;
    }

    /// True exactly once, when the debounce window has passed.
    fn expired(&mut self, frame: u64, window: u64) -> bool {
        match *self {
            Pending::Armed { since } if frame.saturating_sub(since) > window => {
                *self = Pending::Inactive;
                true
            }
            _ => false,
        }
    }
}

/// What one tracker update produced.
#[derive(Debug, Default)]
pub struct UpdateOutput {
    pub events: Vec<Event>,
    /// The history buffer wrapped; callers holding a time-series sink should
    /// flush it now.
    pub flush_history: bool,
}

pub struct TrackerState {
    config: TrackerConfig,
    fps: f32,

    frame: u64,
    history: [BallSample; HISTORY_LEN],
    cursor: usize,

    /// Per-frame speed samples in km/h, zero when the ball was not seen.
    speeds: Vec<f32>,
    speed_cursor: usize,
    frames_since_speed_report: u64,

    missing: u32,
    ever_seen: bool,

    pending_save: Pending,
    pending_fast: Pending,
    last_goal_frame: Option<u64>,
}

impl TrackerState {
    pub fn new(config: TrackerConfig) -> Self {
        let fps = config.fps;
        let window = (config.speed_window_s * fps).max(1.0) as usize;
        Self {
            config,
            fps,
            frame: 0,
            history: [BallSample::default(); HISTORY_LEN],
            cursor: 0,
            speeds: vec![0.0; window],
            speed_cursor: 0,
            frames_since_speed_report: 0,
            missing: 0,
            ever_seen: false,
            pending_save: Pending::Inactive,
            pending_fast: Pending::Inactive,
            last_goal_frame: None,
        }
    }

    /// Replace the nominal frame rate with the measured one. All debounce
    /// windows scale with it.
    pub fn set_fps(&mut self, fps: f32) {
        if fps > 0.0 {
            self.fps = fps;
        }
    }

    /// The recorded trajectory, oldest entries possibly zeroed before the
    /// first wrap.
    pub fn history(&self) -> &[BallSample] {
        &self.history
    }

    /// Samples recorded since the last wrap, for a final partial flush.
    pub fn unflushed_history(&self) -> &[BallSample] {
        &self.history[..self.cursor]
    }

    /// Feed the detection result for one frame. `detection` is the ball
    /// position in field coordinates, or `None` when no ball was found.
    pub fn update(&mut self, detection: Option<Point>) -> UpdateOutput {
        self.frame += 1;
        let mut out = UpdateOutput::default();

        // Pending events age first, so a goal on this very frame can still
        // supersede them below.
        let pending_window = TrackerConfig::frames(self.config.pending_debounce_s, self.fps);
        if self.pending_save.expired(self.frame, pending_window) {
            out.events.push(Event::Save);
        }
        if self.pending_fast.expired(self.frame, pending_window) {
            out.events.push(Event::Fast);
        }

        match detection {
            Some(pos) => self.seen(pos, &mut out),
            None => self.not_seen(&mut out),
        }

        self.maybe_report_max_speed(&mut out);
        out
    }

    fn seen(&mut self, pos: Point, out: &mut UpdateOutput) {
        if self.ever_seen && self.missing >= self.config.missing_reacquire_frames {
            debug!(missing = self.missing, "ball reacquired after a long gap");
        }
        self.missing = 0;

        let prev = self.history[(self.cursor + HISTORY_LEN - 1) % HISTORY_LEN];
        self.history[self.cursor] = BallSample {
            pos,
            frame: self.frame,
        };
        self.cursor += 1;
        if self.cursor == HISTORY_LEN {
            self.cursor = 0;
            out.flush_history = true;
        }

        let mut speed_kmh = 0.0;
        let gap = self.frame - prev.frame;
        if self.ever_seen && self.frame > self.config.warmup_frames && gap <= self.config.max_sample_gap {
            let dx = (pos.x - prev.pos.x) * self.config.field_width_m;
            let dy = (pos.y - prev.pos.y) * self.config.field_height_m;
            let meters = (dx * dx + dy * dy).sqrt();
            let seconds = gap as f32 / self.fps;
            speed_kmh = meters / seconds * 3.6;
            self.classify_speed(pos, speed_kmh);
        }
        self.push_speed(speed_kmh);
        self.ever_seen = true;
    }

    /// Arm pending events for fast balls. A moderate speed straight in front
    /// of a goal mouth already means a shot on goal, so the threshold is
    /// lower there; anywhere else only the higher threshold counts.
    fn classify_speed(&mut self, pos: Point, speed_kmh: f32) {
        let approach = 3.0 * self.config.goal_width;
        let in_goal_band = (pos.y - 0.5).abs() < 0.5 * self.config.goal_height;
        let near_goal = in_goal_band && (pos.x < approach || pos.x > 1.0 - approach);
        if near_goal && speed_kmh > self.config.save_speed_kmh {
            self.pending_save.arm(self.frame);
        } else if speed_kmh > self.config.fast_speed_kmh {
            self.pending_fast.arm(self.frame);
        }
    }

    fn not_seen(&mut self, out: &mut UpdateOutput) {
        self.push_speed(0.0);
        if !self.ever_seen {
            return;
        }
        self.missing += 1;
        if self.missing == self.config.missing_goal_frames {
            self.check_goal(out);
        }
    }

    /// The ball has been gone long enough that this was not a detector
    /// hiccup. If it vanished inside a goal mouth, that is a goal.
    fn check_goal(&mut self, out: &mut UpdateOutput) {
        let last = self.history[(self.cursor + HISTORY_LEN - 1) % HISTORY_LEN];
        let side = match self.goal_side(last.pos) {
            Some(side) => side,
            None => return,
        };

        // The shot ends here; nothing weaker than a goal survives it.
        self.pending_save.disarm();
        self.pending_fast.disarm();

        let debounce = TrackerConfig::frames(self.config.goal_debounce_s, self.fps);
        if let Some(previous) = self.last_goal_frame {
            if self.frame.saturating_sub(previous) <= debounce {
                debug!(side = %side, "goal suppressed by debounce");
                return;
            }
        }
        self.last_goal_frame = Some(self.frame);

        let bar = self.attribute_goal(side);
        info!(side = %side, bar = ?bar, "goal");
        out.events.push(Event::Goal { side, bar });
    }

    fn goal_side(&self, pos: Point) -> Option<Side> {
        if (pos.y - 0.5).abs() >= 0.5 * self.config.goal_height {
            return None;
        }
        if pos.x < self.config.goal_width {
            Some(Side::Left)
        } else if pos.x > 1.0 - self.config.goal_width {
            Some(Side::Right)
        } else {
            None
        }
    }

    /// Walk the trajectory backwards and find the scoring bar: the last bar
    /// of the scoring team the ball stayed at for a confirmed run. Bars of
    /// the conceding team are skipped since the ball passes them on the way
    /// in without having been shot from there.
    fn attribute_goal(&self, side: Side) -> Option<u8> {
        let conceding = Team::defending(side);
        let lookback = TrackerConfig::frames(self.config.attribution_lookback_s, self.fps);
        let oldest = self.frame.saturating_sub(lookback);

        let mut candidate = 0u8;
        let mut hits = 0u32;
        for offset in 1..=HISTORY_LEN {
            let sample = self.history[(self.cursor + HISTORY_LEN - offset) % HISTORY_LEN];
            if sample.frame < oldest || sample.frame > self.frame {
                break;
            }
            let bar = bar_at(sample.pos.x);
            if BAR_TEAMS[bar as usize] == conceding {
                continue;
            }
            if bar == candidate {
                hits += 1;
                if hits >= self.config.bar_confirm_hits {
                    return Some(bar);
                }
            } else {
                candidate = bar;
                hits = 1;
            }
        }
        None
    }

    fn push_speed(&mut self, speed_kmh: f32) {
        self.speeds[self.speed_cursor] = speed_kmh;
        self.speed_cursor = (self.speed_cursor + 1) % self.speeds.len();
    }

    fn maybe_report_max_speed(&mut self, out: &mut UpdateOutput) {
        if self.frame <= self.config.warmup_frames {
            return;
        }
        self.frames_since_speed_report += 1;
        let interval = TrackerConfig::frames(self.config.speed_report_interval_s, self.fps);
        if self.frames_since_speed_report <= interval {
            return;
        }
        self.frames_since_speed_report = 0;
        let max = self.speeds.iter().copied().fold(0.0f32, f32::max);
        // Sent even when the window is all zeroes; consumers use the steady
        // cadence as a liveness signal.
        out.events.push(Event::MaxSpeed(max));
    }
}

/// Bar number 1..=8 under a field x coordinate. Bar 1 is the left keeper.
fn bar_at(x: f32) -> u8 {
    (1.0 + 8.0 * x).clamp(1.0, 8.0) as u8
}
