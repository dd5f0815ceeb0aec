//! Runtime configuration.
//!
//! Every tuning constant of the detectors and the event state machine lives
//! here so a table with different geometry or lighting can be dialed in
//! without recompiling. Defaults match the values the tracker ships with.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};

const USAGE: &str = "Usage: balltrack --replay <raw-rgba-file> \
[--fifo <path>] [--timeseries <path>] [--fps <hz>] \
[--field-interval <frames>] [--field-alpha <0..1>] [--verbose]";

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Raw RGBA8 frame file for offline runs.
    pub replay: Option<PathBuf>,
    /// Named pipe the event notifier writes to.
    pub fifo_path: PathBuf,
    /// Optional diagnostic time-series file.
    pub timeseries_path: Option<PathBuf>,
    /// Nominal camera frame rate; refined at runtime by the measured rate.
    pub fps: f32,
    pub verbose: bool,

    // Field detection
    /// Frames between field rectangle updates.
    pub field_interval: u32,
    /// EMA weight kept for the previous rectangle per update.
    pub field_alpha: f32,
    /// Intensity below this is ignored in the projections.
    pub field_noise_floor: u8,
    /// Widening factor that includes the white bars around the felt.
    pub field_bar_factor: f32,

    // Ball detection
    /// The peak sample must exceed this.
    pub ball_peak_threshold: u8,
    /// The summed weight around the peak must exceed this.
    pub ball_weight_threshold: u32,

    // Goal geometry, in field coordinates where the full field is 1.0 wide.
    pub goal_width: f32,
    pub goal_height: f32,

    // Physical field size, for speeds in km/h.
    pub field_width_m: f32,
    pub field_height_m: f32,

    // Event state machine
    /// Speed sample is only taken when consecutive detections are at most
    /// this many frames apart.
    pub max_sample_gap: u64,
    /// Missing-frame count at which a disappearance becomes a goal check.
    pub missing_goal_frames: u32,
    /// Missing streak worth a reacquisition diagnostic.
    pub missing_reacquire_frames: u32,
    /// Frames before any speed handling or reports start.
    pub warmup_frames: u64,
    /// Speed toward a goal mouth that arms a SAVE, km/h.
    pub save_speed_kmh: f32,
    /// Speed elsewhere that arms a FAST, km/h.
    pub fast_speed_kmh: f32,
    /// Seconds a pending SAVE/FAST waits for a superseding goal.
    pub pending_debounce_s: f32,
    /// Minimum seconds between two emitted goals.
    pub goal_debounce_s: f32,
    /// Seconds of history scanned for scoring attribution.
    pub attribution_lookback_s: f32,
    /// Consecutive samples on one bar required to attribute a goal.
    pub bar_confirm_hits: u32,
    /// Seconds of speed samples considered for a max-speed report.
    pub speed_window_s: f32,
    /// Minimum seconds between max-speed reports.
    pub speed_report_interval_s: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            replay: None,
            fifo_path: PathBuf::from("/tmp/foosballtrackerpipe.in"),
            timeseries_path: None,
            fps: 60.0,
            verbose: false,
            field_interval: 20,
            field_alpha: 0.80,
            field_noise_floor: 20,
            field_bar_factor: 1.143,
            ball_peak_threshold: 100,
            ball_weight_threshold: 270,
            goal_width: 0.10,
            goal_height: 0.38,
            field_width_m: 1.205,
            field_height_m: 0.702,
            max_sample_gap: 10,
            missing_goal_frames: 15,
            missing_reacquire_frames: 30,
            warmup_frames: 100,
            save_speed_kmh: 15.0,
            fast_speed_kmh: 30.0,
            pending_debounce_s: 0.5,
            goal_debounce_s: 1.5,
            attribution_lookback_s: 2.5,
            bar_confirm_hits: 6,
            speed_window_s: 5.0,
            speed_report_interval_s: 0.5,
        }
    }
}

impl TrackerConfig {
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();

        let mut idx = 1;
        while idx < args.len() {
            match args[idx].as_str() {
                "--replay" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--replay requires a value"))?;
                    config.replay = Some(PathBuf::from(value));
                    idx += 1;
                }
                "--fifo" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--fifo requires a value"))?;
                    config.fifo_path = PathBuf::from(value);
                    idx += 1;
                }
                "--timeseries" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--timeseries requires a value"))?;
                    config.timeseries_path = Some(PathBuf::from(value));
                    idx += 1;
                }
                "--fps" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--fps requires a value"))?
                        .parse::<f32>()
                        .with_context(|| "--fps must be a number".to_string())?;
                    if !(value > 0.0) {
                        bail!("--fps must be positive");
                    }
                    config.fps = value;
                    idx += 1;
                }
                "--field-interval" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--field-interval requires a value"))?
                        .parse::<u32>()
                        .with_context(|| "--field-interval must be an integer".to_string())?;
                    if value < 3 {
                        bail!("--field-interval must be at least 3 (filter, downsample, readback)");
                    }
                    config.field_interval = value;
                    idx += 1;
                }
                "--field-alpha" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--field-alpha requires a value"))?
                        .parse::<f32>()
                        .with_context(|| "--field-alpha must be a number".to_string())?;
                    if !(0.0..1.0).contains(&value) {
                        bail!("--field-alpha must be in [0, 1)");
                    }
                    config.field_alpha = value;
                    idx += 1;
                }
                "--verbose" => {
                    config.verbose = true;
                    idx += 1;
                }
                "--help" | "-h" => {
                    bail!(USAGE);
                }
                arg => {
                    bail!("Unrecognised argument: {arg}\n{USAGE}");
                }
            }
        }

        Ok(config)
    }

    /// Convert a duration in seconds into whole frames at the given rate.
    pub fn frames(seconds: f32, fps: f32) -> u64 {
        (seconds * fps).max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("balltrack")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        let config = TrackerConfig::from_args(&args(&[])).unwrap();
        assert_eq!(config.field_interval, 20);
        assert!(config.replay.is_none());
        assert_eq!(config.fifo_path, PathBuf::from("/tmp/foosballtrackerpipe.in"));
    }

    #[test]
    fn parses_replay_and_fps() {
        let config =
            TrackerConfig::from_args(&args(&["--replay", "match.rgba", "--fps", "50"])).unwrap();
        assert_eq!(config.replay.as_deref(), Some(std::path::Path::new("match.rgba")));
        assert_eq!(config.fps, 50.0);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(TrackerConfig::from_args(&args(&["--fps", "0"])).is_err());
        assert!(TrackerConfig::from_args(&args(&["--field-interval", "1"])).is_err());
        assert!(TrackerConfig::from_args(&args(&["--bogus"])).is_err());
    }
}
