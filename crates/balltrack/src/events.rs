//! Game events and how they leave the process.
//!
//! Events travel as single text lines through a named pipe. Delivery is best
//! effort by design: a scoreboard that is not running must never stall or
//! kill the tracker, so writes are non-blocking and failures are logged at
//! debug level and dropped.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use metrics::counter;
use tracing::{debug, warn};

use crate::data::{BallSample, Side};

/// One detected game event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    /// The ball disappeared into a goal mouth. `bar` is the scoring bar
    /// (1..=8 from the left keeper) when attribution was confident.
    Goal { side: Side, bar: Option<u8> },
    /// A keeper held a fast shot out of the goal.
    Save,
    /// A fast ball in open play.
    Fast,
    /// Highest speed over the sliding window, km/h.
    MaxSpeed(f32),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Goal { side, bar: Some(bar) } => write!(f, "GOAL {side} {bar}"),
            Event::Goal { side, bar: None } => write!(f, "GOAL {side}"),
            Event::Save => f.write_str("SAVE"),
            Event::Fast => f.write_str("FAST"),
            Event::MaxSpeed(kmh) => write!(f, "MAXSPEED {kmh:.1}"),
        }
    }
}

/// Writes event lines into the named pipe consumers subscribe to.
pub struct Notifier {
    path: PathBuf,
}

impl Notifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Send one event. Nothing listening on the pipe is a normal state, not
    /// an error.
    pub fn notify(&self, event: &Event) {
        counter!("balltrack_events_total").increment(1);
        let line = format!("{event}\n");
        match self.open() {
            Ok(mut pipe) => {
                if let Err(err) = pipe.write_all(line.as_bytes()) {
                    debug!(path = %self.path.display(), %err, "event dropped, pipe write failed");
                }
            }
            Err(err) => {
                debug!(path = %self.path.display(), %err, "event dropped, no pipe reader");
            }
        }
    }

    /// Non-blocking open fails immediately when no reader has the pipe open,
    /// instead of hanging the analysis thread.
    fn open(&self) -> std::io::Result<File> {
        OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
    }
}

/// Appends ball trajectory windows to a diagnostic file for offline tuning.
/// A sink that fails once disables itself so a full disk does not spam the
/// log at frame rate.
pub struct TimeseriesSink {
    file: Option<File>,
    path: PathBuf,
}

impl TimeseriesSink {
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = File::create(path)
            .with_context(|| format!("creating time series file {}", path.display()))?;
        writeln!(file, "# balltrack trajectory, started {}", Local::now().to_rfc3339())
            .context("writing time series header")?;
        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
        })
    }

    /// Append one history window, oldest sample first.
    pub fn append_window(&mut self, samples: &[BallSample]) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        for sample in samples {
            if sample.frame == 0 {
                continue;
            }
            if let Err(err) = writeln!(file, "{} {:.4} {:.4}", sample.frame, sample.pos.x, sample.pos.y)
            {
                warn!(path = %self.path.display(), %err, "time series disabled after write failure");
                self.file = None;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Point;
    use std::io::Read;

    #[test]
    fn event_lines_match_the_wire_format() {
        assert_eq!(
            Event::Goal {
                side: Side::Left,
                bar: Some(3)
            }
            .to_string(),
            "GOAL left 3"
        );
        assert_eq!(
            Event::Goal {
                side: Side::Right,
                bar: None
            }
            .to_string(),
            "GOAL right"
        );
        assert_eq!(Event::Save.to_string(), "SAVE");
        assert_eq!(Event::Fast.to_string(), "FAST");
        assert_eq!(Event::MaxSpeed(31.26).to_string(), "MAXSPEED 31.3");
    }

    #[test]
    fn missing_pipe_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Notifier::new(dir.path().join("no-such-pipe"));
        notifier.notify(&Event::Save);
        notifier.notify(&Event::MaxSpeed(12.0));
    }

    #[test]
    fn timeseries_skips_unwritten_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trajectory.txt");
        let mut sink = TimeseriesSink::create(&path).unwrap();

        let mut samples = [BallSample::default(); 4];
        samples[0] = BallSample {
            pos: Point::new(0.25, 0.5),
            frame: 10,
        };
        samples[1] = BallSample {
            pos: Point::new(0.26, 0.5),
            frame: 11,
        };
        sink.append_window(&samples);

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert!(lines[0].starts_with('#'));
        assert_eq!(lines[1], "10 0.2500 0.5000");
        assert_eq!(lines[2], "11 0.2600 0.5000");
        assert_eq!(lines.len(), 3);
    }
}
