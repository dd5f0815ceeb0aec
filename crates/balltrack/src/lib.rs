//! Real-time foosball ball tracker.
//!
//! A camera above the table feeds 720p frames through a small GPU compute
//! schedule (hue filtering and downsampling, pipelined across frames), and
//! an analysis thread turns the downsampled readouts into a field rectangle,
//! ball positions, and game events: goals with scoring-bar attribution,
//! saves, fast balls, and periodic maximum-speed reports. Events leave the
//! process as text lines on a named pipe.

pub mod analysis;
pub mod config;
pub mod data;
pub mod events;
pub mod pipeline;
pub mod snapshot;
pub mod source;
pub mod telemetry;

pub use config::TrackerConfig;
pub use data::{FieldRect, Point, Side};
pub use events::Event;
