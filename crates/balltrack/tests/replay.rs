//! End-to-end run over a synthetic recording: green field, orange ball,
//! replayed through the software stage.

use std::fs::File;
use std::io::Write;

use balltrack::{pipeline, TrackerConfig};
use gpu_stage::{SoftwareStage, StageGeometry};

use balltrack::source::RawReplaySource;

const FIELD_COLOR: [u8; 3] = [40, 140, 60];
const BALL_COLOR: [u8; 3] = [230, 120, 30];

fn synthetic_frame(geometry: &StageGeometry, ball_x: u32, ball_y: u32) -> Vec<u8> {
    let (w, h) = (geometry.source_width, geometry.source_height);
    let mut frame = vec![0u8; (w * h * 4) as usize];
    for y in 0..h {
        for x in 0..w {
            let idx = ((y * w + x) * 4) as usize;
            let on_ball = x.abs_diff(ball_x) < 12 && y.abs_diff(ball_y) < 12;
            let color = if on_ball { BALL_COLOR } else { FIELD_COLOR };
            frame[idx..idx + 3].copy_from_slice(&color);
            frame[idx + 3] = 255;
        }
    }
    frame
}

#[test]
fn replayed_recording_runs_to_completion() {
    let geometry = StageGeometry::default();
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("synthetic.rgba");

    let mut file = File::create(&recording).unwrap();
    for step in 0..8u32 {
        let frame = synthetic_frame(&geometry, 600 + 10 * step, 360);
        file.write_all(&frame).unwrap();
    }
    drop(file);

    let config = TrackerConfig {
        replay: Some(recording.clone()),
        fifo_path: dir.path().join("events.out"),
        timeseries_path: Some(dir.path().join("trajectory.txt")),
        // Keep the pacing sleep negligible for the test.
        fps: 500.0,
        ..TrackerConfig::default()
    };

    let mut source =
        RawReplaySource::open(&recording, geometry.source_width, geometry.source_height).unwrap();
    let mut stage = SoftwareStage::new();
    pipeline::run(config, &mut stage, &mut source).unwrap();

    // The time series file must exist with its header even though the short
    // run never wrapped the history.
    let trajectory = std::fs::read_to_string(dir.path().join("trajectory.txt")).unwrap();
    assert!(trajectory.starts_with('#'));
}
