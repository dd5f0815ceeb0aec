//! Frame sources feeding the pipeline.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open frame source {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read frame")]
    Io(#[from] std::io::Error),
}

/// Anything that yields RGBA8 frames of a fixed size.
pub trait FrameSource {
    /// Frame size in pixels, constant over the source's lifetime.
    fn dimensions(&self) -> (u32, u32);

    /// The next frame, or `None` when the source is exhausted. The slice is
    /// valid until the next call.
    fn next_frame(&mut self) -> Result<Option<&[u8]>, SourceError>;
}

/// Replays a file of raw, headerless RGBA8 frames at a fixed geometry. Used
/// for offline runs against recorded footage.
#[derive(Debug)]
pub struct RawReplaySource {
    reader: BufReader<File>,
    frame: Vec<u8>,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl RawReplaySource {
    pub fn open(path: &Path, width: u32, height: u32) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), width, height, "replaying raw frames");
        Ok(Self {
            reader: BufReader::new(file),
            frame: vec![0u8; width as usize * height as usize * 4],
            width,
            height,
            frames_read: 0,
        })
    }
}

impl FrameSource for RawReplaySource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<Option<&[u8]>, SourceError> {
        let mut filled = 0;
        while filled < self.frame.len() {
            let n = self.reader.read(&mut self.frame[filled..])?;
            if n == 0 {
                // A partial trailing frame means a truncated recording;
                // treat it as the end either way.
                if filled > 0 {
                    info!(frames = self.frames_read, "replay ended on a partial frame");
                }
                return Ok(None);
            }
            filled += n;
        }
        self.frames_read += 1;
        Ok(Some(&self.frame))
    }
}
