//! Contract between the tracking pipeline and the GPU compute stage.
//!
//! The pipeline only ever asks the GPU for two things: "apply transform T
//! from image S into image D" and "read image D back into a CPU buffer".
//! Everything else — shader text, framebuffer objects, shared-memory texture
//! acquisition — belongs to the backend behind the [`ComputeStage`] trait.
//!
//! The crate also owns the pipeline image geometry, including the 4:1 texel
//! packing the hue-filter passes use: one RGBA texel carries four adjacent
//! intensity samples, so a texture of width W holds 4·W logical samples.
//! [`ComputeStage::readback`] is the *only* place where that packing exists;
//! consumers always receive a flat row-major intensity array.

use thiserror::Error;

pub mod software;

pub use software::SoftwareStage;

/// Number of intensity samples packed into one RGBA texel.
pub const PACK_FACTOR: usize = 4;

/// Handle to a backend-owned image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(pub u32);

/// Destination of a transform pass. Rendering to the screen is allowed but a
/// screen target can never be read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Image(ImageId),
    Screen,
}

/// Transform vocabulary the pipeline schedules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
    /// Per-pixel "looks like the ball color" intensity, packed 4 per texel.
    HueFilterBall,
    /// Per-pixel "looks like the field color" intensity, packed 4 per texel.
    HueFilterField,
    /// Box-filter average of packed samples into a smaller packed image.
    Downsample,
    /// Pass-through copy.
    Identity,
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("image {0:?} has not been created on this stage")]
    UnknownImage(ImageId),
    #[error("the screen target cannot be read back")]
    ScreenReadback,
    #[error("readback buffer holds {got} bytes but image needs {need}")]
    BufferSize { need: usize, got: usize },
    #[error("upload of {got} bytes does not match image size {need}")]
    UploadSize { need: usize, got: usize },
    #[error("failed to create {width}x{height} image")]
    CreateImage { width: u32, height: u32 },
}

/// Sizes of every image in the detection pipeline.
///
/// Each step keeps the 16:9 aspect ratio of the 720p source. The hue-filter
/// texture is a quarter of the source width because of the RGBA packing; the
/// downsampled readout averages 8x8 logical samples into one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageGeometry {
    pub source_width: u32,
    pub source_height: u32,
    /// Hue-filter texture size in texels (width is packed).
    pub filter_width: u32,
    pub filter_height: u32,
    /// Readout texture size in texels (width is packed).
    pub readout_width: u32,
    pub readout_height: u32,
}

impl Default for StageGeometry {
    fn default() -> Self {
        Self {
            source_width: 1280,
            source_height: 720,
            filter_width: 1280 / PACK_FACTOR as u32,
            filter_height: 720,
            readout_width: 160 / PACK_FACTOR as u32,
            readout_height: 90,
        }
    }
}

impl StageGeometry {
    /// Bytes required to read back the readout texture.
    pub fn readback_len(&self) -> usize {
        self.readout_width as usize * self.readout_height as usize * 4
    }

    /// Logical sample width of the unpacked readout buffer.
    pub fn sample_width(&self) -> usize {
        self.readout_width as usize * PACK_FACTOR
    }

    /// Logical sample height of the unpacked readout buffer.
    pub fn sample_height(&self) -> usize {
        self.readout_height as usize
    }
}

/// A backend able to run the pipeline's transform passes.
///
/// Implementations own all image storage. The trait is deliberately small so
/// that an EGL/dispmanx backend, a desktop GL backend, and the CPU
/// [`SoftwareStage`] are interchangeable from the scheduler's point of view.
pub trait ComputeStage {
    /// Allocate a backend image. Fatal at initialization when it fails.
    fn create_image(&mut self, width: u32, height: u32) -> Result<ImageId, StageError>;

    /// Replace the contents of `image` with tightly packed RGBA8 pixels.
    fn upload(&mut self, image: ImageId, rgba: &[u8]) -> Result<(), StageError>;

    /// Run `transform` reading `source` and writing `dest`.
    fn apply(&mut self, transform: Transform, source: ImageId, dest: Target)
        -> Result<(), StageError>;

    /// Copy `image` into `out` as a flat intensity array, unpacking the
    /// 4-samples-per-texel layout. `out` must hold exactly
    /// `width * height * 4` bytes.
    fn readback(&mut self, image: ImageId, out: &mut [u8]) -> Result<(), StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_matches_packed_sizes() {
        let geo = StageGeometry::default();
        assert_eq!(geo.filter_width as usize * PACK_FACTOR, 1280);
        assert_eq!(geo.sample_width(), 160);
        assert_eq!(geo.sample_height(), 90);
        assert_eq!(geo.readback_len(), 160 * 90);
    }
}
