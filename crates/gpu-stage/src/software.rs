//! CPU reference backend.
//!
//! Implements the transform vocabulary on plain byte images. It exists for
//! replay runs without a GPU and for exercising the scheduler in tests; the
//! arithmetic is deliberately simple and matches the shader contract rather
//! than any particular shader text.

use std::collections::HashMap;

use crate::{ComputeStage, ImageId, StageError, Target, Transform, PACK_FACTOR};

/// Reference color the ball hue filter scores against (orange ball).
pub const BALL_COLOR: [u8; 3] = [230, 120, 30];
/// Reference color the field hue filter scores against (green felt).
pub const FIELD_COLOR: [u8; 3] = [40, 140, 60];

struct Image {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Image {
    fn len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    /// Logical sample count along x for a packed image.
    fn sample_width(&self) -> usize {
        self.width as usize * PACK_FACTOR
    }

    fn sample(&self, x: usize, y: usize) -> u8 {
        let texel = x / PACK_FACTOR;
        let chan = x % PACK_FACTOR;
        self.data[(y * self.width as usize + texel) * 4 + chan]
    }

    fn set_sample(&mut self, x: usize, y: usize, value: u8) {
        let texel = x / PACK_FACTOR;
        let chan = x % PACK_FACTOR;
        self.data[(y * self.width as usize + texel) * 4 + chan] = value;
    }

    fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let base = (y * self.width as usize + x) * 4;
        [self.data[base], self.data[base + 1], self.data[base + 2]]
    }
}

/// How strongly a pixel resembles `reference`, 255 meaning an exact match.
fn color_score(pixel: [u8; 3], reference: [u8; 3]) -> u8 {
    let dist: u32 = pixel
        .iter()
        .zip(reference.iter())
        .map(|(&p, &r)| (p as i32 - r as i32).unsigned_abs())
        .sum();
    255u32.saturating_sub(dist) as u8
}

/// CPU implementation of [`ComputeStage`].
pub struct SoftwareStage {
    images: HashMap<ImageId, Image>,
    next_id: u32,
    ball_color: [u8; 3],
    field_color: [u8; 3],
}

impl SoftwareStage {
    pub fn new() -> Self {
        Self {
            images: HashMap::new(),
            next_id: 0,
            ball_color: BALL_COLOR,
            field_color: FIELD_COLOR,
        }
    }

    /// Override the reference colors, e.g. for a differently colored table.
    pub fn with_colors(ball: [u8; 3], field: [u8; 3]) -> Self {
        Self {
            ball_color: ball,
            field_color: field,
            ..Self::new()
        }
    }

    fn image(&self, id: ImageId) -> Result<&Image, StageError> {
        self.images.get(&id).ok_or(StageError::UnknownImage(id))
    }

    fn hue_filter(&mut self, reference: [u8; 3], source: ImageId, dest: ImageId)
        -> Result<(), StageError> {
        let src = self.image(source)?;
        let dst = self.image(dest)?;
        let (dw, dh) = (dst.width as usize, dst.height as usize);
        let (sw, sh) = (src.width as usize, src.height as usize);
        let logical_w = dw * PACK_FACTOR;

        let mut out = vec![0u8; Image::len(dst.width, dst.height)];
        for y in 0..dh {
            let sy = y * sh / dh;
            for lx in 0..logical_w {
                let sx = lx * sw / logical_w;
                let score = color_score(src.pixel(sx, sy), reference);
                out[(y * dw + lx / PACK_FACTOR) * 4 + lx % PACK_FACTOR] = score;
            }
        }
        if let Some(img) = self.images.get_mut(&dest) {
            img.data = out;
        }
        Ok(())
    }

    fn downsample(&mut self, source: ImageId, dest: ImageId) -> Result<(), StageError> {
        let src = self.image(source)?;
        let dst = self.image(dest)?;
        let (dw, dh) = (dst.width as usize, dst.height as usize);
        let logical_dw = dw * PACK_FACTOR;
        let logical_sw = src.sample_width();
        let sh = src.height as usize;
        let block_x = (logical_sw / logical_dw).max(1);
        let block_y = (sh / dh).max(1);

        let mut out = vec![0u8; Image::len(dst.width, dst.height)];
        for y in 0..dh {
            for lx in 0..logical_dw {
                let mut total: u32 = 0;
                let mut count: u32 = 0;
                for by in 0..block_y {
                    let sy = y * block_y + by;
                    if sy >= sh {
                        continue;
                    }
                    for bx in 0..block_x {
                        let sx = lx * block_x + bx;
                        if sx >= logical_sw {
                            continue;
                        }
                        total += src.sample(sx, sy) as u32;
                        count += 1;
                    }
                }
                let avg = if count > 0 { (total / count) as u8 } else { 0 };
                out[(y * dw + lx / PACK_FACTOR) * 4 + lx % PACK_FACTOR] = avg;
            }
        }
        if let Some(img) = self.images.get_mut(&dest) {
            img.data = out;
        }
        Ok(())
    }

    fn copy(&mut self, source: ImageId, dest: ImageId) -> Result<(), StageError> {
        let src = self.image(source)?;
        let dst = self.image(dest)?;
        let (dw, dh) = (dst.width as usize, dst.height as usize);
        let (sw, sh) = (src.width as usize, src.height as usize);

        let mut out = vec![0u8; Image::len(dst.width, dst.height)];
        for y in 0..dh {
            let sy = y * sh / dh;
            for x in 0..dw {
                let sx = x * sw / dw;
                let sbase = (sy * sw + sx) * 4;
                let dbase = (y * dw + x) * 4;
                out[dbase..dbase + 4].copy_from_slice(&src.data[sbase..sbase + 4]);
            }
        }
        if let Some(img) = self.images.get_mut(&dest) {
            img.data = out;
        }
        Ok(())
    }
}

impl Default for SoftwareStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeStage for SoftwareStage {
    fn create_image(&mut self, width: u32, height: u32) -> Result<ImageId, StageError> {
        if width == 0 || height == 0 {
            return Err(StageError::CreateImage { width, height });
        }
        let id = ImageId(self.next_id);
        self.next_id += 1;
        self.images.insert(
            id,
            Image {
                width,
                height,
                data: vec![0u8; Image::len(width, height)],
            },
        );
        Ok(id)
    }

    fn upload(&mut self, image: ImageId, rgba: &[u8]) -> Result<(), StageError> {
        let img = self
            .images
            .get_mut(&image)
            .ok_or(StageError::UnknownImage(image))?;
        let need = Image::len(img.width, img.height);
        if rgba.len() != need {
            return Err(StageError::UploadSize {
                need,
                got: rgba.len(),
            });
        }
        img.data.copy_from_slice(rgba);
        Ok(())
    }

    fn apply(
        &mut self,
        transform: Transform,
        source: ImageId,
        dest: Target,
    ) -> Result<(), StageError> {
        let dest = match dest {
            Target::Image(id) => id,
            // Nothing to present in the software backend.
            Target::Screen => return Ok(()),
        };
        match transform {
            Transform::HueFilterBall => self.hue_filter(self.ball_color, source, dest),
            Transform::HueFilterField => self.hue_filter(self.field_color, source, dest),
            Transform::Downsample => self.downsample(source, dest),
            Transform::Identity => self.copy(source, dest),
        }
    }

    fn readback(&mut self, image: ImageId, out: &mut [u8]) -> Result<(), StageError> {
        let img = self.image(image)?;
        let need = Image::len(img.width, img.height);
        if out.len() != need {
            return Err(StageError::BufferSize {
                need,
                got: out.len(),
            });
        }
        // Channel order is already sample order, so the packed texels form
        // the flat intensity array by construction.
        out.copy_from_slice(&img.data);
        Ok(())
    }
}
