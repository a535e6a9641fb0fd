use image::{RgbImage, RgbaImage};

use crate::error::{RecorderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// One captured image. Immutable once built; ownership moves from the sampler
/// through the queue to the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
    index: u64,
}

impl Frame {
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>, index: u64) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RecorderError::InvalidFrame(format!(
                "zero dimension {}x{}",
                width, height
            )));
        }
        let expected = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(format.bytes_per_pixel());
        if pixels.len() != expected {
            return Err(RecorderError::InvalidFrame(format!(
                "{}x{} {:?} needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
            index,
        })
    }

    pub fn from_rgba(image: RgbaImage, index: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgba,
            pixels: image.into_raw(),
            index,
        }
    }

    pub fn from_rgb(image: RgbImage, index: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgb,
            pixels: image.into_raw(),
            index,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Sample index this frame was captured at, counted from the start of the session.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// Expands to an RGBA image regardless of the stored layout.
    pub fn into_rgba_image(self) -> Result<RgbaImage> {
        let (width, height) = (self.width, self.height);
        let raw = match self.format {
            PixelFormat::Rgba => self.pixels,
            PixelFormat::Rgb => {
                let mut rgba = Vec::with_capacity(self.pixels.len() / 3 * 4);
                for chunk in self.pixels.chunks_exact(3) {
                    rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
                }
                rgba
            }
        };
        RgbaImage::from_raw(width, height, raw)
            .ok_or_else(|| RecorderError::InvalidFrame("pixel buffer does not match dimensions".into()))
    }
}
