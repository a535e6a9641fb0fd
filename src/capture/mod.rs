mod frame;
mod pattern;
mod region;

pub use frame::{Frame, PixelFormat};
pub use pattern::TestPattern;
pub use region::FrameGrabber;

use anyhow::Result;
use image::RgbaImage;

/// A render surface the recorder samples from.
pub trait Capture {
    /// Reads back the current surface contents.
    fn capture(&mut self) -> Result<RgbaImage>;

    /// Surface size in pixels, used for aspect ratio and region clamping.
    fn size(&self) -> (u32, u32);

    fn aspect(&self) -> f32 {
        let (width, height) = self.size();
        if height == 0 {
            return 1.0;
        }
        width as f32 / height as f32
    }
}

impl<C: Capture + ?Sized> Capture for Box<C> {
    fn capture(&mut self) -> Result<RgbaImage> {
        (**self).capture()
    }

    fn size(&self) -> (u32, u32) {
        (**self).size()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Intersects with a `bounds_w` x `bounds_h` surface anchored at the origin.
    /// Returns `None` when nothing of the rectangle is visible.
    pub fn clamp_to(&self, bounds_w: u32, bounds_h: u32) -> Option<Rectangle> {
        let x = self.x.max(0) as u32;
        let y = self.y.max(0) as u32;
        if x >= bounds_w || y >= bounds_h {
            return None;
        }
        let skipped_x = self.x.min(0).unsigned_abs();
        let skipped_y = self.y.min(0).unsigned_abs();
        let width = self.width.saturating_sub(skipped_x).min(bounds_w - x);
        let height = self.height.saturating_sub(skipped_y).min(bounds_h - y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Rectangle::new(x as i32, y as i32, width, height))
    }
}
