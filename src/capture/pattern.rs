use anyhow::Result;
use image::{Rgba, RgbaImage};

use super::Capture;

/// Synthetic surface: a diagonal gradient with a bar that advances one step per capture.
pub struct TestPattern {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            tick: 0,
        }
    }

    pub fn captures(&self) -> u32 {
        self.tick
    }
}

impl Capture for TestPattern {
    fn capture(&mut self) -> Result<RgbaImage> {
        let bar_width = (self.width / 8).max(1);
        let bar_x = (self.tick.wrapping_mul(bar_width / 2 + 1)) % self.width;
        let (w, h) = (self.width, self.height);

        let img = RgbaImage::from_fn(w, h, |x, y| {
            if x >= bar_x && x < bar_x.saturating_add(bar_width) {
                return Rgba([255, 255, 255, 255]);
            }
            let r = (x * 255 / w.max(1)) as u8;
            let g = (y * 255 / h.max(1)) as u8;
            let b = ((x + y) * 127 / (w + h).max(1)) as u8;
            Rgba([r, g, b, 255])
        });

        self.tick = self.tick.wrapping_add(1);
        Ok(img)
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_animates() {
        let mut pattern = TestPattern::new(64, 32);
        let first = pattern.capture().unwrap();
        let second = pattern.capture().unwrap();
        assert_eq!(first.dimensions(), (64, 32));
        assert_ne!(first, second);
        assert_eq!(pattern.captures(), 2);
    }

    #[test]
    fn test_aspect() {
        let pattern = TestPattern::new(320, 160);
        assert!((pattern.aspect() - 2.0).abs() < f32::EPSILON);
    }
}
