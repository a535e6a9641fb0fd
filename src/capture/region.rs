use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImage, RgbaImage};

use super::{Capture, Frame, Rectangle};

const MAX_FRAME_DIMENSION: u32 = 4096;

/// Turns surface readbacks into frames: crops to the record region, scales by the
/// resolution factor and drops alpha.
pub struct FrameGrabber {
    region: Option<Rectangle>,
    output_size: (u32, u32),
    resolution_scale: f32,
    scratch: Option<RgbaImage>,
}

impl FrameGrabber {
    pub fn new(output_width: u32, output_height: u32, resolution_scale: f32) -> Self {
        Self {
            region: None,
            output_size: (output_width.max(1), output_height.max(1)),
            resolution_scale: sanitize_scale(resolution_scale),
            scratch: None,
        }
    }

    pub fn with_region(mut self, region: Rectangle) -> Self {
        self.region = Some(region);
        self
    }

    pub fn set_region(&mut self, region: Option<Rectangle>) {
        self.region = region;
    }

    pub fn region(&self) -> Option<Rectangle> {
        self.region
    }

    pub fn set_output_size(&mut self, width: u32, height: u32) {
        self.output_size = (width.max(1), height.max(1));
    }

    /// Size of the frames this grabber produces. Scaled sizes beyond the GIF
    /// limit are shrunk to fit, keeping the aspect ratio.
    pub fn frame_size(&self) -> (u32, u32) {
        let (width, height) = match self.region {
            Some(rect) => (rect.width, rect.height),
            None => self.output_size,
        };
        let width = scaled(width, self.resolution_scale);
        let height = scaled(height, self.resolution_scale);
        let longest = width.max(height);
        if longest <= MAX_FRAME_DIMENSION {
            return (width, height);
        }
        let shrink = f64::from(MAX_FRAME_DIMENSION) / f64::from(longest);
        let fit = |value: u32| ((f64::from(value) * shrink).round() as u32).clamp(1, MAX_FRAME_DIMENSION);
        (fit(width), fit(height))
    }

    pub fn has_scratch(&self) -> bool {
        self.scratch.is_some()
    }

    pub fn release_scratch(&mut self) {
        self.scratch = None;
    }

    pub fn grab<C: Capture + ?Sized>(&mut self, source: &mut C, index: u64) -> Result<Frame> {
        let surface = source.capture()?;
        if surface.width() == 0 || surface.height() == 0 {
            return Err(anyhow!("Surface has zero dimension"));
        }

        let (target_w, target_h) = self.frame_size();

        let region = self.region;
        let staged = match region {
            Some(rect) => {
                let visible = rect
                    .clamp_to(surface.width(), surface.height())
                    .ok_or_else(|| anyhow!("Record region lies outside the surface"))?;
                let scratch = self.scratch_for(rect.width, rect.height);
                if visible != rect {
                    scratch.fill(0);
                }
                let view = imageops::crop_imm(
                    &surface,
                    visible.x as u32,
                    visible.y as u32,
                    visible.width,
                    visible.height,
                );
                let offset_x = (visible.x - rect.x).max(0) as u32;
                let offset_y = (visible.y - rect.y).max(0) as u32;
                scratch.copy_from(&*view, offset_x, offset_y)?;
                &*scratch
            }
            None => {
                let scratch = self.scratch_for(surface.width(), surface.height());
                scratch.copy_from(&surface, 0, 0)?;
                &*scratch
            }
        };

        let resized = if staged.dimensions() == (target_w, target_h) {
            staged.clone()
        } else {
            imageops::resize(staged, target_w, target_h, FilterType::Triangle)
        };

        let rgb = DynamicImage::ImageRgba8(resized).into_rgb8();
        Ok(Frame::from_rgb(rgb, index))
    }

    fn scratch_for(&mut self, width: u32, height: u32) -> &mut RgbaImage {
        let reuse = matches!(&self.scratch, Some(img) if img.dimensions() == (width, height));
        if !reuse {
            self.scratch = Some(RgbaImage::new(width, height));
        }
        self.scratch.get_or_insert_with(|| RgbaImage::new(width, height))
    }
}

fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

fn scaled(value: u32, scale: f32) -> u32 {
    ((value as f32 * scale) as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    struct Solid {
        width: u32,
        height: u32,
    }

    impl Capture for Solid {
        fn capture(&mut self) -> Result<RgbaImage> {
            let mut img = RgbaImage::from_pixel(self.width, self.height, Rgba([0, 0, 255, 255]));
            img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
            Ok(img)
        }

        fn size(&self) -> (u32, u32) {
            (self.width, self.height)
        }
    }

    #[test]
    fn test_full_surface_resized_to_output() {
        let mut grabber = FrameGrabber::new(32, 16, 1.0);
        let mut surface = Solid { width: 64, height: 32 };
        let frame = grabber.grab(&mut surface, 3).unwrap();
        assert_eq!((frame.width(), frame.height()), (32, 16));
        assert_eq!(frame.byte_len(), 32 * 16 * 3);
        assert_eq!(frame.index(), 3);
    }

    #[test]
    fn test_region_with_scale() {
        let mut grabber = FrameGrabber::new(320, 200, 0.5).with_region(Rectangle::new(0, 0, 20, 10));
        let mut surface = Solid { width: 64, height: 32 };
        let frame = grabber.grab(&mut surface, 0).unwrap();
        assert_eq!((frame.width(), frame.height()), (10, 5));
    }

    #[test]
    fn test_region_crop_keeps_origin_pixel() {
        let mut grabber = FrameGrabber::new(8, 8, 1.0).with_region(Rectangle::new(0, 0, 4, 4));
        let mut surface = Solid { width: 16, height: 16 };
        let frame = grabber.grab(&mut surface, 0).unwrap();
        assert_eq!(&frame.pixels()[0..3], &[255, 0, 0]);
        assert_eq!(&frame.pixels()[3..6], &[0, 0, 255]);
    }

    #[test]
    fn test_region_outside_surface_fails() {
        let mut grabber = FrameGrabber::new(8, 8, 1.0).with_region(Rectangle::new(100, 100, 4, 4));
        let mut surface = Solid { width: 16, height: 16 };
        assert!(grabber.grab(&mut surface, 0).is_err());
    }

    #[test]
    fn test_scratch_retained_until_released() {
        let mut grabber = FrameGrabber::new(8, 8, 1.0);
        let mut surface = Solid { width: 8, height: 8 };
        assert!(!grabber.has_scratch());
        grabber.grab(&mut surface, 0).unwrap();
        assert!(grabber.has_scratch());
        grabber.release_scratch();
        assert!(!grabber.has_scratch());
    }

    #[test]
    fn test_oversized_scale_fits_gif_limit() {
        assert_eq!(FrameGrabber::new(2048, 64, 4.0).frame_size(), (4096, 128));

        let grabber = FrameGrabber::new(16, 16, 4.0).with_region(Rectangle::new(0, 0, 1600, 800));
        assert_eq!(grabber.frame_size(), (4096, 2048));

        let mut grabber = FrameGrabber::new(1200, 10, 4.0);
        let mut surface = Solid { width: 32, height: 16 };
        let frame = grabber.grab(&mut surface, 0).unwrap();
        assert_eq!((frame.width(), frame.height()), (4096, 34));
    }

    #[test]
    fn test_invalid_scale_falls_back() {
        let grabber = FrameGrabber::new(40, 20, f32::NAN);
        assert_eq!(grabber.frame_size(), (40, 20));
    }
}
