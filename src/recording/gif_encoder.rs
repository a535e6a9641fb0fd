use gif::{Encoder, Repeat};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use crate::capture::Frame;
use crate::error::{RecorderError, Result};

use super::{FrameEncoder, FrameProgress};

const MAX_GIF_DIMENSION: u32 = 4096;
const MAX_GIF_FILE_SIZE: u64 = 500 * 1024 * 1024;
const MIN_DELAY_CS: u32 = 2;
const MAX_QUANTIZER_SPEED: i32 = 30;

enum Staged {
    Raw(Frame),
    Quantized(gif::Frame<'static>),
}

/// Animated GIF writer.
///
/// The output file is opened by `start`; the logical screen size is taken from
/// the first frame, and later frames of a different size are resized to it.
pub struct GifEncoder {
    repeat: i32,
    speed: i32,
    delay_cs: u16,
    path: Option<PathBuf>,
    file: Option<BufWriter<File>>,
    encoder: Option<Encoder<BufWriter<File>>>,
    screen: Option<(u16, u16)>,
    staged: Option<Staged>,
    frames_written: usize,
    finished: bool,
}

impl GifEncoder {
    /// `repeat`: -1 plays once, 0 loops forever, n loops n times.
    /// `quality`: 1 (best, slowest) to 100 (fastest).
    pub fn new(repeat: i32, quality: u8) -> Self {
        Self {
            repeat,
            speed: quality_to_speed(quality),
            delay_cs: 10,
            path: None,
            file: None,
            encoder: None,
            screen: None,
            staged: None,
            frames_written: 0,
            finished: false,
        }
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    fn quantize(&mut self, frame: Frame) -> Result<gif::Frame<'static>> {
        let (width, height) = (frame.width(), frame.height());
        let (screen_w, screen_h) = match self.screen {
            Some(screen) => screen,
            None => {
                if width > MAX_GIF_DIMENSION || height > MAX_GIF_DIMENSION {
                    return Err(RecorderError::InvalidFrame(
                        "Image dimensions exceed GIF safety limit".into(),
                    ));
                }
                let screen = (width as u16, height as u16);
                self.screen = Some(screen);
                screen
            }
        };

        let image = frame.into_rgba_image()?;
        let image = if image.dimensions() != (u32::from(screen_w), u32::from(screen_h)) {
            image::imageops::resize(
                &image,
                u32::from(screen_w),
                u32::from(screen_h),
                image::imageops::FilterType::Nearest,
            )
        } else {
            image
        };

        let mut rgba = image.into_raw();
        let mut gif_frame = gif::Frame::from_rgba_speed(screen_w, screen_h, &mut rgba, self.speed);
        gif_frame.delay = self.delay_cs;
        Ok(gif_frame)
    }

    fn writer(&mut self) -> Result<&mut Encoder<BufWriter<File>>> {
        if self.encoder.is_none() {
            let file = self
                .file
                .take()
                .ok_or(RecorderError::EncoderState("encoder was not started"))?;
            let (width, height) = self.screen.unwrap_or((1, 1));
            let mut encoder = Encoder::new(file, width, height, &[])?;
            match self.repeat {
                r if r < 0 => {}
                0 => encoder.set_repeat(Repeat::Infinite)?,
                r => encoder.set_repeat(Repeat::Finite(r.min(i32::from(u16::MAX)) as u16))?,
            }
            self.encoder = Some(encoder);
        }
        self.encoder
            .as_mut()
            .ok_or(RecorderError::EncoderState("encoder was not started"))
    }
}

impl FrameEncoder for GifEncoder {
    fn start(&mut self, path: &Path) -> Result<()> {
        if self.finished {
            return Err(RecorderError::EncoderState("encoder already finished"));
        }
        if self.file.is_some() || self.encoder.is_some() {
            return Err(RecorderError::EncoderState("encoder already started"));
        }

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(RecorderError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Path contains directory traversal",
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        self.file = Some(BufWriter::new(file));
        self.path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "gif output opened");
        Ok(())
    }

    fn set_delay(&mut self, millis: u32) {
        let centis = (millis.saturating_add(5) / 10).clamp(MIN_DELAY_CS, u32::from(u16::MAX));
        self.delay_cs = centis as u16;
    }

    fn begin_frame(&mut self, frame: Frame) -> Result<()> {
        if self.finished {
            return Err(RecorderError::EncoderState("frame added after finish"));
        }
        if self.file.is_none() && self.encoder.is_none() {
            return Err(RecorderError::EncoderState("encoder was not started"));
        }
        if self.staged.is_some() {
            return Err(RecorderError::EncoderState("previous frame still pending"));
        }
        self.staged = Some(Staged::Raw(frame));
        Ok(())
    }

    fn resume_frame(&mut self) -> Result<FrameProgress> {
        match self.staged.take() {
            None => Err(RecorderError::EncoderState("no frame pending")),
            Some(Staged::Raw(frame)) => {
                let quantized = self.quantize(frame)?;
                self.staged = Some(Staged::Quantized(quantized));
                Ok(FrameProgress::Pending)
            }
            Some(Staged::Quantized(gif_frame)) => {
                self.writer()?.write_frame(&gif_frame)?;
                self.frames_written += 1;
                Ok(FrameProgress::Written)
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(RecorderError::EncoderState("finish called twice"));
        }
        if self.staged.is_some() {
            return Err(RecorderError::EncoderState("finish called with a frame pending"));
        }
        self.writer()?;
        self.finished = true;

        if let Some(encoder) = self.encoder.take() {
            let mut writer = encoder.into_inner()?;
            writer.flush()?;
        }

        if let Some(path) = &self.path {
            if let Ok(metadata) = std::fs::metadata(path) {
                if metadata.len() > MAX_GIF_FILE_SIZE {
                    tracing::warn!(path = %path.display(), bytes = metadata.len(), "gif exceeds size limit");
                }
            }
        }
        Ok(())
    }
}

fn quality_to_speed(quality: u8) -> i32 {
    let quality = i32::from(quality.clamp(1, 100));
    1 + (quality - 1) * (MAX_QUANTIZER_SPEED - 1) / 99
}
