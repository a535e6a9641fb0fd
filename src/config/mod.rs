use anyhow::{anyhow, Result};
use chrono::format::{Item, StrftimeItems};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::recording::{SessionLimit, WorkerMode};

const MIN_DIMENSION: u32 = 8;
const MAX_DIMENSION: u32 = 4096;
const MIN_FPS: u32 = 1;
const MAX_FPS: u32 = 30;
const MIN_REPEAT: i32 = -1;
const MIN_QUALITY: u8 = 1;
const MAX_QUALITY: u8 = 100;
const MIN_BUFFER_SECS: f32 = 0.1;
const MAX_BUFFER_SECS: f32 = 300.0;
const MIN_RESOLUTION_SCALE: f32 = 0.1;
const MAX_RESOLUTION_SCALE: f32 = 4.0;
const MAX_STEPS_PER_TICK: u32 = 1024;
const MAX_FILENAME_TEMPLATE_LEN: usize = 128;
const DEFAULT_FILENAME_TEMPLATE: &str = "GifCapture-%Y%m%d%H%M%S%3f";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecorderConfig {
    pub recording: RecordingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RecordingConfig {
    pub width: u32,
    pub height: u32,
    /// Derive `height` from the surface aspect ratio when recording begins.
    pub auto_aspect: bool,
    pub fps: u32,
    /// -1 plays once, 0 loops forever, n loops n times.
    pub repeat: i32,
    /// 1 is the best quality and the slowest to encode.
    pub quality: u8,
    /// Seconds of frames kept per session.
    pub buffer_secs: f32,
    #[serde(default = "default_resolution_scale")]
    pub resolution_scale: f32,
    /// Ignore `buffer_secs` and record until stopped.
    #[serde(default)]
    pub unbounded: bool,
    #[serde(default)]
    pub worker: WorkerMode,
    #[serde(default = "default_steps_per_tick")]
    pub steps_per_tick: u32,
}

fn default_resolution_scale() -> f32 {
    1.0
}

fn default_steps_per_tick() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub filename_template: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 200,
            auto_aspect: true,
            fps: 15,
            repeat: 0,
            quality: 15,
            buffer_secs: 3.0,
            resolution_scale: default_resolution_scale(),
            unbounded: false,
            worker: WorkerMode::default(),
            steps_per_tick: default_steps_per_tick(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        let pictures_dir = directories::UserDirs::new()
            .and_then(|d| d.picture_dir().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map(|b| b.home_dir().to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        Self {
            directory: pictures_dir.join("reelcap"),
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
        }
    }
}

impl RecordingConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                return Err(anyhow!(
                    "{} must be between {} and {}",
                    name,
                    MIN_DIMENSION,
                    MAX_DIMENSION
                ));
            }
        }
        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            return Err(anyhow!("fps must be between {} and {}", MIN_FPS, MAX_FPS));
        }
        if self.repeat < MIN_REPEAT {
            return Err(anyhow!("repeat must be >= {}", MIN_REPEAT));
        }
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.quality) {
            return Err(anyhow!("quality must be between {} and {}", MIN_QUALITY, MAX_QUALITY));
        }
        if !self.buffer_secs.is_finite()
            || !(MIN_BUFFER_SECS..=MAX_BUFFER_SECS).contains(&self.buffer_secs)
        {
            return Err(anyhow!(
                "buffer_secs must be between {} and {}",
                MIN_BUFFER_SECS,
                MAX_BUFFER_SECS
            ));
        }
        if !self.resolution_scale.is_finite()
            || !(MIN_RESOLUTION_SCALE..=MAX_RESOLUTION_SCALE).contains(&self.resolution_scale)
        {
            return Err(anyhow!(
                "resolution_scale must be between {} and {}",
                MIN_RESOLUTION_SCALE,
                MAX_RESOLUTION_SCALE
            ));
        }
        if self.steps_per_tick == 0 || self.steps_per_tick > MAX_STEPS_PER_TICK {
            return Err(anyhow!("steps_per_tick must be between 1 and {}", MAX_STEPS_PER_TICK));
        }
        Ok(())
    }

    pub fn sanitize(&mut self) {
        self.width = self.width.clamp(MIN_DIMENSION, MAX_DIMENSION);
        self.height = self.height.clamp(MIN_DIMENSION, MAX_DIMENSION);
        self.fps = self.fps.clamp(MIN_FPS, MAX_FPS);
        self.repeat = self.repeat.max(MIN_REPEAT);
        self.quality = self.quality.clamp(MIN_QUALITY, MAX_QUALITY);
        self.buffer_secs = if self.buffer_secs.is_finite() {
            self.buffer_secs.clamp(MIN_BUFFER_SECS, MAX_BUFFER_SECS)
        } else {
            3.0
        };
        self.resolution_scale = if self.resolution_scale.is_finite() {
            self.resolution_scale.clamp(MIN_RESOLUTION_SCALE, MAX_RESOLUTION_SCALE)
        } else {
            default_resolution_scale()
        };
        self.steps_per_tick = self.steps_per_tick.clamp(1, MAX_STEPS_PER_TICK);
    }

    /// `round(buffer_secs * fps)`, at least one frame.
    pub fn max_frames(&self) -> usize {
        ((self.buffer_secs * self.fps.max(MIN_FPS) as f32).round() as usize).max(1)
    }

    pub fn session_limit(&self) -> SessionLimit {
        if self.unbounded {
            SessionLimit::Unbounded
        } else {
            SessionLimit::Frames(self.max_frames())
        }
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(MIN_FPS)))
    }

    pub fn frame_delay_ms(&self) -> u32 {
        (1000.0 / self.fps.max(MIN_FPS) as f32).round() as u32
    }

    /// Memory held by one full buffer of RGBA frames, in MiB.
    pub fn estimated_memory_mb(&self) -> f32 {
        let bytes = self.fps as f32 * self.buffer_secs * self.width as f32 * self.height as f32 * 4.0;
        bytes / (1024.0 * 1024.0)
    }

    /// Output height for a surface of the given width/height ratio.
    pub fn compute_height(&self, aspect: f32) -> u32 {
        if !aspect.is_finite() || aspect <= 0.0 {
            return self.height;
        }
        ((self.width as f32 / aspect).round() as u32).clamp(MIN_DIMENSION, MAX_DIMENSION)
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Result<()> {
        check_template(&self.filename_template)?;
        if self.directory.as_os_str().is_empty() {
            return Err(anyhow!("Output directory path is empty"));
        }
        if has_parent_dir(&self.directory) {
            return Err(anyhow!("Output directory contains path traversal"));
        }
        Ok(())
    }

    pub fn sanitize(&mut self) {
        if check_template(&self.filename_template).is_err() {
            self.filename_template = DEFAULT_FILENAME_TEMPLATE.to_string();
        }
    }
}

fn has_parent_dir(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

fn check_template(template: &str) -> Result<()> {
    if template.is_empty() {
        return Err(anyhow!("filename_template is empty"));
    }
    if template.len() > MAX_FILENAME_TEMPLATE_LEN {
        return Err(anyhow!("filename_template too long"));
    }
    if template.contains('/') || template.contains('\\') || has_parent_dir(Path::new(template)) {
        return Err(anyhow!("filename_template contains invalid path characters"));
    }
    if StrftimeItems::new(template).any(|item| matches!(item, Item::Error)) {
        return Err(anyhow!("filename_template has an invalid time format specifier"));
    }
    Ok(())
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<()> {
        self.recording.validate()?;
        self.output.validate()
    }

    pub fn sanitize(&mut self) {
        self.recording.sanitize();
        self.output.sanitize();
    }

    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "reelcap", "reelcap").map(|p| p.config_dir().to_path_buf())
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(RecorderConfig::default()),
        }
    }

    /// Missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(RecorderConfig::default());
        }
        let content = fs::read_to_string(path)?;
        let mut config: RecorderConfig = toml::from_str(&content)?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or_else(|| anyhow!("No configuration directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn ensure_output_dir(&self) -> Result<()> {
        self.output.validate()?;
        fs::create_dir_all(&self.output.directory)?;
        Ok(())
    }

    pub fn generate_filename(&self) -> String {
        let now = chrono::Local::now();
        let items: Vec<Item> = StrftimeItems::new(&self.output.filename_template).collect();
        let formatted = if items.iter().any(|item| matches!(item, Item::Error)) {
            String::new()
        } else {
            now.format_with_items(items.iter()).to_string()
        };
        let sanitized: String = formatted
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .take(200)
            .collect();
        let safe_name = if sanitized.is_empty() {
            format!("GifCapture-{}", now.timestamp())
        } else {
            sanitized
        };
        format!("{}.gif", safe_name)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output.directory.join(self.generate_filename())
    }
}
