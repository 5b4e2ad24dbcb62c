use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::capture::{CapturePreset, CaptureSettings, DeviceSelector};
use crate::detect::CropScale;
use crate::frame::Orientation;

const DEFAULT_DEVICE: &str = "rear";
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_MODEL_BACKEND: &str = "scripted";
const DEFAULT_MODEL_PATH: &str = "models/best.json";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_SURFACE_WIDTH: u32 = 390;
const DEFAULT_SURFACE_HEIGHT: u32 = 844;
const DEFAULT_MAX_IN_FLIGHT: usize = 2;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    surface: Option<SurfaceConfigFile>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    preset: Option<CapturePreset>,
    orientation: Option<Orientation>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    crop: Option<CropScale>,
    labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SurfaceConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    max_in_flight: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub device: DeviceSelector,
    pub capture: CaptureSettings,
    pub model: ModelSettings,
    pub surface_width: u32,
    pub surface_height: u32,
    pub max_in_flight: usize,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// `scripted` or `tract`.
    pub backend: String,
    pub path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    pub crop: CropScale,
    /// Class names indexed by the model's class id.
    pub labels: Vec<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_MODEL_BACKEND.to_string(),
            path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
            crop: CropScale::CenterCrop,
            labels: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// Load `DETECT_CONFIG` (JSON, or TOML for `.toml` files) when set, then
    /// apply `DETECT_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectorConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let surface = file.surface.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        let model_defaults = ModelSettings::default();

        Self {
            device: DeviceSelector::parse(camera.device.as_deref().unwrap_or(DEFAULT_DEVICE)),
            capture: CaptureSettings {
                preset: camera.preset.unwrap_or_default(),
                orientation: camera.orientation.unwrap_or(Orientation::Right),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            },
            model: ModelSettings {
                backend: model.backend.unwrap_or(model_defaults.backend),
                path: model.path.unwrap_or(model_defaults.path),
                input_width: model.input_width.unwrap_or(model_defaults.input_width),
                input_height: model.input_height.unwrap_or(model_defaults.input_height),
                crop: model.crop.unwrap_or(model_defaults.crop),
                labels: model.labels.unwrap_or_default(),
            },
            surface_width: surface.width.unwrap_or(DEFAULT_SURFACE_WIDTH),
            surface_height: surface.height.unwrap_or(DEFAULT_SURFACE_HEIGHT),
            max_in_flight: pipeline.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = non_empty_env("DETECT_DEVICE") {
            self.device = DeviceSelector::parse(&device);
        }
        if let Some(preset) = non_empty_env("DETECT_PRESET") {
            self.capture.preset = CapturePreset::parse(&preset)?;
        }
        if let Some(path) = non_empty_env("DETECT_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(backend) = non_empty_env("DETECT_MODEL_BACKEND") {
            self.model.backend = backend;
        }
        if let Some(crop) = non_empty_env("DETECT_CROP") {
            self.model.crop = CropScale::parse(&crop)?;
        }
        if let Some(surface) = non_empty_env("DETECT_SURFACE") {
            let (width, height) = parse_dimensions(&surface)
                .ok_or_else(|| anyhow!("DETECT_SURFACE must look like WIDTHxHEIGHT"))?;
            self.surface_width = width;
            self.surface_height = height;
        }
        if let Some(max) = non_empty_env("DETECT_MAX_IN_FLIGHT") {
            self.max_in_flight = max
                .parse()
                .map_err(|_| anyhow!("DETECT_MAX_IN_FLIGHT must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.surface_width == 0 || self.surface_height == 0 {
            return Err(anyhow!("surface dimensions must be greater than zero"));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input dimensions must be greater than zero"));
        }
        if self.max_in_flight == 0 {
            return Err(anyhow!("max_in_flight must be at least 1"));
        }
        if self.model.path.as_os_str().is_empty() {
            return Err(anyhow!("model path must be set"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DetectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse `WIDTHxHEIGHT`.
pub fn parse_dimensions(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.trim().split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}
