use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_SOURCE_PATH: &str = "stub://demo";
const DEFAULT_SOURCE_FPS: u32 = 30;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_OUTPUT_PATH: &str = "output_video.y4m";
const DEFAULT_DB_PATH: &str = "detections.db";
const DEFAULT_EXPORT_PATH: &str = "detections.csv";
const DEFAULT_DETECTOR_BACKEND: &str = "stub";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_MAX_SOURCE_ERRORS: u32 = 30;
const DEFAULT_DISPLAY_MODE: &str = "auto";

#[derive(Debug, Deserialize, Default)]
struct CounterConfigFile {
    source: Option<SourceConfigFile>,
    output: Option<OutputConfigFile>,
    store: Option<StoreConfigFile>,
    export: Option<ExportConfigFile>,
    detector: Option<DetectorConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    path: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    /// Empty string disables the output video.
    path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StoreConfigFile {
    db_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ExportConfigFile {
    /// Empty string disables the record log.
    path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    min_confidence: Option<f32>,
    max_frames: Option<u64>,
    max_consecutive_source_errors: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CounterConfig {
    pub source: SourceSettings,
    pub output_path: Option<PathBuf>,
    pub db_path: String,
    pub export_path: Option<PathBuf>,
    pub detector: DetectorSettings,
    pub pipeline: PipelineSettings,
    pub display_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    /// Local video file or `stub://name`.
    pub path: String,
    /// Used by synthetic sources only; files declare their own.
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub min_confidence: f32,
    pub max_frames: Option<u64>,
    pub max_consecutive_source_errors: u32,
}

impl Default for CounterConfig {
    fn default() -> Self {
        // An empty file section resolves every key to its default.
        Self::from_file(CounterConfigFile::default())
    }
}

impl CounterConfig {
    /// Defaults, then the JSON file named by `COUNTER_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("COUNTER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Self {
        let source = SourceSettings {
            path: file
                .source
                .as_ref()
                .and_then(|source| source.path.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_PATH.to_string()),
            fps: file
                .source
                .as_ref()
                .and_then(|source| source.fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        let output_path = optional_path(
            file.output.and_then(|output| output.path),
            DEFAULT_OUTPUT_PATH,
        );
        let db_path = file
            .store
            .and_then(|store| store.db_path)
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let export_path = optional_path(
            file.export.and_then(|export| export.path),
            DEFAULT_EXPORT_PATH,
        );
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
            model_path: detector_file.model_path,
            labels_path: detector_file.labels_path,
            input_width: detector_file.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: detector_file.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
        };
        let pipeline_file = file.pipeline.unwrap_or_default();
        let pipeline = PipelineSettings {
            min_confidence: pipeline_file.min_confidence.unwrap_or(0.0),
            max_frames: pipeline_file.max_frames,
            max_consecutive_source_errors: pipeline_file
                .max_consecutive_source_errors
                .unwrap_or(DEFAULT_MAX_SOURCE_ERRORS),
        };
        let display_mode = file
            .display
            .and_then(|display| display.mode)
            .unwrap_or_else(|| DEFAULT_DISPLAY_MODE.to_string());
        Self {
            source,
            output_path,
            db_path,
            export_path,
            detector,
            pipeline,
            display_mode,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("COUNTER_SOURCE") {
            if !path.trim().is_empty() {
                self.source.path = path;
            }
        }
        if let Ok(path) = std::env::var("COUNTER_OUTPUT") {
            self.output_path = optional_path(Some(path), DEFAULT_OUTPUT_PATH);
        }
        if let Ok(path) = std::env::var("COUNTER_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(path) = std::env::var("COUNTER_EXPORT_PATH") {
            self.export_path = optional_path(Some(path), DEFAULT_EXPORT_PATH);
        }
        if let Ok(backend) = std::env::var("COUNTER_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend;
            }
        }
        if let Ok(value) = std::env::var("COUNTER_MIN_CONFIDENCE") {
            self.pipeline.min_confidence = value
                .parse()
                .map_err(|_| anyhow!("COUNTER_MIN_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Ok(value) = std::env::var("COUNTER_MAX_FRAMES") {
            let frames: u64 = value
                .parse()
                .map_err(|_| anyhow!("COUNTER_MAX_FRAMES must be a non-negative integer"))?;
            self.pipeline.max_frames = Some(frames);
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if self.source.path.trim().is_empty() {
            return Err(anyhow!("source path must not be empty"));
        }
        if self.source.fps == 0 || self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source fps, width and height must be greater than zero"));
        }
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("store db_path must not be empty"));
        }
        let conf = self.pipeline.min_confidence;
        if !(0.0..=1.0).contains(&conf) {
            return Err(anyhow!("min_confidence must be within [0, 1], got {}", conf));
        }
        if self.pipeline.max_consecutive_source_errors == 0 {
            return Err(anyhow!("max_consecutive_source_errors must be greater than zero"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        self.detector.backend = self.detector.backend.trim().to_lowercase();
        self.display_mode = self.display_mode.trim().to_lowercase();
        if !matches!(self.display_mode.as_str(), "auto" | "plain" | "pretty") {
            return Err(anyhow!(
                "display mode must be auto, plain or pretty, got '{}'",
                self.display_mode
            ));
        }
        Ok(())
    }
}

/// `None` key: default path. Empty string: disabled.
fn optional_path(value: Option<String>, default: &str) -> Option<PathBuf> {
    match value {
        None => Some(PathBuf::from(default)),
        Some(v) if v.trim().is_empty() => None,
        Some(v) => Some(PathBuf::from(v)),
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CounterConfig::default();
        assert_eq!(cfg.source.path, "stub://demo");
        assert_eq!(cfg.output_path, Some(PathBuf::from("output_video.y4m")));
        assert_eq!(cfg.db_path, "detections.db");
        assert_eq!(cfg.export_path, Some(PathBuf::from("detections.csv")));
        assert_eq!(cfg.detector.backend, "stub");
        assert_eq!(cfg.pipeline.max_frames, None);
        assert_eq!(cfg.pipeline.max_consecutive_source_errors, 30);
    }

    #[test]
    fn empty_paths_disable_outputs() {
        let file: CounterConfigFile =
            serde_json::from_str(r#"{"output": {"path": ""}, "export": {"path": " "}}"#).unwrap();
        let cfg = CounterConfig::from_file(file);
        assert_eq!(cfg.output_path, None);
        assert_eq!(cfg.export_path, None);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = CounterConfig::default();
        cfg.pipeline.min_confidence = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = CounterConfig::default();
        cfg.display_mode = "fancy".into();
        assert!(cfg.validate().is_err());

        let mut cfg = CounterConfig::default();
        cfg.detector.backend = " Stub ".into();
        cfg.validate().unwrap();
        assert_eq!(cfg.detector.backend, "stub");
    }
}
