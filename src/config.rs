use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{
    BackendKind, DetectorSettings, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INFERENCE_TIMEOUT,
    DEFAULT_SAMPLE_FPS,
};
use crate::intake::{ANNOTATED_IMAGE_DIR, ANNOTATED_VIDEO_DIR};
use crate::probe::{
    DurationPolicy, ProbeSettings, DEFAULT_ASSUMED_BYTES_PER_SEC, DEFAULT_HEURISTIC_MAX_SECS,
    DEFAULT_MAX_VIDEO_SECS, DEFAULT_PROBE_TIMEOUT,
};

const DEFAULT_DB_PATH: &str = "triage.db";
const DEFAULT_MEDIA_ROOT: &str = "media";
const DEFAULT_MODEL_PATH: &str = "models/best.onnx";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_FFPROBE_BIN: &str = "ffprobe";
const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";

#[derive(Debug, Deserialize, Default)]
struct TriageConfigFile {
    db_path: Option<String>,
    media_root: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    max_video_secs: Option<f64>,
    model: Option<ModelConfigFile>,
    probe: Option<ProbeConfigFile>,
    video: Option<VideoConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    input_size: Option<u32>,
    inference_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ProbeConfigFile {
    timeout_secs: Option<u64>,
    ffprobe_bin: Option<String>,
    assumed_bytes_per_sec: Option<u64>,
    heuristic_max_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    sample_fps: Option<f64>,
    ffmpeg_bin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub db_path: String,
    pub media_root: PathBuf,
    pub temp_dir: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub max_video_secs: f64,
    pub model: ModelSettings,
    pub probe: ProbeSettings,
    pub video: VideoSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub backend: BackendKind,
    pub path: PathBuf,
    pub input_size: u32,
    pub inference_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub sample_fps: f64,
    pub ffmpeg_bin: String,
}

impl TriageConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRIAGE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TriageConfigFile) -> Result<Self> {
        let backend = match file.model.as_ref().and_then(|m| m.backend.as_deref()) {
            Some(name) => name.parse()?,
            None => BackendKind::Tract,
        };
        let model = ModelSettings {
            backend,
            path: file
                .model
                .as_ref()
                .and_then(|m| m.path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: file
                .model
                .as_ref()
                .and_then(|m| m.input_size)
                .unwrap_or(DEFAULT_MODEL_INPUT),
            inference_timeout: file
                .model
                .as_ref()
                .and_then(|m| m.inference_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_INFERENCE_TIMEOUT),
        };
        let temp_dir = file.temp_dir;
        let probe = ProbeSettings {
            timeout: file
                .probe
                .as_ref()
                .and_then(|p| p.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PROBE_TIMEOUT),
            ffprobe_bin: file
                .probe
                .as_ref()
                .and_then(|p| p.ffprobe_bin.clone())
                .unwrap_or_else(|| DEFAULT_FFPROBE_BIN.to_string()),
            assumed_bytes_per_sec: file
                .probe
                .as_ref()
                .and_then(|p| p.assumed_bytes_per_sec)
                .unwrap_or(DEFAULT_ASSUMED_BYTES_PER_SEC),
            heuristic_max_secs: file
                .probe
                .as_ref()
                .and_then(|p| p.heuristic_max_secs)
                .unwrap_or(DEFAULT_HEURISTIC_MAX_SECS),
            temp_dir: temp_dir.clone(),
        };
        let video = VideoSettings {
            sample_fps: file
                .video
                .as_ref()
                .and_then(|v| v.sample_fps)
                .unwrap_or(DEFAULT_SAMPLE_FPS),
            ffmpeg_bin: file
                .video
                .and_then(|v| v.ffmpeg_bin)
                .unwrap_or_else(|| DEFAULT_FFMPEG_BIN.to_string()),
        };
        Ok(Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            media_root: file
                .media_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_ROOT)),
            temp_dir,
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            max_video_secs: file.max_video_secs.unwrap_or(DEFAULT_MAX_VIDEO_SECS),
            model,
            probe,
            video,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("TRIAGE_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("TRIAGE_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = backend.parse()?;
            }
        }
        if let Ok(root) = std::env::var("TRIAGE_MEDIA_ROOT") {
            if !root.trim().is_empty() {
                self.media_root = PathBuf::from(root);
            }
        }
        if let Ok(db_path) = std::env::var("TRIAGE_DB_PATH") {
            if !db_path.trim().is_empty() {
                self.db_path = db_path;
            }
        }
        if let Ok(confidence) = std::env::var("TRIAGE_CONFIDENCE") {
            self.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("TRIAGE_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(max_secs) = std::env::var("TRIAGE_MAX_VIDEO_SECS") {
            self.max_video_secs = max_secs
                .trim()
                .parse()
                .map_err(|_| anyhow!("TRIAGE_MAX_VIDEO_SECS must be a number of seconds"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if !self.max_video_secs.is_finite() || self.max_video_secs <= 0.0 {
            return Err(anyhow!("max video seconds must be greater than zero"));
        }
        if self.probe.timeout.is_zero() || self.model.inference_timeout.is_zero() {
            return Err(anyhow!("timeouts must be greater than zero"));
        }
        if self.probe.assumed_bytes_per_sec == 0 {
            return Err(anyhow!("assumed bytes per second must be greater than zero"));
        }
        if !self.video.sample_fps.is_finite() || self.video.sample_fps < 0.0 {
            return Err(anyhow!(
                "video sample fps must be zero (every frame) or positive"
            ));
        }
        if !self.probe.heuristic_max_secs.is_finite() || self.probe.heuristic_max_secs <= 0.0 {
            return Err(anyhow!("heuristic max seconds must be greater than zero"));
        }
        if self.model.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        Ok(())
    }

    pub fn annotated_image_dir(&self) -> PathBuf {
        self.media_root.join(ANNOTATED_IMAGE_DIR)
    }

    pub fn annotated_video_dir(&self) -> PathBuf {
        self.media_root.join(ANNOTATED_VIDEO_DIR)
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            confidence_threshold: self.confidence_threshold,
            video_sample_fps: self.video.sample_fps,
            inference_timeout: self.model.inference_timeout,
            ffmpeg_bin: self.video.ffmpeg_bin.clone(),
        }
    }

    pub fn duration_policy(&self) -> DurationPolicy {
        DurationPolicy {
            max_secs: self.max_video_secs,
        }
    }
}

fn read_config_file(path: &Path) -> Result<TriageConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
