//! Report intake: validate a submitted issue report, classify its media,
//! gate clip length, and persist the report.
//!
//! Nothing is persisted unless every check passes. Annotated outputs of
//! discarded or rejected submissions are removed again.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::config::TriageConfig;
use crate::detect::{DetectionResult, ModelHandle, SeverityDetector};
use crate::media::output::reserve_named;
use crate::media::UploadedMedia;
use crate::probe::{DurationPolicy, DurationProber, DurationVerdict};
use crate::report::{Category, IssueReport, NewReport};
use crate::storage::ReportStore;

pub(crate) const ANNOTATED_IMAGE_DIR: &str = "issues/ann_images";
pub(crate) const ANNOTATED_VIDEO_DIR: &str = "issues/ann_videos";
const IMAGE_DIR: &str = "issues/images";
const VIDEO_DIR: &str = "issues/videos";

/// Text fields of a submitted report, as received.
#[derive(Clone, Debug, Default)]
pub struct ReportForm {
    pub title: String,
    pub category: String,
    pub description: String,
    pub location: String,
    pub reporter: Option<String>,
}

/// The single media attachment that will be classified.
#[derive(Debug)]
pub enum Upload {
    Image(UploadedMedia),
    Video(UploadedMedia),
}

impl Upload {
    /// An image takes precedence when both slots are filled.
    pub fn pick(image: Option<UploadedMedia>, video: Option<UploadedMedia>) -> Option<Self> {
        match (image, video) {
            (Some(image), Some(video)) => {
                log::info!(
                    "both image {} and video {} supplied; using the image",
                    image.name(),
                    video.name()
                );
                Some(Upload::Image(image))
            }
            (Some(image), None) => Some(Upload::Image(image)),
            (None, Some(video)) => Some(Upload::Video(video)),
            (None, None) => None,
        }
    }

    fn media_mut(&mut self) -> &mut UploadedMedia {
        match self {
            Upload::Image(media) | Upload::Video(media) => media,
        }
    }

    fn is_video(&self) -> bool {
        matches!(self, Upload::Video(_))
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum IntakeRejection {
    #[error("All fields are required.")]
    MissingFields,
    #[error("Unknown category '{0}'.")]
    UnknownCategory(String),
    #[error("Invalid image file type. Please upload a valid image.")]
    InvalidImageType,
    #[error("Invalid video file type. Please upload a valid video.")]
    InvalidVideoType,
    #[error("Video must be {max} seconds or less. Your video is {seconds:.1} seconds long.")]
    VideoTooLong { seconds: f64, max: f64 },
    #[error("Could not process media. Please try a different file.")]
    ProcessingFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// No image or video was attached.
    NoMedia,
    /// The detector found no qualifying hazard.
    NoHazard,
}

#[derive(Debug)]
pub enum IntakeOutcome {
    Created(IssueReport),
    Discarded(DiscardReason),
    Rejected(IntakeRejection),
}

struct ValidForm {
    title: String,
    category: Category,
    description: String,
    location: String,
    reporter: Option<String>,
}

pub struct ReportIntake<S> {
    detector: SeverityDetector,
    prober: DurationProber,
    policy: DurationPolicy,
    store: S,
    media_root: PathBuf,
    temp_dir: Option<PathBuf>,
}

impl<S: ReportStore> ReportIntake<S> {
    pub fn new(
        detector: SeverityDetector,
        prober: DurationProber,
        policy: DurationPolicy,
        store: S,
        media_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            detector,
            prober,
            policy,
            store,
            media_root: media_root.into(),
            temp_dir: None,
        }
    }

    pub fn from_config(cfg: &TriageConfig, model: ModelHandle, store: S) -> Self {
        let detector = SeverityDetector::new(model, cfg.detector_settings());
        let prober = DurationProber::with_default_strategies(&cfg.probe);
        Self::new(detector, prober, cfg.duration_policy(), store, &cfg.media_root)
            .with_temp_dir(cfg.temp_dir.clone())
    }

    /// Directory for temporary upload copies; the system temp dir when `None`.
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn submit(&mut self, form: &ReportForm, upload: Option<Upload>) -> Result<IntakeOutcome> {
        let form = match validate_form(form) {
            Ok(form) => form,
            Err(rejection) => {
                log::info!("report rejected: {}", rejection);
                return Ok(IntakeOutcome::Rejected(rejection));
            }
        };

        let Some(mut upload) = upload else {
            log::info!("report '{}' has no media; discarded", form.title);
            return Ok(IntakeOutcome::Discarded(DiscardReason::NoMedia));
        };

        let type_ok = match &upload {
            Upload::Image(media) => media.is_image_type(),
            Upload::Video(media) => media.is_video_type(),
        };
        if !type_ok {
            let rejection = if upload.is_video() {
                IntakeRejection::InvalidVideoType
            } else {
                IntakeRejection::InvalidImageType
            };
            let media = upload.media_mut();
            log::info!(
                "{} rejected: content type {:?}",
                media.name(),
                media.content_type()
            );
            return Ok(IntakeOutcome::Rejected(rejection));
        }

        let is_video = upload.is_video();
        let media = upload.media_mut();
        let suffix = media.name_suffix();
        let tmp = media.materialize(&suffix, self.temp_dir.as_deref())?;

        let annotated_dir = self.media_root.join(if is_video {
            ANNOTATED_VIDEO_DIR
        } else {
            ANNOTATED_IMAGE_DIR
        });
        let result = match self.detector.classify(tmp.path(), &annotated_dir) {
            Ok(result) => result,
            Err(e) if e.is_fatal() => {
                return Err(anyhow::Error::new(e).context("classify uploaded media"));
            }
            Err(e) => {
                log::warn!("classification of {} failed: {}", media.name(), e);
                return Ok(IntakeOutcome::Rejected(IntakeRejection::ProcessingFailed));
            }
        };

        if !result.has_hazard() {
            log::info!("no hazard detected in {}; report discarded", media.name());
            discard_output(&result);
            return Ok(IntakeOutcome::Discarded(DiscardReason::NoHazard));
        }

        if is_video {
            let estimate = self.prober.probe_duration(media);
            match self.policy.evaluate(&estimate) {
                DurationVerdict::Rejected(seconds) => {
                    log::info!(
                        "video {} rejected: {:.1}s exceeds {:.1}s",
                        media.name(),
                        seconds,
                        self.policy.max_secs
                    );
                    discard_output(&result);
                    return Ok(IntakeOutcome::Rejected(IntakeRejection::VideoTooLong {
                        seconds,
                        max: self.policy.max_secs,
                    }));
                }
                DurationVerdict::AcceptedUnverified => {
                    log::warn!(
                        "could not determine duration of {}; accepting unverified",
                        media.name()
                    );
                }
                DurationVerdict::Accepted(seconds) => {
                    log::debug!("video {} is {:.1}s", media.name(), seconds);
                }
            }
        }

        let original_dir = self.media_root.join(if is_video { VIDEO_DIR } else { IMAGE_DIR });
        let stored = match store_original(&original_dir, media.name(), tmp.path()) {
            Ok(path) => path,
            Err(e) => {
                discard_output(&result);
                return Err(e);
            }
        };
        drop(tmp);

        let stored_rel = self.relative(&stored);
        let annotated_rel = self.relative(result.annotated_output_path());
        let (image, video, annotated_image, annotated_video) = if is_video {
            (None, Some(stored_rel), None, Some(annotated_rel))
        } else {
            (Some(stored_rel), None, Some(annotated_rel), None)
        };
        let new_report = NewReport {
            reporter: form.reporter,
            title: form.title,
            category: form.category,
            description: form.description,
            location: form.location,
            severity: result.severity(),
            image,
            video,
            annotated_image,
            annotated_video,
        };

        match self.store.create(new_report) {
            Ok(report) => {
                log::info!(
                    "created report {} ({}, severity {}, {} boxes)",
                    report.id,
                    report.category,
                    report.severity,
                    result.box_count()
                );
                Ok(IntakeOutcome::Created(report))
            }
            Err(e) => {
                discard_output(&result);
                remove_quietly(&stored);
                Err(e.context("create issue report"))
            }
        }
    }

    /// Path relative to the media root when it lives under it.
    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.media_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

fn validate_form(form: &ReportForm) -> std::result::Result<ValidForm, IntakeRejection> {
    let title = form.title.trim();
    let category = form.category.trim();
    let description = form.description.trim();
    let location = form.location.trim();
    if title.is_empty() || category.is_empty() || description.is_empty() || location.is_empty() {
        return Err(IntakeRejection::MissingFields);
    }
    let category: Category = category
        .parse()
        .map_err(|_| IntakeRejection::UnknownCategory(category.to_string()))?;
    Ok(ValidForm {
        title: title.to_string(),
        category,
        description: description.to_string(),
        location: location.to_string(),
        reporter: form
            .reporter
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    })
}

/// Copy the accepted upload under `dir`, named after the original file.
fn store_original(dir: &Path, original_name: &str, content: &Path) -> Result<PathBuf> {
    let ext = Path::new(original_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    let mut reserved = reserve_named(dir, original_name, content, &ext)
        .with_context(|| format!("reserve stored copy in {}", dir.display()))?;
    let copied = File::open(content).and_then(|mut src| io::copy(&mut src, &mut reserved.file));
    if let Err(e) = copied {
        remove_quietly(&reserved.path);
        return Err(anyhow::Error::new(e).context("store uploaded media"));
    }
    Ok(reserved.path)
}

fn discard_output(result: &DetectionResult) {
    remove_quietly(result.annotated_output_path());
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("failed to remove {}: {}", path.display(), e);
    }
}
