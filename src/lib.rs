//! Civic Triage
//!
//! Media severity pipeline for municipal issue reports. Citizens attach a
//! photo or a short clip to a report; the pipeline decides how severe the
//! pictured road hazard is and whether the clip is short enough to accept.
//!
//! # Architecture
//!
//! Two components do the media work:
//!
//! 1. **Duration probing**: an ordered cascade of strategies estimates a
//!    clip's length. Each strategy works on its own temporary copy; failures
//!    fall through and the result may be `unknown`.
//! 2. **Severity detection**: a detection model counts qualifying hazard
//!    boxes, draws them onto an annotated copy, and maps the count onto a
//!    fixed severity band.
//!
//! Report intake ties both together in front of a report store.
//!
//! # Module Structure
//!
//! - `media`: upload handles, content sniffing, frame decoding, annotation
//! - `probe`: `DurationProber` and its strategies
//! - `detect`: `SeverityDetector`, model backends, `DetectionResult`
//! - `intake`: report validation and acceptance flow
//! - `storage`: `ReportStore` (sqlite and in-memory)
//! - `config`: layered configuration for the `triage` binary

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
mod deadline;
pub mod detect;
pub mod error;
pub mod intake;
pub mod media;
pub mod probe;
pub mod report;
pub mod storage;

pub use detect::{
    classify, BackendKind, Detection, DetectionResult, DetectorBackend, ModelHandle, Severity,
    SeverityDetector,
};
pub use error::{ClassifyError, ClassifyResult};
pub use intake::{IntakeOutcome, IntakeRejection, ReportForm, ReportIntake, Upload};
pub use media::UploadedMedia;
pub use probe::{
    DurationConfidence, DurationEstimate, DurationPolicy, DurationProbe, DurationProber,
    DurationVerdict,
};
pub use report::{Category, IssueReport, ReportStatus};
pub use storage::{InMemoryReportStore, ReportStore, SqliteReportStore};

/// Estimate the playback duration of an upload with the default strategy cascade.
pub fn probe_duration(media: &mut UploadedMedia) -> DurationEstimate {
    DurationProber::with_default_strategies(&probe::ProbeSettings::default()).probe_duration(media)
}

pub(crate) fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
