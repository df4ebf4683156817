mod backend;
pub mod backends;
mod detector;
mod model;
mod result;
mod severity;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use detector::{
    classify, DetectorSettings, SeverityDetector, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_INFERENCE_TIMEOUT, DEFAULT_SAMPLE_FPS,
};
pub use model::{BackendKind, ModelHandle};
pub use result::{Detection, DetectionResult};
pub use severity::{Severity, SEVERITY_TABLE_VERSION};
