use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::detect::backend::DetectorBackend;
use crate::detect::backends::StubBackend;
use crate::error::{ClassifyError, ClassifyResult};

/// Backend family used to run the detection model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// ONNX weights executed with tract (feature: backend-tract).
    Tract,
    /// Deterministic dark-region detector. Needs no weights.
    Stub,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Tract => "tract",
            BackendKind::Stub => "stub",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tract" | "onnx" => Ok(BackendKind::Tract),
            "stub" => Ok(BackendKind::Stub),
            other => Err(anyhow::anyhow!("unknown detector backend '{}'", other)),
        }
    }
}

/// A loaded detection model, shared read-only across classification calls.
#[derive(Clone)]
pub struct ModelHandle {
    backend: Arc<dyn DetectorBackend>,
}

impl ModelHandle {
    pub fn from_backend<B: DetectorBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Load the model for `kind`.
    ///
    /// A missing or unloadable weights file is `ModelUnavailable`. The stub
    /// backend ignores `model_path`.
    pub fn load(kind: BackendKind, model_path: &Path, input_size: u32) -> ClassifyResult<Self> {
        match kind {
            BackendKind::Stub => Ok(Self::from_backend(StubBackend::new())),
            BackendKind::Tract => {
                if !model_path.is_file() {
                    return Err(ClassifyError::ModelUnavailable(format!(
                        "model weights not found at {}",
                        model_path.display()
                    )));
                }
                load_tract(model_path, input_size)
            }
        }
    }

    pub fn backend(&self) -> &Arc<dyn DetectorBackend> {
        &self.backend
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[cfg(feature = "backend-tract")]
fn load_tract(model_path: &Path, input_size: u32) -> ClassifyResult<ModelHandle> {
    let backend = crate::detect::backends::TractBackend::new(model_path, input_size)
        .map_err(|e| ClassifyError::ModelUnavailable(format!("{:#}", e)))?;
    backend
        .warm_up()
        .map_err(|e| ClassifyError::ModelUnavailable(format!("warm-up failed: {:#}", e)))?;
    log::info!("loaded detection model {}", model_path.display());
    Ok(ModelHandle::from_backend(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(model_path: &Path, _input_size: u32) -> ClassifyResult<ModelHandle> {
    Err(ClassifyError::ModelUnavailable(format!(
        "cannot load {}: built without the backend-tract feature",
        model_path.display()
    )))
}
