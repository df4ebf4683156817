use anyhow::{Context, Result};
use std::path::Path;

use crate::probe::{DurationConfidence, DurationProbe};

/// Last resort: treat file size as seconds at an assumed bitrate.
///
/// Only answers when the estimate lands in `(0, max_secs]`; anything larger
/// is too unreliable to report.
pub struct SizeHeuristicProbe {
    bytes_per_sec: u64,
    max_secs: f64,
}

impl SizeHeuristicProbe {
    pub fn new(bytes_per_sec: u64, max_secs: f64) -> Self {
        Self {
            bytes_per_sec: bytes_per_sec.max(1),
            max_secs,
        }
    }
}

impl DurationProbe for SizeHeuristicProbe {
    fn name(&self) -> &'static str {
        "size-heuristic"
    }

    fn confidence(&self) -> DurationConfidence {
        DurationConfidence::Estimated
    }

    fn probe(&self, path: &Path) -> Result<Option<f64>> {
        let size = std::fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        let secs = size as f64 / self.bytes_per_sec as f64;
        if secs > 0.0 && secs <= self.max_secs {
            Ok(Some(secs))
        } else {
            Ok(None)
        }
    }
}
