//! Video duration probing.
//!
//! `DurationProber` runs an ordered list of `DurationProbe` strategies
//! against fresh temporary copies of an upload and stops at the first one
//! that reports a duration. A strategy that errors, times out, or has no
//! answer never aborts the cascade. When every strategy comes up empty the
//! result is an `unknown` estimate, not an error.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::deadline::run_with_deadline;
use crate::media::UploadedMedia;

pub mod strategies;

pub const DEFAULT_MAX_VIDEO_SECS: f64 = 6.0;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Assumed bitrate for the size heuristic: 1 MiB per second.
pub const DEFAULT_ASSUMED_BYTES_PER_SEC: u64 = 1024 * 1024;
pub const DEFAULT_HEURISTIC_MAX_SECS: f64 = 10.0;
const STRATEGY_GRACE: Duration = Duration::from_millis(250);

/// How much a duration can be trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationConfidence {
    /// Read from container metadata or decoded stream properties.
    Measured,
    /// Guessed from indirect evidence such as file size.
    Estimated,
    /// No strategy produced a duration.
    Unknown,
}

impl fmt::Display for DurationConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DurationConfidence::Measured => "measured",
            DurationConfidence::Estimated => "estimated",
            DurationConfidence::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DurationEstimate {
    pub seconds: f64,
    pub confidence: DurationConfidence,
}

impl DurationEstimate {
    pub fn unknown() -> Self {
        Self {
            seconds: 0.0,
            confidence: DurationConfidence::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        self.confidence != DurationConfidence::Unknown
    }

    /// Duration in seconds, `None` when unknown.
    pub fn seconds(&self) -> Option<f64> {
        self.is_known().then_some(self.seconds)
    }
}

/// One fallback technique for estimating a clip's duration.
pub trait DurationProbe: Send + Sync {
    /// Strategy identifier used in logs.
    fn name(&self) -> &'static str;

    /// Trust level of a duration this strategy reports.
    fn confidence(&self) -> DurationConfidence {
        DurationConfidence::Measured
    }

    /// Duration of the file at `path` in seconds.
    ///
    /// `Ok(None)` means the strategy ran but found no usable duration.
    fn probe(&self, path: &Path) -> Result<Option<f64>>;
}

#[derive(Clone, Debug)]
pub struct ProbeSettings {
    /// Wall-clock limit for a single strategy.
    pub timeout: Duration,
    pub ffprobe_bin: String,
    pub assumed_bytes_per_sec: u64,
    pub heuristic_max_secs: f64,
    /// Directory for temporary copies; the system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            ffprobe_bin: "ffprobe".to_string(),
            assumed_bytes_per_sec: DEFAULT_ASSUMED_BYTES_PER_SEC,
            heuristic_max_secs: DEFAULT_HEURISTIC_MAX_SECS,
            temp_dir: None,
        }
    }
}

pub struct DurationProber {
    probes: Vec<Arc<dyn DurationProbe>>,
    timeout: Duration,
    temp_dir: Option<PathBuf>,
}

impl DurationProber {
    pub fn new(probes: Vec<Arc<dyn DurationProbe>>, settings: &ProbeSettings) -> Self {
        Self {
            probes,
            timeout: settings.timeout,
            temp_dir: settings.temp_dir.clone(),
        }
    }

    /// Prober with the standard cascade for this build.
    pub fn with_default_strategies(settings: &ProbeSettings) -> Self {
        Self::new(strategies::default_strategies(settings), settings)
    }

    /// Strategy names in the order they are attempted.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    pub fn probe_duration(&self, media: &mut UploadedMedia) -> DurationEstimate {
        let suffix = media.video_suffix();
        log::debug!(
            "probing duration of {} (type: {:?}, suffix: {})",
            media.name(),
            media.content_type(),
            suffix
        );

        for probe in &self.probes {
            match self.attempt(probe, media, suffix) {
                Ok(Some(seconds)) => {
                    log::debug!("{}: {} reported {:.3}s", media.name(), probe.name(), seconds);
                    return DurationEstimate {
                        seconds,
                        confidence: probe.confidence(),
                    };
                }
                Ok(None) => log::debug!("{}: {} found no duration", media.name(), probe.name()),
                Err(e) => log::debug!("{}: {} failed: {:#}", media.name(), probe.name(), e),
            }
        }

        log::warn!(
            "duration of {} unknown after {} strategies",
            media.name(),
            self.probes.len()
        );
        DurationEstimate::unknown()
    }

    fn attempt(
        &self,
        probe: &Arc<dyn DurationProbe>,
        media: &mut UploadedMedia,
        suffix: &str,
    ) -> Result<Option<f64>> {
        let tmp = media.materialize(suffix, self.temp_dir.as_deref())?;
        let path = tmp.path().to_path_buf();
        let job = Arc::clone(probe);
        // Strategies that run child processes kill them at `timeout`; the
        // grace lets that finish before the worker is abandoned.
        let outcome = run_with_deadline(self.timeout + STRATEGY_GRACE, move || job.probe(&path));
        drop(tmp);

        match outcome {
            Some(result) => Ok(result?.filter(|s| s.is_finite() && *s > 0.0)),
            None => Err(anyhow!("timed out after {:?}", self.timeout)),
        }
    }
}

/// Caller-side gate on clip length.
#[derive(Clone, Copy, Debug)]
pub struct DurationPolicy {
    pub max_secs: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DurationVerdict {
    Accepted(f64),
    /// No duration could be determined; the clip is let through.
    AcceptedUnverified,
    Rejected(f64),
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self {
            max_secs: DEFAULT_MAX_VIDEO_SECS,
        }
    }
}

impl DurationPolicy {
    pub fn evaluate(&self, estimate: &DurationEstimate) -> DurationVerdict {
        match estimate.seconds() {
            None => DurationVerdict::AcceptedUnverified,
            Some(secs) if secs > self.max_secs => DurationVerdict::Rejected(secs),
            Some(secs) => DurationVerdict::Accepted(secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        answer: fn() -> Result<Option<f64>>,
        calls: Arc<AtomicUsize>,
        seen_len: Arc<AtomicUsize>,
    }

    impl DurationProbe for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn probe(&self, path: &Path) -> Result<Option<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let len = std::fs::metadata(path)?.len() as usize;
            self.seen_len.store(len, Ordering::SeqCst);
            (self.answer)()
        }
    }

    fn scripted(
        name: &'static str,
        answer: fn() -> Result<Option<f64>>,
    ) -> (Arc<dyn DurationProbe>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_len = Arc::new(AtomicUsize::new(0));
        let probe = Arc::new(Scripted {
            name,
            answer,
            calls: calls.clone(),
            seen_len: seen_len.clone(),
        });
        (probe, calls, seen_len)
    }

    fn upload() -> UploadedMedia {
        UploadedMedia::from_bytes("clip.webm", Some("video/webm"), vec![3u8; 2048]).unwrap()
    }

    #[test]
    fn cascade_stops_at_first_success() {
        let (failing, failing_calls, failing_len) = scripted("broken", || Err(anyhow!("no codec")));
        let (empty, empty_calls, _) = scripted("empty", || Ok(None));
        let (good, good_calls, good_len) = scripted("good", || Ok(Some(3.2)));
        let (never, never_calls, _) = scripted("never", || Ok(Some(99.0)));

        let prober = DurationProber::new(
            vec![failing, empty, good, never],
            &ProbeSettings::default(),
        );
        let mut media = upload();
        let estimate = prober.probe_duration(&mut media);

        assert_eq!(estimate.seconds(), Some(3.2));
        assert_eq!(estimate.confidence, DurationConfidence::Measured);
        assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
        assert_eq!(empty_calls.load(Ordering::SeqCst), 1);
        assert_eq!(good_calls.load(Ordering::SeqCst), 1);
        assert_eq!(never_calls.load(Ordering::SeqCst), 0);
        // Each strategy saw a complete copy of the rewound upload.
        assert_eq!(failing_len.load(Ordering::SeqCst), 2048);
        assert_eq!(good_len.load(Ordering::SeqCst), 2048);
    }

    #[test]
    fn exhausted_cascade_is_unknown_not_error() {
        let (a, _, _) = scripted("a", || Err(anyhow!("corrupt")));
        let (b, _, _) = scripted("b", || Ok(Some(f64::NAN)));
        let (c, _, _) = scripted("c", || Ok(Some(0.0)));
        let prober = DurationProber::new(vec![a, b, c], &ProbeSettings::default());

        let estimate = prober.probe_duration(&mut upload());
        assert!(!estimate.is_known());
        assert_eq!(estimate.confidence, DurationConfidence::Unknown);
        assert_eq!(estimate.seconds(), None);
    }

    #[test]
    fn temp_copies_are_removed_after_each_strategy() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (a, _, _) = scripted("a", || Err(anyhow!("corrupt")));
        let (b, _, _) = scripted("b", || Ok(Some(1.5)));
        let settings = ProbeSettings {
            temp_dir: Some(dir.path().to_path_buf()),
            ..ProbeSettings::default()
        };
        let prober = DurationProber::new(vec![a, b], &settings);

        let estimate = prober.probe_duration(&mut upload());
        assert_eq!(estimate.seconds(), Some(1.5));
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn slow_strategies_time_out_and_fall_through() {
        struct Hang;
        impl DurationProbe for Hang {
            fn name(&self) -> &'static str {
                "hang"
            }
            fn probe(&self, _path: &Path) -> Result<Option<f64>> {
                std::thread::sleep(Duration::from_millis(1500));
                Ok(Some(1.0))
            }
        }
        let (fallback, _, _) = scripted("fallback", || Ok(Some(2.0)));
        let settings = ProbeSettings {
            timeout: Duration::from_millis(20),
            ..ProbeSettings::default()
        };
        let prober = DurationProber::new(vec![Arc::new(Hang), fallback], &settings);
        assert_eq!(prober.probe_duration(&mut upload()).seconds(), Some(2.0));
    }

    #[test]
    fn policy_caps_at_six_seconds() {
        let policy = DurationPolicy::default();
        let measured = |s| DurationEstimate {
            seconds: s,
            confidence: DurationConfidence::Measured,
        };
        assert_eq!(policy.evaluate(&measured(3.0)), DurationVerdict::Accepted(3.0));
        assert_eq!(policy.evaluate(&measured(6.0)), DurationVerdict::Accepted(6.0));
        assert_eq!(policy.evaluate(&measured(6.01)), DurationVerdict::Rejected(6.01));
        assert_eq!(
            policy.evaluate(&DurationEstimate::unknown()),
            DurationVerdict::AcceptedUnverified
        );
    }
}
