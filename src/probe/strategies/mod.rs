//! Duration strategies, in cascade order:
//!
//! 1. `ffmpeg-container`: container-level duration via libavformat (feature: video-ffmpeg)
//! 2. `ffprobe`: first video stream's duration from the ffprobe CLI
//! 3. `frame-count`: frame count over average frame rate (feature: video-ffmpeg)
//! 4. `header`: MP4 `mvhd` box or summed GIF frame delays, pure Rust
//! 5. `size-heuristic`: file size over an assumed bitrate, bounded

use std::sync::Arc;

use super::{DurationProbe, ProbeSettings};

#[cfg(feature = "video-ffmpeg")]
mod ffmpeg;
mod ffprobe;
mod header;
mod size;

#[cfg(feature = "video-ffmpeg")]
pub use ffmpeg::{FfmpegContainerProbe, FrameCountProbe};
pub use ffprobe::FfprobeProbe;
pub use header::HeaderProbe;
pub use size::SizeHeuristicProbe;

pub fn default_strategies(settings: &ProbeSettings) -> Vec<Arc<dyn DurationProbe>> {
    let mut probes: Vec<Arc<dyn DurationProbe>> = Vec::new();
    #[cfg(feature = "video-ffmpeg")]
    probes.push(Arc::new(FfmpegContainerProbe));
    probes.push(Arc::new(FfprobeProbe::with_timeout(
        &settings.ffprobe_bin,
        settings.timeout,
    )));
    #[cfg(feature = "video-ffmpeg")]
    probes.push(Arc::new(FrameCountProbe));
    probes.push(Arc::new(HeaderProbe));
    probes.push(Arc::new(SizeHeuristicProbe::new(
        settings.assumed_bytes_per_sec,
        settings.heuristic_max_secs,
    )));
    probes
}
