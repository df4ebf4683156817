use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::path::Path;

use crate::probe::DurationProbe;

/// Container-level duration as reported by libavformat.
pub struct FfmpegContainerProbe;

impl DurationProbe for FfmpegContainerProbe {
    fn name(&self) -> &'static str {
        "ffmpeg-container"
    }

    fn probe(&self, path: &Path) -> Result<Option<f64>> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", path.display()))?;
        // AV_NOPTS_VALUE is negative, so unknown durations fall out here.
        let duration = input.duration();
        if duration <= 0 {
            return Ok(None);
        }
        Ok(Some(duration as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)))
    }
}

/// Frame count divided by average frame rate of the best video stream.
pub struct FrameCountProbe;

impl DurationProbe for FrameCountProbe {
    fn name(&self) -> &'static str {
        "frame-count"
    }

    fn probe(&self, path: &Path) -> Result<Option<f64>> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", path.display()))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let frames = stream.frames();
        let rate = f64::from(stream.avg_frame_rate());
        if frames <= 0 || !rate.is_finite() || rate <= 0.0 {
            return Ok(None);
        }
        Ok(Some(frames as f64 / rate))
    }
}
