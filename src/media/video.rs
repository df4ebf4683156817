//! Local video frame sources.
//!
//! `VideoSource` decodes a clip on disk into RGB frames, one at a time.
//! Animated GIFs are decoded in-process with the `image` crate; every other
//! container goes through FFmpeg (feature: video-ffmpeg).

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frames, RgbImage};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[cfg(feature = "video-ffmpeg")]
use super::video_ffmpeg::FfmpegVideoSource;
use super::MediaKind;

/// A decoded frame and its presentation time.
pub struct VideoFrame {
    pub image: RgbImage,
    pub timestamp_secs: f64,
}

pub struct VideoSource {
    backend: VideoBackend,
}

enum VideoBackend {
    Gif(GifVideoSource),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegVideoSource),
}

impl VideoSource {
    pub fn open(path: &Path, kind: MediaKind) -> Result<Self> {
        match kind {
            MediaKind::AnimatedGif => Ok(Self {
                backend: VideoBackend::Gif(GifVideoSource::open(path)?),
            }),
            MediaKind::Video => {
                #[cfg(feature = "video-ffmpeg")]
                {
                    Ok(Self {
                        backend: VideoBackend::Ffmpeg(FfmpegVideoSource::open(path)?),
                    })
                }
                #[cfg(not(feature = "video-ffmpeg"))]
                {
                    Err(anyhow!(
                        "decoding {} requires the video-ffmpeg feature",
                        path.display()
                    ))
                }
            }
            MediaKind::Image(_) => Err(anyhow!("{} is a still image", path.display())),
        }
    }

    /// Decode the next frame, `None` at end of stream.
    pub fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        match &mut self.backend {
            VideoBackend::Gif(source) => source.next_frame(),
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    /// Nominal frame rate, used when re-encoding the annotated clip.
    pub fn frame_rate(&self) -> f64 {
        match &self.backend {
            VideoBackend::Gif(source) => source.frame_rate(),
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.frame_rate(),
        }
    }

    pub fn stats(&self) -> VideoStats {
        match &self.backend {
            VideoBackend::Gif(source) => source.stats(),
            #[cfg(feature = "video-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

/// Statistics for a video source.
#[derive(Clone, Debug)]
pub struct VideoStats {
    pub frames_decoded: u64,
    pub path: PathBuf,
}

/// Decides which frames get inference at a target sampling rate.
///
/// A frame is sampled when its timestamp reaches the next sampling slot.
/// Slots are counted from the first frame's timestamp, so the first frame is
/// always sampled even when it starts before zero. A rate of zero samples
/// every frame.
#[derive(Clone, Debug)]
pub struct FrameSampler {
    interval_secs: f64,
    next_slot: Option<f64>,
}

impl FrameSampler {
    pub fn new(sample_fps: f64) -> Self {
        let interval_secs = if sample_fps.is_finite() && sample_fps > 0.0 {
            1.0 / sample_fps
        } else {
            0.0
        };
        Self {
            interval_secs,
            next_slot: None,
        }
    }

    /// Sampler that picks every frame.
    pub fn every_frame() -> Self {
        Self::new(0.0)
    }

    pub fn should_sample(&mut self, timestamp_secs: f64) -> bool {
        if self.interval_secs <= 0.0 {
            return true;
        }
        let slot = match self.next_slot {
            None => timestamp_secs,
            // Small tolerance for rounding in container timestamps.
            Some(slot) if timestamp_secs + 1e-6 < slot => return false,
            Some(slot) => slot,
        };
        let elapsed_slots = ((timestamp_secs - slot) / self.interval_secs).floor();
        self.next_slot = Some(slot + (elapsed_slots.max(0.0) + 1.0) * self.interval_secs);
        true
    }
}

// ----------------------------------------------------------------------------
// Animated GIF source
// ----------------------------------------------------------------------------

struct GifVideoSource {
    path: PathBuf,
    frames: Frames<'static>,
    frame_count: u64,
    elapsed_secs: f64,
    frame_rate: f64,
}

impl GifVideoSource {
    fn open(path: &Path) -> Result<Self> {
        let frame_rate = gif_frame_rate(path)?;
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let decoder = GifDecoder::new(BufReader::new(file)).context("read gif header")?;
        Ok(Self {
            path: path.to_path_buf(),
            frames: decoder.into_frames(),
            frame_count: 0,
            elapsed_secs: 0.0,
            frame_rate,
        })
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let Some(frame) = self.frames.next() else {
            return Ok(None);
        };
        let frame = frame.context("decode gif frame")?;
        let timestamp_secs = self.elapsed_secs;
        self.elapsed_secs += delay_secs(frame.delay());
        self.frame_count += 1;
        let image = DynamicImage::ImageRgba8(frame.into_buffer()).into_rgb8();
        Ok(Some(VideoFrame {
            image,
            timestamp_secs,
        }))
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn stats(&self) -> VideoStats {
        VideoStats {
            frames_decoded: self.frame_count,
            path: self.path.clone(),
        }
    }
}

pub(crate) fn delay_secs(delay: image::Delay) -> f64 {
    let (numer, denom) = delay.numer_denom_ms();
    if denom == 0 {
        return 0.0;
    }
    numer as f64 / denom as f64 / 1000.0
}

/// Total playback time of an animated GIF in seconds.
pub(crate) fn gif_duration_secs(path: &Path) -> Result<(f64, u64)> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let decoder = GifDecoder::new(BufReader::new(file)).context("read gif header")?;
    let mut total = 0.0;
    let mut count = 0u64;
    for frame in decoder.into_frames() {
        let frame = frame.context("decode gif frame")?;
        total += delay_secs(frame.delay());
        count += 1;
    }
    if count == 0 {
        return Err(anyhow!("gif has no frames"));
    }
    Ok((total, count))
}

fn gif_frame_rate(path: &Path) -> Result<f64> {
    let (duration, count) = gif_duration_secs(path)?;
    if duration > 0.0 {
        Ok(count as f64 / duration)
    } else {
        Ok(10.0)
    }
}
