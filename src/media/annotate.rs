//! Annotated copies of classified media.
//!
//! Boxes are drawn over qualifying detections only. Stills keep their
//! input format when it can be encoded, otherwise PNG. Clips are written
//! as MP4 through the `ffmpeg` executable, or as animated GIF when the
//! input was a GIF or no `ffmpeg` binary is available.

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, ImageFormat, Rgb, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::deadline::kill_child;
use crate::detect::Detection;

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 32, 32]);
const BOX_THICKNESS: u32 = 3;

/// Draw hollow rectangles for `detections` onto `frame`.
pub fn draw_detections(frame: &mut RgbImage, detections: &[Detection]) {
    let (width, height) = frame.dimensions();
    for det in detections {
        let Some((x0, y0, x1, y1)) = det.pixel_bounds(width, height) else {
            continue;
        };
        for t in 0..BOX_THICKNESS {
            let (left, top) = (x0.saturating_add(t).min(x1), y0.saturating_add(t).min(y1));
            let (right, bottom) = (x1.saturating_sub(t).max(left), y1.saturating_sub(t).max(top));
            for x in left..=right {
                frame.put_pixel(x, top, BOX_COLOR);
                frame.put_pixel(x, bottom, BOX_COLOR);
            }
            for y in top..=bottom {
                frame.put_pixel(left, y, BOX_COLOR);
                frame.put_pixel(right, y, BOX_COLOR);
            }
        }
    }
}

/// Output format and extension for an annotated still.
pub fn still_output_format(input: ImageFormat) -> (ImageFormat, &'static str) {
    match input {
        ImageFormat::Jpeg => (ImageFormat::Jpeg, "jpg"),
        ImageFormat::Bmp => (ImageFormat::Bmp, "bmp"),
        _ => (ImageFormat::Png, "png"),
    }
}

/// Encode an annotated still into an already reserved file.
pub fn write_still(file: File, frame: RgbImage, format: ImageFormat) -> Result<()> {
    let mut writer = BufWriter::new(file);
    DynamicImage::ImageRgb8(frame)
        .write_to(&mut writer, format)
        .context("encode annotated image")?;
    writer.flush().context("flush annotated image")?;
    Ok(())
}

/// Sink for annotated video frames.
pub trait ClipWriter {
    fn push(&mut self, frame: &RgbImage) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Container used for an annotated clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipFormat {
    Gif,
    Mp4,
}

impl ClipFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ClipFormat::Gif => "gif",
            ClipFormat::Mp4 => "mp4",
        }
    }

    /// Pick MP4 when an encoder binary is on `PATH`, GIF otherwise.
    pub fn choose(input_is_gif: bool, ffmpeg_bin: &str) -> Self {
        if input_is_gif {
            return ClipFormat::Gif;
        }
        match which::which(ffmpeg_bin) {
            Ok(_) => ClipFormat::Mp4,
            Err(_) => {
                log::warn!(
                    "'{}' not found on PATH, writing annotated clip as GIF",
                    ffmpeg_bin
                );
                ClipFormat::Gif
            }
        }
    }
}

pub struct GifClipWriter {
    encoder: GifEncoder<BufWriter<File>>,
    delay: Delay,
}

impl GifClipWriter {
    pub fn new(file: File, fps: f64) -> Result<Self> {
        let mut encoder = GifEncoder::new(BufWriter::new(file));
        encoder
            .set_repeat(Repeat::Infinite)
            .context("configure gif repeat")?;
        let delay_ms = if fps > 0.0 {
            (1000.0 / fps).round().max(10.0) as u32
        } else {
            100
        };
        Ok(Self {
            encoder,
            delay: Delay::from_numer_denom_ms(delay_ms, 1),
        })
    }
}

impl ClipWriter for GifClipWriter {
    fn push(&mut self, frame: &RgbImage) -> Result<()> {
        let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
        self.encoder
            .encode_frame(Frame::from_parts(rgba, 0, 0, self.delay))
            .context("encode gif frame")
    }

    fn finish(self: Box<Self>) -> Result<()> {
        // The encoder writes the GIF trailer and flushes when dropped.
        drop(self.encoder);
        Ok(())
    }
}

/// Pipes raw RGB frames into an `ffmpeg` child that encodes H.264 MP4.
///
/// A writer dropped before `finish` kills and reaps its child.
pub struct FfmpegClipWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    size: (u32, u32),
    path: PathBuf,
    finished: bool,
}

impl FfmpegClipWriter {
    pub fn spawn(ffmpeg_bin: &str, path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        let fps = if fps > 0.0 { fps } else { 25.0 };
        let mut child = Command::new(ffmpeg_bin)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{}x{}", width, height))
            .arg("-r")
            .arg(format!("{:.3}", fps))
            .args(["-i", "-"])
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags", "+faststart"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", ffmpeg_bin))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdin unavailable"))?;
        Ok(Self {
            child,
            stdin: Some(stdin),
            size: (width, height),
            path: path.to_path_buf(),
            finished: false,
        })
    }
}

impl ClipWriter for FfmpegClipWriter {
    fn push(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != self.size {
            return Err(anyhow!(
                "frame size {:?} does not match clip size {:?}",
                frame.dimensions(),
                self.size
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg stdin already closed"))?;
        stdin
            .write_all(frame.as_raw())
            .context("write frame to ffmpeg")
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        drop(self.stdin.take());
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = self.child.wait().context("wait for ffmpeg")?;
        self.finished = true;
        if !status.success() {
            return Err(anyhow!(
                "ffmpeg failed writing {}: {}",
                self.path.display(),
                stderr.trim()
            ));
        }
        Ok(())
    }
}

impl Drop for FfmpegClipWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        drop(self.stdin.take());
        kill_child(&mut self.child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::AnimationDecoder;

    fn box_at(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            x,
            y,
            w,
            h,
            confidence: 0.9,
            class_id: 0,
        }
    }

    #[test]
    fn boxes_are_drawn_on_the_outline_only() {
        let mut frame = RgbImage::from_pixel(40, 40, Rgb([0, 0, 0]));
        draw_detections(&mut frame, &[box_at(0.25, 0.25, 0.5, 0.5)]);
        assert_eq!(*frame.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*frame.get_pixel(30, 20), BOX_COLOR);
        assert_eq!(*frame.get_pixel(20, 20), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn tiny_boxes_do_not_panic() {
        let mut frame = RgbImage::new(4, 4);
        draw_detections(&mut frame, &[box_at(0.9, 0.9, 0.5, 0.5), box_at(0.0, 0.0, 0.0, 0.0)]);
        assert_eq!(*frame.get_pixel(3, 3), BOX_COLOR);
    }

    #[test]
    fn still_formats_fall_back_to_png() {
        assert_eq!(still_output_format(ImageFormat::Jpeg).1, "jpg");
        assert_eq!(still_output_format(ImageFormat::WebP).1, "png");
    }

    #[test]
    fn gif_writer_round_trips_frame_count() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.gif");
        let mut writer = Box::new(GifClipWriter::new(File::create(&path)?, 10.0)?);
        for shade in [10u8, 120, 240] {
            writer.push(&RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade])))?;
        }
        writer.finish()?;

        let decoder = image::codecs::gif::GifDecoder::new(std::io::BufReader::new(File::open(&path)?))?;
        let frames = decoder.into_frames().collect_frames()?;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].delay().numer_denom_ms(), (100, 1));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn abandoned_ffmpeg_writer_kills_its_encoder() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let pid_file = dir.path().join("pid");
        let out = dir.path().join("clip.mp4");
        let script = dir.path().join("fake-ffmpeg");
        // Ignores stdin closing and writes the output late, like a slow encoder.
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho $$ > {}\nsleep 2\ntouch {}\n",
                pid_file.display(),
                out.display()
            ),
        )?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let writer = FfmpegClipWriter::spawn(script.to_str().unwrap(), &out, 8, 8, 10.0)?;
        while !pid_file.exists() {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        drop(writer);

        let pid = std::fs::read_to_string(&pid_file)?;
        assert!(!Path::new("/proc").join(pid.trim()).exists());
        std::thread::sleep(std::time::Duration::from_millis(2500));
        assert!(!out.exists(), "killed encoder must not create the clip");
        Ok(())
    }
}
