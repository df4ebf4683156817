//! Severity classification of still images and clips.
//!
//! Stills get one inference pass. Clips are decoded frame by frame and
//! inference runs on every frame unless a sampling rate is configured; the
//! reported box count is the maximum number of qualifying detections on any
//! inspected frame. With sampling on, skipped frames reuse the boxes of the
//! last sampled frame in the annotated clip.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, RgbImage};

use crate::deadline::run_with_deadline;
use crate::detect::model::ModelHandle;
use crate::detect::result::{Detection, DetectionResult};
use crate::error::{ClassifyError, ClassifyResult};
use crate::media::annotate::{
    draw_detections, still_output_format, write_still, ClipFormat, ClipWriter,
    FfmpegClipWriter, GifClipWriter,
};
use crate::media::output::reserve_output;
use crate::media::{FrameSampler, MediaKind, VideoSource};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// Zero runs inference on every decoded frame.
pub const DEFAULT_SAMPLE_FPS: f64 = 0.0;
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct DetectorSettings {
    pub confidence_threshold: f32,
    /// Inference rate for clips, in sampled frames per second of playback.
    /// Zero inspects every frame.
    pub video_sample_fps: f64,
    pub inference_timeout: Duration,
    /// Encoder used for annotated MP4 clips.
    pub ffmpeg_bin: String,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            video_sample_fps: DEFAULT_SAMPLE_FPS,
            inference_timeout: DEFAULT_INFERENCE_TIMEOUT,
            ffmpeg_bin: "ffmpeg".to_string(),
        }
    }
}

pub struct SeverityDetector {
    model: ModelHandle,
    settings: DetectorSettings,
}

impl SeverityDetector {
    pub fn new(model: ModelHandle, settings: DetectorSettings) -> Self {
        Self { model, settings }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Classify `file_path` with the configured confidence threshold.
    pub fn classify(&self, file_path: &Path, output_folder: &Path) -> ClassifyResult<DetectionResult> {
        self.classify_with_threshold(file_path, output_folder, self.settings.confidence_threshold)
    }

    pub fn classify_with_threshold(
        &self,
        file_path: &Path,
        output_folder: &Path,
        confidence_threshold: f32,
    ) -> ClassifyResult<DetectionResult> {
        let kind = MediaKind::detect(file_path)?;
        let result = match kind {
            MediaKind::Image(format) => {
                self.classify_still(file_path, format, output_folder, confidence_threshold)?
            }
            MediaKind::AnimatedGif | MediaKind::Video => {
                self.classify_clip(file_path, kind, output_folder, confidence_threshold)?
            }
        };
        log::info!(
            "classified {} with {}: {} qualifying boxes, severity {}",
            file_path.display(),
            self.model.name(),
            result.box_count(),
            result.severity()
        );
        Ok(result)
    }

    fn classify_still(
        &self,
        file_path: &Path,
        format: ImageFormat,
        output_folder: &Path,
        threshold: f32,
    ) -> ClassifyResult<DetectionResult> {
        let file = File::open(file_path).map_err(|e| ClassifyError::decode(file_path, e))?;
        let frame = image::load(BufReader::new(file), format)
            .map_err(|e| ClassifyError::decode(file_path, e))?
            .into_rgb8();

        let (mut frame, detections) = self.infer(frame)?;
        let kept = qualifying(detections, threshold);
        draw_detections(&mut frame, &kept);

        let (out_format, ext) = still_output_format(format);
        let reserved = reserve_output(output_folder, file_path, ext)?;
        if let Err(e) = write_still(reserved.file, frame, out_format) {
            let _ = fs::remove_file(&reserved.path);
            return Err(ClassifyError::Io(std::io::Error::other(format!("{:#}", e))));
        }
        Ok(DetectionResult::new(kept.len() as u32, reserved.path))
    }

    fn classify_clip(
        &self,
        file_path: &Path,
        kind: MediaKind,
        output_folder: &Path,
        threshold: f32,
    ) -> ClassifyResult<DetectionResult> {
        let mut source = VideoSource::open(file_path, kind)
            .map_err(|e| ClassifyError::decode(file_path, format!("{:#}", e)))?;
        let format = ClipFormat::choose(kind == MediaKind::AnimatedGif, &self.settings.ffmpeg_bin);
        let reserved = reserve_output(output_folder, file_path, format.extension())?;

        let annotated = self.annotate_clip(
            file_path,
            &mut source,
            reserved.file,
            &reserved.path,
            format,
            threshold,
        );
        match annotated {
            Ok(box_count) => Ok(DetectionResult::new(box_count, reserved.path)),
            Err(e) => {
                let _ = fs::remove_file(&reserved.path);
                Err(e)
            }
        }
    }

    fn annotate_clip(
        &self,
        file_path: &Path,
        source: &mut VideoSource,
        file: File,
        out_path: &Path,
        format: ClipFormat,
        threshold: f32,
    ) -> ClassifyResult<u32> {
        let fps = source.frame_rate();
        let mut sampler = FrameSampler::new(self.settings.video_sample_fps);
        let mut reserved_file = Some(file);
        let mut writer: Option<Box<dyn ClipWriter>> = None;
        let mut current: Vec<Detection> = Vec::new();
        let mut max_count = 0u32;
        let mut sampled = 0u64;

        while let Some(frame) = source
            .next_frame()
            .map_err(|e| ClassifyError::decode(file_path, format!("{:#}", e)))?
        {
            let mut image = frame.image;
            if sampler.should_sample(frame.timestamp_secs) {
                let (returned, detections) = self.infer(image)?;
                image = returned;
                current = qualifying(detections, threshold);
                max_count = max_count.max(current.len() as u32);
                sampled += 1;
            }
            draw_detections(&mut image, &current);

            if writer.is_none() {
                let (width, height) = image.dimensions();
                writer = Some(open_clip_writer(
                    format,
                    reserved_file.take(),
                    out_path,
                    width,
                    height,
                    fps,
                    &self.settings.ffmpeg_bin,
                )?);
            }
            if let Some(sink) = writer.as_mut() {
                sink.push(&image).map_err(to_io)?;
            }
        }

        let Some(writer) = writer else {
            return Err(ClassifyError::decode(file_path, "clip contains no frames"));
        };
        writer.finish().map_err(to_io)?;

        log::debug!(
            "{}: {} frames decoded, {} sampled, max {} qualifying boxes",
            file_path.display(),
            source.stats().frames_decoded,
            sampled,
            max_count
        );
        Ok(max_count)
    }

    /// Run the backend on `frame` under the inference deadline.
    ///
    /// The frame is handed back so it can be annotated without a copy.
    fn infer(&self, frame: RgbImage) -> ClassifyResult<(RgbImage, Vec<Detection>)> {
        let backend = Arc::clone(self.model.backend());
        let timeout = self.settings.inference_timeout;
        let outcome = run_with_deadline(timeout, move || {
            let detections = backend.detect(&frame);
            (frame, detections)
        });
        match outcome {
            None => Err(ClassifyError::Timeout(timeout)),
            Some((frame, Ok(detections))) => Ok((frame, detections)),
            Some((_, Err(e))) => Err(ClassifyError::Inference(format!("{:#}", e))),
        }
    }
}

/// Classify one file with default detector settings and the given threshold.
pub fn classify(
    file_path: &Path,
    model: &ModelHandle,
    output_folder: &Path,
    confidence_threshold: f32,
) -> ClassifyResult<DetectionResult> {
    SeverityDetector::new(model.clone(), DetectorSettings::default()).classify_with_threshold(
        file_path,
        output_folder,
        confidence_threshold,
    )
}

fn qualifying(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.qualifies(threshold))
        .collect()
}

fn open_clip_writer(
    format: ClipFormat,
    file: Option<File>,
    path: &Path,
    width: u32,
    height: u32,
    fps: f64,
    ffmpeg_bin: &str,
) -> ClassifyResult<Box<dyn ClipWriter>> {
    match format {
        ClipFormat::Gif => {
            let file = match file {
                Some(file) => file,
                None => File::create(path)?,
            };
            Ok(Box::new(GifClipWriter::new(file, fps).map_err(to_io)?))
        }
        ClipFormat::Mp4 => {
            // ffmpeg reopens the reserved path itself.
            drop(file);
            Ok(Box::new(
                FfmpegClipWriter::spawn(ffmpeg_bin, path, width, height, fps).map_err(to_io)?,
            ))
        }
    }
}

fn to_io(e: anyhow::Error) -> ClassifyError {
    ClassifyError::Io(std::io::Error::other(format!("{:#}", e)))
}
