use anyhow::Result;
use image::RgbImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Pixels darker than this luma are candidate hazard pixels.
const DARK_LUMA: u32 = 96;
/// Regions smaller than this are treated as noise.
const MIN_REGION_PIXELS: usize = 9;

/// Stub backend for testing and demos.
///
/// Reports one detection per 4-connected region of dark pixels, with
/// confidence `1 - mean_luma / 255`. Fully deterministic: the same frame
/// always yields the same detections in the same order.
#[derive(Clone, Debug, Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        let (w, h) = (width as usize, height as usize);
        let luma: Vec<u32> = frame
            .pixels()
            .map(|p| (299 * p[0] as u32 + 587 * p[1] as u32 + 114 * p[2] as u32) / 1000)
            .collect();
        let mut visited = vec![false; w * h];
        let mut stack = Vec::new();
        let mut detections = Vec::new();

        for start in 0..w * h {
            if visited[start] || luma[start] >= DARK_LUMA {
                continue;
            }
            visited[start] = true;
            stack.push(start);

            let (mut x0, mut y0, mut x1, mut y1) = (w, h, 0usize, 0usize);
            let mut area = 0usize;
            let mut luma_sum = 0u64;

            while let Some(idx) = stack.pop() {
                let (x, y) = (idx % w, idx / w);
                area += 1;
                luma_sum += luma[idx] as u64;
                x0 = x0.min(x);
                y0 = y0.min(y);
                x1 = x1.max(x);
                y1 = y1.max(y);

                let mut visit = |n: usize| {
                    if !visited[n] && luma[n] < DARK_LUMA {
                        visited[n] = true;
                        stack.push(n);
                    }
                };
                if x > 0 {
                    visit(idx - 1);
                }
                if x + 1 < w {
                    visit(idx + 1);
                }
                if y > 0 {
                    visit(idx - w);
                }
                if y + 1 < h {
                    visit(idx + w);
                }
            }

            if area < MIN_REGION_PIXELS {
                continue;
            }
            let mean_luma = luma_sum as f32 / area as f32;
            detections.push(Detection {
                x: x0 as f32 / width as f32,
                y: y0 as f32 / height as f32,
                w: (x1 - x0 + 1) as f32 / width as f32,
                h: (y1 - y0 + 1) as f32 / height as f32,
                confidence: 1.0 - mean_luma / 255.0,
                class_id: 0,
            });
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn road(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([200, 200, 200]))
    }

    fn paint(img: &mut RgbImage, x: u32, y: u32, size: u32, value: u8) {
        for yy in y..y + size {
            for xx in x..x + size {
                img.put_pixel(xx, yy, Rgb([value, value, value]));
            }
        }
    }

    #[test]
    fn stub_backend_finds_each_dark_region() -> Result<()> {
        let backend = StubBackend::new();
        let mut img = road(64, 48);
        paint(&mut img, 4, 4, 8, 0);
        paint(&mut img, 40, 20, 6, 60);

        let detections = backend.detect(&img)?;
        assert_eq!(detections.len(), 2);
        assert!((detections[0].confidence - 1.0).abs() < 1e-6);
        assert!((detections[0].x - 4.0 / 64.0).abs() < 1e-6);
        assert!((detections[0].w - 8.0 / 64.0).abs() < 1e-6);
        assert!(detections[1].confidence < 0.8);
        Ok(())
    }

    #[test]
    fn stub_backend_ignores_specks_and_clean_frames() -> Result<()> {
        let backend = StubBackend::new();
        let mut img = road(32, 32);
        assert!(backend.detect(&img)?.is_empty());

        paint(&mut img, 10, 10, 2, 0);
        assert!(backend.detect(&img)?.is_empty());
        Ok(())
    }
}
