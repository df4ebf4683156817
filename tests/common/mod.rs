#![allow(dead_code)]

use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs::File;
use std::path::Path;

pub const BLOB: u32 = 6;

/// White canvas with `blobs` black squares laid out left to right.
pub fn canvas_with_blobs(blobs: u32) -> RgbImage {
    let width = 16 + blobs * (BLOB + 6);
    let mut img = RgbImage::from_pixel(width.max(32), 32, Rgb([255, 255, 255]));
    for i in 0..blobs {
        paint_square(&mut img, 8 + i * (BLOB + 6), 12, Rgb([0, 0, 0]));
    }
    img
}

pub fn paint_square(img: &mut RgbImage, x0: u32, y0: u32, color: Rgb<u8>) {
    for y in y0..y0 + BLOB {
        for x in x0..x0 + BLOB {
            img.put_pixel(x, y, color);
        }
    }
}

pub fn write_still(path: &Path, img: &RgbImage, format: ImageFormat) {
    img.save_with_format(path, format).unwrap();
}

/// Animated GIF whose frames carry the given blob counts, each shown for `delay_ms`.
pub fn write_gif(path: &Path, blob_counts: &[u32], delay_ms: u32) {
    let width = 16 + blob_counts.iter().copied().max().unwrap_or(0) * (BLOB + 6);
    let mut encoder = GifEncoder::new(File::create(path).unwrap());
    for &count in blob_counts {
        let mut rgba = RgbaImage::from_pixel(width.max(32), 32, Rgba([255, 255, 255, 255]));
        for i in 0..count {
            for y in 12..12 + BLOB {
                for x in 8 + i * (BLOB + 6)..8 + i * (BLOB + 6) + BLOB {
                    rgba.put_pixel(x, y, Rgba([0, 0, 0, 255]));
                }
            }
        }
        encoder
            .encode_frame(Frame::from_parts(
                rgba,
                0,
                0,
                Delay::from_numer_denom_ms(delay_ms, 1),
            ))
            .unwrap();
    }
}

pub fn gif_bytes(blob_counts: &[u32], delay_ms: u32) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    write_gif(&path, blob_counts, delay_ms);
    std::fs::read(path).unwrap()
}

pub fn png_bytes(img: &RgbImage) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

/// ISO-BMFF bytes whose movie header declares `duration / timescale` seconds.
/// There is no decodable track.
pub fn synthetic_mp4(timescale: u32, duration: u32) -> Vec<u8> {
    let mut mvhd = vec![0u8; 100];
    mvhd[12..16].copy_from_slice(&timescale.to_be_bytes());
    mvhd[16..20].copy_from_slice(&duration.to_be_bytes());
    let mut file = mp4_box(b"ftyp", b"isom\0\0\x02\0isomiso2");
    file.extend(mp4_box(b"moov", &mp4_box(b"mvhd", &mvhd)));
    file.extend(mp4_box(b"mdat", &[0u8; 32]));
    file
}

pub fn dir_entries(path: &Path) -> usize {
    std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
}
