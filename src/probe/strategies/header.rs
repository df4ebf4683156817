use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::media::video::gif_duration_secs;
use crate::probe::DurationProbe;

const GIF_MAGIC: [&[u8]; 2] = [b"GIF87a", b"GIF89a"];
const MP4_TOP_LEVEL: [&[u8; 4]; 6] = [b"ftyp", b"moov", b"mdat", b"free", b"skip", b"wide"];
/// Guard against pathological box trees.
const MAX_BOXES: usize = 4096;

/// Reads duration straight from container headers without FFmpeg.
///
/// Understands ISO-BMFF (MP4/MOV) `moov/mvhd` and animated GIF frame delays.
/// Other containers yield no answer.
pub struct HeaderProbe;

impl DurationProbe for HeaderProbe {
    fn name(&self) -> &'static str {
        "header"
    }

    fn probe(&self, path: &Path) -> Result<Option<f64>> {
        let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let len = file.metadata()?.len();
        let mut head = [0u8; 12];
        let read = read_up_to(&mut file, &mut head)?;
        let head = &head[..read];

        if GIF_MAGIC.iter().any(|m| head.starts_with(m)) {
            let (secs, _) = gif_duration_secs(path)?;
            return Ok(Some(secs));
        }
        if head.len() >= 8 && MP4_TOP_LEVEL.iter().any(|t| &head[4..8] == *t) {
            file.seek(SeekFrom::Start(0))?;
            return mp4_duration(&mut BufReader::new(file), len);
        }
        Ok(None)
    }
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

struct BoxHeader {
    kind: [u8; 4],
    body_start: u64,
    end: u64,
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

fn read_box_header<R: Read + Seek>(reader: &mut R, pos: u64, limit: u64) -> Result<BoxHeader> {
    reader.seek(SeekFrom::Start(pos))?;
    let size = read_u32(reader)?;
    let mut kind = [0u8; 4];
    reader.read_exact(&mut kind)?;
    let (size, header_len) = match size {
        0 => (limit - pos, 8),
        1 => (read_u64(reader)?, 16),
        n => (u64::from(n), 8),
    };
    if size < header_len || pos.saturating_add(size) > limit {
        return Err(anyhow!(
            "malformed '{}' box at offset {}",
            String::from_utf8_lossy(&kind),
            pos
        ));
    }
    Ok(BoxHeader {
        kind,
        body_start: pos + header_len,
        end: pos + size,
    })
}

fn find_box<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    limit: u64,
    kind: &[u8; 4],
) -> Result<Option<BoxHeader>> {
    let mut pos = start;
    for _ in 0..MAX_BOXES {
        if pos + 8 > limit {
            return Ok(None);
        }
        let header = read_box_header(reader, pos, limit)?;
        if &header.kind == kind {
            return Ok(Some(header));
        }
        pos = header.end;
    }
    Err(anyhow!("too many boxes"))
}

fn mp4_duration<R: Read + Seek>(reader: &mut R, len: u64) -> Result<Option<f64>> {
    let Some(moov) = find_box(reader, 0, len, b"moov")? else {
        return Ok(None);
    };
    let Some(mvhd) = find_box(reader, moov.body_start, moov.end, b"mvhd")? else {
        return Ok(None);
    };
    reader.seek(SeekFrom::Start(mvhd.body_start))?;
    let version = read_u32(reader)? >> 24;
    let (timescale, duration) = match version {
        0 => {
            // creation + modification time
            reader.seek(SeekFrom::Current(8))?;
            let timescale = read_u32(reader)?;
            let duration = read_u32(reader)?;
            let duration = if duration == u32::MAX {
                None
            } else {
                Some(u64::from(duration))
            };
            (timescale, duration)
        }
        1 => {
            reader.seek(SeekFrom::Current(16))?;
            let timescale = read_u32(reader)?;
            let duration = read_u64(reader)?;
            (timescale, (duration != u64::MAX).then_some(duration))
        }
        other => return Err(anyhow!("unsupported mvhd version {}", other)),
    };
    match duration {
        Some(d) if timescale > 0 && d > 0 => Ok(Some(d as f64 / f64::from(timescale))),
        _ => Ok(None),
    }
}
