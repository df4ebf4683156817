//! Collision-free naming for annotated media.
//!
//! Names combine a sanitized input stem, a content hash prefix, the current
//! time in milliseconds and a random suffix. The file is reserved with
//! exclusive create so two writers never share a path.

use rand::RngCore;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

const HASH_WINDOW_BYTES: u64 = 1024 * 1024;
const MAX_STEM_CHARS: usize = 32;
const MAX_ATTEMPTS: usize = 8;

/// A reserved, empty output file.
#[derive(Debug)]
pub struct ReservedOutput {
    pub path: PathBuf,
    pub file: File,
}

/// Create `folder` if needed and reserve a unique file for an annotated copy
/// of `input` with extension `ext`.
pub fn reserve_output(folder: &Path, input: &Path, ext: &str) -> io::Result<ReservedOutput> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    reserve_named(folder, &stem, input, ext)
}

/// Like `reserve_output`, but the name stem comes from `display_name`
/// rather than the path of `content`.
pub fn reserve_named(
    folder: &Path,
    display_name: &str,
    content: &Path,
    ext: &str,
) -> io::Result<ReservedOutput> {
    fs::create_dir_all(folder)?;
    let stem = sanitize_stem(
        &Path::new(display_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    );
    let digest = content_digest(content)?;
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    for _ in 0..MAX_ATTEMPTS {
        let mut salt = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut salt);
        let name = format!(
            "{}-{}-{}-{}.{}",
            stem,
            &digest[..12],
            millis,
            hex::encode(salt),
            ext
        );
        let path = folder.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok(ReservedOutput { path, file }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "could not reserve a unique output name",
    ))
}

fn sanitize_stem(stem: &str) -> String {
    static UNSAFE_RE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE_RE.get_or_init(|| Regex::new(r"[^a-z0-9_-]+").unwrap());
    let lowered = stem.to_ascii_lowercase();
    let cleaned = re.replace_all(&lowered, "_");
    let trimmed: String = cleaned.trim_matches('_').chars().take(MAX_STEM_CHARS).collect();
    if trimmed.is_empty() {
        "media".to_string()
    } else {
        trimmed
    }
}

fn content_digest(input: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut reader = File::open(input)?.take(HASH_WINDOW_BYTES);
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
