//! Uploaded media handle.
//!
//! The web layer hands the pipeline a rewindable byte source plus the
//! metadata it declared. The pipeline borrows it for probing and
//! classification and materializes short-lived temporary copies on disk.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Byte source backing an upload.
pub trait MediaSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> MediaSource for T {}

pub struct UploadedMedia {
    name: String,
    content_type: Option<String>,
    size: u64,
    source: Box<dyn MediaSource>,
}

impl UploadedMedia {
    /// Wrap a byte source. The size is measured by seeking to the end.
    pub fn new<S: MediaSource + 'static>(
        name: impl Into<String>,
        content_type: Option<String>,
        mut source: S,
    ) -> Result<Self> {
        let size = source.seek(SeekFrom::End(0)).context("measure upload size")?;
        source.rewind().context("rewind upload")?;
        Ok(Self {
            name: name.into(),
            content_type,
            size,
            source: Box::new(source),
        })
    }

    pub fn from_bytes(
        name: impl Into<String>,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        Self::new(name, content_type.map(str::to_string), Cursor::new(bytes))
    }

    /// Open a local file as an upload, keeping its file name.
    pub fn open(path: &Path, content_type: Option<&str>) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("open upload {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(name, content_type.map(str::to_string), file)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reposition the source at its first byte.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.source.rewind()
    }

    /// Copy the whole upload into a new temporary file with `suffix`.
    ///
    /// The source is rewound before and after the copy. The returned file is
    /// deleted when dropped.
    pub fn materialize(&mut self, suffix: &str, dir: Option<&Path>) -> Result<NamedTempFile> {
        self.rewind().context("rewind upload")?;
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-").suffix(suffix);
        let mut tmp = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .context("create temporary upload file")?;
        io::copy(&mut self.source, tmp.as_file_mut()).context("copy upload to temp file")?;
        tmp.as_file_mut().flush().context("flush temp file")?;
        self.rewind().context("rewind upload")?;
        Ok(tmp)
    }

    /// Suffix derived from the original file name, `.tmp` when it has none.
    pub fn name_suffix(&self) -> String {
        PathBuf::from(&self.name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_else(|| ".tmp".to_string())
    }

    /// Suffix hinted by the declared video content type. Advisory only.
    pub fn video_suffix(&self) -> &'static str {
        video_suffix(self.content_type())
    }

    pub fn is_image_type(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
    }

    pub fn is_video_type(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("video/"))
    }
}

impl std::fmt::Debug for UploadedMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedMedia")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

pub fn video_suffix(content_type: Option<&str>) -> &'static str {
    let Some(ct) = content_type else {
        return ".webm";
    };
    let ct = ct.to_ascii_lowercase();
    if ct.contains("mp4") {
        ".mp4"
    } else if ct.contains("webm") {
        ".webm"
    } else if ct.contains("avi") {
        ".avi"
    } else {
        ".webm"
    }
}
