use std::fs::File;
use std::io::Read;
use std::path::Path;

use image::ImageFormat;

use crate::error::{ClassifyError, ClassifyResult};

/// How a file on disk is classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image decodable by the `image` crate.
    Image(ImageFormat),
    /// Animated GIF, decoded frame by frame in-process.
    AnimatedGif,
    /// Any other container, handed to the video decoder.
    Video,
}

impl MediaKind {
    /// Sniff the leading bytes of `path`. The file extension is ignored.
    pub fn detect(path: &Path) -> ClassifyResult<Self> {
        let mut head = [0u8; 32];
        let mut file = File::open(path).map_err(|e| ClassifyError::decode(path, e))?;
        let len = read_head(&mut file, &mut head).map_err(|e| ClassifyError::decode(path, e))?;
        if len == 0 {
            return Err(ClassifyError::decode(path, "file is empty"));
        }
        Ok(Self::from_head(&head[..len]))
    }

    pub fn from_head(head: &[u8]) -> Self {
        match image::guess_format(head) {
            Ok(ImageFormat::Gif) => MediaKind::AnimatedGif,
            Ok(format) => MediaKind::Image(format),
            Err(_) => MediaKind::Video,
        }
    }

    pub fn is_video(self) -> bool {
        !matches!(self, MediaKind::Image(_))
    }
}

fn read_head(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_headers() {
        assert_eq!(
            MediaKind::from_head(b"\x89PNG\r\n\x1a\n0000"),
            MediaKind::Image(ImageFormat::Png)
        );
        assert_eq!(
            MediaKind::from_head(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]),
            MediaKind::Image(ImageFormat::Jpeg)
        );
        assert_eq!(MediaKind::from_head(b"GIF89a....."), MediaKind::AnimatedGif);
        assert_eq!(
            MediaKind::from_head(b"\x00\x00\x00\x18ftypmp42"),
            MediaKind::Video
        );
        assert!(MediaKind::AnimatedGif.is_video());
    }

    #[test]
    fn empty_file_is_a_decode_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let err = MediaKind::detect(tmp.path()).unwrap_err();
        assert!(matches!(err, ClassifyError::Decode { .. }));
    }
}
