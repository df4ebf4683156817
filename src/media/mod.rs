//! Media handling for uploaded evidence.
//!
//! - `upload`: the borrowed upload handle and its temporary materialization
//! - `kind`: content sniffing (still image, animated GIF, other video)
//! - `video`: frame-by-frame decoding (GIF in-process, others via FFmpeg)
//! - `annotate`: box drawing and annotated still/clip writers
//! - `output`: collision-free names for annotated files
//!
//! Temporary copies live only for the duration of one probe or
//! classification call. Annotated outputs are meant to persist.

pub mod annotate;
mod kind;
pub mod output;
pub mod upload;
pub mod video;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod video_ffmpeg;

pub use kind::MediaKind;
pub use upload::{MediaSource, UploadedMedia};
pub use video::{FrameSampler, VideoFrame, VideoSource};
