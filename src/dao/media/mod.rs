//! Media storage for uploaded photos and videos.

#[cfg(feature = "cloudinary-media")]
pub mod cloudinary;
pub mod memory;

use std::error::Error;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dao::models::MediaKind;

/// Edge length in pixels of generated thumbnails.
pub const THUMBNAIL_SIZE: u32 = 300;

/// Result alias for media store operations.
pub type MediaResult<T> = Result<T, MediaStoreError>;

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("failed to reach media store")]
    Request {
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("media store rejected upload with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("failed to decode media store response")]
    Decode {
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

/// Payload handed to a media store.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    /// Decoded file contents.
    pub data: Vec<u8>,
    /// MIME type such as `image/jpeg`.
    pub content_type: String,
    pub kind: MediaKind,
    /// Folder grouping assets of one tournament.
    pub folder: String,
    pub tags: Vec<String>,
    /// Free-form key/value context (match, tournament, uploader).
    pub context: Vec<(String, String)>,
}

impl MediaUpload {
    /// File extension implied by the MIME type.
    pub fn extension(&self) -> &str {
        self.content_type
            .split_once('/')
            .map(|(_, subtype)| subtype.split(['+', ';']).next().unwrap_or(subtype))
            .map(|subtype| if subtype == "jpeg" { "jpg" } else { subtype })
            .unwrap_or("bin")
    }
}

/// Metadata of a stored asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaAsset {
    pub public_id: String,
    pub secure_url: String,
    pub thumbnail_url: String,
    pub format: String,
    pub bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
}

/// Upload backend for user media.
pub trait MediaStore: Send + Sync {
    fn upload(&self, upload: MediaUpload) -> BoxFuture<'static, MediaResult<MediaAsset>>;
}

/// Derive a square thumbnail URL from a delivery URL containing `/upload/`.
///
/// Videos are thumbnailed from their first frame, so the extension becomes `.jpg`.
pub fn thumbnail_url(secure_url: &str, kind: MediaKind) -> String {
    let transformation = format!("c_thumb,w_{THUMBNAIL_SIZE},h_{THUMBNAIL_SIZE}");
    let url = match secure_url.split_once("/upload/") {
        Some((head, tail)) => format!("{head}/upload/{transformation}/{tail}"),
        None => secure_url.to_string(),
    };
    match kind {
        MediaKind::Image => url,
        MediaKind::Video => match url.rsplit_once('.') {
            Some((stem, ext)) if !ext.contains('/') => format!("{stem}.jpg"),
            _ => format!("{url}.jpg"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnails_insert_a_transformation() {
        assert_eq!(
            thumbnail_url("https://res.example.com/demo/image/upload/v1/spring/abc.png", MediaKind::Image),
            "https://res.example.com/demo/image/upload/c_thumb,w_300,h_300/v1/spring/abc.png"
        );
    }

    #[test]
    fn video_thumbnails_are_jpegs() {
        assert_eq!(
            thumbnail_url("https://res.example.com/demo/video/upload/v1/clip.mp4", MediaKind::Video),
            "https://res.example.com/demo/video/upload/c_thumb,w_300,h_300/v1/clip.jpg"
        );
    }

    #[test]
    fn extension_follows_mime_type() {
        let upload = |content_type: &str| MediaUpload {
            data: Vec::new(),
            content_type: content_type.into(),
            kind: MediaKind::Image,
            folder: String::new(),
            tags: Vec::new(),
            context: Vec::new(),
        };
        assert_eq!(upload("image/jpeg").extension(), "jpg");
        assert_eq!(upload("image/svg+xml").extension(), "svg");
        assert_eq!(upload("garbage").extension(), "bin");
    }
}
