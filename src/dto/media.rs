use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{MediaEntity, MediaKind},
    dto::format_system_time,
};

/// Base64 media upload.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MediaUploadRequest {
    #[validate(length(min = 1, message = "Tournament is required"))]
    pub tournament_slug: String,
    #[serde(default)]
    pub match_id: Option<Uuid>,
    /// Base64 payload, optionally as a `data:<mime>;base64,` URI.
    #[validate(length(min = 1, message = "File data is required"))]
    pub data: String,
    /// MIME type; required unless `data` is a data URI.
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub tags: Vec<String>,
}

/// Stored media item.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    pub id: Uuid,
    pub tournament_slug: String,
    pub match_id: Option<Uuid>,
    pub uploader_id: String,
    pub kind: MediaKind,
    pub url: String,
    pub thumbnail_url: String,
    pub format: String,
    pub bytes: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub tags: Vec<String>,
    pub created_at: String,
}

impl From<MediaEntity> for MediaView {
    fn from(media: MediaEntity) -> Self {
        Self {
            id: media.id,
            tournament_slug: media.tournament_slug,
            match_id: media.match_id,
            uploader_id: media.uploader_id,
            kind: media.kind,
            url: media.secure_url,
            thumbnail_url: media.thumbnail_url,
            format: media.format,
            bytes: media.bytes,
            width: media.width,
            height: media.height,
            duration: media.duration,
            tags: media.tags,
            created_at: format_system_time(media.created_at),
        }
    }
}
