//! Photo and video uploads attached to tournaments and matches.

use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        media::MediaUpload,
        models::{MatchEntity, MediaEntity, MediaKind, match_key},
    },
    dto::media::{MediaUploadRequest, MediaView},
    error::ServiceError,
    realtime::TournamentEvent,
    services::{
        realtime_service, room_service, tournament_service,
        xp_service::{self, XpReward},
    },
    state::SharedState,
};

/// Split an optional `data:<mime>;base64,` prefix off `data`.
fn split_data_uri(data: &str) -> (Option<&str>, &str) {
    match data.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
        Some((header, payload)) => {
            let mime = header.strip_suffix(";base64").unwrap_or(header);
            (Some(mime).filter(|mime| !mime.is_empty()), payload)
        }
        None => (None, data),
    }
}

fn media_kind(content_type: &str) -> Result<MediaKind, ServiceError> {
    if content_type.starts_with("image/") {
        Ok(MediaKind::Image)
    } else if content_type.starts_with("video/") {
        Ok(MediaKind::Video)
    } else {
        Err(ServiceError::InvalidInput(format!(
            "Unsupported content type {content_type}"
        )))
    }
}

/// Decode the payload of `request` and check it against the upload size limit.
fn decode_payload(
    request: &MediaUploadRequest,
    max_bytes: usize,
) -> Result<(Vec<u8>, String, MediaKind), ServiceError> {
    let (uri_type, payload) = split_data_uri(request.data.trim());
    let content_type = request
        .content_type
        .as_deref()
        .or(uri_type)
        .ok_or_else(|| ServiceError::InvalidInput("Content type is required".into()))?
        .to_ascii_lowercase();
    let kind = media_kind(&content_type)?;

    // Reject before decoding when even the encoded form is clearly too large.
    if payload.len() / 4 * 3 > max_bytes + 2 {
        return Err(ServiceError::InvalidInput(format!(
            "File exceeds the {max_bytes} byte limit"
        )));
    }
    let data = STANDARD
        .decode(payload)
        .map_err(|_| ServiceError::InvalidInput("File data is not valid base64".into()))?;
    if data.is_empty() {
        return Err(ServiceError::InvalidInput("File is empty".into()));
    }
    if data.len() > max_bytes {
        return Err(ServiceError::InvalidInput(format!(
            "File exceeds the {max_bytes} byte limit"
        )));
    }
    Ok((data, content_type, kind))
}

/// Store an upload of `uploader_id`, persist its metadata and announce it to the tournament.
pub async fn upload(
    state: &SharedState,
    uploader_id: &str,
    request: MediaUploadRequest,
) -> Result<MediaView, ServiceError> {
    let (data, content_type, kind) = decode_payload(&request, state.config().max_upload_bytes)?;
    let documents = state.require_documents().await?;
    let slug = request.tournament_slug;
    tournament_service::load_tournament(state, &documents, &slug).await?;
    if let Some(match_id) = request.match_id {
        let game = documents.get::<MatchEntity>(&match_key(match_id)).await?;
        if !matches!(game, Some(game) if game.tournament_slug == slug) {
            return Err(ServiceError::InvalidInput(
                "Match does not belong to this tournament".into(),
            ));
        }
    }

    let mut context = vec![
        ("tournament".to_string(), slug.clone()),
        ("uploader".to_string(), uploader_id.to_string()),
    ];
    if let Some(match_id) = request.match_id {
        context.push(("match".to_string(), match_id.to_string()));
    }
    let asset = state
        .media()
        .upload(MediaUpload {
            data,
            content_type,
            kind,
            folder: format!("beer-olympics/{slug}"),
            tags: request.tags.clone(),
            context,
        })
        .await?;

    let media = MediaEntity {
        id: Uuid::new_v4(),
        tournament_slug: slug.clone(),
        match_id: request.match_id,
        uploader_id: uploader_id.to_string(),
        kind,
        public_id: asset.public_id,
        secure_url: asset.secure_url,
        thumbnail_url: asset.thumbnail_url,
        format: asset.format,
        bytes: asset.bytes,
        width: asset.width,
        height: asset.height,
        duration: asset.duration,
        tags: request.tags,
        created_at: state.clock().now(),
    };
    documents.upsert(&media).await?;
    info!(media_id = %media.id, slug = %slug, uploader_id, bytes = media.bytes, "media uploaded");

    xp_service::award_best_effort(state, &documents, uploader_id, &[XpReward::MediaUpload]).await;
    realtime_service::publish(
        state,
        &room_service::tournament_room(&slug),
        TournamentEvent::MediaUploaded {
            media_id: media.id,
            match_id: media.match_id,
            uploader_id: uploader_id.to_string(),
            url: media.secure_url.clone(),
            thumbnail_url: media.thumbnail_url.clone(),
        },
    );

    Ok(media.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dto::tournament::CreateTournamentRequest,
        state::{AppState, clock::ManualClock},
    };

    fn request(data: &str, content_type: Option<&str>) -> MediaUploadRequest {
        MediaUploadRequest {
            tournament_slug: "spring".into(),
            match_id: None,
            data: data.into(),
            content_type: content_type.map(str::to_string),
            tags: vec!["finals".into()],
        }
    }

    #[test]
    fn data_uris_provide_the_content_type() {
        let (data, content_type, kind) =
            decode_payload(&request("data:image/png;base64,aGVsbG8=", None), 1024).unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(content_type, "image/png");
        assert_eq!(kind, MediaKind::Image);
    }

    #[test]
    fn payloads_are_checked() {
        assert!(matches!(
            decode_payload(&request("aGVsbG8=", None), 1024),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            decode_payload(&request("not base64!", Some("image/png")), 1024),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            decode_payload(&request("aGVsbG8=", Some("application/pdf")), 1024),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            decode_payload(&request("aGVsbG8=", Some("video/mp4")), 4),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn uploads_are_persisted_and_rewarded() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        tournament_service::create_tournament(
            &state,
            "owner",
            CreateTournamentRequest {
                name: "Spring".into(),
                date: "2025-06-21".into(),
                location: None,
                format: None,
                max_teams: None,
            },
        )
        .await
        .unwrap();

        let view = upload(&state, "p1", request("data:image/jpeg;base64,aGVsbG8=", None))
            .await
            .unwrap();

        assert_eq!(view.kind, MediaKind::Image);
        assert_eq!(view.bytes, 5);
        assert_eq!(view.tags, vec!["finals"]);
        assert!(view.url.contains("beer-olympics/spring"));
        assert_eq!(xp_service::get_profile(&state, "p1").await.unwrap().uploads, 1);
    }
}
