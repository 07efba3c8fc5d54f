use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::post,
};

use crate::{
    dto::media::{MediaUploadRequest, MediaView},
    error::AppError,
    routes::extract::{AuthUser, ValidatedJson},
    services::media_service,
    state::SharedState,
};

/// Room left in the request body for the JSON envelope around the base64 payload.
const ENVELOPE_BYTES: usize = 16 * 1024;

/// Upload route; the body limit follows the configured maximum file size.
pub fn router(max_upload_bytes: usize) -> Router<SharedState> {
    let body_limit = max_upload_bytes.div_ceil(3) * 4 + ENVELOPE_BYTES;
    Router::new().route(
        "/api/media/upload",
        post(upload).layer(DefaultBodyLimit::max(body_limit)),
    )
}

/// Store a base64-encoded photo or video for a tournament.
#[utoipa::path(
    post,
    path = "/api/media/upload",
    tag = "media",
    request_body = MediaUploadRequest,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Media stored", body = MediaView),
        (status = 400, description = "Invalid payload or file too large"),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub async fn upload(
    State(state): State<SharedState>,
    user: AuthUser,
    ValidatedJson(payload): ValidatedJson<MediaUploadRequest>,
) -> Result<(StatusCode, Json<MediaView>), AppError> {
    let media = media_service::upload(&state, &user.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(media)))
}
