//! Cloudinary upload API client.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{MediaAsset, MediaResult, MediaStore, MediaStoreError, MediaUpload, thumbnail_url};
use crate::dao::models::MediaKind;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Credentials of a Cloudinary account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Signed uploads to Cloudinary using SHA-256 request signatures.
#[derive(Clone)]
pub struct CloudinaryMediaStore {
    client: Client,
    config: Arc<CloudinaryConfig>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    format: Option<String>,
    bytes: u64,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryMediaStore {
    pub fn new(client: Client, config: CloudinaryConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    fn endpoint(&self, kind: MediaKind) -> String {
        let resource = match kind {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        };
        format!("{API_BASE}/{}/{resource}/upload", self.config.cloud_name)
    }
}

/// Signature over the alphabetically sorted, `&`-joined parameters followed by the secret.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted = params.iter().collect::<Vec<_>>();
    sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
    let payload = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(api_secret.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

impl MediaStore for CloudinaryMediaStore {
    fn upload(&self, upload: MediaUpload) -> BoxFuture<'static, MediaResult<MediaAsset>> {
        let store = self.clone();
        Box::pin(async move {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default();

            let mut signed = vec![
                ("folder", upload.folder.clone()),
                ("timestamp", timestamp.to_string()),
            ];
            if !upload.tags.is_empty() {
                signed.push(("tags", upload.tags.join(",")));
            }
            if !upload.context.is_empty() {
                let context = upload
                    .context
                    .iter()
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect::<Vec<_>>()
                    .join("|");
                signed.push(("context", context));
            }
            let signature = sign_params(&signed, &store.config.api_secret);

            let mut form = signed;
            form.push((
                "file",
                format!(
                    "data:{};base64,{}",
                    upload.content_type,
                    STANDARD.encode(&upload.data)
                ),
            ));
            form.push(("api_key", store.config.api_key.clone()));
            form.push(("signature", signature));
            form.push(("signature_algorithm", "sha256".to_string()));

            let response = store
                .client
                .post(store.endpoint(upload.kind))
                .form(&form)
                .send()
                .await
                .map_err(|source| MediaStoreError::Request {
                    source: Box::new(source),
                })?;

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .json::<ErrorResponse>()
                    .await
                    .map(|body| body.error.message)
                    .unwrap_or_else(|_| status.to_string());
                return Err(MediaStoreError::Rejected {
                    status: status.as_u16(),
                    message,
                });
            }

            let body = response
                .json::<UploadResponse>()
                .await
                .map_err(|source| MediaStoreError::Decode {
                    source: Box::new(source),
                })?;

            Ok(MediaAsset {
                thumbnail_url: thumbnail_url(&body.secure_url, upload.kind),
                format: body
                    .format
                    .unwrap_or_else(|| upload.extension().to_string()),
                public_id: body.public_id,
                secure_url: body.secure_url,
                bytes: body.bytes,
                width: body.width,
                height: body.height,
                duration: body.duration,
            })
        })
    }
}
