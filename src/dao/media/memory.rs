use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use super::{MediaAsset, MediaResult, MediaStore, MediaUpload, thumbnail_url};

const BASE_URL: &str = "memory://media/upload";

/// Keeps uploads in process memory; used when no media service is configured.
#[derive(Clone, Default)]
pub struct MemoryMediaStore {
    assets: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes of an asset.
    pub fn contents(&self, public_id: &str) -> Option<Vec<u8>> {
        self.assets.get(public_id).map(|entry| entry.value().clone())
    }
}

/// Width and height read from a PNG header.
fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if data.len() < 24 || !data.starts_with(SIGNATURE) {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some((width, height))
}

impl MediaStore for MemoryMediaStore {
    fn upload(&self, upload: MediaUpload) -> BoxFuture<'static, MediaResult<MediaAsset>> {
        let public_id = format!("{}/{}", upload.folder, Uuid::new_v4().simple());
        let format = upload.extension().to_string();
        let secure_url = format!("{BASE_URL}/{public_id}.{format}");
        let dimensions = png_dimensions(&upload.data);

        let asset = MediaAsset {
            thumbnail_url: thumbnail_url(&secure_url, upload.kind),
            bytes: upload.data.len() as u64,
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            duration: None,
            public_id: public_id.clone(),
            secure_url,
            format,
        };
        self.assets.insert(public_id, upload.data);
        Box::pin(async move { Ok(asset) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::MediaKind;

    #[tokio::test]
    async fn upload_reports_png_dimensions() {
        let mut png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
        png.extend_from_slice(&640u32.to_be_bytes());
        png.extend_from_slice(&480u32.to_be_bytes());

        let store = MemoryMediaStore::new();
        let asset = store
            .upload(MediaUpload {
                data: png.clone(),
                content_type: "image/png".into(),
                kind: MediaKind::Image,
                folder: "spring".into(),
                tags: vec![],
                context: vec![],
            })
            .await
            .unwrap();

        assert_eq!((asset.width, asset.height), (Some(640), Some(480)));
        assert_eq!(asset.format, "png");
        assert!(asset.thumbnail_url.contains("/upload/c_thumb,w_300,h_300/spring/"));
        assert_eq!(store.contents(&asset.public_id), Some(png));
    }
}
