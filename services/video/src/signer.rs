//! Read path: swap a record's storage reference for a short-lived URL.

use crate::error::VideoError;
use crate::metadata_store::Video;
use crate::object_store::ObjectStore;
use crate::storage_ref::StorageReference;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Lifetime of every signed playback URL
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone)]
pub struct VideoSigner {
    store: Arc<dyn ObjectStore>,
}

impl VideoSigner {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Return a copy of `video` whose `video_url` is a signed URL.
    ///
    /// Records without a reference pass through untouched. The persisted
    /// record is never modified: the caller hands over an owned copy.
    #[instrument(skip(self, video), fields(video_id = %video.id))]
    pub async fn resolve_for_display(&self, mut video: Video) -> Result<Video, VideoError> {
        let Some(raw) = video.video_url.as_deref() else {
            return Ok(video);
        };

        let reference = StorageReference::parse(raw).ok_or_else(|| {
            error!(reference = %raw, "Stored video reference has no bucket/key delimiter");
            VideoError::MalformedReference(video.id)
        })?;

        let presigned = self
            .store
            .presign(reference.bucket(), reference.key(), SIGNED_URL_TTL)
            .await
            .map_err(VideoError::Storage)?;

        metrics::counter!("video.urls.signed").increment(1);
        debug!(
            key = %reference.key(),
            expires_at = %presigned.expires_at,
            "Signed video URL"
        );

        video.video_url = Some(presigned.url);
        Ok(video)
    }

    /// Resolve every record, failing on the first bad one
    pub async fn resolve_all(&self, videos: Vec<Video>) -> Result<Vec<Video>, VideoError> {
        let mut resolved = Vec::with_capacity(videos.len());
        for video in videos {
            resolved.push(self.resolve_for_display(video).await?);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::{MockObjectStore, PresignedUrl};
    use chrono::Utc;
    use mockall::predicate::eq;
    use uuid::Uuid;

    fn video_with(reference: Option<&str>) -> Video {
        Video {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            title: "Boots".to_string(),
            description: String::new(),
            thumbnail_url: None,
            video_url: reference.map(String::from),
            user_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_unset_reference_passes_through() {
        let mut store = MockObjectStore::new();
        store.expect_presign().never();
        let signer = VideoSigner::new(Arc::new(store));

        let video = video_with(None);
        let resolved = signer.resolve_for_display(video.clone()).await.unwrap();
        assert_eq!(resolved, video);
    }

    #[tokio::test]
    async fn test_reference_replaced_with_signed_url() {
        let mut store = MockObjectStore::new();
        store
            .expect_presign()
            .with(
                eq("tubely-videos"),
                eq("landscape/abc.mp4"),
                eq(SIGNED_URL_TTL),
            )
            .times(1)
            .returning(|bucket, key, ttl| {
                Ok(PresignedUrl {
                    url: format!(
                        "https://{}.s3.test/{}?X-Amz-Expires={}",
                        bucket,
                        key,
                        ttl.as_secs()
                    ),
                    expires_at: Utc::now(),
                })
            });
        let signer = VideoSigner::new(Arc::new(store));

        let original = video_with(Some("tubely-videos,landscape/abc.mp4"));
        let resolved = signer.resolve_for_display(original.clone()).await.unwrap();

        assert_eq!(
            resolved.video_url.as_deref(),
            Some("https://tubely-videos.s3.test/landscape/abc.mp4?X-Amz-Expires=600")
        );
        // the caller's copy still holds the reference
        assert_eq!(
            original.video_url.as_deref(),
            Some("tubely-videos,landscape/abc.mp4")
        );
    }

    #[tokio::test]
    async fn test_malformed_reference_is_fault() {
        let mut store = MockObjectStore::new();
        store.expect_presign().never();
        let signer = VideoSigner::new(Arc::new(store));

        let result = signer
            .resolve_for_display(video_with(Some("https://cdn.example.com/video.mp4")))
            .await;
        assert!(matches!(result, Err(VideoError::MalformedReference(_))));
    }

    #[tokio::test]
    async fn test_presign_failure_is_storage_error() {
        let mut store = MockObjectStore::new();
        store
            .expect_presign()
            .returning(|_, _, _| Err(anyhow::anyhow!("credentials expired")));
        let signer = VideoSigner::new(Arc::new(store));

        let result = signer
            .resolve_for_display(video_with(Some("b,other/k.mp4")))
            .await;
        assert!(matches!(result, Err(VideoError::Storage(_))));
    }

    #[test]
    fn test_ttl_is_ten_minutes() {
        assert_eq!(SIGNED_URL_TTL.as_secs(), 600);
    }
}
