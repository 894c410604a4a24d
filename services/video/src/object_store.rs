use crate::config::S3Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, instrument, warn};

/// A time-boxed, read-only download URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Remote object storage as seen by the upload pipeline and the read path
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream the file at `path` into `bucket/key`, creating or replacing it
    async fn upload(&self, bucket: &str, key: &str, content_type: &str, path: &Path)
        -> Result<()>;

    /// Mint a GET URL valid for `ttl`. The object is not checked for existence.
    async fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<PresignedUrl>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
    config: S3Config,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self::from_client(client, config))
    }

    /// Wrap an already configured client
    pub fn from_client(client: S3Client, config: &S3Config) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    /// Single request upload, body streamed from disk
    async fn simple_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        path: &Path,
    ) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .context("Failed to open staged file for upload")?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload video to S3")?;

        Ok(())
    }

    /// Multipart upload for large files, one part in memory at a time
    async fn multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        path: &Path,
    ) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to create multipart upload")?;

        let upload_id = create_response
            .upload_id()
            .context("No upload ID in response")?
            .to_string();

        match self.upload_parts(bucket, key, &upload_id, path).await {
            Ok(completed_parts) => {
                let completed_upload = CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed_upload)
                    .send()
                    .await
                    .context("Failed to complete multipart upload")?;

                Ok(())
            }
            Err(e) => {
                // Orphaned parts are billed until aborted
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key = %key, error = %abort_err, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        path: &Path,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(path)
            .await
            .context("Failed to open staged file for upload")?;

        let part_size = self.config.part_size_bytes;
        let mut completed_parts = Vec::new();
        let mut part_number = 1;

        loop {
            let chunk = read_part(&mut file, part_size).await?;
            if chunk.is_empty() {
                break;
            }

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .context("Failed to upload part")?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
            part_number += 1;
        }

        Ok(completed_parts)
    }
}

/// Fill up to `part_size` bytes; short only at end of file
async fn read_part(file: &mut tokio::fs::File, part_size: usize) -> Result<Vec<u8>> {
    let mut chunk = vec![0u8; part_size];
    let mut filled = 0;

    while filled < part_size {
        let read = file
            .read(&mut chunk[filled..])
            .await
            .context("Failed to read staged file")?;
        if read == 0 {
            break;
        }
        filled += read;
    }

    chunk.truncate(filled);
    Ok(chunk)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, path), fields(bucket = %bucket, key = %key))]
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        path: &Path,
    ) -> Result<()> {
        let size_bytes = tokio::fs::metadata(path)
            .await
            .context("Failed to stat staged file")?
            .len();

        debug!(size_bytes = size_bytes, "Uploading video to S3");

        if size_bytes > self.config.multipart_threshold_bytes {
            self.multipart_upload(bucket, key, content_type, path).await?;
        } else {
            self.simple_upload(bucket, key, content_type, path).await?;
        }

        info!(size_bytes = size_bytes, "Video uploaded successfully");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %bucket, key = %key))]
    async fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<PresignedUrl> {
        let presigning_config =
            PresigningConfig::expires_in(ttl).context("Failed to create presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned URL")?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).context("Presign TTL out of range")?;

        Ok(PresignedUrl {
            url: presigned.uri().to_string(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{Credentials, Region};

    fn test_config() -> S3Config {
        S3Config {
            bucket: "tubely-videos".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            multipart_threshold_bytes: 64 * 1024 * 1024,
            part_size_bytes: 16 * 1024 * 1024,
        }
    }

    /// A real client with static credentials; presigning never hits the network
    fn offline_store() -> S3ObjectStore {
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new(
                "AKIDEXAMPLE",
                "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY",
                None,
                None,
                "test",
            ))
            .build();

        S3ObjectStore::from_client(S3Client::from_conf(conf), &test_config())
    }

    #[tokio::test]
    async fn test_presign_embeds_expiry() {
        let store = offline_store();
        let ttl = Duration::from_secs(600);

        let before = Utc::now();
        let presigned = store
            .presign("tubely-videos", "landscape/abc.mp4", ttl)
            .await
            .unwrap();

        assert!(presigned.url.starts_with("https://tubely-videos.s3."));
        assert!(presigned.url.contains("/landscape/abc.mp4?"));
        assert!(presigned.url.contains("X-Amz-Expires=600"));
        assert!(presigned.url.contains("X-Amz-Signature="));

        let window = (presigned.expires_at - before).num_seconds();
        assert!((599..=601).contains(&window));
    }

    #[tokio::test]
    async fn test_read_part_splits_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, vec![7u8; 10]).unwrap();

        let mut file = tokio::fs::File::open(&path).await.unwrap();
        assert_eq!(read_part(&mut file, 4).await.unwrap().len(), 4);
        assert_eq!(read_part(&mut file, 4).await.unwrap().len(), 4);
        assert_eq!(read_part(&mut file, 4).await.unwrap().len(), 2);
        assert!(read_part(&mut file, 4).await.unwrap().is_empty());
    }
}
