//! Presigned-URL issuance against an S3-compatible attachment store.
//!
//! Thin wrapper over `aws-sdk-s3`, the same shape as a generic object
//! storage client wrapping the AWS SDK's `Client` behind a narrow method
//! surface — `presigned_get_url` generalizes directly to a presigned-PUT
//! counterpart for uploads.

use std::collections::HashMap;
use std::time::Duration;

use aws_sdk_s3::config::{Builder as S3Builder, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use chrono::Utc;

use whisper_common::ports::{AttachmentStore, PresignedDownload, PresignedUpload};

pub struct S3AttachmentAdapter {
    client: Client,
    bucket: String,
    presign_ttl_secs: u64,
}

impl S3AttachmentAdapter {
    pub fn new(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
        bucket: String,
        presign_ttl_secs: u64,
    ) -> Self {
        let creds = Credentials::new(access_key, secret_key, None, None, "whisper2-attachments");
        let s3_cfg = S3Builder::new()
            .endpoint_url(endpoint)
            .credentials_provider(creds)
            .region(Region::new(region.to_string()))
            .force_path_style(true)
            .build();

        Self { client: Client::from_conf(s3_cfg), bucket, presign_ttl_secs }
    }

    /// Server-chosen key prefix: `attachments/<ownerWhisperId>/<uuid>`.
    /// Keeping ownership in the key itself lets `presign_download` check
    /// authorization without a separate metadata lookup in the common case;
    /// callers still persist a row in `attachment_metadata` for the case
    /// where the downloader is the *recipient*, not the owner.
    pub fn object_key(owner_whisper_id: &str) -> String {
        format!("attachments/{owner_whisper_id}/{}", uuid::Uuid::new_v4())
    }
}

#[async_trait::async_trait]
impl AttachmentStore for S3AttachmentAdapter {
    async fn presign_upload(
        &self,
        object_key: &str,
        content_type: &str,
        size_bytes: u64,
    ) -> anyhow::Result<PresignedUpload> {
        let presigning_cfg = PresigningConfig::expires_in(Duration::from_secs(self.presign_ttl_secs))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .content_type(content_type)
            .content_length(size_bytes as i64)
            .presigned(presigning_cfg)
            .await?;

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        for (name, value) in request.headers() {
            headers.insert(name.to_string(), value.to_string());
        }

        Ok(PresignedUpload {
            object_key: object_key.to_string(),
            upload_url: request.uri().to_string(),
            headers,
            expires_at: Utc::now() + chrono::Duration::seconds(self.presign_ttl_secs as i64),
        })
    }

    async fn presign_download(&self, object_key: &str) -> anyhow::Result<PresignedDownload> {
        let presigning_cfg = PresigningConfig::expires_in(Duration::from_secs(self.presign_ttl_secs))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .presigned(presigning_cfg)
            .await?;

        Ok(PresignedDownload {
            download_url: request.uri().to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(self.presign_ttl_secs as i64),
        })
    }
}
