use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;

use crate::{ObjectStorage, StorageError};

/// Clip storage in an S3 bucket.
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Client configured from the standard AWS environment variables and
    /// profile files.
    pub async fn from_env(bucket: String) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| match e {
                SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
                    StorageError::Unavailable(e.to_string())
                }
                other => StorageError::Write(other.to_string()),
            })?;

        tracing::debug!(bucket = %self.bucket, key, "Clip uploaded to S3");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
