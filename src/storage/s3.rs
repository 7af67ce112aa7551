use crate::{
    error::{GenerationError, Result},
    models::StorageTarget,
    storage::traits::ImageStore,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{retry::RetryConfig, BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata},
    primitives::ByteStream,
    Client, Config,
};

/// S3 uploader. Credentials can differ per request, so a client is built for
/// each upload from the request's resolved target.
#[derive(Debug, Clone, Default)]
pub struct S3ImageStore;

impl S3ImageStore {
    pub fn new() -> Self {
        Self
    }

    fn client_for(target: &StorageTarget) -> Client {
        let config = Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(target.region.clone()))
            .credentials_provider(Credentials::new(
                &target.credentials.access_key_id,
                &target.credentials.secret_access_key,
                None,
                None,
                "rgen-diffusion-request",
            ))
            .retry_config(RetryConfig::disabled())
            .build();
        Client::from_conf(config)
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn put_object(
        &self,
        target: &StorageTarget,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        log::debug!(
            "Uploading {} bytes to s3://{}/{} ({})",
            body.len(),
            target.bucket,
            key,
            target.region
        );

        Self::client_for(target)
            .put_object()
            .bucket(&target.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                log::error!("S3 upload failed: {}", DisplayErrorContext(&e));
                match e.as_service_error() {
                    Some(service_error) => GenerationError::PersistenceError(format!(
                        "S3 error uploading s3://{}/{}: {} - {}",
                        target.bucket,
                        key,
                        service_error.code().unwrap_or("unknown"),
                        service_error.message().unwrap_or("no message")
                    )),
                    None => GenerationError::PersistenceError(format!(
                        "S3 upload of s3://{}/{} failed: {}",
                        target.bucket, key, e
                    )),
                }
            })?;

        Ok(())
    }
}
