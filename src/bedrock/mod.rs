pub mod image_client;

use crate::{config::BedrockConfig, resolver::DEFAULT_REGION};
use aws_config::{retry::RetryConfig, BehaviorVersion, Region, SdkConfig};
use aws_sdk_bedrockruntime::config::Credentials;

pub use image_client::{BedrockImageModel, ModelFamily};

/// Shared AWS configuration for the Bedrock runtime. Retries are disabled:
/// a failed generation surfaces to the caller instead of being replayed.
pub async fn load_sdk_config(bedrock_config: &BedrockConfig) -> SdkConfig {
    let region = bedrock_config
        .region
        .clone()
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region))
        .retry_config(RetryConfig::disabled());

    let loader = match (&bedrock_config.access_key, &bedrock_config.secret_key) {
        (Some(access_key), Some(secret_key)) => {
            loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "rgen-diffusion",
            ))
        }
        _ => {
            log::info!("No explicit Bedrock credentials, using the default AWS credential chain");
            loader
        }
    };

    loader.load().await
}
