use serde::{Deserialize, Serialize};

/// Body of `POST /generate`. Everything is optional on the wire; the resolver
/// decides what is required and what gets defaulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub positive_magic: Option<String>,
    pub aspect_ratio: Option<String>,
    #[serde(alias = "inference_steps")]
    pub num_inference_steps: Option<u32>,
    #[serde(alias = "guidance_scale")]
    pub true_cfg_scale: Option<f64>,
    pub seed: Option<u32>,
    pub s3_bucket: Option<String>,
    pub s3_key: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(aspect_ratio.into());
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.s3_bucket = Some(bucket.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.s3_key = Some(key.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.aws_access_key_id = Some(access_key.into());
        self.aws_secret_access_key = Some(secret_key.into());
        self
    }
}
