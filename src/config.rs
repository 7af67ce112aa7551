use std::env;
use std::str::FromStr;

use crate::error::{GenerationError, Result};

pub const DEFAULT_MODEL_ID: &str = "amazon.nova-canvas-v1:0";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Storage settings taken from the environment. Each field may still be
/// overridden per request.
#[derive(Clone, Default)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        StorageConfig {
            bucket: non_empty(lookup("S3_BUCKET")),
            region: non_empty(lookup("AWS_REGION")),
            access_key: non_empty(lookup("AWS_ACCESS_KEY_ID")),
            secret_key: non_empty(lookup("AWS_SECRET_ACCESS_KEY")),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }
}

/// Environment-level fallbacks consumed by the parameter resolver. Anything left
/// `None` here falls through to the resolver's literal defaults.
#[derive(Debug, Clone, Default)]
pub struct GenerationDefaults {
    pub inference_steps: Option<u32>,
    pub guidance_scale: Option<f64>,
    pub seed: Option<u32>,
    pub storage: StorageConfig,
}

impl GenerationDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(GenerationDefaults {
            inference_steps: parse_var(&lookup, "NUM_INFERENCE_STEPS")?,
            guidance_scale: parse_var(&lookup, "TRUE_CFG_SCALE")?,
            seed: parse_var(&lookup, "DEFAULT_SEED")?,
            storage: StorageConfig::from_lookup(&lookup),
        })
    }

    pub fn with_inference_steps(mut self, steps: u32) -> Self {
        self.inference_steps = Some(steps);
        self
    }

    pub fn with_guidance_scale(mut self, scale: f64) -> Self {
        self.guidance_scale = Some(scale);
        self
    }

    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

#[derive(Clone, Default)]
pub struct BedrockConfig {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for BedrockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockConfig")
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BedrockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `BEDROCK_REGION` wins over `AWS_REGION` so the model can live in a
    /// different region than the bucket.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        BedrockConfig {
            region: non_empty(lookup("BEDROCK_REGION"))
                .or_else(|| non_empty(lookup("AWS_REGION"))),
            access_key: non_empty(lookup("AWS_ACCESS_KEY_ID")),
            secret_key: non_empty(lookup("AWS_SECRET_ACCESS_KEY")),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_id: String,
    pub max_concurrent_generations: usize,
    pub bedrock: BedrockConfig,
    pub defaults: GenerationDefaults,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            model_id: DEFAULT_MODEL_ID.to_string(),
            max_concurrent_generations: 1,
            bedrock: BedrockConfig::default(),
            defaults: GenerationDefaults::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_concurrent_generations =
            parse_var(&lookup, "MAX_CONCURRENT_GENERATIONS")?.unwrap_or(1);
        if max_concurrent_generations == 0 {
            return Err(GenerationError::ConfigError(
                "MAX_CONCURRENT_GENERATIONS must be at least 1".into(),
            ));
        }

        Ok(ServerConfig {
            host: non_empty(lookup("HOST")).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_var(&lookup, "PORT")?.unwrap_or(DEFAULT_PORT),
            model_id: non_empty(lookup("MODEL_NAME"))
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            max_concurrent_generations,
            bedrock: BedrockConfig::from_lookup(&lookup),
            defaults: GenerationDefaults::from_lookup(&lookup)?,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_bedrock(mut self, config: BedrockConfig) -> Self {
        self.bedrock = config;
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match non_empty(lookup(name)) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            GenerationError::ConfigError(format!("{} has invalid value '{}': {}", name, raw, e))
        }),
    }
}
