pub mod bedrock;
pub mod config;
pub mod error;
pub mod inference;
pub mod logger;
pub mod mock;
pub mod models;
pub mod orchestrator;
pub mod resolver;
pub mod server;
pub mod storage;

pub use bedrock::{BedrockImageModel, ModelFamily};
pub use config::{BedrockConfig, GenerationDefaults, ServerConfig, StorageConfig};
pub use error::{GenerationError, Result};
pub use inference::{ImageModel, ModelGateway};
pub use models::*;
pub use orchestrator::{GenerationService, PipelineFailure, Stage};
pub use resolver::resolve;
pub use storage::{ImageStore, ResultSink, S3ImageStore};
