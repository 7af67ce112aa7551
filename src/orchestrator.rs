use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::GenerationDefaults,
    error::GenerationError,
    inference::{ImageModel, ModelGateway},
    models::{GenerationMetadata, GenerationRequest, GenerationResponse, ResolvedJob},
    resolver,
    storage::{ImageStore, ResultSink},
};

/// Pipeline stage a request failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Generation,
    Persistence,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Validation => "validation",
            Stage::Generation => "generation",
            Stage::Persistence => "persistence",
        })
    }
}

#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: GenerationError,
}

impl PipelineFailure {
    fn at(stage: Stage) -> impl FnOnce(GenerationError) -> Self {
        move |error| Self { stage, error }
    }

    pub fn is_client_error(&self) -> bool {
        self.error.is_client_error()
    }
}

/// Process-wide generation context: environment defaults plus the model and
/// store handles, built once at startup and shared by every request.
#[derive(Clone)]
pub struct GenerationService {
    defaults: GenerationDefaults,
    gateway: ModelGateway,
    sink: ResultSink,
}

impl GenerationService {
    pub fn new(
        defaults: GenerationDefaults,
        model: Arc<dyn ImageModel>,
        store: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            defaults,
            gateway: ModelGateway::new(model),
            sink: ResultSink::new(store),
        }
    }

    pub fn model_id(&self) -> &str {
        self.gateway.model_id()
    }

    /// Validate, generate, persist, respond. The first failing stage ends the
    /// request and nothing is retried.
    pub async fn handle(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, PipelineFailure> {
        let job = self.prepare(&request)?;
        self.execute(job).await
    }

    /// The validation stage on its own: resolves the request and checks it
    /// against the loaded model. Touches neither the model nor the store.
    pub fn prepare(&self, request: &GenerationRequest) -> Result<ResolvedJob, PipelineFailure> {
        resolver::resolve(request, &self.defaults)
            .and_then(|job| self.gateway.check(&job).map(|_| job))
            .map_err(PipelineFailure::at(Stage::Validation))
            .inspect_err(|f| log::warn!("rejected: {}", f))
    }

    /// Generation and persistence for a job that passed [`Self::prepare`].
    pub async fn execute(&self, job: ResolvedJob) -> Result<GenerationResponse, PipelineFailure> {
        let request_id = Uuid::new_v4();
        log::debug!(
            "[{}] resolved {} {}x{} seed {}",
            request_id,
            job.aspect_ratio,
            job.width,
            job.height,
            job.seed
        );

        let generated = self
            .gateway
            .invoke(job)
            .await
            .map_err(PipelineFailure::at(Stage::Generation))
            .inspect_err(|f| log::error!("[{}] {} failed: {:?}", request_id, f.stage, f.error))?;

        let job = generated.job;
        let reference = self
            .sink
            .persist(generated.image, &job.storage)
            .await
            .map_err(PipelineFailure::at(Stage::Persistence))
            .inspect_err(|f| log::error!("[{}] {} failed: {:?}", request_id, f.stage, f.error))?;

        log::info!("[{}] done: {}", request_id, reference.url);

        Ok(GenerationResponse {
            success: true,
            image_url: reference.url,
            s3_bucket: reference.bucket,
            s3_key: reference.key,
            metadata: GenerationMetadata {
                prompt: job.prompt,
                negative_prompt: job.negative_prompt,
                aspect_ratio: job.aspect_ratio.to_string(),
                width: job.width,
                height: job.height,
                seed: job.seed,
                timestamp: reference.timestamp,
                num_inference_steps: job.inference_steps,
                true_cfg_scale: job.guidance_scale,
            },
        })
    }
}
