use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use std::sync::Arc;

use crate::{
    error::{GenerationError, Result},
    logger,
    models::{GeneratedImage, ResolvedJob},
};

/// A text-to-image model loaded once per process.
///
/// Implementations must feed `job.seed` to the model as its only source of
/// randomness so that identical jobs reproduce the same image, and must not
/// retry internally.
#[async_trait]
pub trait ImageModel: Send + Sync {
    fn model_id(&self) -> &str;

    /// Rejects a job the model cannot accept, as a client error. Runs before
    /// any generation is scheduled.
    fn check(&self, _job: &ResolvedJob) -> Result<()> {
        Ok(())
    }

    async fn generate(&self, job: &ResolvedJob) -> Result<DynamicImage>;
}

#[derive(Clone)]
pub struct ModelGateway {
    model: Arc<dyn ImageModel>,
}

impl ModelGateway {
    pub fn new(model: Arc<dyn ImageModel>) -> Self {
        Self { model }
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn check(&self, job: &ResolvedJob) -> Result<()> {
        self.model.check(job)
    }

    /// Runs the model for `job`. Failures come back as `InferenceError`. An
    /// image rendered at the model's native size is resized to the job's.
    pub async fn invoke(&self, job: ResolvedJob) -> Result<GeneratedImage> {
        log::info!(
            "Generating {}x{} image with {} (seed {}, {} steps): {}...",
            job.width,
            job.height,
            self.model_id(),
            job.seed,
            job.inference_steps,
            job.prompt.chars().take(100).collect::<String>()
        );

        let _timer = logger::timer("image generation");
        let image = self.model.generate(&job).await.map_err(|e| match e {
            GenerationError::InferenceError(_) => e,
            other => GenerationError::InferenceError(other.to_string()),
        })?;

        let (width, height) = image.dimensions();
        let image = if (width, height) != (job.width, job.height) {
            log::debug!(
                "Resizing {}x{} model output to {}x{}",
                width,
                height,
                job.width,
                job.height
            );
            image.resize_exact(job.width, job.height, FilterType::Lanczos3)
        } else {
            image
        };

        Ok(GeneratedImage { image, job })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{sample_job, MockImageModel};

    #[tokio::test]
    async fn test_identical_jobs_reproduce_identical_images() {
        let gateway = ModelGateway::new(Arc::new(MockImageModel::new()));

        let first = gateway.invoke(sample_job(7)).await.unwrap();
        let second = gateway.invoke(sample_job(7)).await.unwrap();
        assert_eq!(first.image.as_bytes(), second.image.as_bytes());

        let other_seed = gateway.invoke(sample_job(8)).await.unwrap();
        assert_ne!(first.image.as_bytes(), other_seed.image.as_bytes());
    }

    #[tokio::test]
    async fn test_image_is_paired_with_its_job() {
        let gateway = ModelGateway::new(Arc::new(MockImageModel::new()));
        let job = sample_job(3);

        let generated = gateway.invoke(job.clone()).await.unwrap();
        assert_eq!(generated.job, job);
        assert_eq!(generated.image.dimensions(), (job.width, job.height));
    }

    #[tokio::test]
    async fn test_model_failure_becomes_inference_error() {
        let model =
            MockImageModel::failing_with(|| GenerationError::ConfigError("bad weights".into()));
        let gateway = ModelGateway::new(Arc::new(model));

        match gateway.invoke(sample_job(1)).await {
            Err(GenerationError::InferenceError(message)) => {
                assert!(message.contains("bad weights"))
            }
            other => panic!("expected InferenceError, got {:?}", other.map(|g| g.job)),
        }
    }
}
