//! In-process stand-ins for the model and the object store, for tests and
//! offline runs of the pipeline.

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{
    bedrock::ModelFamily,
    error::{GenerationError, Result},
    inference::ImageModel,
    models::{AspectRatio, Credentials, ResolvedJob, StorageTarget},
    storage::ImageStore,
};

type ErrorFactory = Box<dyn Fn() -> GenerationError + Send + Sync>;

/// Produces a noise image seeded by `job.seed`, so equal jobs give equal pixels.
pub struct MockImageModel {
    model_id: String,
    calls: AtomicUsize,
    failure: Option<ErrorFactory>,
    limits: Option<ModelFamily>,
}

impl MockImageModel {
    pub fn new() -> Self {
        Self {
            model_id: "mock/seeded-noise".to_string(),
            calls: AtomicUsize::new(0),
            failure: None,
            limits: None,
        }
    }

    /// Every call fails with `InferenceError(message)`.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::failing_with(move || GenerationError::InferenceError(message.clone()))
    }

    pub fn failing_with(factory: impl Fn() -> GenerationError + Send + Sync + 'static) -> Self {
        Self {
            failure: Some(Box::new(factory)),
            ..Self::new()
        }
    }

    /// Applies the parameter limits of a Bedrock model family.
    pub fn with_limits(mut self, family: ModelFamily) -> Self {
        self.limits = Some(family);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockImageModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageModel for MockImageModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn check(&self, job: &ResolvedJob) -> Result<()> {
        match self.limits {
            Some(family) => family.check_job(job),
            None => Ok(()),
        }
    }

    async fn generate(&self, job: &ResolvedJob) -> Result<DynamicImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = &self.failure {
            return Err(failure());
        }

        // xorshift64*, never seeded with zero
        let mut state = (job.seed as u64) ^ 0x9E37_79B9_7F4A_7C15;
        let mut next = move || {
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            (state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 56) as u8
        };

        let image = RgbImage::from_fn(job.width, job.height, |_, _| Rgb([next(), next(), next()]));
        Ok(DynamicImage::ImageRgb8(image))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Keeps uploads in memory.
#[derive(Default)]
pub struct MemoryImageStore {
    objects: Mutex<Vec<StoredObject>>,
    calls: AtomicUsize,
    failure: Option<String>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects
            .lock()
            .map(|objects| objects.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put_object(
        &self,
        target: &StorageTarget,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.failure {
            return Err(GenerationError::PersistenceError(reason.clone()));
        }

        let mut objects = self
            .objects
            .lock()
            .map_err(|_| GenerationError::PersistenceError("store poisoned".into()))?;
        objects.push(StoredObject {
            bucket: target.bucket.clone(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            body,
        });
        Ok(())
    }
}

/// A resolved 16:9 job with test storage credentials.
pub fn sample_job(seed: u32) -> ResolvedJob {
    let aspect_ratio = AspectRatio::Landscape16x9;
    let (width, height) = aspect_ratio.dimensions();
    ResolvedJob {
        prompt: "a red bicycle".to_string(),
        composed_prompt: "a red bicycle Ultra HD, 4K, cinematic composition.".to_string(),
        negative_prompt: "ugly, deformed, disfigured, poor details, bad anatomy".to_string(),
        aspect_ratio,
        width,
        height,
        inference_steps: 50,
        guidance_scale: 4.0,
        seed,
        storage: StorageTarget {
            bucket: "test-bucket".to_string(),
            key: None,
            region: "us-east-1".to_string(),
            credentials: Credentials {
                access_key_id: "AKIATEST".to_string(),
                secret_access_key: "test-secret".to_string(),
            },
        },
    }
}
