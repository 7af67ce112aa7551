use crate::{
    config::BedrockConfig,
    error::{GenerationError, Result},
    inference::ImageModel,
    models::ResolvedJob,
};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::{error::ProvideErrorMetadata, primitives::Blob, Client};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::DynamicImage;
use serde::Deserialize;
use serde_json::{json, Value};

/// Request/response schema a Bedrock model id speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// `stability.*` diffusion models.
    Stability,
    /// Amazon Titan Image Generator (`TEXT_IMAGE` task).
    Titan,
    /// Amazon Nova Canvas. Same schema as Titan with a narrower seed range.
    NovaCanvas,
}

/// SDXL on Bedrock renders only these sizes.
const STABILITY_SIZES: &[(u32, u32)] = &[
    (1024, 1024),
    (1152, 896),
    (896, 1152),
    (1216, 832),
    (832, 1216),
    (1344, 768),
    (768, 1344),
    (1536, 640),
    (640, 1536),
];

/// Titan's fixed size list. Nova Canvas accepts every one of them as well.
const TITAN_SIZES: &[(u32, u32)] = &[
    (1024, 1024),
    (1152, 896),
    (896, 1152),
    (1152, 768),
    (768, 1152),
    (1280, 768),
    (768, 1280),
    (1408, 768),
    (768, 1408),
    (1408, 640),
    (640, 1408),
];

impl ModelFamily {
    pub fn from_model_id(model_id: &str) -> Option<Self> {
        if model_id.starts_with("stability.") {
            Some(ModelFamily::Stability)
        } else if model_id.starts_with("amazon.titan-image") {
            Some(ModelFamily::Titan)
        } else if model_id.starts_with("amazon.nova-canvas") {
            Some(ModelFamily::NovaCanvas)
        } else {
            None
        }
    }

    pub fn supported_sizes(&self) -> &'static [(u32, u32)] {
        match self {
            ModelFamily::Stability => STABILITY_SIZES,
            ModelFamily::Titan | ModelFamily::NovaCanvas => TITAN_SIZES,
        }
    }

    /// The supported size closest in shape to `width`x`height`, ties broken by
    /// pixel count.
    pub fn native_size(&self, width: u32, height: u32) -> (u32, u32) {
        let shape = |w: u32, h: u32| (w as f64 / h as f64).ln();
        let target_shape = shape(width, height);
        let target_area = width as f64 * height as f64;

        self.supported_sizes()
            .iter()
            .copied()
            .min_by(|&(aw, ah), &(bw, bh)| {
                let key = |w: u32, h: u32| {
                    (
                        (shape(w, h) - target_shape).abs(),
                        (w as f64 * h as f64 - target_area).abs(),
                    )
                };
                key(aw, ah)
                    .partial_cmp(&key(bw, bh))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or((width, height))
    }

    /// Titan and Nova Canvas have no step count parameter.
    pub fn uses_inference_steps(&self) -> bool {
        matches!(self, ModelFamily::Stability)
    }

    fn max_seed(&self) -> u32 {
        match self {
            ModelFamily::Stability => u32::MAX,
            ModelFamily::Titan => 2_147_483_646,
            ModelFamily::NovaCanvas => 858_993_459,
        }
    }

    fn guidance_range(&self) -> (f64, f64) {
        match self {
            ModelFamily::Stability => (0.0, 35.0),
            ModelFamily::Titan | ModelFamily::NovaCanvas => (1.1, 10.0),
        }
    }

    /// Rejects parameters the model would refuse, before anything is sent.
    pub fn check_job(&self, job: &ResolvedJob) -> Result<()> {
        if self.uses_inference_steps() && !(10..=150).contains(&job.inference_steps) {
            return Err(GenerationError::InvalidValue {
                field: "num_inference_steps",
                reason: format!("must be between 10 and 150, got {}", job.inference_steps),
            });
        }

        let (min, max) = self.guidance_range();
        if job.guidance_scale < min || job.guidance_scale > max {
            return Err(GenerationError::InvalidValue {
                field: "true_cfg_scale",
                reason: format!("must be between {} and {}, got {}", min, max, job.guidance_scale),
            });
        }

        if job.seed > self.max_seed() {
            return Err(GenerationError::InvalidValue {
                field: "seed",
                reason: format!("must be at most {}, got {}", self.max_seed(), job.seed),
            });
        }
        Ok(())
    }

    pub fn build_payload(&self, job: &ResolvedJob) -> Value {
        let (width, height) = self.native_size(job.width, job.height);
        match self {
            ModelFamily::Stability => {
                let mut text_prompts = vec![json!({ "text": job.composed_prompt, "weight": 1.0 })];
                if !job.negative_prompt.is_empty() {
                    text_prompts.push(json!({ "text": job.negative_prompt, "weight": -1.0 }));
                }
                json!({
                    "text_prompts": text_prompts,
                    "cfg_scale": job.guidance_scale,
                    "steps": job.inference_steps,
                    "seed": job.seed,
                    "width": width,
                    "height": height,
                    "samples": 1
                })
            }
            ModelFamily::Titan | ModelFamily::NovaCanvas => {
                let mut params = json!({ "text": job.composed_prompt });
                if !job.negative_prompt.is_empty() {
                    params["negativeText"] = json!(job.negative_prompt);
                }
                json!({
                    "taskType": "TEXT_IMAGE",
                    "textToImageParams": params,
                    "imageGenerationConfig": {
                        "numberOfImages": 1,
                        "quality": "standard",
                        "width": width,
                        "height": height,
                        "cfgScale": job.guidance_scale,
                        "seed": job.seed
                    }
                })
            }
        }
    }

    /// Pulls the first base64 image out of a model response body.
    pub fn extract_image(&self, body: &[u8]) -> Result<String> {
        match self {
            ModelFamily::Stability => {
                let response: StabilityResponse = serde_json::from_slice(body)
                    .map_err(|e| GenerationError::InferenceError(e.to_string()))?;
                let artifact = response.artifacts.into_iter().next().ok_or_else(|| {
                    GenerationError::InferenceError("No images generated".into())
                })?;
                match artifact.finish_reason.as_deref() {
                    None | Some("SUCCESS") => Ok(artifact.base64),
                    Some(reason) => Err(GenerationError::InferenceError(format!(
                        "Generation finished with {}",
                        reason
                    ))),
                }
            }
            ModelFamily::Titan | ModelFamily::NovaCanvas => {
                let response: TitanImageResponse = serde_json::from_slice(body)
                    .map_err(|e| GenerationError::InferenceError(e.to_string()))?;
                if let Some(error) = response.error {
                    return Err(GenerationError::InferenceError(error));
                }
                response
                    .images
                    .into_iter()
                    .next()
                    .ok_or_else(|| GenerationError::InferenceError("No images generated".into()))
            }
        }
    }
}

#[derive(Deserialize)]
struct StabilityResponse {
    artifacts: Vec<StabilityArtifact>,
}

#[derive(Deserialize)]
struct StabilityArtifact {
    base64: String,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct TitanImageResponse {
    #[serde(default)]
    images: Vec<String>,
    error: Option<String>,
}

pub fn decode_image(encoded: &str) -> Result<DynamicImage> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| GenerationError::InferenceError(format!("Invalid base64 image: {}", e)))?;
    image::load_from_memory(&bytes)
        .map_err(|e| GenerationError::InferenceError(format!("Undecodable image: {}", e)))
}

/// Bedrock-hosted text-to-image model. The client is built once at startup and
/// shared by every request.
#[derive(Clone)]
pub struct BedrockImageModel {
    client: Client,
    model_id: String,
    family: ModelFamily,
}

impl BedrockImageModel {
    pub fn new(client: Client, model_id: impl Into<String>) -> Result<Self> {
        let model_id = model_id.into();
        let family = ModelFamily::from_model_id(&model_id).ok_or_else(|| {
            GenerationError::ConfigError(format!("Unsupported image model: {}", model_id))
        })?;
        if !family.uses_inference_steps() {
            log::warn!(
                "{} has no step count parameter; num_inference_steps is echoed but not sent",
                model_id
            );
        }
        Ok(Self {
            client,
            model_id,
            family,
        })
    }

    pub async fn load(model_id: impl Into<String>, config: &BedrockConfig) -> Result<Self> {
        let sdk_config = super::load_sdk_config(config).await;
        Self::new(Client::new(&sdk_config), model_id)
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }
}

#[async_trait]
impl ImageModel for BedrockImageModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn check(&self, job: &ResolvedJob) -> Result<()> {
        self.family.check_job(job)
    }

    async fn generate(&self, job: &ResolvedJob) -> Result<DynamicImage> {
        let request_json = serde_json::to_string(&self.family.build_payload(job))
            .map_err(|e| GenerationError::InferenceError(e.to_string()))?;

        log::debug!(
            "Invoking {} ({:?}) at {:?}",
            self.model_id,
            self.family,
            self.family.native_size(job.width, job.height)
        );

        let response = self
            .client
            .invoke_model()
            .model_id(&self.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(request_json.into_bytes()))
            .send()
            .await
            .map_err(|e| {
                log::error!("Bedrock invocation failed: {:?}", e);
                match e.as_service_error() {
                    Some(service_error) => GenerationError::InferenceError(format!(
                        "Bedrock service error: {} - {}",
                        service_error.code().unwrap_or("unknown"),
                        service_error.message().unwrap_or("no message")
                    )),
                    None => GenerationError::InferenceError(format!("AWS SDK error: {}", e)),
                }
            })?;

        let encoded = self.family.extract_image(&response.body.into_inner())?;
        decode_image(&encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ModelGateway;
    use crate::mock::sample_job;
    use crate::models::AspectRatio;
    use image::{GenericImageView, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::Arc;

    const FAMILIES: [ModelFamily; 3] = [
        ModelFamily::Stability,
        ModelFamily::Titan,
        ModelFamily::NovaCanvas,
    ];

    fn job_for(aspect_ratio: AspectRatio) -> ResolvedJob {
        let (width, height) = aspect_ratio.dimensions();
        ResolvedJob {
            aspect_ratio,
            width,
            height,
            ..sample_job(42)
        }
    }

    fn payload_size(family: ModelFamily, payload: &Value) -> (u32, u32) {
        let dims = match family {
            ModelFamily::Stability => payload,
            _ => &payload["imageGenerationConfig"],
        };
        (
            dims["width"].as_u64().unwrap() as u32,
            dims["height"].as_u64().unwrap() as u32,
        )
    }

    /// Answers at whatever size the family would actually render.
    struct NativeSizeModel(ModelFamily);

    #[async_trait]
    impl ImageModel for NativeSizeModel {
        fn model_id(&self) -> &str {
            "native-size"
        }

        async fn generate(&self, job: &ResolvedJob) -> Result<DynamicImage> {
            let (width, height) = self.0.native_size(job.width, job.height);
            Ok(DynamicImage::ImageRgb8(RgbImage::new(width, height)))
        }
    }

    fn encoded_png(width: u32, height: u32) -> String {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_family_detection() {
        assert_eq!(
            ModelFamily::from_model_id("stability.stable-diffusion-xl-v1"),
            Some(ModelFamily::Stability)
        );
        assert_eq!(
            ModelFamily::from_model_id("amazon.titan-image-generator-v2:0"),
            Some(ModelFamily::Titan)
        );
        assert_eq!(
            ModelFamily::from_model_id("amazon.nova-canvas-v1:0"),
            Some(ModelFamily::NovaCanvas)
        );
        assert_eq!(ModelFamily::from_model_id("Qwen/Qwen-Image"), None);
        assert_eq!(
            ModelFamily::from_model_id(crate::config::DEFAULT_MODEL_ID),
            Some(ModelFamily::NovaCanvas)
        );
    }

    #[test]
    fn test_stability_payload_carries_job_parameters() {
        let job = sample_job(42);
        let payload = ModelFamily::Stability.build_payload(&job);

        assert_eq!(payload["seed"], 42);
        assert_eq!(payload["steps"], job.inference_steps);
        assert_eq!(payload["cfg_scale"], job.guidance_scale);
        assert_eq!(payload["width"], 1152);
        assert_eq!(payload["height"], 896);
        assert_eq!(payload["text_prompts"][0]["text"], job.composed_prompt.as_str());
        assert_eq!(payload["text_prompts"][1]["text"], job.negative_prompt.as_str());
        assert_eq!(payload["text_prompts"][1]["weight"], -1.0);
    }

    #[test]
    fn test_payload_sizes_are_renderable_for_every_aspect_ratio() {
        for family in FAMILIES {
            for aspect_ratio in AspectRatio::ALL {
                let size = payload_size(family, &family.build_payload(&job_for(aspect_ratio)));
                assert!(
                    family.supported_sizes().contains(&size),
                    "{:?} {} -> {:?}",
                    family,
                    aspect_ratio,
                    size
                );
                assert_eq!(size.0 % 64, 0);
                assert_eq!(size.1 % 64, 0);
            }
        }
    }

    #[test]
    fn test_native_size_keeps_orientation() {
        assert_eq!(ModelFamily::Stability.native_size(1328, 1328), (1024, 1024));
        assert_eq!(ModelFamily::Stability.native_size(928, 1664), (768, 1344));
        assert_eq!(ModelFamily::NovaCanvas.native_size(1584, 1056), (1152, 768));
        assert_eq!(ModelFamily::Titan.native_size(1056, 1584), (768, 1152));
    }

    #[tokio::test]
    async fn test_gateway_returns_table_dimensions_for_every_family() {
        for family in FAMILIES {
            let gateway = ModelGateway::new(Arc::new(NativeSizeModel(family)));
            for aspect_ratio in AspectRatio::ALL {
                let job = job_for(aspect_ratio);
                let generated = gateway.invoke(job.clone()).await.unwrap();
                assert_eq!(
                    generated.image.dimensions(),
                    aspect_ratio.dimensions(),
                    "{:?} {}",
                    family,
                    aspect_ratio
                );
                assert_eq!(generated.job, job);
            }
        }
    }

    #[test]
    fn test_default_job_passes_every_family() {
        for family in FAMILIES {
            assert!(family.check_job(&sample_job(42)).is_ok(), "{:?}", family);
        }
    }

    #[test]
    fn test_out_of_range_parameters_are_invalid_values() {
        let mut job = sample_job(900_000_000);
        assert!(ModelFamily::Titan.check_job(&job).is_ok());
        match ModelFamily::NovaCanvas.check_job(&job) {
            Err(GenerationError::InvalidValue { field, .. }) => assert_eq!(field, "seed"),
            other => panic!("expected InvalidValue, got {:?}", other),
        }

        job.seed = u32::MAX;
        assert!(ModelFamily::Stability.check_job(&job).is_ok());
        assert!(ModelFamily::Titan.check_job(&job).is_err());

        let mut job = sample_job(1);
        job.inference_steps = 5;
        let err = ModelFamily::Stability.check_job(&job).unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("num_inference_steps"));
        assert!(ModelFamily::Titan.check_job(&job).is_ok());

        let mut job = sample_job(1);
        job.guidance_scale = 20.0;
        assert!(ModelFamily::Stability.check_job(&job).is_ok());
        assert!(matches!(
            ModelFamily::NovaCanvas.check_job(&job),
            Err(GenerationError::InvalidValue { field: "true_cfg_scale", .. })
        ));
    }

    #[test]
    fn test_only_stability_takes_a_step_count() {
        assert!(ModelFamily::Stability.uses_inference_steps());
        assert!(!ModelFamily::Titan.uses_inference_steps());
        assert!(!ModelFamily::NovaCanvas.uses_inference_steps());

        let payload = ModelFamily::NovaCanvas.build_payload(&sample_job(1));
        assert!(payload["imageGenerationConfig"].get("steps").is_none());
    }

    #[test]
    fn test_titan_payload_omits_empty_negative_prompt() {
        let mut job = sample_job(5);
        job.negative_prompt.clear();
        let payload = ModelFamily::Titan.build_payload(&job);

        assert_eq!(payload["taskType"], "TEXT_IMAGE");
        assert_eq!(payload["textToImageParams"]["text"], job.composed_prompt.as_str());
        assert!(payload["textToImageParams"].get("negativeText").is_none());
        assert_eq!(payload["imageGenerationConfig"]["seed"], 5);
        assert_eq!(payload["imageGenerationConfig"]["numberOfImages"], 1);
    }

    #[test]
    fn test_extract_stability_image() {
        let body = json!({
            "result": "success",
            "artifacts": [{ "seed": 42, "base64": "abc", "finishReason": "SUCCESS" }]
        });
        let encoded = ModelFamily::Stability
            .extract_image(body.to_string().as_bytes())
            .unwrap();
        assert_eq!(encoded, "abc");
    }

    #[test]
    fn test_filtered_stability_image_is_an_error() {
        let body = json!({
            "artifacts": [{ "base64": "", "finishReason": "CONTENT_FILTERED" }]
        });
        let err = ModelFamily::Stability
            .extract_image(body.to_string().as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("CONTENT_FILTERED"));
    }

    #[test]
    fn test_titan_error_and_empty_responses() {
        let err = ModelFamily::Titan
            .extract_image(json!({ "images": [], "error": "throttled" }).to_string().as_bytes())
            .unwrap_err();
        assert!(matches!(err, GenerationError::InferenceError(ref m) if m == "throttled"));

        let err = ModelFamily::Titan
            .extract_image(json!({ "images": [] }).to_string().as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("No images generated"));
    }

    #[test]
    fn test_decode_image() {
        let image = decode_image(&encoded_png(4, 3)).unwrap();
        assert_eq!((image.width(), image.height()), (4, 3));

        assert!(decode_image("not base64!").is_err());
        assert!(decode_image(&STANDARD.encode(b"not a png")).is_err());
    }
}
