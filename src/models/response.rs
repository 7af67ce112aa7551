use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    pub image_url: String,
    pub s3_bucket: String,
    pub s3_key: String,
    pub metadata: GenerationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub prompt: String,
    pub negative_prompt: String,
    pub aspect_ratio: String,
    pub width: u32,
    pub height: u32,
    pub seed: u32,
    pub timestamp: String,
    pub num_inference_steps: u32,
    pub true_cfg_scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
