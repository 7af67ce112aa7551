//! Turns a raw [`GenerationRequest`] into a [`ResolvedJob`].
//!
//! Every optional value is layered as request, then environment default, then
//! literal default. Nothing here performs I/O, so identical inputs always give
//! an identical job.

use crate::{
    config::GenerationDefaults,
    error::{GenerationError, Result},
    models::{AspectRatio, Credentials, GenerationRequest, ResolvedJob, StorageTarget},
};

pub const DEFAULT_NEGATIVE_PROMPT: &str = "ugly, deformed, disfigured, poor details, bad anatomy";
pub const DEFAULT_POSITIVE_MAGIC: &str = "Ultra HD, 4K, cinematic composition.";
pub const DEFAULT_INFERENCE_STEPS: u32 = 50;
pub const DEFAULT_GUIDANCE_SCALE: f64 = 4.0;
pub const DEFAULT_SEED: u32 = 42;
pub const DEFAULT_REGION: &str = "us-east-1";

pub fn resolve(request: &GenerationRequest, defaults: &GenerationDefaults) -> Result<ResolvedJob> {
    let prompt = request
        .prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or(GenerationError::MissingField("prompt"))?;

    let aspect_ratio = match request.aspect_ratio.as_deref() {
        None => AspectRatio::default(),
        Some(label) => label.parse::<AspectRatio>().map_err(|_| GenerationError::InvalidEnum {
            field: "aspect_ratio",
            value: label.to_string(),
            allowed: AspectRatio::labels(),
        })?,
    };

    let inference_steps = request
        .num_inference_steps
        .or(defaults.inference_steps)
        .unwrap_or(DEFAULT_INFERENCE_STEPS);
    if inference_steps == 0 {
        return Err(GenerationError::InvalidValue {
            field: "num_inference_steps",
            reason: "must be a positive integer".into(),
        });
    }

    let guidance_scale = request
        .true_cfg_scale
        .or(defaults.guidance_scale)
        .unwrap_or(DEFAULT_GUIDANCE_SCALE);
    if !guidance_scale.is_finite() || guidance_scale <= 0.0 {
        return Err(GenerationError::InvalidValue {
            field: "true_cfg_scale",
            reason: format!("must be a positive number, got {}", guidance_scale),
        });
    }

    let storage = resolve_storage(request, defaults)?;

    // Explicit empty strings are kept as given; only absent fields fall back.
    let negative_prompt = request
        .negative_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string());
    let positive_magic = request
        .positive_magic
        .as_deref()
        .unwrap_or(DEFAULT_POSITIVE_MAGIC);

    let (width, height) = aspect_ratio.dimensions();

    Ok(ResolvedJob {
        prompt: prompt.to_string(),
        composed_prompt: compose_prompt(prompt, positive_magic),
        negative_prompt,
        aspect_ratio,
        width,
        height,
        inference_steps,
        guidance_scale,
        seed: request.seed.or(defaults.seed).unwrap_or(DEFAULT_SEED),
        storage,
    })
}

pub fn compose_prompt(prompt: &str, positive_magic: &str) -> String {
    format!("{} {}", prompt, positive_magic)
}

fn resolve_storage(request: &GenerationRequest, defaults: &GenerationDefaults) -> Result<StorageTarget> {
    let env = &defaults.storage;
    let bucket = layered(&request.s3_bucket, &env.bucket);
    let access_key = layered(&request.aws_access_key_id, &env.access_key);
    let secret_key = layered(&request.aws_secret_access_key, &env.secret_key);

    match (bucket, access_key, secret_key) {
        (Some(bucket), Some(access_key_id), Some(secret_access_key)) => Ok(StorageTarget {
            bucket,
            key: layered(&request.s3_key, &None),
            region: layered(&request.aws_region, &env.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            credentials: Credentials {
                access_key_id,
                secret_access_key,
            },
        }),
        (bucket, access_key, secret_key) => {
            let missing = [
                ("s3_bucket", bucket.is_none()),
                ("aws_access_key_id", access_key.is_none()),
                ("aws_secret_access_key", secret_key.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();
            Err(GenerationError::MissingConfiguration {
                scope: "storage",
                missing,
            })
        }
    }
}

/// Request value, else environment value. Blank strings count as unset.
fn layered(request: &Option<String>, env: &Option<String>) -> Option<String> {
    request
        .as_ref()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env.as_ref().filter(|v| !v.trim().is_empty()))
        .cloned()
}
