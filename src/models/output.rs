use image::DynamicImage;
use serde::Serialize;

use super::ResolvedJob;

/// Model output paired with the job that produced it.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub image: DynamicImage,
    pub job: ResolvedJob,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageReference {
    pub bucket: String,
    pub key: String,
    pub url: String,
    /// Wall-clock time of the upload, `YYYYMMDD_HHMMSS`.
    pub timestamp: String,
}
