pub mod s3;
pub mod traits;

use crate::{
    error::{GenerationError, Result},
    logger,
    models::{StorageReference, StorageTarget},
};
use chrono::{DateTime, Local};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

pub use s3::S3ImageStore;
pub use traits::ImageStore;

pub const KEY_PREFIX: &str = "generated_images";
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// Encodes finished images and hands them to an [`ImageStore`].
#[derive(Clone)]
pub struct ResultSink {
    store: Arc<dyn ImageStore>,
}

impl ResultSink {
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self { store }
    }

    /// Uploads `image` as PNG. The key is the caller's if the target carries
    /// one, otherwise a fresh `generated_images/{timestamp}_{uuid}.png`.
    pub async fn persist(&self, image: DynamicImage, target: &StorageTarget) -> Result<StorageReference> {
        let timestamp = format_timestamp(Local::now());
        let key = match &target.key {
            Some(key) => key.clone(),
            None => derive_key(&timestamp, Uuid::new_v4()),
        };

        let body = encode_png(&image)?;
        drop(image);

        let _timer = logger::timer("image upload");
        self.store
            .put_object(target, &key, body, PNG_CONTENT_TYPE)
            .await?;

        let url = object_url(&target.bucket, &target.region, &key);
        log::info!("Image uploaded successfully to: {}", url);

        Ok(StorageReference {
            bucket: target.bucket.clone(),
            key,
            url,
            timestamp,
        })
    }
}

pub fn format_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

pub fn derive_key(timestamp: &str, id: Uuid) -> String {
    format!("{}/{}_{}.png", KEY_PREFIX, timestamp, id)
}

/// Virtual-hosted-style URL. Nothing checks that the object exists.
pub fn object_url(bucket: &str, region: &str, key: &str) -> String {
    format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| GenerationError::PersistenceError(format!("PNG encoding failed: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{sample_job, MemoryImageStore};
    use chrono::TimeZone;
    use image::RgbImage;

    fn small_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, image::Rgb([200, 10, 10])))
    }

    #[test]
    fn test_timestamp_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(now), "20240309_070501");
    }

    #[test]
    fn test_same_second_keys_never_collide() {
        let timestamp = "20240309_070501";
        let first = derive_key(timestamp, Uuid::new_v4());
        let second = derive_key(timestamp, Uuid::new_v4());

        assert_ne!(first, second);
        assert!(first.starts_with("generated_images/20240309_070501_"));
        assert!(first.ends_with(".png"));
    }

    #[test]
    fn test_object_url() {
        assert_eq!(
            object_url("bucket", "eu-west-1", "generated_images/a.png"),
            "https://bucket.s3.eu-west-1.amazonaws.com/generated_images/a.png"
        );
    }

    #[test]
    fn test_encode_png_produces_png_signature() {
        let bytes = encode_png(&small_image()).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn test_persist_derives_key_and_uploads_png() {
        let store = Arc::new(MemoryImageStore::new());
        let sink = ResultSink::new(store.clone());
        let target = sample_job(1).storage;

        let reference = sink.persist(small_image(), &target).await.unwrap();

        assert_eq!(reference.bucket, target.bucket);
        assert!(reference.key.starts_with("generated_images/"));
        assert!(reference.key.contains(&reference.timestamp));
        assert_eq!(
            reference.url,
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                target.bucket, target.region, reference.key
            )
        );

        let objects = store.objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, reference.key);
        assert_eq!(objects[0].content_type, "image/png");
        let stored = image::load_from_memory(&objects[0].body).unwrap();
        assert_eq!((stored.width(), stored.height()), (8, 6));
    }

    #[tokio::test]
    async fn test_persist_keeps_caller_key() {
        let store = Arc::new(MemoryImageStore::new());
        let sink = ResultSink::new(store.clone());
        let mut target = sample_job(1).storage;
        target.key = Some("renders/hero.png".into());

        let reference = sink.persist(small_image(), &target).await.unwrap();
        assert_eq!(reference.key, "renders/hero.png");
        assert_eq!(store.objects()[0].key, "renders/hero.png");
    }

    #[tokio::test]
    async fn test_two_uploads_in_a_row_get_distinct_keys() {
        let store = Arc::new(MemoryImageStore::new());
        let sink = ResultSink::new(store.clone());
        let target = sample_job(1).storage;

        let first = sink.persist(small_image(), &target).await.unwrap();
        let second = sink.persist(small_image(), &target).await.unwrap();
        assert_ne!(first.key, second.key);
    }

    #[tokio::test]
    async fn test_store_failure_is_persistence_error() {
        let store = Arc::new(MemoryImageStore::failing("AccessDenied"));
        let sink = ResultSink::new(store);

        let err = sink
            .persist(small_image(), &sample_job(1).storage)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::PersistenceError(ref m) if m.contains("AccessDenied")));
    }
}
