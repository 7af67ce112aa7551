use crate::{error::Result, models::StorageTarget};
use async_trait::async_trait;

/// Object storage the sink uploads finished images to.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Uploads `body` under `key` in `target.bucket`. Must not retry; any
    /// failure is reported as `PersistenceError`.
    async fn put_object(
        &self,
        target: &StorageTarget,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;
}
