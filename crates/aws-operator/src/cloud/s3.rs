use async_trait::async_trait;

use crate::cloud::CloudError;

#[async_trait]
pub trait S3: Send + Sync {
    /// Fails with [`CloudError::NotFound`] if the bucket does not exist.
    async fn head_bucket(&self, bucket: &str) -> Result<(), CloudError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), CloudError>;

    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, CloudError>;

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), CloudError>;

    async fn delete_bucket(&self, bucket: &str) -> Result<(), CloudError>;
}
