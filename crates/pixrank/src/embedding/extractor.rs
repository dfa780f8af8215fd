use super::ExtractError;
use std::path::Path;

/// Trait for models that embed images and text into a shared vector space
#[async_trait::async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// L2-normalized embedding of the image at `path`
    async fn extract_image(&self, path: &Path) -> Result<Vec<f32>, ExtractError>;

    /// L2-normalized embedding of a text query
    async fn extract_text(&self, query: &str) -> Result<Vec<f32>, ExtractError>;

    /// Get the model identifier
    fn model_id(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;
}
