pub mod clip;
pub mod extractor;
pub mod feature;

pub use clip::ClipExtractor;
pub use extractor::FeatureExtractor;
pub use feature::{l2_normalize, parse_feature, serialize_feature, FeatureParseError};

use crate::services::ModelConfig;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("cannot decode image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<candle_core::Error> for ExtractError {
    fn from(e: candle_core::Error) -> Self {
        ExtractError::Inference(e.to_string())
    }
}

/// Create the feature extractor described by the configuration
pub async fn create_extractor(
    config: &ModelConfig,
) -> Result<Arc<dyn FeatureExtractor>, ExtractError> {
    let extractor = ClipExtractor::new(&config.id, config.revision.as_deref()).await?;
    Ok(Arc::new(extractor))
}
