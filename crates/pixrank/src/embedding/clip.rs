use super::extractor::FeatureExtractor;
use super::feature::l2_normalize;
use super::ExtractError;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;

const WEIGHTS_FILE: &str = "model.safetensors";
const TOKENIZER_FILE: &str = "tokenizer.json";
const END_OF_TEXT: &str = "<|endoftext|>";
const MAX_TEXT_TOKENS: usize = 77;
const IMAGE_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const IMAGE_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Pick the candle config matching a CLIP checkpoint name
fn config_for(model_id: &str) -> Option<ClipConfig> {
    let id = model_id.to_lowercase();
    if !id.contains("clip-vit-base") {
        return None;
    }
    let mut config = ClipConfig::vit_base_patch32();
    if id.contains("patch16") {
        config.vision_config.patch_size = 16;
    }
    Some(config)
}

struct ClipInner {
    model: ClipModel,
    tokenizer: Tokenizer,
    eos_id: u32,
    image_size: usize,
    device: Device,
}

impl ClipInner {
    fn load(model_id: &str, revision: &str, config: ClipConfig) -> Result<Self, ExtractError> {
        let unavailable = |what: &str, e: &dyn std::fmt::Display| {
            ExtractError::ModelUnavailable(format!("{} for {}: {}", what, model_id, e))
        };

        let api = Api::new().map_err(|e| unavailable("hub client", &e))?;
        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));
        let weights = repo
            .get(WEIGHTS_FILE)
            .map_err(|e| unavailable("weights", &e))?;
        let tokenizer_file = repo
            .get(TOKENIZER_FILE)
            .map_err(|e| unavailable("tokenizer", &e))?;

        let tokenizer =
            Tokenizer::from_file(tokenizer_file).map_err(|e| unavailable("tokenizer", &e))?;
        let eos_id = tokenizer
            .token_to_id(END_OF_TEXT)
            .ok_or_else(|| unavailable("tokenizer", &"missing end-of-text token"))?;

        let device = Device::Cpu;
        // SAFETY: the safetensors file is owned by the hub cache and not mutated while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
            .map_err(|e| unavailable("weights", &e))?;
        let image_size = config.image_size;
        let model = ClipModel::new(vb, &config).map_err(|e| unavailable("model", &e))?;

        Ok(Self {
            model,
            tokenizer,
            eos_id,
            image_size,
            device,
        })
    }

    /// Decode, resize-to-fill and normalize into a (1, 3, H, W) tensor
    fn load_image(&self, path: &Path) -> Result<Tensor, ExtractError> {
        let img = image::open(path).map_err(|source| ExtractError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let size = self.image_size;
        let img = img
            .resize_to_fill(
                size as u32,
                size as u32,
                image::imageops::FilterType::Triangle,
            )
            .to_rgb8()
            .into_raw();

        let mean = Tensor::new(&IMAGE_MEAN, &self.device)?.reshape((3, 1, 1))?;
        let std = Tensor::new(&IMAGE_STD, &self.device)?.reshape((3, 1, 1))?;
        let pixels = Tensor::from_vec(img, (size, size, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)?
            .unsqueeze(0)?;
        Ok(pixels)
    }

    fn tokenize(&self, text: &str) -> Result<Tensor, ExtractError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ExtractError::Inference(format!("tokenizer: {}", e)))?;
        let mut ids = encoding.get_ids().to_vec();
        if ids.len() > MAX_TEXT_TOKENS {
            // The text model pools on the end-of-text token, so keep it last
            ids.truncate(MAX_TEXT_TOKENS - 1);
            ids.push(self.eos_id);
        }
        Ok(Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?)
    }

    fn image_features(&self, path: &Path) -> Result<Vec<f32>, ExtractError> {
        let pixels = self.load_image(path)?;
        let features = self.model.get_image_features(&pixels)?;
        Ok(l2_normalize(features.squeeze(0)?.to_vec1::<f32>()?))
    }

    fn text_features(&self, text: &str) -> Result<Vec<f32>, ExtractError> {
        let input_ids = self.tokenize(text)?;
        let features = self.model.get_text_features(&input_ids)?;
        Ok(l2_normalize(features.squeeze(0)?.to_vec1::<f32>()?))
    }
}

/// CLIP image/text embeddings computed locally with Candle
pub struct ClipExtractor {
    model_id: String,
    dimensions: usize,
    inner: Arc<ClipInner>,
}

impl ClipExtractor {
    /// Download (or reuse the cached) checkpoint and build the model
    pub async fn new(model_id: &str, revision: Option<&str>) -> Result<Self, ExtractError> {
        let config = config_for(model_id).ok_or_else(|| {
            ExtractError::ModelUnavailable(format!("unsupported CLIP checkpoint: {}", model_id))
        })?;
        let dimensions = config.text_config.projection_dim;

        tracing::info!("Initializing CLIP model: {}", model_id);
        let id = model_id.to_string();
        let revision = revision.unwrap_or("main").to_string();
        let inner = tokio::task::spawn_blocking(move || ClipInner::load(&id, &revision, config))
            .await
            .map_err(|e| ExtractError::ModelUnavailable(e.to_string()))??;

        Ok(Self {
            model_id: model_id.to_string(),
            dimensions,
            inner: Arc::new(inner),
        })
    }
}

#[async_trait::async_trait]
impl FeatureExtractor for ClipExtractor {
    async fn extract_image(&self, path: &Path) -> Result<Vec<f32>, ExtractError> {
        tracing::debug!("Embedding image {}", path.display());
        let inner = Arc::clone(&self.inner);
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || inner.image_features(&path))
            .await
            .map_err(|e| ExtractError::Inference(e.to_string()))?
    }

    async fn extract_text(&self, query: &str) -> Result<Vec<f32>, ExtractError> {
        tracing::debug!("Embedding query: {} chars", query.len());
        let inner = Arc::clone(&self.inner);
        let query = query.to_string();
        tokio::task::spawn_blocking(move || inner.text_features(&query))
            .await
            .map_err(|e| ExtractError::Inference(e.to_string()))?
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
