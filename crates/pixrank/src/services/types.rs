use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One stored image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub path: String,
    /// Comma-joined decimal serialization of the image embedding
    pub feature: Option<String>,
    pub captured_at: Option<NaiveDate>,
}

impl ImageRecord {
    /// A freshly inserted record: path only
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            feature: None,
            captured_at: None,
        }
    }
}

/// Similarity metric used for ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Metric {
    #[default]
    CosineSimilarity,
    Euclidean,
}

impl Metric {
    /// Whether a larger score means a closer match
    pub fn higher_is_better(&self) -> bool {
        match self {
            Metric::CosineSimilarity => true,
            Metric::Euclidean => false,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Metric::CosineSimilarity => "cosine_similarity",
            Metric::Euclidean => "euclidean",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "cosine" | "cosine_similarity" => Ok(Metric::CosineSimilarity),
            "2" | "euclidean" => Ok(Metric::Euclidean),
            _ => Err(UnknownMetric(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown similarity metric: {0}")]
pub struct UnknownMetric(pub String);

/// A row that could not be processed by a batch update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub path: String,
    pub message: String,
}

/// Outcome of a batch update over every stored row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub updated: usize,
    /// Rows left unchanged on purpose (e.g. no capture time in metadata)
    pub skipped: usize,
    pub failed: Vec<RowFailure>,
}

impl UpdateSummary {
    pub fn total(&self) -> usize {
        self.updated + self.skipped + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Database credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx driver scheme: "mysql" or "sqlite"
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Database name, or the file path for sqlite
    #[serde(default)]
    pub name: String,
}

fn default_driver() -> String {
    "mysql".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            host: String::new(),
            user: String::new(),
            password: String::new(),
            name: String::new(),
        }
    }
}

/// Configuration for the CLIP model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hugging Face model id
    pub id: String,
    /// Hub revision holding `model.safetensors` and `tokenizer.json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: "openai/clip-vit-base-patch32".to_string(),
            revision: Some("refs/pr/15".to_string()),
        }
    }
}

/// Where auto-insert looks for images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesConfig {
    pub dir: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            dir: "./image_file".to_string(),
        }
    }
}

/// Project configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub images: ImagesConfig,
}
