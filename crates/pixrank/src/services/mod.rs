pub mod config;
pub mod ingest;
pub mod rank;
pub mod types;
pub mod update;

pub use config::{ConfigError, ConfigService, CONFIG_FILE};
pub use ingest::{parse_path_list, scan_image_dir, IngestError, IngestService, IMAGE_EXTENSIONS};
pub use rank::{cosine_similarity, euclidean_distance, select_top, Ranker};
pub use types::{
    DatabaseConfig, ImageRecord, ImagesConfig, Metric, ModelConfig, ProjectConfig, RowFailure,
    UnknownMetric, UpdateSummary,
};
pub use update::{CaptureDateService, UpdateService};
