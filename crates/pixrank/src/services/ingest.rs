use crate::db::{ImageStore, StoreError};
use std::io;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

/// File extensions picked up by the directory scan, compared case-insensitively
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpeg", "tiff", "jpg", "png", "gif"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Every image file under `dir`, recursively, sorted.
///
/// The directory is created when it does not exist yet.
pub fn scan_image_dir(dir: &Path) -> io::Result<Vec<String>> {
    if !dir.exists() {
        tracing::info!("Creating image directory {}", dir.display());
        std::fs::create_dir_all(dir)?;
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            paths.push(entry.path().to_string_lossy().into_owned());
        }
    }
    paths.sort();

    tracing::debug!("Found {} images under {}", paths.len(), dir.display());
    Ok(paths)
}

/// Split a comma-separated path list, dropping blank entries
pub fn parse_path_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Service for adding images to the store
pub struct IngestService {
    store: Arc<dyn ImageStore>,
}

impl IngestService {
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self { store }
    }

    /// Insert `paths` as new rows; all or nothing
    pub async fn insert_paths(&self, paths: &[String]) -> Result<usize, StoreError> {
        if paths.is_empty() {
            tracing::info!("No image paths to insert");
            return Ok(0);
        }
        self.store.insert_paths(paths).await
    }

    /// Scan `dir` and insert every image found
    pub async fn insert_dir(&self, dir: &Path) -> Result<usize, IngestError> {
        let paths = scan_image_dir(dir).map_err(|source| IngestError::Scan {
            dir: dir.display().to_string(),
            source,
        })?;
        Ok(self.insert_paths(&paths).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("cannot scan image directory {dir}: {source}")]
    Scan {
        dir: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
