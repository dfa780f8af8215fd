//! Test utilities for the pixrank crate
//!
//! This module provides reusable test doubles for unit and integration testing.
//! It includes stand-in implementations of the `FeatureExtractor` and `ImageStore` traits.

use crate::db::{ImageStore, Schema, SqlImageStore, StoreError};
use crate::embedding::{l2_normalize, ExtractError, FeatureExtractor};
use crate::services::ImageRecord;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Test extractor that derives embeddings from an image's mean colour.
///
/// Images are really decoded, so unreadable files fail the way they would
/// with CLIP. Text queries naming a colour ("red", "green", "blue") embed
/// onto that colour; other text hashes to a fixed pseudo-colour.
pub struct TestExtractor {
    dimensions: usize,
}

impl TestExtractor {
    pub fn new() -> Self {
        Self::with_dimensions(512)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_rgb(&self, rgb: [f32; 3]) -> Vec<f32> {
        l2_normalize((0..self.dimensions).map(|i| rgb[i % 3]).collect())
    }
}

impl Default for TestExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FeatureExtractor for TestExtractor {
    async fn extract_image(&self, path: &Path) -> Result<Vec<f32>, ExtractError> {
        let img = image::open(path)
            .map_err(|source| ExtractError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();

        let pixels = (img.width() as f32 * img.height() as f32).max(1.0);
        let mut sum = [0f32; 3];
        for pixel in img.pixels() {
            for (acc, channel) in sum.iter_mut().zip(pixel.0) {
                *acc += channel as f32 / 255.0;
            }
        }
        Ok(self.embed_rgb(sum.map(|c| c / pixels)))
    }

    async fn extract_text(&self, query: &str) -> Result<Vec<f32>, ExtractError> {
        let query = query.to_lowercase();
        let rgb = if query.contains("red") {
            [1.0, 0.0, 0.0]
        } else if query.contains("green") {
            [0.0, 1.0, 0.0]
        } else if query.contains("blue") {
            [0.0, 0.0, 1.0]
        } else {
            let hash = query.bytes().fold(0u32, |acc, b| acc.wrapping_add(b as u32));
            [
                (hash % 7) as f32 + 1.0,
                (hash % 11) as f32 + 1.0,
                (hash % 13) as f32 + 1.0,
            ]
        };
        Ok(self.embed_rgb(rgb))
    }

    fn model_id(&self) -> &str {
        "test-extractor"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// In-memory store for testing.
///
/// Thread-safe via Mutex. Writes for paths registered with
/// [`TestStore::fail_writes_for`] return a query error.
pub struct TestStore {
    records: Mutex<BTreeMap<String, ImageRecord>>,
    failing: Mutex<HashSet<String>>,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Seed a store with already-built records
    pub fn with_records(records: Vec<ImageRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.lock().unwrap();
            for record in records {
                map.insert(record.path.clone(), record);
            }
        }
        store
    }

    pub fn fail_writes_for(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    pub fn get(&self, path: &str) -> Option<ImageRecord> {
        self.records.lock().unwrap().get(path).cloned()
    }

    fn update<F>(&self, path: &str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ImageRecord),
    {
        if self.failing.lock().unwrap().contains(path) {
            return Err(StoreError::Query(sqlx::Error::Protocol(format!(
                "injected failure for {}",
                path
            ))));
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(path)
            .ok_or_else(|| StoreError::RowMissing(path.to_string()))?;
        apply(record);
        Ok(())
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ImageStore for TestStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ImageRecord>, StoreError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.records.lock().unwrap().len() as u64)
    }

    async fn insert_paths(&self, paths: &[String]) -> Result<usize, StoreError> {
        let mut records = self.records.lock().unwrap();
        let mut batch: BTreeMap<String, ImageRecord> = BTreeMap::new();
        for path in paths {
            if records.contains_key(path) || batch.contains_key(path) {
                return Err(StoreError::Duplicate(path.clone()));
            }
            batch.insert(path.clone(), ImageRecord::new(path.as_str()));
        }
        records.extend(batch);
        Ok(paths.len())
    }

    async fn set_feature(&self, path: &str, feature: &str) -> Result<(), StoreError> {
        self.update(path, |record| record.feature = Some(feature.to_string()))
    }

    async fn set_captured_at(&self, path: &str, date: NaiveDate) -> Result<(), StoreError> {
        self.update(path, |record| record.captured_at = Some(date))
    }
}

/// Write a solid-colour image; the format follows the file extension
pub fn write_test_image(dir: &Path, name: &str, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    image::RgbImage::from_pixel(8, 8, image::Rgb(rgb))
        .save(&path)
        .unwrap();
    path
}

/// Write a solid-colour JPEG whose APP1 segment carries `DateTimeOriginal`.
///
/// `datetime` uses the EXIF `YYYY:MM:DD HH:MM:SS` layout.
pub fn write_exif_jpeg(dir: &Path, name: &str, rgb: [u8; 3], datetime: &str) -> PathBuf {
    let mut jpeg = Vec::new();
    image::RgbImage::from_pixel(8, 8, image::Rgb(rgb))
        .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
        .unwrap();

    let field = exif::Field {
        tag: exif::Tag::DateTimeOriginal,
        ifd_num: exif::In::PRIMARY,
        value: exif::Value::Ascii(vec![datetime.as_bytes().to_vec()]),
    };
    let mut writer = exif::experimental::Writer::new();
    writer.push_field(&field);
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    // APP1 goes right after SOI; its length counts itself and the Exif header
    let length = u16::try_from(2 + 6 + tiff.len()).unwrap();
    let mut bytes = jpeg[..2].to_vec();
    bytes.extend_from_slice(&[0xff, 0xe1]);
    bytes.extend_from_slice(&length.to_be_bytes());
    bytes.extend_from_slice(b"Exif\0\0");
    bytes.extend_from_slice(&tiff);
    bytes.extend_from_slice(&jpeg[2..]);

    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

/// SQLite-backed store in a file under `dir`
pub async fn sqlite_store(dir: &Path) -> SqlImageStore {
    let url = format!("sqlite://{}?mode=rwc", dir.join("images.db").display());
    SqlImageStore::connect(&url, Schema::default()).await.unwrap()
}
