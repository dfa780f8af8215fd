use super::types::{ImageRecord, RowFailure, UpdateSummary};
use crate::db::{ImageStore, StoreError};
use crate::embedding::{serialize_feature, FeatureExtractor};
use crate::metadata;
use std::path::Path;
use std::sync::Arc;

/// Service that recomputes stored features one row at a time
pub struct UpdateService {
    store: Arc<dyn ImageStore>,
    extractor: Arc<dyn FeatureExtractor>,
}

impl UpdateService {
    pub fn new(store: Arc<dyn ImageStore>, extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self { store, extractor }
    }

    /// Recompute and store the feature of every row.
    ///
    /// Each row is written in its own transaction. A failing row is logged,
    /// recorded in the summary and left as it was; the rest still run.
    pub async fn update_all_features(&self) -> Result<UpdateSummary, StoreError> {
        let records = self.store.list().await?;
        let mut summary = UpdateSummary::default();
        if records.is_empty() {
            tracing::info!("No images to process.");
            return Ok(summary);
        }

        for record in &records {
            match self.update_feature(record).await {
                Ok(()) => summary.updated += 1,
                Err(message) => {
                    tracing::error!("Error updating feature for {}: {}", record.path, message);
                    summary.failed.push(RowFailure {
                        path: record.path.clone(),
                        message,
                    });
                },
            }
        }

        tracing::info!(
            "Updated features for {} of {} images ({} failed)",
            summary.updated,
            records.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn update_feature(&self, record: &ImageRecord) -> Result<(), String> {
        let feature = self
            .extractor
            .extract_image(Path::new(&record.path))
            .await
            .map_err(|e| e.to_string())?;

        let expected = self.extractor.dimensions();
        if feature.len() != expected {
            return Err(format!(
                "feature has {} components, expected {}",
                feature.len(),
                expected
            ));
        }

        self.store
            .set_feature(&record.path, &serialize_feature(&feature))
            .await
            .map_err(|e| e.to_string())
    }
}

/// Service that fills in capture dates from image metadata
pub struct CaptureDateService {
    store: Arc<dyn ImageStore>,
}

impl CaptureDateService {
    pub fn new(store: Arc<dyn ImageStore>) -> Self {
        Self { store }
    }

    /// Fill in the capture date of every row that has none.
    ///
    /// Rows already dated and images without a capture time are skipped.
    pub async fn update_all_capture_dates(&self) -> Result<UpdateSummary, StoreError> {
        let records = self.store.list().await?;
        let mut summary = UpdateSummary::default();
        if records.is_empty() {
            tracing::info!("No images to process.");
            return Ok(summary);
        }

        for record in &records {
            if record.captured_at.is_some() {
                summary.skipped += 1;
                continue;
            }

            let date = match metadata::capture_date(Path::new(&record.path)) {
                Ok(Some(date)) => date,
                Ok(None) => {
                    tracing::debug!("No capture time for {}", record.path);
                    summary.skipped += 1;
                    continue;
                },
                Err(e) => {
                    tracing::error!("Error reading metadata of {}: {}", record.path, e);
                    summary.failed.push(RowFailure {
                        path: record.path.clone(),
                        message: e.to_string(),
                    });
                    continue;
                },
            };

            match self.store.set_captured_at(&record.path, date).await {
                Ok(()) => summary.updated += 1,
                Err(e) => {
                    tracing::error!("Error updating date for {}: {}", record.path, e);
                    summary.failed.push(RowFailure {
                        path: record.path.clone(),
                        message: e.to_string(),
                    });
                },
            }
        }

        tracing::info!(
            "Updated capture dates for {} images ({} skipped, {} failed)",
            summary.updated,
            summary.skipped,
            summary.failed.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::parse_feature;
    use crate::testing::{
        sqlite_store, write_exif_jpeg, write_test_image, TestExtractor, TestStore,
    };
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn service(store: Arc<dyn ImageStore>) -> UpdateService {
        UpdateService::new(store, Arc::new(TestExtractor::new()))
    }

    fn path_string(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn empty_store_gives_empty_summary() {
        let summary = service(Arc::new(TestStore::new()))
            .update_all_features()
            .await
            .unwrap();
        assert_eq!(summary, UpdateSummary::default());
    }

    #[tokio::test]
    async fn missing_file_does_not_block_other_rows() {
        let dir = TempDir::new().unwrap();
        let red = write_test_image(dir.path(), "red.png", [255, 0, 0]);
        let blue = write_test_image(dir.path(), "blue.png", [0, 0, 255]);
        let ghost = dir.path().join("ghost.png");

        let store = Arc::new(sqlite_store(dir.path()).await);
        store
            .insert_paths(&[path_string(&red), path_string(&ghost), path_string(&blue)])
            .await
            .unwrap();

        let summary = service(store.clone()).update_all_features().await.unwrap();

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].path, path_string(&ghost));

        for record in store.list().await.unwrap() {
            if record.path == path_string(&ghost) {
                assert!(record.feature.is_none());
            } else {
                let feature = parse_feature(record.feature.as_deref().unwrap()).unwrap();
                assert_eq!(feature.len(), 512);
            }
        }
    }

    #[tokio::test]
    async fn rerun_overwrites_with_identical_features() {
        let dir = TempDir::new().unwrap();
        let red = write_test_image(dir.path(), "red.png", [200, 10, 10]);
        let store = Arc::new(TestStore::new());
        store.insert_paths(&[path_string(&red)]).await.unwrap();
        let service = service(store.clone());

        service.update_all_features().await.unwrap();
        let first = store.get(&path_string(&red)).unwrap().feature;
        service.update_all_features().await.unwrap();
        let second = store.get(&path_string(&red)).unwrap().feature;

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn store_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        let a = write_test_image(dir.path(), "a.png", [1, 2, 3]);
        let b = write_test_image(dir.path(), "b.png", [4, 5, 6]);
        let store = Arc::new(TestStore::new());
        store
            .insert_paths(&[path_string(&a), path_string(&b)])
            .await
            .unwrap();
        store.fail_writes_for(&path_string(&a));

        let summary = service(store.clone()).update_all_features().await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed[0].path, path_string(&a));
        assert!(store.get(&path_string(&b)).unwrap().feature.is_some());
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        struct ShortExtractor;

        #[async_trait::async_trait]
        impl FeatureExtractor for ShortExtractor {
            async fn extract_image(
                &self,
                _path: &Path,
            ) -> Result<Vec<f32>, crate::embedding::ExtractError> {
                Ok(vec![1.0, 0.0])
            }

            async fn extract_text(
                &self,
                _query: &str,
            ) -> Result<Vec<f32>, crate::embedding::ExtractError> {
                Ok(vec![1.0, 0.0])
            }

            fn model_id(&self) -> &str {
                "short"
            }

            fn dimensions(&self) -> usize {
                512
            }
        }

        let store = Arc::new(TestStore::new());
        store.insert_paths(&["a.png".to_string()]).await.unwrap();
        let service = UpdateService::new(store.clone(), Arc::new(ShortExtractor));

        let summary = service.update_all_features().await.unwrap();
        assert_eq!(summary.updated, 0);
        assert!(summary.failed[0].message.contains("expected 512"));
        assert!(store.get("a.png").unwrap().feature.is_none());
    }

    #[tokio::test]
    async fn capture_dates_skip_rows_without_metadata() {
        let dir = TempDir::new().unwrap();
        let png = write_test_image(dir.path(), "plain.png", [9, 9, 9]);
        let store = Arc::new(TestStore::new());
        store.insert_paths(&[path_string(&png)]).await.unwrap();

        let summary = CaptureDateService::new(store.clone())
            .update_all_capture_dates()
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert!(summary.is_clean());
        assert!(store.get(&path_string(&png)).unwrap().captured_at.is_none());
    }

    #[tokio::test]
    async fn capture_dates_keep_existing_dates() {
        let date = NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
        let store = Arc::new(TestStore::with_records(vec![ImageRecord {
            path: "/gone/old.jpg".to_string(),
            feature: None,
            captured_at: Some(date),
        }]));

        let summary = CaptureDateService::new(store.clone())
            .update_all_capture_dates()
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(store.get("/gone/old.jpg").unwrap().captured_at, Some(date));
    }

    #[tokio::test]
    async fn capture_dates_report_unreadable_files() {
        let store = Arc::new(TestStore::new());
        store.insert_paths(&["/no/such/file.jpg".to_string()]).await.unwrap();

        let summary = CaptureDateService::new(store)
            .update_all_capture_dates()
            .await
            .unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.updated, 0);
    }

    #[tokio::test]
    async fn capture_date_from_exif_is_stored() {
        let dir = TempDir::new().unwrap();
        let jpeg = write_exif_jpeg(dir.path(), "dated.jpg", [30, 60, 90], "2016:05:04 03:02:01");
        let plain = write_test_image(dir.path(), "plain.png", [9, 9, 9]);
        let store = Arc::new(sqlite_store(dir.path()).await);
        store
            .insert_paths(&[path_string(&jpeg), path_string(&plain)])
            .await
            .unwrap();

        let summary = CaptureDateService::new(store.clone())
            .update_all_capture_dates()
            .await
            .unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.is_clean());

        let records = store.list().await.unwrap();
        let dated = records.iter().find(|r| r.path == path_string(&jpeg)).unwrap();
        assert_eq!(dated.captured_at, NaiveDate::from_ymd_opt(2016, 5, 4));
        let undated = records.iter().find(|r| r.path == path_string(&plain)).unwrap();
        assert!(undated.captured_at.is_none());

        // a second pass leaves dated rows alone
        let rerun = CaptureDateService::new(store)
            .update_all_capture_dates()
            .await
            .unwrap();
        assert_eq!(rerun.updated, 0);
        assert_eq!(rerun.skipped, 2);
    }
}
