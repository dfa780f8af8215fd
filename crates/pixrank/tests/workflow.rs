use pixrank::db::{ImageStore, StoreError};
use pixrank::embedding::{parse_feature, FeatureExtractor};
use pixrank::services::{
    select_top, CaptureDateService, ConfigService, DatabaseConfig, IngestService, Metric,
    ProjectConfig, Ranker, UpdateService,
};
use pixrank::testing::{sqlite_store, write_exif_jpeg, write_test_image, TestExtractor};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// -- Helpers --

struct Fixture {
    _dir: TempDir,
    store: Arc<dyn ImageStore>,
    extractor: Arc<dyn FeatureExtractor>,
    images: std::path::PathBuf,
}

async fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let images = dir.path().join("image_file");
    write_test_image(&images, "red.png", [240, 10, 10]);
    write_test_image(&images, "green.jpg", [10, 240, 10]);
    write_test_image(&images, "blue.png", [10, 10, 240]);
    std::fs::write(images.join("readme.txt"), "not an image").unwrap();

    let store: Arc<dyn ImageStore> = Arc::new(sqlite_store(dir.path()).await);
    Fixture {
        _dir: dir,
        store,
        extractor: Arc::new(TestExtractor::new()),
        images,
    }
}

fn file_name(path: &str) -> &str {
    Path::new(path).file_name().unwrap().to_str().unwrap()
}

// -- Tests --

#[tokio::test]
async fn insert_extract_rank() {
    let f = fixture().await;

    let inserted = IngestService::new(f.store.clone())
        .insert_dir(&f.images)
        .await
        .unwrap();
    assert_eq!(inserted, 3);

    let summary = UpdateService::new(f.store.clone(), f.extractor.clone())
        .update_all_features()
        .await
        .unwrap();
    assert_eq!(summary.updated, 3);
    assert!(summary.is_clean());

    let records = f.store.list().await.unwrap();
    for record in &records {
        let feature = parse_feature(record.feature.as_deref().unwrap()).unwrap();
        assert_eq!(feature.len(), f.extractor.dimensions());
    }

    let ranker = Ranker::new(f.extractor.clone());
    let paths: Vec<String> = records.iter().map(|r| r.path.clone()).collect();
    let scores = ranker
        .rank(&paths, "something green", Metric::CosineSimilarity)
        .await
        .unwrap();
    assert_eq!(scores.len(), 3);
    let top = select_top(&scores, 1, Metric::CosineSimilarity);
    assert_eq!(file_name(&top[0].0), "green.jpg");

    let scores = ranker
        .rank(&paths, "blue sky", Metric::Euclidean)
        .await
        .unwrap();
    let top = select_top(&scores, 2, Metric::Euclidean);
    assert_eq!(top.len(), 2);
    assert_eq!(file_name(&top[0].0), "blue.png");
    assert!(top[0].1 <= top[1].1);
}

#[tokio::test]
async fn ranking_reads_current_image_content() {
    let f = fixture().await;
    IngestService::new(f.store.clone())
        .insert_dir(&f.images)
        .await
        .unwrap();
    UpdateService::new(f.store.clone(), f.extractor.clone())
        .update_all_features()
        .await
        .unwrap();

    // repaint after the features were stored
    write_test_image(&f.images, "red.png", [10, 240, 10]);

    let paths: Vec<String> = f
        .store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    let scores = Ranker::new(f.extractor.clone())
        .rank(&paths, "red", Metric::CosineSimilarity)
        .await
        .unwrap();

    let red = paths.iter().find(|p| file_name(p) == "red.png").unwrap();
    assert!(scores[red] < 0.5);
    let top = select_top(&scores, 3, Metric::CosineSimilarity);
    assert!(top.iter().all(|(_, score)| *score < 0.5));
}

#[tokio::test]
async fn insert_is_followed_by_date_pass() {
    let f = fixture().await;
    write_exif_jpeg(&f.images, "holiday.jpg", [90, 120, 200], "2019:08:17 14:30:00");
    IngestService::new(f.store.clone())
        .insert_dir(&f.images)
        .await
        .unwrap();

    let summary = CaptureDateService::new(f.store.clone())
        .update_all_capture_dates()
        .await
        .unwrap();

    // only the JPEG carries an EXIF block
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 3);
    assert!(summary.is_clean());
    for record in f.store.list().await.unwrap() {
        let expected = if file_name(&record.path) == "holiday.jpg" {
            chrono::NaiveDate::from_ymd_opt(2019, 8, 17)
        } else {
            None
        };
        assert_eq!(record.captured_at, expected);
    }
}

#[tokio::test]
async fn rescanning_directory_aborts_on_duplicates() {
    let f = fixture().await;
    let ingest = IngestService::new(f.store.clone());
    ingest.insert_dir(&f.images).await.unwrap();
    write_test_image(&f.images, "new.png", [1, 1, 1]);

    let err = ingest.insert_dir(&f.images).await.unwrap_err();

    assert!(matches!(
        err,
        pixrank::services::IngestError::Store(StoreError::Duplicate(_))
    ));
    assert_eq!(f.store.count().await.unwrap(), 3);
}

#[test]
fn saved_sqlite_config_builds_url() {
    let dir = TempDir::new().unwrap();
    let service = ConfigService::new(&dir.path().join("config.json"));
    let db_file = dir.path().join("images.db");
    let config = ProjectConfig {
        database: DatabaseConfig {
            driver: "sqlite".to_string(),
            name: db_file.display().to_string(),
            ..DatabaseConfig::default()
        },
        ..ProjectConfig::default()
    };
    service.save(&config).unwrap();

    let loaded = service.load().unwrap();
    assert_eq!(loaded, config);
    assert_eq!(
        loaded.database.connection_url().unwrap(),
        format!("sqlite://{}?mode=rwc", db_file.display())
    );
}
