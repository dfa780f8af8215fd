use super::prompt::{ask_text, ask_yes_no};
use super::setup::Session;
use anyhow::{Context, Result};
use pixrank::db::{ImageStore, StoreError};
use pixrank::services::{parse_path_list, scan_image_dir, CaptureDateService, IngestService};
use std::path::Path;
use std::sync::Arc;

/// Insert new image paths, then fill in capture dates
pub async fn execute(session: &Session) -> Result<()> {
    let auto = ask_yes_no("Do you want to use auto-insert? (y/n)")?;
    let paths = if auto {
        let dir = Path::new(&session.config.images.dir);
        scan_image_dir(dir)
            .with_context(|| format!("Failed to scan image directory {}", dir.display()))?
    } else {
        parse_path_list(&ask_text("Enter image paths separated by commas")?)
    };

    if paths.is_empty() {
        println!("No valid image paths provided.");
        return Ok(());
    }

    let store: Arc<dyn ImageStore> = session.store.clone();
    match IngestService::new(store.clone()).insert_paths(&paths).await {
        Ok(count) => println!("Inserted {} images.", count),
        Err(StoreError::Duplicate(path)) => {
            tracing::error!("Batch insert rolled back: {} is already stored", path);
            println!(
                "{} is already stored; the batch was rolled back and nothing was inserted.",
                path
            );
        },
        Err(e) => {
            tracing::error!("Batch insert rolled back: {}", e);
            println!("Insert failed: {}", e);
        },
    }

    let summary = CaptureDateService::new(store)
        .update_all_capture_dates()
        .await
        .context("Failed to read stored images")?;
    println!(
        "Capture dates: {} set, {} skipped, {} failed.",
        summary.updated,
        summary.skipped,
        summary.failed.len()
    );
    for failure in &summary.failed {
        println!("  failed: {} ({})", failure.path, failure.message);
    }
    Ok(())
}
