use super::setup::Session;
use anyhow::{Context, Result};
use pixrank::services::UpdateService;

/// Recompute the feature of every stored image
pub async fn execute(session: &Session) -> Result<()> {
    let summary = UpdateService::new(session.store.clone(), session.extractor.clone())
        .update_all_features()
        .await
        .context("Failed to read stored images")?;

    if summary.total() == 0 {
        println!("No images to process.");
        return Ok(());
    }

    if summary.is_clean() {
        println!("Updated features for all {} images.", summary.updated);
        return Ok(());
    }

    println!(
        "Updated features for {} of {} images.",
        summary.updated,
        summary.total()
    );
    for failure in &summary.failed {
        println!("  failed: {} ({})", failure.path, failure.message);
    }
    Ok(())
}
