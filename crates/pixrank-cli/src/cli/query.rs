use super::prompt::{ask_metric, ask_text, ask_top_n, parse_query_list, pause};
use super::setup::Session;
use anyhow::{Context, Result};
use pixrank::db::ImageStore;
use pixrank::services::{select_top, ImageRecord, Metric, Ranker};

const SEPARATOR: &str = "******************************************************************";

/// Rank the stored images against one query
pub async fn execute_single(session: &Session) -> Result<()> {
    let query = ask_text("Enter the query text")?;
    if query.is_empty() {
        println!("No query entered.");
        return Ok(());
    }

    let records = load_records(session).await?;
    if records.is_empty() {
        println!("No images found in the database.");
        return Ok(());
    }

    let metric = ask_metric()?;
    show_ranking(session, &records, &query, metric).await?;
    pause()
}

/// Rank the stored images against several comma-separated queries
pub async fn execute_batch(session: &Session) -> Result<()> {
    let queries = parse_query_list(&ask_text("Enter queries separated by commas")?);
    let records = load_records(session).await?;
    if queries.is_empty() || records.is_empty() {
        println!("No valid queries or images found in the database.");
        return Ok(());
    }

    for query in &queries {
        println!("\nResults for query '{}':", query);
        let metric = ask_metric()?;
        show_ranking(session, &records, query, metric).await?;
    }
    pause()
}

async fn load_records(session: &Session) -> Result<Vec<ImageRecord>> {
    session
        .store
        .list()
        .await
        .context("Failed to read stored images")
}

async fn show_ranking(
    session: &Session,
    records: &[ImageRecord],
    query: &str,
    metric: Metric,
) -> Result<()> {
    let paths: Vec<String> = records.iter().map(|r| r.path.clone()).collect();
    let scores = Ranker::new(session.extractor.clone())
        .rank(&paths, query, metric)
        .await
        .with_context(|| format!("Failed to rank images for '{}'", query))?;

    if scores.is_empty() {
        println!("None of the stored images could be read.");
        return Ok(());
    }

    let label = match metric {
        Metric::CosineSimilarity => "Similarity",
        Metric::Euclidean => "Distance",
    };
    println!("\n{}\n", SEPARATOR);
    for (path, score) in select_top(&scores, scores.len(), metric) {
        println!("{} with {}: {:.4}", label, path, score);
    }
    println!("\n{}\n", SEPARATOR);

    let n = ask_top_n()?;
    let top = select_top(&scores, n, metric);
    let order = if metric.higher_is_better() {
        "highest"
    } else {
        "lowest"
    };
    println!("Top {} by {} ({} first):", top.len(), metric, order);
    for (rank, (path, score)) in top.iter().enumerate() {
        println!("{:>4}. {:.4}  {}", rank + 1, score, path);
    }
    Ok(())
}
