use super::types::Metric;
use crate::embedding::{ExtractError, FeatureExtractor};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Cosine of the angle between `a` and `b`, 0 when either has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn score(metric: Metric, image: &[f32], query: &[f32]) -> f32 {
    match metric {
        Metric::CosineSimilarity => cosine_similarity(image, query),
        Metric::Euclidean => euclidean_distance(image, query),
    }
}

/// The `n` best entries of `scores`, best first.
///
/// "Best" follows the metric: highest similarity for cosine, smallest
/// distance for Euclidean. Ties are broken by path.
pub fn select_top(scores: &HashMap<String, f32>, n: usize, metric: Metric) -> Vec<(String, f32)> {
    let mut entries: Vec<(String, f32)> = scores
        .iter()
        .map(|(path, score)| (path.clone(), *score))
        .collect();

    entries.sort_by(|(pa, a), (pb, b)| {
        let by_score = if metric.higher_is_better() {
            b.partial_cmp(a)
        } else {
            a.partial_cmp(b)
        };
        by_score.unwrap_or(Ordering::Equal).then_with(|| pa.cmp(pb))
    });
    entries.truncate(n);
    entries
}

/// Scores images against text queries
pub struct Ranker {
    extractor: Arc<dyn FeatureExtractor>,
}

impl Ranker {
    pub fn new(extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self { extractor }
    }

    /// Score every path against `query`.
    ///
    /// Images that fail to decode are logged and left out of the result.
    pub async fn rank(
        &self,
        paths: &[String],
        query: &str,
        metric: Metric,
    ) -> Result<HashMap<String, f32>, ExtractError> {
        let query_vec = self.extractor.extract_text(query).await?;
        let mut scores = HashMap::new();
        let mut failed = HashSet::new();

        for path in paths {
            // each distinct path is extracted once per call
            if scores.contains_key(path) || failed.contains(path.as_str()) {
                continue;
            }
            match self.extractor.extract_image(Path::new(path)).await {
                Ok(image_vec) => {
                    scores.insert(path.clone(), score(metric, &image_vec, &query_vec));
                },
                Err(e) => {
                    tracing::error!("Skipping {}: {}", path, e);
                    failed.insert(path.as_str());
                },
            }
        }

        tracing::info!(
            "Ranked {} of {} images for query '{}' by {}",
            scores.len(),
            paths.len(),
            query,
            metric
        );
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_test_image, TestExtractor};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tempfile::TempDir;

    fn scores(items: &[(&str, f32)]) -> HashMap<String, f32> {
        items.iter().map(|(p, s)| (p.to_string(), *s)).collect()
    }

    mod metrics {
        use super::*;

        #[test]
        fn cosine_of_self_is_one() {
            let v = [0.3, -0.4, 0.5];
            assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        }

        #[test]
        fn cosine_of_opposite_is_minus_one() {
            let v = [1.0, 2.0];
            let w = [-1.0, -2.0];
            assert!((cosine_similarity(&v, &w) + 1.0).abs() < 1e-6);
        }

        #[test]
        fn cosine_with_zero_vector_is_zero() {
            assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        }

        #[test]
        fn euclidean_of_self_is_zero() {
            let v = [0.1, 0.2, 0.3];
            assert_eq!(euclidean_distance(&v, &v), 0.0);
        }

        #[test]
        fn euclidean_is_non_negative() {
            assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
            assert!(euclidean_distance(&[-1.0], &[1.0]) >= 0.0);
        }
    }

    mod top {
        use super::*;

        #[test]
        fn cosine_keeps_highest() {
            let s = scores(&[("a", 0.1), ("b", 0.9), ("c", 0.5)]);
            let top = select_top(&s, 2, Metric::CosineSimilarity);
            assert_eq!(top, vec![("b".to_string(), 0.9), ("c".to_string(), 0.5)]);
        }

        #[test]
        fn euclidean_keeps_nearest() {
            let s = scores(&[("a", 0.1), ("b", 0.9), ("c", 0.5)]);
            let top = select_top(&s, 2, Metric::Euclidean);
            assert_eq!(top, vec![("a".to_string(), 0.1), ("c".to_string(), 0.5)]);
        }

        #[test]
        fn n_is_clamped_to_size() {
            let s = scores(&[("a", 0.1)]);
            assert_eq!(select_top(&s, 10, Metric::CosineSimilarity).len(), 1);
            assert!(select_top(&s, 0, Metric::CosineSimilarity).is_empty());
        }

        #[test]
        fn ties_are_ordered_by_path() {
            let s = scores(&[("b", 0.5), ("a", 0.5)]);
            let top = select_top(&s, 2, Metric::Euclidean);
            assert_eq!(top[0].0, "a");
        }
    }

    /// Counts image extractions made through the wrapped extractor
    struct CountingExtractor {
        inner: TestExtractor,
        images: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FeatureExtractor for CountingExtractor {
        async fn extract_image(&self, path: &Path) -> Result<Vec<f32>, ExtractError> {
            self.images.fetch_add(1, AtomicOrdering::SeqCst);
            self.inner.extract_image(path).await
        }

        async fn extract_text(&self, query: &str) -> Result<Vec<f32>, ExtractError> {
            self.inner.extract_text(query).await
        }

        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
    }

    fn counting() -> Arc<CountingExtractor> {
        Arc::new(CountingExtractor {
            inner: TestExtractor::new(),
            images: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn matching_colour_ranks_first() {
        let dir = TempDir::new().unwrap();
        let red = write_test_image(dir.path(), "red.png", [250, 5, 5]);
        let blue = write_test_image(dir.path(), "blue.png", [5, 5, 250]);
        let paths = vec![
            red.to_string_lossy().into_owned(),
            blue.to_string_lossy().into_owned(),
        ];
        let ranker = Ranker::new(Arc::new(TestExtractor::new()));

        let cosine = ranker
            .rank(&paths, "a red square", Metric::CosineSimilarity)
            .await
            .unwrap();
        assert!(cosine[&paths[0]] > cosine[&paths[1]]);
        assert!(cosine.values().all(|s| (-1.0..=1.0).contains(s)));

        let euclid = ranker
            .rank(&paths, "a red square", Metric::Euclidean)
            .await
            .unwrap();
        assert!(euclid[&paths[0]] < euclid[&paths[1]]);
        assert_eq!(select_top(&euclid, 1, Metric::Euclidean)[0].0, paths[0]);
    }

    #[tokio::test]
    async fn duplicate_paths_are_extracted_once() {
        let dir = TempDir::new().unwrap();
        let img = write_test_image(dir.path(), "g.png", [0, 255, 0]);
        let path = img.to_string_lossy().into_owned();
        let extractor = counting();
        let ranker = Ranker::new(extractor.clone());

        let result = ranker
            .rank(&[path.clone(), path.clone()], "green", Metric::CosineSimilarity)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(extractor.images.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn undecodable_paths_are_omitted() {
        let dir = TempDir::new().unwrap();
        let img = write_test_image(dir.path(), "ok.png", [1, 1, 1]);
        let paths = vec![
            img.to_string_lossy().into_owned(),
            "/missing/photo.jpg".to_string(),
        ];
        let ranker = Ranker::new(Arc::new(TestExtractor::new()));

        let result = ranker
            .rank(&paths, "anything", Metric::CosineSimilarity)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.contains_key(&paths[0]));
    }

    #[tokio::test]
    async fn empty_paths_give_empty_mapping() {
        let ranker = Ranker::new(Arc::new(TestExtractor::new()));
        let result = ranker
            .rank(&[], "query", Metric::Euclidean)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn every_call_extracts_from_the_image() {
        let dir = TempDir::new().unwrap();
        let img = write_test_image(dir.path(), "swap.png", [255, 0, 0]);
        let paths = vec![img.to_string_lossy().into_owned()];
        let extractor = counting();
        let ranker = Ranker::new(extractor.clone());

        let before = ranker
            .rank(&paths, "red", Metric::CosineSimilarity)
            .await
            .unwrap();
        write_test_image(dir.path(), "swap.png", [0, 0, 255]);
        let after = ranker
            .rank(&paths, "red", Metric::CosineSimilarity)
            .await
            .unwrap();

        assert_eq!(extractor.images.load(AtomicOrdering::SeqCst), 2);
        assert!(before[&paths[0]] > 0.99);
        assert!(after[&paths[0]] < 0.1);
    }
}
