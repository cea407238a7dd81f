//! Semantic duplicate detection for new comments.
//!
//! A proposed comment is embedded together with the room's existing
//! comments and scored by cosine similarity; the best match at or above
//! the threshold is reported back as an advisory warning. This path never
//! blocks a submission: when the embedding provider is missing or fails,
//! the check degrades to "no match" and the comment goes through.

use crate::embed::{embed_batched, EmbeddingProvider};
use crate::types::CommentId;
use serde::Serialize;

/// Score at or above which two comments count as similar
pub const SIMILARITY_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Serialize)]
pub struct SimilarityReport {
    pub similar: bool,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_comment_id: Option<CommentId>,
    /// True when the embedding provider failed and the check was skipped
    pub degraded: bool,
}

impl SimilarityReport {
    fn no_match() -> Self {
        Self {
            similar: false,
            score: 0.0,
            matched_comment_id: None,
            degraded: false,
        }
    }

    fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::no_match()
        }
    }
}

/// Cosine similarity of two vectors, 0 when either norm is 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Rank `proposed` against the room's existing comments and return the
/// single best match. `existing` pairs each comment id with its text.
pub async fn check_similarity(
    provider: Option<&dyn EmbeddingProvider>,
    proposed: &str,
    existing: &[(CommentId, String)],
) -> SimilarityReport {
    let Some(provider) = provider else {
        return SimilarityReport::no_match();
    };
    if existing.is_empty() {
        return SimilarityReport::no_match();
    }

    // One batch: the proposed text first, then every existing comment.
    let mut texts = Vec::with_capacity(existing.len() + 1);
    texts.push(proposed.to_string());
    texts.extend(existing.iter().map(|(_, text)| text.clone()));

    let vectors = match embed_batched(provider, &texts).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Similarity check degraded, embedding failed: {}", e);
            return SimilarityReport::degraded();
        }
    };

    let (proposed_vec, rest) = match vectors.split_first() {
        Some(split) => split,
        None => return SimilarityReport::degraded(),
    };

    let mut best: Option<(usize, f32)> = None;
    for (i, vec) in rest.iter().enumerate() {
        let score = cosine(proposed_vec, vec);
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((i, score));
        }
    }

    match best {
        Some((i, score)) => SimilarityReport {
            similar: score >= SIMILARITY_THRESHOLD,
            score,
            matched_comment_id: Some(existing[i].0.clone()),
            degraded: false,
        },
        None => SimilarityReport::no_match(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{EmbedError, EmbedResult};
    use async_trait::async_trait;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.3, 0.5, 0.1];
        let score = cosine(&v, &v);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_norm() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    /// Maps a few known strings to fixed vectors
    struct FixtureEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixtureEmbedder {
        async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| match t.as_str() {
                    "meet tuesday" => vec![1.0, 0.0, 0.0],
                    "let us meet on tuesday" => vec![0.9, 0.1, 0.0],
                    "pineapple pizza" => vec![0.0, 0.0, 1.0],
                    _ => vec![0.0, 1.0, 0.0],
                })
                .collect())
        }

        fn name(&self) -> &str {
            "fixture"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
            Err(EmbedError::ApiError("boom".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_best_match_above_threshold() {
        let existing = vec![
            ("c1".to_string(), "pineapple pizza".to_string()),
            ("c2".to_string(), "let us meet on tuesday".to_string()),
        ];
        let report = check_similarity(Some(&FixtureEmbedder), "meet tuesday", &existing).await;

        assert!(report.similar);
        assert_eq!(report.matched_comment_id.as_deref(), Some("c2"));
        assert!(report.score > SIMILARITY_THRESHOLD);
        assert!(!report.degraded);
    }

    #[tokio::test]
    async fn test_orthogonal_is_not_similar() {
        let existing = vec![("c1".to_string(), "pineapple pizza".to_string())];
        let report = check_similarity(Some(&FixtureEmbedder), "meet tuesday", &existing).await;

        assert!(!report.similar);
        assert_eq!(report.score, 0.0);
    }

    #[tokio::test]
    async fn test_fails_open() {
        let existing = vec![("c1".to_string(), "anything".to_string())];
        let report = check_similarity(Some(&FailingEmbedder), "meet tuesday", &existing).await;

        assert!(!report.similar);
        assert!(report.degraded);
    }

    #[tokio::test]
    async fn test_no_provider_and_no_history() {
        let report = check_similarity(None, "text", &[("c".into(), "x".into())]).await;
        assert!(!report.similar);
        assert!(!report.degraded);

        let report = check_similarity(Some(&FixtureEmbedder), "text", &[]).await;
        assert!(!report.similar);
        assert!(report.matched_comment_id.is_none());
    }
}
