use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use extract::Triple;
use index::{IndexError, VectorIndex};

/// Which rows are allowed through after the similarity cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Rank and threshold only.
    #[default]
    Similarity,
    /// Additionally require the row to share the query's head or its tail.
    SharedEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub top_k: usize,
    pub sim_th: f32,
    #[serde(default)]
    pub policy: MatchPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 100,
            sim_th: 0.80,
            policy: MatchPolicy::Similarity,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.top_k == 0 {
            anyhow::bail!("top_k must be positive");
        }
        if !(-1.0..=1.0).contains(&self.sim_th) {
            anyhow::bail!("sim_th must be a cosine value in [-1, 1], got {}", self.sim_th);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    pub row: usize,
    pub score: f32,
}

/// Indices of the `k` highest scores, best first. Equal scores keep index
/// order; NaN ranks below everything.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    if k == 0 {
        return Vec::new();
    }

    let rank = |i: usize| {
        let s = scores[i];
        if s.is_nan() { f32::NEG_INFINITY } else { s }
    };
    let best_first = |a: &usize, b: &usize| -> Ordering {
        rank(*b).total_cmp(&rank(*a)).then(a.cmp(b))
    };

    let mut order: Vec<usize> = (0..scores.len()).collect();
    if k < order.len() {
        order.select_nth_unstable_by(k - 1, best_first);
        order.truncate(k);
    }
    order.sort_unstable_by(best_first);
    order
}

/// Rows of `index` most similar to `query_vec`, best first.
///
/// Takes the `top_k` highest cosine scores and stops at the first one below
/// `sim_th`; since the slice is sorted descending this drops exactly the
/// sub-threshold rows. With [`MatchPolicy::SharedEndpoint`] rows must also
/// have `head == query.head` or `tail == query.tail`.
pub fn cosine_search(
    index: &VectorIndex,
    query: &Triple,
    query_vec: &[f32],
    config: &SearchConfig,
) -> Result<Vec<SearchHit>, IndexError> {
    let scores = index.scores(query_vec)?;

    let hits = top_k_indices(&scores, config.top_k)
        .into_iter()
        .take_while(|&row| scores[row] >= config.sim_th)
        .filter(|&row| match config.policy {
            MatchPolicy::Similarity => true,
            MatchPolicy::SharedEndpoint => index
                .row(row)
                .is_some_and(|r| r.head == query.head || r.tail == query.tail),
        })
        .map(|row| SearchHit {
            row,
            score: scores[row],
        })
        .collect();

    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::{IndexRow, PropColumns};
    use ndarray::Array2;

    fn index_from(rows: Vec<(IndexRow, Vec<f32>)>) -> VectorIndex {
        let dim = rows[0].1.len();
        let flat: Vec<f32> = rows.iter().flat_map(|(_, v)| v.clone()).collect();
        let matrix = Array2::from_shape_vec((rows.len(), dim), flat).unwrap();
        let rows = rows.into_iter().map(|(r, _)| r).collect();
        VectorIndex::new(matrix, rows, PropColumns::default()).unwrap()
    }

    #[test]
    fn test_threshold_cuts_low_similarity() {
        // similarity 1.0 and 0.4 against the query
        let index = index_from(vec![
            (IndexRow::new("A", "loves", "B"), vec![1.0, 0.0]),
            (IndexRow::new("A", "knows", "C"), vec![0.4, (1.0f32 - 0.16).sqrt()]),
        ]);
        let query = Triple::new("A", "loves", "B");
        let config = SearchConfig { top_k: 10, sim_th: 0.8, ..Default::default() };

        let hits = cosine_search(&index, &query, &[1.0, 0.0], &config).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].row, 0);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hits_are_ranked_and_bounded() {
        let index = index_from(
            (0..20)
                .map(|i| {
                    let angle = i as f32 * 0.02;
                    (IndexRow::new(format!("h{i}"), "r", "t"), vec![angle.cos(), angle.sin()])
                })
                .rev()
                .collect(),
        );
        let query = Triple::new("x", "r", "y");

        for top_k in [1, 3, 7, 50] {
            let config = SearchConfig { top_k, sim_th: 0.95, ..Default::default() };
            let hits = cosine_search(&index, &query, &[1.0, 0.0], &config).unwrap();

            assert!(hits.len() <= top_k);
            assert!(hits.iter().all(|h| h.score >= 0.95));
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[test]
    fn test_shared_endpoint_policy() {
        let index = index_from(vec![
            (IndexRow::new("A", "r", "Z"), vec![1.0, 0.0]),
            (IndexRow::new("Q", "r", "B"), vec![1.0, 0.0]),
            (IndexRow::new("Q", "r", "Z"), vec![1.0, 0.0]),
        ]);
        let query = Triple::new("A", "r", "B");

        let loose = SearchConfig::default();
        assert_eq!(cosine_search(&index, &query, &[1.0, 0.0], &loose).unwrap().len(), 3);

        let strict = SearchConfig { policy: MatchPolicy::SharedEndpoint, ..Default::default() };
        let rows: Vec<_> = cosine_search(&index, &query, &[1.0, 0.0], &strict)
            .unwrap()
            .into_iter()
            .map(|h| h.row)
            .collect();
        assert_eq!(rows, vec![0, 1]);
    }

    #[test]
    fn test_top_k_ties_and_nan() {
        let scores = [0.5, f32::NAN, 0.9, 0.5, 0.9];
        assert_eq!(top_k_indices(&scores, 3), vec![2, 4, 0]);
        assert_eq!(top_k_indices(&scores, 10), vec![2, 4, 0, 3, 1]);
        assert!(top_k_indices(&scores, 0).is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let index = index_from(vec![(IndexRow::new("A", "r", "B"), vec![1.0, 0.0])]);
        let result = cosine_search(&index, &Triple::new("A", "r", "B"), &[1.0], &SearchConfig::default());
        assert_eq!(result, Err(IndexError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_config_validation() {
        assert!(SearchConfig::default().validate().is_ok());
        assert!(SearchConfig { top_k: 0, ..Default::default() }.validate().is_err());
        assert!(SearchConfig { sim_th: 1.5, ..Default::default() }.validate().is_err());
    }
}
