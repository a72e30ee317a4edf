use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use extract::Triple;
use index::{Embedder, VectorIndex};

use crate::dedup::{DedupConfig, Deduplicator};
use crate::render::{Renderer, render_hits};
use crate::search::{SearchConfig, cosine_search};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalTrace {
    pub triples_queried: usize,
    pub rows_matched: usize,
    pub lines_rendered: usize,
    pub lines_kept: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub lines: Vec<String>,
    pub trace: RetrievalTrace,
}

impl Evidence {
    /// No evidence survived; callers abort the run on this.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Search, render and dedup over one loaded index.
///
/// Both pipeline modes go through here; they differ only in the
/// [`SearchConfig`] they pass in.
pub struct EvidenceRetriever<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn Embedder,
    renderer: &'a dyn Renderer,
    search: SearchConfig,
    dedup: Deduplicator,
}

impl<'a> EvidenceRetriever<'a> {
    pub fn new(
        index: &'a VectorIndex,
        embedder: &'a dyn Embedder,
        renderer: &'a dyn Renderer,
        search: SearchConfig,
        dedup: DedupConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            renderer,
            search,
            dedup: Deduplicator::new(dedup),
        }
    }

    /// Raw evidence lines for `triples`, queried in order.
    pub async fn retrieve(&self, triples: &[Triple]) -> Result<(Vec<String>, RetrievalTrace)> {
        let mut lines = Vec::new();
        let mut trace = RetrievalTrace {
            triples_queried: triples.len(),
            ..Default::default()
        };

        for triple in triples {
            let query_vec = self
                .embedder
                .embed_triple(triple)
                .await
                .with_context(|| format!("Failed to embed query triple {}", triple))?;

            let hits = cosine_search(self.index, triple, &query_vec, &self.search)?;
            debug!(query = %triple, matched = hits.len(), "Searched index");

            trace.rows_matched += hits.len();
            lines.extend(render_hits(self.index, &hits, self.renderer));
        }

        trace.lines_rendered = lines.len();
        Ok((lines, trace))
    }

    /// Deduplicated, renumbered evidence for `triples`.
    pub async fn evidence(&self, triples: &[Triple]) -> Result<Evidence> {
        let (raw, mut trace) = self.retrieve(triples).await?;

        let lines = self
            .dedup
            .dedupe(raw, self.embedder)
            .await
            .context("Failed to deduplicate evidence")?;
        trace.lines_kept = lines.len();

        info!(
            triples = trace.triples_queried,
            matched = trace.rows_matched,
            rendered = trace.lines_rendered,
            kept = trace.lines_kept,
            "Retrieved evidence"
        );

        Ok(Evidence { lines, trace })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MatchPolicy;
    use crate::verbalize::TemplateRenderer;
    use async_trait::async_trait;
    use index::{IndexRow, PropColumns};
    use ndarray::array;

    /// Query triples embed by head; evidence lines embed to a shared vector
    /// so lines for the same entity collapse.
    struct HeadEmbedder;

    #[async_trait]
    impl Embedder for HeadEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("Alice") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    fn kg() -> VectorIndex {
        let mut rows = vec![
            IndexRow::new("Alice", "works_at", "Acme"),
            IndexRow::new("Alice", "works_at", "Acme Corp"),
            IndexRow::new("Bob", "lives_in", "Paris"),
        ];
        rows[1].rel_props = Some(r#"{"evidence": "Alice has worked at Acme Corp since 2019"}"#.into());
        VectorIndex::new(
            array![[1.0f32, 0.0], [0.99, 0.141], [0.0, 1.0]],
            rows,
            PropColumns::all(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_evidence_is_deduplicated_and_numbered() {
        let index = kg();
        let retriever = EvidenceRetriever::new(
            &index,
            &HeadEmbedder,
            &TemplateRenderer,
            SearchConfig::default(),
            DedupConfig::default(),
        );

        let evidence = retriever
            .evidence(&[Triple::new("Alice", "employed_by", "Acme")])
            .await
            .unwrap();

        assert_eq!(evidence.trace.rows_matched, 2);
        assert_eq!(evidence.trace.lines_rendered, 2);
        assert_eq!(evidence.lines.len(), 1);
        assert!(evidence.lines[0].starts_with("[1] Alice (subject)"));
        assert!(evidence.lines[0].contains("since 2019"));
    }

    #[tokio::test]
    async fn test_shared_endpoint_policy_filters_rows() {
        let index = kg();
        let search = SearchConfig {
            sim_th: -1.0,
            policy: MatchPolicy::SharedEndpoint,
            ..Default::default()
        };
        let retriever =
            EvidenceRetriever::new(&index, &HeadEmbedder, &TemplateRenderer, search, DedupConfig::default());

        let (lines, trace) = retriever
            .retrieve(&[Triple::new("Carol", "visited", "Paris")])
            .await
            .unwrap();

        assert_eq!(trace.rows_matched, 1);
        assert!(lines[0].contains("Bob (subject)"));
    }

    #[tokio::test]
    async fn test_no_match_yields_empty_evidence() {
        let index = kg();
        let search = SearchConfig { policy: MatchPolicy::SharedEndpoint, ..Default::default() };
        let retriever =
            EvidenceRetriever::new(&index, &HeadEmbedder, &TemplateRenderer, search, DedupConfig::default());

        // Scores 1.0 against the Bob row, but shares neither endpoint with it
        let evidence = retriever.evidence(&[Triple::new("Zed", "x", "y")]).await.unwrap();
        assert!(evidence.is_empty());
        assert_eq!(evidence.trace.triples_queried, 1);
        assert_eq!(evidence.trace.rows_matched, 0);

        let none = retriever.evidence(&[]).await.unwrap();
        assert!(none.is_empty());
        assert_eq!(none.trace, RetrievalTrace::default());
    }
}
