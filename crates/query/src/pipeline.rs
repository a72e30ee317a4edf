use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use extract::prompt::{ANSWERER_ROLE, VERIFIER_ROLE};
use extract::{Extractor, LanguageModel, OllamaClient, Triple};
use index::{CachedEmbedder, Embedder, EmbeddingClient, VectorIndex};

use crate::config::{AppConfig, PipelineMode};
use crate::judge::{Judge, evidence_block};
use crate::render::Renderer;
use crate::retrieval::{Evidence, EvidenceRetriever};
use crate::verbalize::TemplateRenderer;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub triples: Vec<Triple>,
    pub evidence: Evidence,
    pub block: String,
    pub verdict: String,
}

/// How a run ended. The first two variants stop before judgment.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    NoTriples,
    NoEvidence { triples: Vec<Triple> },
    Judged(Report),
}

/// Extraction, retrieval and judgment over one loaded index.
pub struct Pipeline {
    config: AppConfig,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    renderer: Arc<dyn Renderer>,
    extractor: Extractor,
    judge: Judge,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        renderer: Arc<dyn Renderer>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        let role = match config.mode {
            PipelineMode::Answerer => ANSWERER_ROLE,
            PipelineMode::Verifier => VERIFIER_ROLE,
        };

        Self {
            extractor: Extractor::new(llm.clone()),
            judge: Judge::new(llm, role),
            config,
            index,
            embedder,
            renderer,
        }
    }

    /// Load the index from `config.paths` and wire up the HTTP collaborators.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let start = Instant::now();
        let index = VectorIndex::load(&config.paths.vectors, &config.paths.table)?;
        info!(
            rows = index.len(),
            dim = index.dim(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Index ready"
        );

        let llm = OllamaClient::new(config.llm.base_url.clone(), config.llm.model.clone())
            .with_temperature(config.llm.temperature);
        let embedder = CachedEmbedder::new(
            EmbeddingClient::new(config.embedding.base_url.clone(), config.embedding.model.clone()),
            config.embedding.cache_entries,
        );

        Ok(Self::new(
            config,
            index,
            Arc::new(embedder),
            Arc::new(TemplateRenderer),
            Arc::new(llm),
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub async fn run(&self, text: &str) -> Result<Outcome> {
        let rounds = match self.config.mode {
            PipelineMode::Answerer => 1,
            PipelineMode::Verifier => self.config.extraction.rounds,
        };

        let triples = self.extractor.extract_rounds(text, rounds).await;
        if triples.is_empty() {
            warn!("No triples extracted; aborting");
            return Ok(Outcome::NoTriples);
        }
        info!(triples = triples.len(), rounds, "Extracted query triples");

        let retriever = EvidenceRetriever::new(
            &self.index,
            self.embedder.as_ref(),
            self.renderer.as_ref(),
            self.config.retrieval.clone(),
            self.config.dedup.clone(),
        );
        let evidence = retriever.evidence(&triples).await?;
        if evidence.is_empty() {
            warn!(triples = triples.len(), "No evidence above threshold; aborting");
            return Ok(Outcome::NoEvidence { triples });
        }

        let label = match self.config.mode {
            PipelineMode::Answerer => "Question",
            PipelineMode::Verifier => "Source",
        };
        let block = evidence_block(label, text, &evidence.lines);
        let verdict = self.judge.judge(&block).await?;

        Ok(Outcome::Judged(Report {
            triples,
            evidence,
            block,
            verdict,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use index::{IndexRow, PropColumns};
    use ndarray::array;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Extraction prompts get a fixed JSON reply; anything else is judgment.
    struct FakeModel {
        extraction: String,
        extraction_calls: AtomicUsize,
    }

    impl FakeModel {
        fn new(extraction: &str) -> Arc<Self> {
            Arc::new(Self {
                extraction: extraction.to_string(),
                extraction_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if prompt.contains("JSON OUTPUT:") {
                self.extraction_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.extraction.clone())
            } else {
                Ok("SUPPORTED by [1]".to_string())
            }
        }
    }

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("Acme") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    const ACME_REPLY: &str = r#"{"entities": [{"id": "E1", "name": "Acme"}, {"id": "E2", "name": "Widgets"}],
        "relations": [{"source": "E1", "target": "E2", "relation": "acquired"}]}"#;

    fn pipeline(config: AppConfig, model: Arc<FakeModel>) -> Pipeline {
        let index = VectorIndex::new(
            array![[1.0f32, 0.0], [0.0, 1.0]],
            vec![
                IndexRow::new("Acme", "bought", "Widgets"),
                IndexRow::new("Paris", "capital_of", "France"),
            ],
            PropColumns::default(),
        )
        .unwrap();
        Pipeline::new(config, index, Arc::new(AxisEmbedder), Arc::new(TemplateRenderer), model)
    }

    #[tokio::test]
    async fn test_verifier_run_is_judged() {
        let model = FakeModel::new(ACME_REPLY);
        let pipeline = pipeline(AppConfig::verifier_mode(), model.clone());

        let report = match pipeline.run("Acme acquired Widgets last year.").await.unwrap() {
            Outcome::Judged(report) => report,
            other => panic!("expected a judged outcome, got {:?}", other),
        };

        assert_eq!(model.extraction_calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.triples, vec![Triple::new("Acme", "acquired", "Widgets")]);
        assert_eq!(report.evidence.lines.len(), 1);
        assert!(report.evidence.lines[0].starts_with("[1] Acme (subject)"));
        assert!(report.block.starts_with("[Source]\n```\nAcme acquired Widgets last year.\n```"));
        assert_eq!(report.verdict, "SUPPORTED by [1]");
    }

    #[tokio::test]
    async fn test_answerer_makes_one_extraction_call() {
        let model = FakeModel::new(ACME_REPLY);
        let pipeline = pipeline(AppConfig::answerer_mode(), model.clone());

        let outcome = pipeline.run("Who bought Widgets?").await.unwrap();
        assert_eq!(model.extraction_calls.load(Ordering::SeqCst), 1);
        match outcome {
            Outcome::Judged(report) => assert!(report.block.starts_with("[Question]")),
            other => panic!("expected a judged outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_abort_outcomes() {
        let pipeline_without_triples = pipeline(AppConfig::answerer_mode(), FakeModel::new("{}"));
        assert!(matches!(
            pipeline_without_triples.run("text").await.unwrap(),
            Outcome::NoTriples
        ));

        let unrelated = r#"{"entities": [{"id": 1, "name": "Zed"}, {"id": 2, "name": "Nowhere"}],
            "relations": [{"source": 1, "target": 2, "relation": "visited"}]}"#;
        // Scores 1.0 against the Paris row but shares no endpoint with it
        let pipeline_without_evidence = pipeline(AppConfig::verifier_mode(), FakeModel::new(unrelated));
        match pipeline_without_evidence.run("text").await.unwrap() {
            Outcome::NoEvidence { triples } => {
                assert_eq!(triples, vec![Triple::new("Zed", "visited", "Nowhere")]);
            }
            other => panic!("expected no evidence, got {:?}", other),
        }
    }
}
