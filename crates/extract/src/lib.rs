pub mod json;
pub mod llm;
pub mod prompt;
pub mod schema;
pub mod transform;
pub mod triples;

pub use llm::{LanguageModel, OllamaClient};
pub use schema::{Endpoints, Entity, ExtractionResult, Relation};
pub use transform::{Edge, GraphBatch, Node};
pub use triples::{Triple, TripleKey, json_to_triples, merge_rounds, merge_triples};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Extractor {
    llm: Arc<dyn LanguageModel>,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub fn default() -> Self {
        Self::new(Arc::new(OllamaClient::default()))
    }

    /// Ask the model for an extraction and return the parsed JSON reply.
    pub async fn extract_raw(&self, text: &str) -> Result<serde_json::Value> {
        let prompt = prompt::build_extraction_prompt(text);

        let reply = self.llm
            .generate_json(&prompt)
            .await
            .context("Extraction request failed")?;

        if reply.trim().is_empty() {
            anyhow::bail!("Model returned an empty extraction");
        }

        json::extract_json_block(&reply)
            .or_else(|| json::safe_json_loads(&reply).ok())
            .context("Model reply did not contain a JSON object")
    }

    /// Single extraction call flattened into triples.
    pub async fn extract_triples(&self, text: &str) -> Result<Vec<Triple>> {
        let value = self.extract_raw(text).await?;
        Ok(json_to_triples(&value).unwrap_or_default())
    }

    /// Run `rounds` independent extractions over the same text and merge them.
    ///
    /// Rounds that fail or come back unparsable are skipped; if every round
    /// fails the result is empty and the last error is logged.
    pub async fn extract_rounds(&self, text: &str, rounds: usize) -> Vec<Triple> {
        let mut collected = Vec::with_capacity(rounds);
        let mut last_error = None;

        for round in 1..=rounds {
            let start = Instant::now();
            match self.extract_raw(text).await {
                Ok(value) => match json_to_triples(&value) {
                    Some(triples) => {
                        info!(
                            round,
                            triples = triples.len(),
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Extraction round finished"
                        );
                        collected.push(triples);
                    }
                    None => warn!(round, "Extraction reply was not a JSON object"),
                },
                Err(e) => {
                    warn!(round, error = %e, "Extraction round failed");
                    last_error = Some(e);
                }
            }
        }

        if collected.is_empty() {
            if let Some(e) = last_error {
                warn!(error = %e, "All extraction rounds failed");
            }
            return Vec::new();
        }

        merge_rounds(collected)
    }

    /// Single extraction call converted into loadable graph records.
    pub async fn extract_graph(&self, text: &str) -> Result<GraphBatch> {
        let value = self.extract_raw(text).await?;
        Ok(transform::value_to_graph(&value))
    }
}
