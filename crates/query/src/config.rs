use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::dedup::DedupConfig;
use crate::search::{MatchPolicy, SearchConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: PipelineMode,
    pub retrieval: SearchConfig,
    pub dedup: DedupConfig,
    pub extraction: ExtractionConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    Answerer, // Question in, answer grounded in the KG out
    Verifier, // News text in, per-claim verdict out
}

impl FromStr for PipelineMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "answerer" => Ok(Self::Answerer),
            "verifier" => Ok(Self::Verifier),
            other => anyhow::bail!("Unknown pipeline mode: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub rounds: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub cache_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub vectors: PathBuf,
    pub table: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            temperature: 0.4,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            cache_entries: 10000,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            vectors: PathBuf::from("data/processed/knowledge-graph/kg-triplet.emb.npy"),
            table: PathBuf::from("data/raw/knowledge-graph/neo4j-kg-raw-graph.csv"),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::verifier_mode()
    }
}

impl AppConfig {
    pub fn answerer_mode() -> Self {
        Self {
            mode: PipelineMode::Answerer,
            retrieval: SearchConfig {
                top_k: 100,
                sim_th: 0.80,
                policy: MatchPolicy::Similarity,
            },
            dedup: DedupConfig::default(),
            extraction: ExtractionConfig { rounds: 1 },
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            paths: PathsConfig::default(),
        }
    }

    pub fn verifier_mode() -> Self {
        Self {
            mode: PipelineMode::Verifier,
            retrieval: SearchConfig {
                top_k: 100,
                sim_th: 0.80,
                policy: MatchPolicy::SharedEndpoint,
            },
            dedup: DedupConfig::default(),
            extraction: ExtractionConfig { rounds: 3 },
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            paths: PathsConfig::default(),
        }
    }

    /// Preset for `PIPELINE_MODE` overlaid with the remaining variables.
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mode = match lookup("PIPELINE_MODE") {
            Some(raw) => raw.parse::<PipelineMode>().context("Invalid PIPELINE_MODE")?,
            None => PipelineMode::Verifier,
        };

        let mut config = match mode {
            PipelineMode::Answerer => Self::answerer_mode(),
            PipelineMode::Verifier => Self::verifier_mode(),
        };

        if let Some(path) = lookup("KG_EMB_PATH") {
            config.paths.vectors = PathBuf::from(path);
        }
        if let Some(path) = lookup("KG_CSV_PATH") {
            config.paths.table = PathBuf::from(path);
        }
        if let Some(path) = lookup("OUTPUT_DIR") {
            config.paths.output_dir = PathBuf::from(path);
        }
        if let Some(top_k) = parse_var(&lookup, "TOP_K")? {
            config.retrieval.top_k = top_k;
        }
        if let Some(sim_th) = parse_var(&lookup, "SIM_TH")? {
            config.retrieval.sim_th = sim_th;
        }
        if let Some(threshold) = parse_var(&lookup, "DUP_TH")? {
            config.dedup.threshold = threshold;
        }
        if let Some(rounds) = parse_var(&lookup, "LLM_ROUNDS")? {
            config.extraction.rounds = rounds;
        }
        if let Some(url) = lookup("LLM_URL") {
            config.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(url) = lookup("EMBED_URL") {
            config.embedding.base_url = url;
        }
        if let Some(model) = lookup("EMBED_MODEL") {
            config.embedding.model = model;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;
        if !(-1.0..=1.0).contains(&self.dedup.threshold) {
            anyhow::bail!("dedup threshold must be in [-1, 1], got {}", self.dedup.threshold);
        }
        if self.extraction.rounds == 0 {
            anyhow::bail!("extraction rounds must be positive");
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", key, raw, e)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_presets() {
        let answerer = AppConfig::answerer_mode();
        assert_eq!(answerer.mode, PipelineMode::Answerer);
        assert_eq!(answerer.retrieval.policy, MatchPolicy::Similarity);
        assert_eq!(answerer.extraction.rounds, 1);

        let verifier = AppConfig::default();
        assert_eq!(verifier.mode, PipelineMode::Verifier);
        assert_eq!(verifier.retrieval.policy, MatchPolicy::SharedEndpoint);
        assert_eq!(verifier.extraction.rounds, 3);
        assert_eq!(verifier.retrieval.top_k, 100);

        assert!(answerer.validate().is_ok());
        assert!(verifier.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("PIPELINE_MODE", "Answerer"),
            ("TOP_K", "25"),
            ("SIM_TH", "0.7"),
            ("DUP_TH", " 0.9 "),
            ("KG_CSV_PATH", "/tmp/kg.csv"),
            ("LLM_MODEL", "qwen2"),
        ]))
        .unwrap();

        assert_eq!(config.mode, PipelineMode::Answerer);
        assert_eq!(config.retrieval.top_k, 25);
        assert!((config.retrieval.sim_th - 0.7).abs() < 1e-6);
        assert!((config.dedup.threshold - 0.9).abs() < 1e-6);
        assert_eq!(config.paths.table, PathBuf::from("/tmp/kg.csv"));
        assert_eq!(config.llm.model, "qwen2");
        assert_eq!(config.extraction.rounds, 1);
    }

    #[test]
    fn test_bad_values_name_the_variable() {
        let err = AppConfig::from_lookup(lookup_from(&[("TOP_K", "many")])).unwrap_err();
        assert!(err.to_string().contains("TOP_K"));

        assert!(AppConfig::from_lookup(lookup_from(&[("PIPELINE_MODE", "judge")])).is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.extraction.rounds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.dedup.threshold = 2.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_mode_is_lowercase() {
        let json = serde_json::to_value(AppConfig::answerer_mode()).unwrap();
        assert_eq!(json["mode"], "answerer");
        assert_eq!(json["retrieval"]["policy"], "similarity");
    }
}
