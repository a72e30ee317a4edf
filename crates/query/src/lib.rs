pub mod config;
pub mod dedup;
pub mod judge;
pub mod pipeline;
pub mod render;
pub mod retrieval;
pub mod search;
pub mod verbalize;

pub use config::{AppConfig, PipelineMode};
pub use dedup::{DedupConfig, Deduplicator, bucket_key, renumber, strip_marker};
pub use judge::{Judge, evidence_block};
pub use pipeline::{Outcome, Pipeline, Report};
pub use render::{Detail, DetailMap, Renderer, render_hits, row_detail};
pub use retrieval::{Evidence, EvidenceRetriever, RetrievalTrace};
pub use search::{MatchPolicy, SearchConfig, SearchHit, cosine_search, top_k_indices};
pub use verbalize::TemplateRenderer;
