use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use index::{Embedder, cosine};

/// Leading entity mention after an ordinal marker, up to whitespace or a
/// full-width paren: `"3. Alice (..."` -> `Alice`.
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+\.|\[\d+\]\.?)\s*([^\s（]+)").expect("valid entity regex")
});

static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[\d+\]\.?|\d+\.)\s*").expect("valid marker regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub threshold: f32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { threshold: 0.80 }
    }
}

/// Coarse grouping key: the leading entity mention, or the first
/// whitespace token when the line has no recognizable marker.
pub fn bucket_key(line: &str) -> String {
    if let Some(caps) = ENTITY_RE.captures(line) {
        return caps[1].to_string();
    }
    line.split_whitespace().next().unwrap_or_default().to_string()
}

/// Drop a leading `"N."` / `"[N]"` / `"[N]."` marker.
pub fn strip_marker(line: &str) -> &str {
    match MARKER_RE.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// `"[1] ...", "[2] ..."` in the given order.
pub fn renumber<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("[{}] {}", i + 1, strip_marker(line.as_ref())))
        .collect()
}

/// Greedy single-pass clustering of evidence lines.
///
/// A line is compared only with the representatives already kept in its
/// bucket. The first representative at or above the threshold absorbs it;
/// if the new line is strictly longer it takes over that representative's
/// slot, so output order follows first appearance.
#[derive(Default)]
pub struct Deduplicator {
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Cluster pre-embedded lines and renumber the survivors.
    pub fn dedupe_embedded(&self, items: Vec<(String, Vec<f32>)>) -> Vec<String> {
        let total = items.len();
        let mut kept: Vec<(String, Vec<f32>)> = Vec::new();
        let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();

        for (line, vector) in items {
            let slots = buckets.entry(bucket_key(&line)).or_default();

            let duplicate_of = slots
                .iter()
                .copied()
                .find(|&slot| cosine(&kept[slot].1, &vector) >= self.config.threshold);

            match duplicate_of {
                Some(slot) => {
                    if line.chars().count() > kept[slot].0.chars().count() {
                        debug!(slot, "Replacing evidence line with longer variant");
                        kept[slot] = (line, vector);
                    }
                }
                None => {
                    slots.push(kept.len());
                    kept.push((line, vector));
                }
            }
        }

        info!(input = total, kept = kept.len(), buckets = buckets.len(), "Deduplicated evidence");

        let lines: Vec<String> = kept.into_iter().map(|(line, _)| line).collect();
        renumber(&lines)
    }

    /// Embed each line in order, then cluster.
    pub async fn dedupe(&self, lines: Vec<String>, embedder: &dyn Embedder) -> Result<Vec<String>> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let vector = embedder
                .embed(&line)
                .await
                .with_context(|| format!("Failed to embed evidence line: {}", line))?;
            items.push((line, vector));
        }
        Ok(self.dedupe_embedded(items))
    }
}
