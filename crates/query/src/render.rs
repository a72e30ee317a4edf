use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use extract::{Triple, TripleKey};
use index::{Role, VectorIndex};

use crate::search::SearchHit;

/// Property maps for the three roles of one triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Detail {
    pub head: Map<String, Value>,
    pub rel: Map<String, Value>,
    pub tail: Map<String, Value>,
}

pub type DetailMap = HashMap<TripleKey, Detail>;

/// Turns triples into numbered natural-language lines, one per triple,
/// each starting with an ordinal marker.
pub trait Renderer: Send + Sync {
    fn render(&self, triples: &[Triple], details: &DetailMap) -> String;
}

/// Stored triple and parsed property maps for one index row.
pub fn row_detail(index: &VectorIndex, row: usize) -> Option<(Triple, Detail)> {
    let stored = index.row(row)?;
    let detail = Detail {
        head: index.props(row, Role::Head),
        rel: index.props(row, Role::Rel),
        tail: index.props(row, Role::Tail),
    };
    Some((stored.triple(), detail))
}

/// Render matched rows in hit order.
///
/// The renderer is called once per row with a single triple, so each row
/// maps to its own line(s) in the output.
pub fn render_hits(index: &VectorIndex, hits: &[SearchHit], renderer: &dyn Renderer) -> Vec<String> {
    let mut lines = Vec::new();

    for hit in hits {
        let Some((triple, detail)) = row_detail(index, hit.row) else {
            continue;
        };
        let details = DetailMap::from([(triple.key(), detail)]);
        let block = renderer.render(std::slice::from_ref(&triple), &details);
        lines.extend(block.lines().map(str::to_string));
    }

    lines
}
