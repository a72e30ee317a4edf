use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::ExtractionResult;

/// Graph node ready for loading. Entity attributes are flattened onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// One directed edge expanded from a (possibly many-to-many) relation.
/// Unresolved endpoint names are empty strings; deciding whether to keep
/// such edges is up to the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub source_name: String,
    pub target_name: String,
    pub relation: String,
    pub evidence: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphBatch {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Convert one extraction response into nodes and edges.
///
/// Each relation yields the cartesian product of its source and target ids;
/// a relation with no source or no target contributes nothing.
pub fn to_graph(extraction: &ExtractionResult) -> GraphBatch {
    let nodes = extraction
        .entities
        .iter()
        .map(|entity| Node {
            id: entity.id.clone(),
            name: entity.name.clone(),
            node_type: entity.entity_type.clone(),
            attributes: entity.attributes.clone(),
        })
        .collect();

    let names = extraction.names_by_id();
    let name_of = |id: &str| names.get(id).map(|n| n.to_string()).unwrap_or_default();

    let mut edges = Vec::new();
    for relation in &extraction.relations {
        if relation.source.is_empty() || relation.target.is_empty() {
            tracing::debug!(relation = relation.label(), "Skipping relation without endpoints");
            continue;
        }

        for source in relation.source.iter() {
            for target in relation.target.iter() {
                edges.push(Edge {
                    source: source.to_string(),
                    target: target.to_string(),
                    source_name: name_of(source),
                    target_name: name_of(target),
                    relation: relation.label().to_string(),
                    evidence: relation.evidence.clone(),
                    attributes: relation.attributes.clone(),
                });
            }
        }
    }

    GraphBatch { nodes, edges }
}

/// Same as [`to_graph`] but starting from raw JSON. Non-object input gives an
/// empty batch.
pub fn value_to_graph(value: &Value) -> GraphBatch {
    ExtractionResult::from_value(value)
        .map(|extraction| to_graph(&extraction))
        .unwrap_or_default()
}
