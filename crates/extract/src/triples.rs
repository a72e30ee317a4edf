use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::schema::ExtractionResult;

/// A (head, relation, tail) candidate edge. Identity is the exact ordered
/// tuple of the three strings; no case folding or trimming is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub head: String,
    pub relation: String,
    pub tail: String,
}

/// Owned field tuple of a triple, used to key renderer detail maps.
pub type TripleKey = (String, String, String);

impl Triple {
    pub fn new(head: impl Into<String>, relation: impl Into<String>, tail: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            relation: relation.into(),
            tail: tail.into(),
        }
    }

    pub fn key(&self) -> TripleKey {
        (self.head.clone(), self.relation.clone(), self.tail.clone())
    }

    /// Text fed to the embedding model for this triple.
    pub fn to_text(&self) -> String {
        format!("{} {} {}", self.head, self.relation, self.tail)
    }

    /// Normalize one loosely shaped record into a triple.
    ///
    /// Accepts objects using `head`/`source`/`source_name`, `relation` and
    /// `tail`/`target`/`target_name`, or sequences of at least three scalars.
    /// Nulls, strings, empty values and short sequences yield `None`.
    pub fn from_record(raw: &Value) -> Option<Self> {
        if !is_truthy(raw) {
            return None;
        }

        let (head, relation, tail) = match raw {
            Value::Object(map) => (
                first_alias(map, &["head", "source", "source_name"]),
                map.get("relation").and_then(scalar_text),
                first_alias(map, &["tail", "target", "target_name"]),
            ),
            Value::Array(items) => {
                if items.len() < 3 {
                    return None;
                }
                (
                    scalar_text(&items[0]),
                    scalar_text(&items[1]),
                    scalar_text(&items[2]),
                )
            }
            _ => return None,
        };

        Some(Self {
            head: head?,
            relation: relation?,
            tail: tail?,
        })
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.head, self.relation, self.tail)
    }
}

/// Flatten one raw extraction response into triples.
///
/// Two shapes are understood: the entities/relations schema, whose endpoint
/// ids are resolved to entity names, and the flat
/// `{"triples": [{"subject", "relation", "object"}]}` schema. Relations whose
/// endpoints do not resolve to a non-empty name, or that have no relation
/// label, are dropped. Returns `None` when `value` is not a JSON object.
pub fn json_to_triples(value: &Value) -> Option<Vec<Triple>> {
    let object = value.as_object()?;

    if let Some(flat) = object.get("triples").and_then(Value::as_array) {
        let triples = flat
            .iter()
            .filter_map(|t| {
                let field = |name: &str| {
                    t.get(name)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                };
                Some(Triple::new(field("subject")?, field("relation")?, field("object")?))
            })
            .collect();
        return Some(triples);
    }

    let extraction = ExtractionResult::from_value(value)?;
    let names = extraction.names_by_id();
    let resolve = |id: &str| names.get(id).copied().filter(|name| !name.is_empty());

    let mut triples = Vec::new();
    for relation in &extraction.relations {
        let Some(label) = relation.relation.as_deref().filter(|r| !r.is_empty()) else {
            continue;
        };
        for source in relation.source.iter() {
            for target in relation.target.iter() {
                if let (Some(head), Some(tail)) = (resolve(source), resolve(target)) {
                    triples.push(Triple::new(head, label, tail));
                }
            }
        }
    }

    Some(triples)
}

/// Merge loosely shaped per-round records into one canonical list.
///
/// Records are visited in concatenated round order; malformed ones are
/// skipped and exact duplicates keep only their first occurrence.
pub fn merge_triples<R, I>(rounds: R) -> Vec<Triple>
where
    R: IntoIterator<Item = I>,
    I: IntoIterator<Item = Value>,
{
    dedup_in_order(
        rounds
            .into_iter()
            .flatten()
            .filter_map(|raw| Triple::from_record(&raw)),
    )
}

/// Merge already typed rounds, keeping first occurrences.
pub fn merge_rounds<R>(rounds: R) -> Vec<Triple>
where
    R: IntoIterator<Item = Vec<Triple>>,
{
    dedup_in_order(rounds.into_iter().flatten())
}

fn dedup_in_order(triples: impl Iterator<Item = Triple>) -> Vec<Triple> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for triple in triples {
        if seen.insert(triple.clone()) {
            merged.push(triple);
        }
    }

    merged
}

/// First alias holding a truthy value; if none does, whatever the last alias
/// holds (which may be an empty string).
fn first_alias(map: &serde_json::Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|alias| map.get(*alias))
        .find(|v| is_truthy(v))
        .or_else(|| aliases.last().and_then(|last| map.get(*last)))
        .and_then(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_triples_resolves_names() {
        let response = json!({
            "entities": [
                {"id": "E1", "name": "Taipei"},
                {"id": "E2", "name": "Taiwan"},
                {"id": "E3", "name": ""}
            ],
            "relations": [
                {"source": "E1", "target": "E2", "relation": "capital_of"},
                {"source": "E1", "target": "E3", "relation": "near"},
                {"source": "E1", "target": "E9", "relation": "near"},
                {"source": "E2", "target": "E1"}
            ]
        });

        let triples = json_to_triples(&response).unwrap();
        assert_eq!(triples, vec![Triple::new("Taipei", "capital_of", "Taiwan")]);
    }

    #[test]
    fn test_json_to_triples_tolerates_null_optional_fields() {
        let response = json!({
            "entities": [
                {"id": "E1", "name": "Acme", "type": null},
                {"id": "E2", "name": "Widgets", "attributes": null},
                {"id": "E3", "name": 2019}
            ],
            "relations": [
                {"source": "E1", "target": "E2", "relation": "acquired", "evidence": null},
                {"source": "E1", "target": "E3", "relation": "founded_in", "attributes": null}
            ]
        });

        let triples = json_to_triples(&response).unwrap();
        assert_eq!(
            triples,
            vec![
                Triple::new("Acme", "acquired", "Widgets"),
                Triple::new("Acme", "founded_in", "2019"),
            ]
        );
    }

    #[test]
    fn test_json_to_triples_expands_list_endpoints() {
        let response = json!({
            "entities": [
                {"id": "a", "name": "A"},
                {"id": "b", "name": "B"},
                {"id": "x", "name": "X"}
            ],
            "relations": [{"source": ["a", "b"], "target": "x", "relation": "funds"}]
        });

        let triples = json_to_triples(&response).unwrap();
        assert_eq!(
            triples,
            vec![Triple::new("A", "funds", "X"), Triple::new("B", "funds", "X")]
        );
    }

    #[test]
    fn test_json_to_triples_flat_schema() {
        let response = json!({
            "triples": [
                {"subject": "Alice", "relation": "works_at", "object": "Acme"},
                {"subject": "Bob", "relation": "works_at"},
                {"subject": "", "relation": "r", "object": "o"}
            ]
        });

        let triples = json_to_triples(&response).unwrap();
        assert_eq!(triples, vec![Triple::new("Alice", "works_at", "Acme")]);
        assert!(json_to_triples(&json!("not an object")).is_none());
    }

    #[test]
    fn test_merge_skips_malformed_and_keeps_first() {
        let round1 = vec![
            json!({"head": "A", "relation": "r", "tail": "B"}),
            Value::Null,
            json!("A r B"),
            json!(["A", "r"]),
            json!({"source": "C", "relation": "r", "target_name": "D"}),
        ];
        let round2 = vec![
            json!(["A", "r", "B"]),
            json!({"head": "", "source_name": "E", "relation": "r", "tail": "F"}),
            json!({"head": "G", "tail": "H"}),
            json!({"head": "C", "relation": "r", "tail": "D"}),
        ];

        let merged = merge_triples(vec![round1, round2]);
        assert_eq!(
            merged,
            vec![
                Triple::new("A", "r", "B"),
                Triple::new("C", "r", "D"),
                Triple::new("E", "r", "F"),
            ]
        );
    }

    #[test]
    fn test_merge_is_case_sensitive() {
        let merged = merge_rounds(vec![
            vec![Triple::new("a", "r", "b")],
            vec![Triple::new("A", "r", "b"), Triple::new("a", "r", "b")],
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], Triple::new("a", "r", "b"));
    }

    #[test]
    fn test_merge_output_is_duplicate_free() {
        let rounds = (0..3).map(|round| {
            (0..5)
                .map(|i| json!([format!("h{}", i % 3), "rel", format!("t{}", (i + round) % 2)]))
                .collect::<Vec<_>>()
        });

        let merged = merge_triples(rounds);
        let unique: HashSet<_> = merged.iter().collect();
        assert_eq!(unique.len(), merged.len());
        assert_eq!(merged[0], Triple::new("h0", "rel", "t0"));
    }
}
