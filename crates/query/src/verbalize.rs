use serde_json::{Map, Value};

use extract::Triple;

use crate::render::{Detail, DetailMap, Renderer};

const EXCLUDED_KEYS: [&str; 3] = ["id", "doc_id", "name"];

/// Default renderer: one templated English sentence per triple.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRenderer;

impl Renderer for TemplateRenderer {
    fn render(&self, triples: &[Triple], details: &DetailMap) -> String {
        let empty = Detail::default();
        triples
            .iter()
            .enumerate()
            .map(|(i, triple)| {
                let detail = details.get(&triple.key()).unwrap_or(&empty);
                verbalize(i + 1, triple, detail)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `"{idx}. {head} is linked to {tail} via [{relation}]; evidence: {desc}."`
pub fn verbalize(idx: usize, triple: &Triple, detail: &Detail) -> String {
    let head = format_entity(&triple.head, &detail.head, "subject");
    let tail = format_entity(&triple.tail, &detail.tail, "object");

    let desc = detail
        .rel
        .get("evidence")
        .map(display)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| triple.relation.clone());

    let time = ["date", "time"]
        .iter()
        .filter_map(|key| detail.rel.get(*key))
        .map(display)
        .find(|s| !s.is_empty())
        .map(|when| format!("; event time: {}", when))
        .unwrap_or_default();

    format!(
        "{}. {} is linked to {} via [{}]; evidence: {}{}.",
        idx, head, tail, triple.relation, desc, time
    )
}

/// `name (k:v; k:v)`, or `name (role)` when there is nothing to show.
pub fn format_entity(name: &str, props: &Map<String, Value>, role: &str) -> String {
    let formatted = format_props(props);
    if formatted.is_empty() {
        format!("{} ({})", name, role)
    } else {
        format!("{} ({})", name, formatted)
    }
}

/// `k:v; k:v` over non-null props, `type` first, skipping identity keys.
pub fn format_props(props: &Map<String, Value>) -> String {
    let type_first = props.get_key_value("type").into_iter().chain(
        props.iter().filter(|(k, _)| k.as_str() != "type"),
    );

    type_first
        .filter(|(k, v)| !EXCLUDED_KEYS.contains(&k.as_str()) && !v.is_null())
        .map(|(k, v)| format!("{}:{}", k, display(v)))
        .collect::<Vec<_>>()
        .join("; ")
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
