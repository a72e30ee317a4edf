use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// An entity as returned by the extraction model. `id` is only meaningful
/// inside the response it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub name: Option<String>,
    #[serde(rename = "type", default = "default_entity_type", deserialize_with = "lenient_entity_type")]
    pub entity_type: String,
    #[serde(default, deserialize_with = "lenient_map")]
    pub attributes: Map<String, Value>,
}

/// A relation between one or more source ids and one or more target ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    #[serde(default)]
    pub source: Endpoints,
    #[serde(default)]
    pub target: Endpoints,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub relation: Option<String>,
    /// Some models emit `type` instead of `relation`.
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub evidence: String,
    #[serde(default, deserialize_with = "lenient_map")]
    pub attributes: Map<String, Value>,
}

impl Relation {
    /// Relation label used for graph edges, falling back to `type` and then
    /// to `RELATED_TO`.
    pub fn label(&self) -> &str {
        self.relation
            .as_deref()
            .or(self.kind.as_deref())
            .unwrap_or("RELATED_TO")
    }
}

/// Endpoint ids of a relation. `null` is empty, a scalar is a singleton and
/// a list is kept as-is (non-scalar list items are skipped).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Endpoints(pub Vec<String>);

impl Endpoints {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self(items.iter().filter_map(scalar_id).collect()),
            other => Self(scalar_id(other).into_iter().collect()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'de> Deserialize<'de> for Endpoints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// One raw extraction response: `{entities: [...], relations: [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

impl ExtractionResult {
    /// Lenient conversion from an arbitrary JSON value. Entities and relations
    /// that do not fit the schema are dropped individually instead of failing
    /// the whole response. Returns `None` when `value` is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let entities = records(object.get("entities"))
            .filter_map(|raw| match serde_json::from_value::<Entity>(raw.clone()) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping malformed entity");
                    None
                }
            })
            .collect();

        let relations = records(object.get("relations"))
            .filter_map(|raw| match serde_json::from_value::<Relation>(raw.clone()) {
                Ok(relation) => Some(relation),
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping malformed relation");
                    None
                }
            })
            .collect();

        Some(Self { entities, relations })
    }

    /// id -> name lookup built from the entity list. Later duplicates win.
    pub fn names_by_id(&self) -> std::collections::HashMap<&str, &str> {
        self.entities
            .iter()
            .filter_map(|e| e.name.as_deref().map(|name| (e.id.as_str(), name)))
            .collect()
    }
}

fn records(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Ids may come back as strings or numbers.
pub(crate) fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_id(&value).ok_or_else(|| serde::de::Error::custom("entity id must be a string or number"))
}

// Optional fields below accept `null` and stray types instead of failing
// the whole record.

fn lenient_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_id(&value))
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_scalar(deserializer)?.unwrap_or_default())
}

fn lenient_entity_type<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_scalar(deserializer)?
        .filter(|t| !t.is_empty())
        .unwrap_or_else(default_entity_type))
}

fn lenient_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Map<String, Value>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn default_entity_type() -> String {
    "Entity".to_string()
}
