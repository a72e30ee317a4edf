use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView1, Axis};
use ndarray_npy::read_npy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};

use crate::error::IndexError;

/// Which part of a stored triple a property blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Head,
    Rel,
    Tail,
}

impl Role {
    pub fn column(self) -> &'static str {
        match self {
            Role::Head => "head_props",
            Role::Rel => "rel_props",
            Role::Tail => "tail_props",
        }
    }
}

/// One stored triple plus its raw JSON property blobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub head: String,
    pub relation: String,
    pub tail: String,
    pub head_props: Option<String>,
    pub rel_props: Option<String>,
    pub tail_props: Option<String>,
}

impl IndexRow {
    pub fn new(head: impl Into<String>, relation: impl Into<String>, tail: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            relation: relation.into(),
            tail: tail.into(),
            ..Default::default()
        }
    }

    pub fn triple(&self) -> extract::Triple {
        extract::Triple::new(&self.head, &self.relation, &self.tail)
    }

    fn raw_props(&self, role: Role) -> Option<&str> {
        match role {
            Role::Head => self.head_props.as_deref(),
            Role::Rel => self.rel_props.as_deref(),
            Role::Tail => self.tail_props.as_deref(),
        }
    }
}

/// Presence of each optional property column in the source table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropColumns {
    pub head: bool,
    pub rel: bool,
    pub tail: bool,
}

impl PropColumns {
    pub fn all() -> Self {
        Self { head: true, rel: true, tail: true }
    }

    pub fn has(&self, role: Role) -> bool {
        match role {
            Role::Head => self.head,
            Role::Rel => self.rel,
            Role::Tail => self.tail,
        }
    }
}

/// Pre-computed KG embeddings aligned row-for-row with their triples.
///
/// Row `i` of the matrix always describes `rows[i]`; construction fails if
/// the counts differ. Normalized copies of all vectors are cached so that a
/// dot product with a unit query vector is the cosine similarity.
pub struct VectorIndex {
    vectors: Array2<f32>,
    normalized: Array2<f32>,
    rows: Vec<IndexRow>,
    columns: PropColumns,
}

impl VectorIndex {
    pub fn new(vectors: Array2<f32>, rows: Vec<IndexRow>, columns: PropColumns) -> Result<Self, IndexError> {
        if vectors.nrows() != rows.len() {
            return Err(IndexError::RowCountMismatch {
                vectors: vectors.nrows(),
                rows: rows.len(),
            });
        }

        let normalized = normalize_rows(&vectors);

        Ok(Self {
            vectors,
            normalized,
            rows,
            columns,
        })
    }

    /// Load an `.npy` matrix and its CSV triple table.
    pub fn load(vectors_path: &Path, table_path: &Path) -> Result<Self> {
        let vectors = read_matrix(vectors_path)?;
        let (rows, columns) = read_table(table_path)?;

        let index = Self::new(vectors, rows, columns)
            .with_context(|| format!("Index files {:?} and {:?} are not aligned", vectors_path, table_path))?;

        info!(
            rows = index.len(),
            dim = index.dim(),
            head_props = columns.head,
            rel_props = columns.rel,
            tail_props = columns.tail,
            "Loaded KG vector index"
        );

        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn vectors(&self) -> &Array2<f32> {
        &self.vectors
    }

    pub fn normalized(&self) -> &Array2<f32> {
        &self.normalized
    }

    pub fn rows(&self) -> &[IndexRow] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&IndexRow> {
        self.rows.get(idx)
    }

    pub fn columns(&self) -> PropColumns {
        self.columns
    }

    /// Cosine similarity of `query` against every stored row.
    pub fn scores(&self, query: &[f32]) -> Result<Vec<f32>, IndexError> {
        if query.len() != self.dim() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim(),
                actual: query.len(),
            });
        }

        Ok(self.normalized.dot(&ArrayView1::from(query)).to_vec())
    }

    /// Parsed property map for one role of one row.
    ///
    /// Absent columns, empty cells and unparsable JSON all give an empty map;
    /// a bad cell only affects its own row.
    pub fn props(&self, idx: usize, role: Role) -> Map<String, Value> {
        if !self.columns.has(role) {
            return Map::new();
        }

        let Some(raw) = self.row(idx).and_then(|row| row.raw_props(role)) else {
            return Map::new();
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!(row = idx, column = role.column(), "Property cell is not a JSON object");
                Map::new()
            }
            Err(e) => {
                warn!(row = idx, column = role.column(), error = %e, "Unparsable property cell");
                Map::new()
            }
        }
    }
}

/// L2-normalize each row; zero rows are left untouched.
fn normalize_rows(vectors: &Array2<f32>) -> Array2<f32> {
    let mut normalized = vectors.clone();
    for mut row in normalized.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row /= norm;
        }
    }
    normalized
}

fn read_matrix(path: &Path) -> Result<Array2<f32>> {
    read_npy::<_, Array2<f32>>(path)
        .or_else(|f32_err| {
            read_npy::<_, Array2<f64>>(path)
                .map(|m| m.mapv(|x| x as f32))
                .map_err(|_| f32_err)
        })
        .with_context(|| format!("Failed to read embedding matrix {:?}", path))
}

fn read_table(path: &Path) -> Result<(Vec<IndexRow>, PropColumns)> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open triple table {:?}", path))?;

    let headers = reader.headers()
        .with_context(|| format!("Failed to read header of {:?}", path))?
        .clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
    };
    let required = |name: &str| position(name).ok_or_else(|| IndexError::MissingColumn(name.to_string()));

    let head = required("head")?;
    let relation = required("relation")?;
    let tail = required("tail")?;
    let head_props = position(Role::Head.column());
    let rel_props = position(Role::Rel.column());
    let tail_props = position(Role::Tail.column());

    let columns = PropColumns {
        head: head_props.is_some(),
        rel: rel_props.is_some(),
        tail: tail_props.is_some(),
    };

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed record {} in {:?}", line + 1, path))?;
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        let props = |col: Option<usize>| {
            col.and_then(|i| record.get(i))
                .filter(|cell| !cell.trim().is_empty())
                .map(str::to_string)
        };

        rows.push(IndexRow {
            head: field(head),
            relation: field(relation),
            tail: field(tail),
            head_props: props(head_props),
            rel_props: props(rel_props),
            tail_props: props(tail_props),
        });
    }

    Ok((rows, columns))
}
