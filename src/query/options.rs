use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::core::types::Document;

/// Sort direction for one result field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Post-processing options for the find family.
///
/// Single-result operations honor `select` only. Multi-result operations
/// apply sort, select, skip, limit and sum in that order, and only when
/// the result set is non-empty.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub select: Option<Vec<String>>,
    pub sort: Option<(String, SortDirection)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub sum: Option<String>,
}

impl FindOptions {
    pub fn new() -> Self {
        FindOptions::default()
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some((field.into(), direction));
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn sum(mut self, field: impl Into<String>) -> Self {
        self.sum = Some(field.into());
        self
    }
}

/// Runs the multi-result pipeline over `docs` in place. Summing collapses
/// the results into a single `{field: total}` document.
pub fn apply_multi(docs: &mut Vec<Document>, options: &FindOptions) {
    if docs.is_empty() {
        return;
    }
    if let Some((field, direction)) = &options.sort {
        docs.sort_unstable_by(|a, b| compare_values(a.get(field), b.get(field)));
        if *direction == SortDirection::Descending {
            docs.reverse();
        }
    }
    if let Some(fields) = &options.select {
        for doc in docs.iter_mut() {
            *doc = project(doc, fields);
        }
    }
    if let Some(skip) = options.skip {
        if skip >= docs.len() {
            docs.clear();
        } else {
            docs.drain(..skip);
        }
    }
    if let Some(limit) = options.limit {
        docs.truncate(limit);
    }
    if let Some(field) = &options.sum {
        let total = sum_field(docs, field);
        let mut doc = Document::new();
        doc.set(field.clone(), total);
        docs.clear();
        docs.push(doc);
    }
}

/// Single-result operations reduce the document to the selected fields.
pub fn apply_single(doc: &mut Document, options: &FindOptions) {
    if let Some(fields) = &options.select {
        *doc = project(doc, fields);
    }
}

fn project(doc: &Document, fields: &[String]) -> Document {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = doc.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    Document::from(out)
}

/// Totals a numeric field. The sum stays integral until a fractional
/// value (or an integer overflow) forces it to a float. Non-numeric and
/// missing values are skipped.
fn sum_field(docs: &[Document], field: &str) -> Value {
    let mut int_total: i64 = 0;
    let mut float_total: f64 = 0.0;
    let mut is_float = false;
    for doc in docs {
        let Some(value) = doc.get(field) else { continue };
        if !is_float {
            if let Some(n) = value.as_i64() {
                match int_total.checked_add(n) {
                    Some(total) => int_total = total,
                    None => {
                        is_float = true;
                        float_total = int_total as f64 + n as f64;
                    }
                }
                continue;
            }
        }
        if let Some(n) = value.as_f64() {
            if !is_float {
                is_float = true;
                float_total = int_total as f64;
            }
            float_total += n;
        }
    }
    if is_float {
        Value::from(float_total)
    } else {
        Value::from(int_total)
    }
}

/// Total order over optional field values: a missing field sorts first,
/// then by type (null, bool, number, string, array, object), then within
/// the type.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            let (rank_a, rank_b) = (type_rank(a), type_rank(b));
            if rank_a != rank_b {
                return rank_a.cmp(&rank_b);
            }
            match (a, b) {
                (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                (Value::Number(x), Value::Number(y)) => {
                    let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
                (Value::String(x), Value::String(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            }
        }
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
