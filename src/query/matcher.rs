use crate::core::types::{Document, Predicate};

/// Exact-equality conjunction: every predicate field must be present in
/// the document with an equal value. An empty predicate matches.
pub fn match_all(doc: &Document, query: &Predicate) -> bool {
    query
        .iter()
        .all(|(field, value)| doc.get(field) == Some(value))
}

/// Exact-equality disjunction: at least one predicate field must be
/// present with an equal value. An empty predicate matches nothing.
pub fn match_any(doc: &Document, query: &Predicate) -> bool {
    query
        .iter()
        .any(|(field, value)| doc.get(field) == Some(value))
}
