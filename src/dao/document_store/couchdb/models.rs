//! Wire shapes exchanged with CouchDB and conversions to store-neutral documents.
//!
//! CouchDB reserves top-level fields starting with `_`, so the `_type` discriminator is
//! stored as `doc_type` and renamed back when documents are read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dao::document_store::{DocumentQuery, TYPE_FIELD};

/// Field holding the discriminator inside CouchDB documents.
pub const COUCH_TYPE_FIELD: &str = "doc_type";
const ID_FIELD: &str = "_id";
const REV_FIELD: &str = "_rev";
/// `_find` defaults to 25 rows; queries without a limit ask for everything up to this bound.
pub const FIND_LIMIT: usize = 10_000;

/// Minimal view of a stored document used to read its revision.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Serialize)]
pub struct FindRequest {
    pub selector: Value,
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
    #[serde(default)]
    pub warning: Option<String>,
}

impl FindRequest {
    /// Translate a store-neutral query into a Mango selector.
    ///
    /// Ordering is applied client side; Mango `sort` requires a matching index.
    pub fn from_query(query: &DocumentQuery) -> Self {
        let mut selector = Map::new();
        selector.insert(
            COUCH_TYPE_FIELD.to_string(),
            Value::String(query.doc_type.clone()),
        );
        for (field, value) in &query.filters {
            selector.insert(field.clone(), value.clone());
        }
        let limit = if query.sort.is_some() {
            FIND_LIMIT
        } else {
            query.limit.unwrap_or(FIND_LIMIT)
        };
        Self {
            selector: Value::Object(selector),
            limit,
        }
    }
}

/// Prepare a document body for `PUT /{db}/{id}`.
pub fn to_couch_document(key: &str, rev: Option<String>, value: Value) -> Value {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    if let Some(doc_type) = map.remove(TYPE_FIELD) {
        map.insert(COUCH_TYPE_FIELD.to_string(), doc_type);
    }
    map.insert(ID_FIELD.to_string(), Value::String(key.to_string()));
    if let Some(rev) = rev {
        map.insert(REV_FIELD.to_string(), Value::String(rev));
    }
    Value::Object(map)
}

/// Strip CouchDB bookkeeping fields and restore the `_type` discriminator.
pub fn from_couch_document(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.remove(ID_FIELD);
            map.remove(REV_FIELD);
            if let Some(doc_type) = map.remove(COUCH_TYPE_FIELD) {
                map.insert(TYPE_FIELD.to_string(), doc_type);
            }
            Value::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dao::document_store::SortOrder;

    #[test]
    fn discriminator_is_renamed_both_ways() {
        let stored = to_couch_document(
            "team::1",
            Some("3-abc".into()),
            json!({"_type": "team", "name": "Hops"}),
        );
        assert_eq!(
            stored,
            json!({"_id": "team::1", "_rev": "3-abc", "doc_type": "team", "name": "Hops"})
        );
        assert_eq!(
            from_couch_document(stored),
            json!({"_type": "team", "name": "Hops"})
        );
    }

    #[test]
    fn selector_carries_type_and_filters() {
        let query = DocumentQuery::of_type("match").filter("tournament_slug", "spring");
        let request = FindRequest::from_query(&query);
        assert_eq!(
            request.selector,
            json!({"doc_type": "match", "tournament_slug": "spring"})
        );
        assert_eq!(request.limit, FIND_LIMIT);
    }

    #[test]
    fn sorted_queries_fetch_everything_before_truncating() {
        let query = DocumentQuery::of_type("vote")
            .sort_by("cast_at", SortOrder::Ascending)
            .limit(3);
        assert_eq!(FindRequest::from_query(&query).limit, FIND_LIMIT);
        assert_eq!(
            FindRequest::from_query(&DocumentQuery::of_type("vote").limit(3)).limit,
            3
        );
    }
}
