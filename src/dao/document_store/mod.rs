#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;

use std::{cmp::Ordering, sync::Arc};

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::dao::storage::{StorageError, StorageResult};

/// Discriminator field carried by every stored document.
pub const TYPE_FIELD: &str = "_type";

/// Abstraction over the document database holding tournaments, teams, matches and the rest.
///
/// Keys are colon-delimited, type-prefixed strings such as `tournament::<slug>`.
pub trait DocumentStore: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    fn upsert(&self, key: &str, value: Value) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove a document, returning whether it existed.
    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>>;
    fn query(&self, query: DocumentQuery) -> BoxFuture<'static, StorageResult<Vec<Value>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Entity that can be persisted in the document store.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Value written to the `_type` discriminator.
    const DOC_TYPE: &'static str;

    /// Storage key of this document.
    fn key(&self) -> String;
}

/// Direction used when ordering query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Ad hoc query: every document of one `_type` whose fields equal the given values.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub doc_type: String,
    pub filters: Vec<(String, Value)>,
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    /// Query every document of the given type.
    pub fn of_type(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            filters: Vec::new(),
            sort: None,
            limit: None,
        }
    }

    /// Query every document of `T`'s type.
    pub fn for_document<T: Document>() -> Self {
        Self::of_type(T::DOC_TYPE)
    }

    /// Require `field` to equal `value`.
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a raw document satisfies the type discriminator and every filter.
    pub fn matches(&self, document: &Value) -> bool {
        document.get(TYPE_FIELD).and_then(Value::as_str) == Some(self.doc_type.as_str())
            && self
                .filters
                .iter()
                .all(|(field, expected)| document.get(field) == Some(expected))
    }

    /// Apply the requested ordering and limit to already filtered documents.
    pub fn finish(&self, mut documents: Vec<Value>) -> Vec<Value> {
        if let Some((field, order)) = &self.sort {
            documents.sort_by(|a, b| {
                let ordering = compare_values(a.get(field), b.get(field));
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            documents.truncate(limit);
        }
        documents
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Typed access to the document store that stamps and checks the `_type` discriminator.
#[derive(Clone)]
pub struct Documents {
    store: Arc<dyn DocumentStore>,
}

impl Documents {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Underlying untyped store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Fetch and decode a document of type `T`.
    pub async fn get<T: Document>(&self, key: &str) -> StorageResult<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        decode(key, raw).map(Some)
    }

    /// Insert or replace a document, last write wins.
    pub async fn upsert<T: Document>(&self, document: &T) -> StorageResult<()> {
        let key = document.key();
        let value = encode(&key, document)?;
        self.store.upsert(&key, value).await
    }

    pub async fn remove(&self, key: &str) -> StorageResult<bool> {
        self.store.remove(key).await
    }

    /// Run a query restricted to `T`'s type and decode every hit.
    pub async fn query<T: Document>(&self, mut query: DocumentQuery) -> StorageResult<Vec<T>> {
        query.doc_type = T::DOC_TYPE.to_string();
        let rows = self.store.query(query).await?;
        rows.into_iter()
            .map(|raw| decode(T::DOC_TYPE, raw))
            .collect()
    }
}

fn encode<T: Document>(key: &str, document: &T) -> StorageResult<Value> {
    let mut value =
        serde_json::to_value(document).map_err(|err| StorageError::malformed(key, err))?;
    if let Value::Object(map) = &mut value {
        map.insert(TYPE_FIELD.to_string(), Value::String(T::DOC_TYPE.to_string()));
    }
    Ok(value)
}

fn decode<T: Document>(key: &str, raw: Value) -> StorageResult<T> {
    serde_json::from_value(raw).map_err(|err| StorageError::malformed(key, err))
}
