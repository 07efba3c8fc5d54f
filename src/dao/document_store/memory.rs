//! In-process document store used in development mode and tests.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;

use super::{DocumentQuery, DocumentStore};
use crate::dao::storage::StorageResult;

/// `DashMap`-backed document store; last write wins.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<DashMap<String, Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let value = self.documents.get(key).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(value) })
    }

    fn upsert(&self, key: &str, value: Value) -> BoxFuture<'static, StorageResult<()>> {
        self.documents.insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self.documents.remove(key).is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn query(&self, query: DocumentQuery) -> BoxFuture<'static, StorageResult<Vec<Value>>> {
        let mut hits = self
            .documents
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect::<Vec<_>>();
        // Stable base order so unsorted queries are deterministic.
        hits.sort_by(|(a, _), (b, _)| a.cmp(b));
        let rows = query.finish(hits.into_iter().map(|(_, value)| value).collect());
        Box::pin(async move { Ok(rows) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
