/// Typed cache facade and key/value backends.
pub mod cache;
/// Document database abstraction and backends.
pub mod document_store;
/// Media upload backends.
pub mod media;
/// Database model definitions.
pub mod models;
/// Projections computed from stored documents.
pub mod read_models;
/// Storage abstraction layer for database operations.
pub mod storage;
