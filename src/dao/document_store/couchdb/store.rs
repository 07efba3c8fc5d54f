use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dao::{
    document_store::{DocumentQuery, DocumentStore},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{FindRequest, FindResponse, RevisionOnly, from_couch_document, to_couch_document},
};

const FIND: &str = "_find";
const UPSERT_ATTEMPTS: usize = 2;

/// Document store backed by a CouchDB database over its HTTP API.
#[derive(Clone)]
pub struct CouchDocumentStore {
    client: Client,
    base_url: Arc<Url>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchDocumentStore {
    /// Connect and create the database when it does not exist yet.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| CouchDaoError::InvalidBaseUrl {
                url: config.base_url.clone(),
            })?;
        let auth = config
            .credentials
            .map(|(user, pass)| (Arc::<str>::from(user), Arc::<str>::from(pass)));

        let store = Self {
            client,
            base_url: Arc::new(base_url),
            database: Arc::<str>::from(config.database),
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    /// URL of `/{db}/{segments..}` with every segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = (*self.base_url).clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.database).extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.client.request(method, self.url(segments));
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder, target: &str) -> CouchResult<Response> {
        builder
            .send()
            .await
            .map_err(|source| CouchDaoError::transport(target, source))
    }

    async fn decode<T: DeserializeOwned>(response: Response, target: &str) -> CouchResult<T> {
        response.json::<T>().await.map_err(|source| CouchDaoError::Decode {
            target: target.to_string(),
            source,
        })
    }

    fn unexpected(target: &str, status: StatusCode) -> CouchDaoError {
        CouchDaoError::UnexpectedStatus {
            target: target.to_string(),
            status,
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let response = Self::send(self.request(Method::GET, &[]), &database).await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = Self::send(self.request(Method::PUT, &[]), &database).await?;
                // 412: another instance created it first
                match create.status() {
                    status if status.is_success() => {
                        info!(database = %database, "created CouchDB database");
                        Ok(())
                    }
                    StatusCode::PRECONDITION_FAILED => Ok(()),
                    status => Err(Self::unexpected(&database, status)),
                }
            }
            status => Err(Self::unexpected(&database, status)),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, doc_id: &str) -> CouchResult<Option<T>> {
        let response = Self::send(self.request(Method::GET, &[doc_id]), doc_id).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Self::decode(response, doc_id).await.map(Some),
            status => Err(Self::unexpected(doc_id, status)),
        }
    }

    /// Write `value` under `doc_id` over whatever revision is current.
    async fn overwrite(&self, doc_id: &str, value: Value) -> CouchResult<()> {
        for attempt in 1..=UPSERT_ATTEMPTS {
            let rev = self
                .fetch::<RevisionOnly>(doc_id)
                .await?
                .map(|existing| existing.rev);
            let body = to_couch_document(doc_id, rev, value.clone());
            let response = Self::send(self.request(Method::PUT, &[doc_id]).json(&body), doc_id).await?;
            match response.status() {
                status if status.is_success() => return Ok(()),
                StatusCode::CONFLICT => debug!(doc_id, attempt, "revision conflict on upsert"),
                status => return Err(Self::unexpected(doc_id, status)),
            }
        }
        Err(CouchDaoError::RevisionConflict {
            doc_id: doc_id.to_string(),
            attempts: UPSERT_ATTEMPTS,
        })
    }

    async fn delete(&self, doc_id: &str) -> CouchResult<bool> {
        let Some(existing) = self.fetch::<RevisionOnly>(doc_id).await? else {
            return Ok(false);
        };
        let request = self
            .request(Method::DELETE, &[doc_id])
            .query(&[("rev", existing.rev)]);
        let response = Self::send(request, doc_id).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(Self::unexpected(doc_id, status)),
        }
    }

    async fn find(&self, query: &DocumentQuery) -> CouchResult<Vec<Value>> {
        let request = self
            .request(Method::POST, &[FIND])
            .json(&FindRequest::from_query(query));
        let response = Self::send(request, FIND).await?;
        if !response.status().is_success() {
            return Err(Self::unexpected(FIND, response.status()));
        }

        let payload: FindResponse = Self::decode(response, FIND).await?;
        if let Some(warning) = payload.warning {
            warn!(doc_type = %query.doc_type, warning = %warning, "CouchDB _find warning");
        }
        Ok(payload.docs.into_iter().map(from_couch_document).collect())
    }

    async fn ping(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let response = Self::send(self.request(Method::GET, &[]), &database).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::unexpected(&database, response.status()))
        }
    }
}

impl DocumentStore for CouchDocumentStore {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move {
            let doc = store.fetch::<Value>(&key).await?;
            Ok(doc.map(from_couch_document))
        })
    }

    fn upsert(&self, key: &str, value: Value) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move { store.overwrite(&key, value).await.map_err(Into::into) })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let key = key.to_string();
        Box::pin(async move { store.delete(&key).await.map_err(Into::into) })
    }

    fn query(&self, query: DocumentQuery) -> BoxFuture<'static, StorageResult<Vec<Value>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store.find(&query).await?;
            Ok(query.finish(rows))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
