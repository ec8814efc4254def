//! Cache-aside operations for single documents and list results.
//!
//! Reads never fail: any backend error or undecodable entry is logged and
//! reported as a miss so the caller falls back to the store. Writes and
//! invalidations return their error for the caller to log and drop.
//!
//! # Key layout
//!
//! ```text
//! doc:<id>
//! docs:list:<login>:<id>:owner=<owner>:key=<key>:val=<value>:limit=<limit>
//! ```
//!
//! Every variable part is percent-encoded and absent parts are written as
//! `*`, which percent-encoding never produces. Distinct filters therefore
//! never share a key, and each requester's lists share the
//! `docs:list:<login>:` prefix.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::{CacheError, CacheStore};
use crate::models::{Document, DocumentFilter};

const DOC_PREFIX: &str = "doc:";
const LIST_PREFIX: &str = "docs:list:";
const ABSENT: &str = "*";

#[derive(Clone)]
pub struct DocumentCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl DocumentCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn document_key(id: Uuid) -> String {
        format!("{}{}", DOC_PREFIX, id)
    }

    /// Derives the list key for a filter. Pure and deterministic.
    pub fn list_key(filter: &DocumentFilter) -> String {
        let requester = match &filter.requester {
            Some(identity) => format!("{}:{}", encode(&identity.login), identity.id),
            None => format!("{}:{}", ABSENT, ABSENT),
        };
        let owner = filter
            .owner_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| ABSENT.to_string());
        let (key, value) = match &filter.predicate {
            Some(p) => (encode(&p.key), encode(&p.value)),
            None => (ABSENT.to_string(), ABSENT.to_string()),
        };
        let limit = filter
            .limit
            .map(|l| l.to_string())
            .unwrap_or_else(|| ABSENT.to_string());

        format!(
            "{}{}:owner={}:key={}:val={}:limit={}",
            LIST_PREFIX, requester, owner, key, value, limit
        )
    }

    /// Prefix shared by every list key derived for `login`.
    pub fn list_prefix_for(login: &str) -> String {
        format!("{}{}:", LIST_PREFIX, encode(login))
    }

    pub async fn get_document(&self, id: Uuid) -> Option<Document> {
        self.read(&Self::document_key(id)).await
    }

    pub async fn set_document(&self, doc: &Document) -> Result<(), CacheError> {
        let value = serde_json::to_string(doc)?;
        self.store
            .set(&Self::document_key(doc.id), value, self.ttl)
            .await
    }

    pub async fn get_document_list(&self, key: &str) -> Option<Vec<Document>> {
        self.read(key).await
    }

    pub async fn set_document_list(&self, key: &str, docs: &[Document]) -> Result<(), CacheError> {
        let value = serde_json::to_string(docs)?;
        self.store.set(key, value, self.ttl).await
    }

    pub async fn invalidate_document(&self, id: Uuid) -> Result<(), CacheError> {
        self.store.delete(&[Self::document_key(id)]).await
    }

    /// Drops every cached list computed for `login`.
    pub async fn invalidate_lists_for(&self, login: &str) -> Result<(), CacheError> {
        self.invalidate_prefix(&Self::list_prefix_for(login)).await
    }

    /// Drops every cached list for every requester.
    pub async fn invalidate_all_lists(&self) -> Result<(), CacheError> {
        self.invalidate_prefix(LIST_PREFIX).await
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let keys = self.store.list_keys(prefix).await?;
        if keys.is_empty() {
            return Ok(());
        }
        tracing::debug!(prefix, count = keys.len(), "Invalidating cached lists");
        self.store.delete(&keys).await
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        }
    }
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
