//! Document workflows: create, read, list and delete.
//!
//! Reads go cache first and fall back to the store. Every mutation commits
//! to the store before any cache entry is touched, then invalidates:
//!
//! - the single-document entry (on delete),
//! - the cached lists of the owner and of every grantee,
//! - every cached list when the document is public, since it appears in
//!   everyone's results.
//!
//! Invalidations and list-cache writes are awaited so the caller's next read
//! sees them; single-document warming is detached. All of them are guarded
//! and never fail the request.

pub mod filter;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::access::{can_delete, check_access};
use crate::cache::{CacheError, DocumentCache};
use crate::db::{DocumentStore, StoreError};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Document, DocumentFilter, Identity, NewDocument};
use crate::tasks;

use filter::FilterError;

pub struct DocumentService {
    docs: Arc<dyn DocumentStore>,
    cache: DocumentCache,
    filter_workers: usize,
}

impl DocumentService {
    pub fn new(docs: Arc<dyn DocumentStore>, cache: DocumentCache) -> Self {
        Self {
            docs,
            cache,
            filter_workers: filter::default_workers(),
        }
    }

    /// Sets the size of the access-filter pool used by list reads.
    pub fn with_filter_workers(mut self, workers: usize) -> Self {
        self.filter_workers = workers.max(1);
        self
    }

    pub async fn create(&self, owner: &Identity, input: NewDocument) -> ServiceResult<Document> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::bad_request("document name is required"));
        }
        if input.is_file && input.file_path.is_none() {
            return Err(ServiceError::bad_request("file is required when file=true"));
        }

        let doc = Document::new(owner, input);
        tracing::debug!(
            doc_id = %doc.id,
            owner = %owner.login,
            name = %doc.name,
            is_public = doc.is_public,
            grant = ?doc.grant,
            "Creating document"
        );

        self.docs.create(&doc).await.map_err(|e| {
            tracing::error!(owner = %owner.login, name = %doc.name, error = %e, "Failed to create document");
            ServiceError::internal("failed to create document")
        })?;

        tracing::info!(doc_id = %doc.id, owner = %owner.login, "Document created");

        self.invalidate_lists(&doc, &owner.login).await;

        self.spawn_warm(&doc);

        Ok(doc)
    }

    pub async fn get_by_id(&self, id: Uuid, identity: &Identity) -> ServiceResult<Document> {
        if let Some(doc) = self.cache.get_document(id).await {
            tracing::debug!(doc_id = %id, "Document cache hit");
            if !check_access(&doc, identity) {
                tracing::warn!(doc_id = %id, user = %identity.login, "Access denied for cached document");
                return Err(access_denied());
            }
            return Ok(doc);
        }

        tracing::debug!(doc_id = %id, "Document cache miss");
        let doc = self.load(id).await?;

        if !check_access(&doc, identity) {
            tracing::warn!(doc_id = %id, user = %identity.login, "Access denied for document");
            return Err(access_denied());
        }

        self.spawn_warm(&doc);

        Ok(doc)
    }

    /// Lists the documents matching `filter` that its requester may read.
    ///
    /// Dropping the returned future stops the access-filter workers.
    pub async fn get_list(&self, filter: &DocumentFilter) -> ServiceResult<Vec<Document>> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();
        self.get_list_with_cancel(filter, &cancel).await
    }

    /// Like [`get_list`](Self::get_list) but stops when `cancel` fires.
    pub async fn get_list_with_cancel(
        &self,
        filter: &DocumentFilter,
        cancel: &CancellationToken,
    ) -> ServiceResult<Vec<Document>> {
        let requester = match &filter.requester {
            Some(requester) if !requester.login.is_empty() => requester,
            _ => {
                tracing::warn!("Document list requested without an identity");
                return Err(ServiceError::forbidden("requesting user is required"));
            }
        };

        let key = DocumentCache::list_key(filter);
        if let Some(docs) = self.cache.get_document_list(&key).await {
            tracing::debug!(cache_key = %key, count = docs.len(), "Document list cache hit");
            return Ok(docs);
        }

        tracing::debug!(cache_key = %key, "Document list cache miss");
        let candidates = self.docs.get_by_owner(filter).await.map_err(|e| {
            tracing::error!(user = %requester.login, error = %e, "Failed to query documents");
            ServiceError::internal("failed to get documents")
        })?;
        let total = candidates.len();

        let docs = filter::filter_accessible(candidates, requester, self.filter_workers, cancel)
            .await
            .map_err(|e| match e {
                FilterError::Cancelled => {
                    tracing::debug!(user = %requester.login, "Document list request cancelled");
                    ServiceError::internal("request cancelled")
                }
                FilterError::WorkerFailed(reason) => {
                    tracing::error!(user = %requester.login, %reason, "Access filtering failed");
                    ServiceError::internal("failed to filter documents by access")
                }
            })?;

        tracing::info!(
            user = %requester.login,
            total,
            visible = docs.len(),
            "Document list retrieved"
        );

        tasks::run_guarded("cache document list", self.cache.set_document_list(&key, &docs)).await;

        Ok(docs)
    }

    pub async fn delete(&self, id: Uuid, identity: &Identity) -> ServiceResult<()> {
        let doc = self.load(id).await?;

        if !can_delete(&doc, identity) {
            tracing::warn!(
                doc_id = %id,
                user = %identity.login,
                owner_id = %doc.owner_id,
                "Delete attempted by non-owner"
            );
            return Err(access_denied());
        }

        match self.docs.delete(id).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => {
                tracing::warn!(doc_id = %id, "Document vanished before delete");
                return Err(ServiceError::not_found("document not found"));
            }
            Err(e) => {
                tracing::error!(doc_id = %id, error = %e, "Failed to delete document");
                return Err(ServiceError::internal("failed to delete document"));
            }
        }

        tracing::info!(doc_id = %id, user = %identity.login, "Document deleted");

        tasks::run_guarded("invalidate document", self.cache.invalidate_document(id)).await;
        self.invalidate_lists(&doc, &identity.login).await;
        Ok(())
    }

    fn spawn_warm(&self, doc: &Document) {
        tasks::spawn_guarded(
            "warm document cache",
            warm_document(Arc::clone(&self.docs), self.cache.clone(), doc.clone()),
        );
    }

    async fn load(&self, id: Uuid) -> ServiceResult<Document> {
        self.docs.get_by_id(id).await.map_err(|e| match e {
            StoreError::NotFound => ServiceError::not_found("document not found"),
            e => {
                tracing::error!(doc_id = %id, error = %e, "Failed to load document");
                ServiceError::internal("failed to get document")
            }
        })
    }

    /// Drops every cached list `doc` could appear in.
    async fn invalidate_lists(&self, doc: &Document, owner_login: &str) {
        if doc.is_public {
            tasks::run_guarded("invalidate all lists", self.cache.invalidate_all_lists()).await;
            return;
        }

        tasks::run_guarded("invalidate owner lists", self.cache.invalidate_lists_for(owner_login))
            .await;
        for login in &doc.grant {
            tasks::run_guarded("invalidate grantee lists", self.cache.invalidate_lists_for(login))
                .await;
        }
    }
}

/// Caches `doc`, then drops the entry again if the store no longer has it.
///
/// A delete commits to the store before invalidating, so either the delete's
/// invalidation lands after this write or the re-check below sees the row gone.
async fn warm_document(
    docs: Arc<dyn DocumentStore>,
    cache: DocumentCache,
    doc: Document,
) -> Result<(), CacheError> {
    cache.set_document(&doc).await?;

    match docs.get_by_id(doc.id).await {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::debug!(doc_id = %doc.id, error = %e, "Document gone after warming, dropping entry");
            cache.invalidate_document(doc.id).await
        }
    }
}

fn access_denied() -> ServiceError {
    ServiceError::forbidden("access denied")
}
