//! Document routes. Every route resolves the caller from a session token.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{auth::bad_json, files, request_token, response, AppState};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Document, DocumentFilter, NewDocument};

#[derive(Debug, Default, Deserialize)]
pub struct DocumentMeta {
    pub name: String,
    #[serde(default)]
    pub file: bool,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub grant: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub meta: DocumentMeta,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
    /// Reference to the stored file, relative to the storage directory,
    /// when `meta.file` is set.
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateResponse {
    id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    json: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub token: Option<String>,
    pub login: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    docs: Vec<Document>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    id: Uuid,
    success: bool,
}

fn parse_id(raw: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::bad_request("invalid document id"))
}

fn bad_query(rejection: QueryRejection) -> ServiceError {
    ServiceError::bad_request(rejection.body_text())
}

/// POST /api/docs
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> ServiceResult<Response> {
    let Json(req) = body.map_err(bad_json)?;
    let token = request_token(&headers, req.meta.token.clone())?;
    let owner = state.auth.validate_token(&token).await?;

    if let Some(reference) = req.file.as_deref() {
        if state.files.resolve(reference).is_none() {
            tracing::warn!(owner = %owner.login, reference, "Rejected file reference outside storage");
            return Err(ServiceError::bad_request("invalid file path"));
        }
    }

    let input = NewDocument {
        name: req.meta.name,
        mime: req.meta.mime,
        is_file: req.meta.file,
        is_public: req.meta.public,
        file_path: req.file,
        json_data: req.json,
        grant: req.meta.grant,
    };
    let doc = state.docs.create(&owner, input).await?;

    Ok(response::data(CreateResponse {
        id: doc.id,
        json: doc.json_data,
        file: doc.is_file.then_some(doc.name),
    }))
}

/// GET|HEAD /api/docs
///
/// `login` narrows the listing to that user's documents; without it every
/// document the caller may read is considered.
pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ServiceResult<Response> {
    let Query(query) = query.map_err(bad_query)?;
    let token = request_token(&headers, query.token)?;
    let requester = state.auth.validate_token(&token).await?;

    let mut filter = DocumentFilter::for_requester(requester);
    if let Some(login) = query.login.filter(|l| !l.is_empty()) {
        let owner = state.auth.find_identity(&login).await?;
        filter = filter.owned_by(owner.id);
    }
    if let (Some(key), Some(value)) = (query.key, query.value) {
        filter = filter.matching(key, value);
    }
    if let Some(limit) = query.limit {
        filter = filter.limit(limit);
    }

    let docs = state.docs.get_list(&filter).await?;
    Ok(response::data(ListResponse { docs }))
}

/// GET|HEAD /api/docs/{id}
///
/// File documents are streamed from the storage directory with their MIME
/// type; JSON documents return their payload; anything else returns the
/// document record.
pub async fn get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    query: Result<Query<TokenQuery>, QueryRejection>,
) -> ServiceResult<Response> {
    let Query(query) = query.map_err(bad_query)?;
    let token = request_token(&headers, query.token)?;
    let identity = state.auth.validate_token(&token).await?;
    let id = parse_id(&id)?;

    let mut doc = state.docs.get_by_id(id, &identity).await?;

    if let (true, Some(reference)) = (doc.is_file, doc.file_path.as_deref()) {
        let Some(path) = state.files.resolve(reference) else {
            tracing::warn!(doc_id = %doc.id, reference, "Stored file reference escapes storage");
            return Err(ServiceError::forbidden("invalid file path"));
        };
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            tracing::error!(doc_id = %doc.id, path = %path.display(), error = %e, "Failed to read document file");
            match e.kind() {
                std::io::ErrorKind::NotFound => ServiceError::not_found("file not found"),
                _ => ServiceError::internal("failed to read file"),
            }
        })?;
        let content_type = HeaderValue::from_str(&doc.mime)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        let disposition = HeaderValue::from_str(&files::content_disposition(&doc.name))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
        return Ok((
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            bytes,
        )
            .into_response());
    }

    match doc.json_data.take() {
        Some(payload) => Ok(response::data(payload)),
        None => Ok(response::data(doc)),
    }
}

/// DELETE /api/docs/{id}
pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    query: Result<Query<TokenQuery>, QueryRejection>,
) -> ServiceResult<Response> {
    let Query(query) = query.map_err(bad_query)?;
    let token = request_token(&headers, query.token)?;
    let identity = state.auth.validate_token(&token).await?;
    let id = parse_id(&id)?;

    state.docs.delete(id, &identity).await?;
    Ok(response::respond(DeleteResponse { id, success: true }))
}
