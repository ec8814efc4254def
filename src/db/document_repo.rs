use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{decode_id, decode_time, encode_time, DocumentStore, StoreError};
use crate::models::{Document, DocumentFilter, Predicate};

pub struct SqliteDocumentRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    name: String,
    owner_id: String,
    mime: String,
    is_file: bool,
    is_public: bool,
    file_path: Option<String>,
    json_data: Option<String>,
    grants: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let json_data = row
            .json_data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("json_data of {}: {}", row.id, e)))?;
        let grant = serde_json::from_str(&row.grants)
            .map_err(|e| StoreError::Corrupt(format!("grants of {}: {}", row.id, e)))?;

        Ok(Document {
            id: decode_id(&row.id)?,
            name: row.name,
            owner_id: decode_id(&row.owner_id)?,
            mime: row.mime,
            is_file: row.is_file,
            is_public: row.is_public,
            file_path: row.file_path,
            json_data,
            grant,
            created_at: decode_time(&row.created_at)?,
            updated_at: decode_time(&row.updated_at)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, name, owner_id, mime, is_file, is_public, file_path, json_data, grants, created_at, updated_at FROM documents";

impl SqliteDocumentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Appends the SQL for a single key/value predicate.
///
/// `name` matches a case-insensitive substring, `mime` and `public` compare
/// columns, any other key compares a top-level field of the JSON payload.
fn push_predicate(query: &mut QueryBuilder<'_, Sqlite>, predicate: &Predicate) {
    if predicate.key.is_empty() || predicate.value.is_empty() {
        return;
    }

    match predicate.key.as_str() {
        "name" => {
            query
                .push(" AND name LIKE ")
                .push_bind(format!("%{}%", escape_like(&predicate.value)))
                .push(" ESCAPE '\\'");
        }
        "mime" => {
            query.push(" AND mime = ").push_bind(predicate.value.clone());
        }
        "public" => {
            query
                .push(" AND is_public = ")
                .push_bind(predicate.value == "true");
        }
        key => {
            query
                .push(" AND CAST(json_extract(json_data, ")
                .push_bind(json_path(key))
                .push(") AS TEXT) = ")
                .push_bind(predicate.value.clone());
        }
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', ""))
}

#[async_trait]
impl DocumentStore for SqliteDocumentRepository {
    async fn create(&self, doc: &Document) -> Result<(), StoreError> {
        let json_data = doc.json_data.as_ref().map(|v| v.to_string());
        let grants = serde_json::to_string(&doc.grant)
            .map_err(|e| StoreError::Corrupt(format!("grants of {}: {}", doc.id, e)))?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, name, owner_id, mime, is_file, is_public, file_path, json_data, grants, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(doc.id.to_string())
        .bind(&doc.name)
        .bind(doc.owner_id.to_string())
        .bind(&doc.mime)
        .bind(doc.is_file)
        .bind(doc.is_public)
        .bind(&doc.file_path)
        .bind(json_data)
        .bind(grants)
        .bind(encode_time(&doc.created_at))
        .bind(encode_time(&doc.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Document, StoreError> {
        let row: DocumentRow = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get_by_owner(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        query.push(" WHERE 1=1");

        if let Some(owner_id) = filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner_id.to_string());
        }
        if let Some(predicate) = &filter.predicate {
            push_predicate(&mut query, predicate);
        }

        query.push(" ORDER BY name ASC, created_at DESC");

        if let Some(limit) = filter.limit.filter(|l| *l > 0) {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = query
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Document::try_from).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
