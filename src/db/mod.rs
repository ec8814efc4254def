//! Persistence contracts and their SQLite implementations.
//!
//! The services only see the [`CredentialStore`], [`SessionStore`] and
//! [`DocumentStore`] traits; the `Sqlite*Repository` types back them with a
//! shared connection pool.

mod document_repo;
mod session_repo;
mod user_repo;

pub use document_repo::SqliteDocumentRepository;
pub use session_repo::SqliteSessionRepository;
pub use user_repo::SqliteUserRepository;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Document, DocumentFilter, Session, User};

/// Errors raised by the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("record already exists")]
    Conflict,

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict,
            other => StoreError::Database(other),
        }
    }
}

/// Persists accounts and their password hashes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create(&self, user: &User) -> Result<(), StoreError>;
    async fn get_by_login(&self, login: &str) -> Result<User, StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError>;
}

/// Persists sessions keyed by their token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), StoreError>;
    async fn get_by_token(&self, token: &str) -> Result<Session, StoreError>;
    /// Removes the session for `token`. Absent tokens are not an error.
    async fn delete(&self, token: &str) -> Result<(), StoreError>;
    /// Removes every session whose expiry has passed, returning how many went.
    async fn delete_expired(&self) -> Result<u64, StoreError>;
}

/// Persists documents and answers filtered list queries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, doc: &Document) -> Result<(), StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Document, StoreError>;
    /// Candidates for a list query: owner and predicate applied, ordered by
    /// name ascending then newest first, truncated to the limit.
    async fn get_by_owner(&self, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Timestamps are stored as fixed-width RFC 3339 so they sort lexically.
pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", value, e)))
}

pub(crate) fn decode_id(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("id '{}': {}", value, e)))
}
