use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_id, decode_time, encode_time, CredentialStore, StoreError};
use crate::models::User;

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    login: String,
    password_hash: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: decode_id(&row.id)?,
            login: row.login,
            password_hash: row.password_hash,
            created_at: decode_time(&row.created_at)?,
            updated_at: decode_time(&row.updated_at)?,
        })
    }
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteUserRepository {
    async fn create(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, login, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.login)
        .bind(&user.password_hash)
        .bind(encode_time(&user.created_at))
        .bind(encode_time(&user.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_login(&self, login: &str) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as("SELECT * FROM users WHERE login = ?")
            .bind(login)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }
}
