use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::{decode_id, decode_time, encode_time, SessionStore, StoreError};
use crate::models::Session;

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    token: String,
    expires_at: String,
    updated_at: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: decode_id(&row.id)?,
            user_id: decode_id(&row.user_id)?,
            token: row.token,
            expires_at: decode_time(&row.expires_at)?,
            updated_at: decode_time(&row.updated_at)?,
        })
    }
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionRepository {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, token, expires_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.user_id.to_string())
        .bind(&session.token)
        .bind(encode_time(&session.expires_at))
        .bind(encode_time(&session.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_token(&self, token: &str) -> Result<Session, StoreError> {
        let row: SessionRow = sqlx::query_as(
            "SELECT id, user_id, token, expires_at, updated_at FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(encode_time(&Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::db::{CredentialStore, SqliteUserRepository};
    use crate::models::User;
    use chrono::Duration;

    async fn seeded() -> (crate::db::test_support::TestDb, User) {
        let db = test_db().await;
        let user = User::new("alice123", "hash");
        SqliteUserRepository::new(db.pool.clone())
            .create(&user)
            .await
            .unwrap();
        (db, user)
    }

    #[tokio::test]
    async fn test_create_and_get_by_token() {
        let (db, user) = seeded().await;
        let repo = SqliteSessionRepository::new(db.pool.clone());
        let session = Session::new(user.id, "tok-1", Utc::now() + Duration::hours(1));

        repo.create(&session).await.unwrap();
        let loaded = repo.get_by_token("tok-1").await.unwrap();

        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.user_id, user.id);
        assert_eq!(
            loaded.expires_at.timestamp_micros(),
            session.expires_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (db, user) = seeded().await;
        let repo = SqliteSessionRepository::new(db.pool.clone());
        repo.create(&Session::new(user.id, "tok-1", Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        repo.delete("tok-1").await.unwrap();
        repo.delete("tok-1").await.unwrap();

        assert!(matches!(
            repo.get_by_token("tok-1").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (db, user) = seeded().await;
        let repo = SqliteSessionRepository::new(db.pool.clone());
        let past = Utc::now() - Duration::minutes(1);
        repo.create(&Session::new(user.id, "old-1", past)).await.unwrap();
        repo.create(&Session::new(user.id, "old-2", past)).await.unwrap();
        repo.create(&Session::new(user.id, "live", Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let removed = repo.delete_expired().await.unwrap();

        assert_eq!(removed, 2);
        assert!(repo.get_by_token("live").await.is_ok());
        assert!(repo.get_by_token("old-1").await.is_err());
    }
}
