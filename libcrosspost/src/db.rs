//! SQLite persistence for credentials and post history

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::credentials::TokenStore;
use crate::error::{DbError, Result};
use crate::types::{Credential, CredentialLookup, Post, PostRecord, PostStatus, Secrets};

/// A post with all its platform records
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWithRecords {
    pub post: Post,
    pub records: Vec<PostRecord>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `db_path` and run migrations
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn new(db_path: &str) -> Result<Self> {
        if db_path == ":memory:" {
            return Self::in_memory().await;
        }

        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// In-memory database on a single pinned connection
    pub async fn in_memory() -> Result<Self> {
        // Every new connection would see a fresh empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Post history
    // ------------------------------------------------------------------

    /// Create a new post
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, content, created_at, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(post.created_at)
        .bind(post.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Update post status
    pub async fn update_post_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, content, created_at, status
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Post {
            id: r.get("id"),
            user_id: r.get("user_id"),
            content: r.get("content"),
            created_at: r.get("created_at"),
            status: PostStatus::parse(&r.get::<String, _>("status")),
        }))
    }

    /// Create a post record
    pub async fn create_post_record(&self, record: &PostRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_records
                (post_id, platform, platform_post_id, url, posted_at, success, used_fallback, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.post_id)
        .bind(&record.platform)
        .bind(&record.platform_post_id)
        .bind(&record.url)
        .bind(record.posted_at)
        .bind(i32::from(record.success))
        .bind(i32::from(record.used_fallback))
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get all platform records for a post, in insertion order
    pub async fn get_post_records(&self, post_id: &str) -> Result<Vec<PostRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, platform_post_id, url, posted_at,
                   success, used_fallback, error_message
            FROM post_records
            WHERE post_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| PostRecord {
                id: r.get("id"),
                post_id: r.get("post_id"),
                platform: r.get("platform"),
                platform_post_id: r.get("platform_post_id"),
                url: r.get("url"),
                posted_at: r.get("posted_at"),
                success: r.get::<i32, _>("success") != 0,
                used_fallback: r.get::<i32, _>("used_fallback") != 0,
                error_message: r.get("error_message"),
            })
            .collect())
    }

    /// A post together with its platform records
    pub async fn get_post_with_records(&self, post_id: &str) -> Result<Option<PostWithRecords>> {
        match self.get_post(post_id).await? {
            Some(post) => {
                let records = self.get_post_records(post_id).await?;
                Ok(Some(PostWithRecords { post, records }))
            }
            None => Ok(None),
        }
    }

    /// Most recent posts for a user, newest first
    pub async fn recent_posts(&self, user_id: &str, limit: usize) -> Result<Vec<PostWithRecords>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM posts
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            if let Some(post) = self.get_post_with_records(&id).await? {
                results.push(post);
            }
        }
        Ok(results)
    }
}

fn credential_from_row(row: &SqliteRow) -> Result<Credential> {
    let platform: String = row.get("platform");
    let raw_secrets: String = row.get("secrets");
    let secrets: Secrets = serde_json::from_str(&raw_secrets).map_err(|e| {
        DbError::Corrupt(format!("secrets for {} credential: {}", platform, e))
    })?;

    Ok(Credential {
        user_id: row.get("user_id"),
        platform,
        platform_user_id: row.get("platform_user_id"),
        email: row.get("email"),
        secrets,
        cached_handle: row.get("cached_handle"),
        cached_handle_updated_at: row.get("cached_handle_updated_at"),
        is_active: row.get::<i32, _>("is_active") != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl TokenStore for Database {
    async fn find(&self, platform: &str, lookup: &CredentialLookup) -> Result<Option<Credential>> {
        let (column, value) = match lookup {
            CredentialLookup::PlatformUserId(id) => ("platform_user_id", id),
            CredentialLookup::UserId(id) => ("user_id", id),
            CredentialLookup::Email(email) => ("email", email),
        };

        let query = format!(
            r#"
            SELECT user_id, platform, platform_user_id, email, secrets, cached_handle,
                   cached_handle_updated_at, is_active, created_at, updated_at
            FROM credentials
            WHERE platform = ? AND is_active = 1 AND {} = ?
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
            column
        );

        let row = sqlx::query(&query)
            .bind(platform)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(credential_from_row).transpose()
    }

    async fn upsert(&self, credential: &Credential) -> Result<()> {
        let secrets = serde_json::to_string(&credential.secrets)
            .map_err(|e| DbError::Corrupt(format!("cannot encode secrets: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO credentials
                (user_id, platform, platform_user_id, email, secrets, cached_handle,
                 cached_handle_updated_at, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                platform_user_id = excluded.platform_user_id,
                email = excluded.email,
                secrets = excluded.secrets,
                cached_handle = excluded.cached_handle,
                cached_handle_updated_at = excluded.cached_handle_updated_at,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&credential.user_id)
        .bind(&credential.platform)
        .bind(&credential.platform_user_id)
        .bind(&credential.email)
        .bind(secrets)
        .bind(&credential.cached_handle)
        .bind(credential.cached_handle_updated_at)
        .bind(i32::from(credential.is_active))
        .bind(credential.created_at)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn update_handle(
        &self,
        user_id: &str,
        platform: &str,
        handle: &str,
        fetched_at: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE credentials SET cached_handle = ?, cached_handle_updated_at = ?
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(handle)
        .bind(fetched_at)
        .bind(user_id)
        .bind(platform)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate(&self, user_id: &str, platform: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE credentials SET is_active = 0, updated_at = ?
            WHERE user_id = ? AND platform = ? AND is_active = 1
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(user_id)
        .bind(platform)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, user_id: &str, platform: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}
