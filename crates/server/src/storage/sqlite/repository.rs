//! SQLite repository implementation.

use async_trait::async_trait;
use tokio_rusqlite::Connection;

use gemproxy_core::storage::{
    ConversationRecord, ConversationRepository, RepositoryError, Result, StoreStats,
};

use super::conversions::{format_datetime, row_to_record, to_json};
use super::error::map_tokio_rusqlite_error;
use super::schema;

/// Helper to wrap rusqlite errors for tokio_rusqlite closures.
fn wrap_err(e: rusqlite::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Rusqlite(e)
}

pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Opens (or creates) the database file and its schema.
    ///
    /// Missing parent directories are created.
    pub async fn new(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    RepositoryError::ConnectionFailed(format!(
                        "Cannot create {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| RepositoryError::ConnectionFailed(e.to_string()))?;

        Self::init_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Creates a repository backed by an in-memory database.
    pub async fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| RepositoryError::ConnectionFailed(e.to_string()))?;

        Self::init_schema(&conn).await?;

        Ok(Self { conn })
    }

    async fn init_schema(conn: &Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(schema::CREATE_TABLES).map_err(wrap_err)?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }
}

#[async_trait]
impl ConversationRepository for SqliteRepository {
    async fn get(&self, hash: &str) -> Result<Option<ConversationRecord>> {
        let hash = hash.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(schema::SELECT_CONVERSATION).map_err(wrap_err)?;
                match stmt.query_row([&hash], row_to_record) {
                    Ok(record) => Ok(Some(record)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(wrap_err(e)),
                }
            })
            .await
            .map_err(map_tokio_rusqlite_error)
    }

    async fn put(&self, record: &ConversationRecord) -> Result<()> {
        let hash = record.hash.clone();
        let credential_id = record.credential_id.clone();
        let model = record.model.clone();
        let messages = to_json(&record.messages)?;
        let metadata = to_json(&record.metadata)?;
        let created_at = format_datetime(&record.created_at);
        let updated_at = format_datetime(&record.updated_at);

        self.conn
            .call(move |conn| {
                conn.execute(
                    schema::UPSERT_CONVERSATION,
                    rusqlite::params![
                        hash,
                        credential_id,
                        model,
                        messages,
                        metadata,
                        created_at,
                        updated_at
                    ],
                )
                .map_err(wrap_err)?;
                Ok(())
            })
            .await
            .map_err(map_tokio_rusqlite_error)
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row(schema::COUNT_CONVERSATIONS, [], |row| row.get(0))
                    .map_err(wrap_err)?;
                Ok(StoreStats {
                    entries: usize::try_from(count).unwrap_or_default(),
                })
            })
            .await
            .map_err(map_tokio_rusqlite_error)
    }

    async fn prune(&self, max_entries: usize) -> Result<usize> {
        let keep = i64::try_from(max_entries).unwrap_or(i64::MAX);

        self.conn
            .call(move |conn| {
                let removed = conn
                    .execute(schema::PRUNE_CONVERSATIONS, [keep])
                    .map_err(wrap_err)?;
                Ok(removed)
            })
            .await
            .map_err(map_tokio_rusqlite_error)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use gemproxy_core::gemini::ChatMetadata;
    use gemproxy_core::openai::{ChatMessage, ContentPart, ImageUrl, MessageContent};

    use super::*;

    fn record(hash: &str, minute: i64) -> ConversationRecord {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute);
        ConversationRecord::new(
            hash,
            "env_client",
            "gemini-2.5-flash",
            vec![
                ChatMessage::user(MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: "what is this".to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "https://example.com/a.png".to_string(),
                            detail: None,
                        },
                    },
                ])),
                ChatMessage::assistant("a cat"),
            ],
            ChatMetadata {
                cid: Some("c_1".to_string()),
                rid: Some("r_1".to_string()),
                rcid: None,
            },
            now,
        )
    }

    #[tokio::test]
    async fn test_put_and_get_round_trip() {
        let repo = SqliteRepository::new_in_memory().await.unwrap();
        let original = record("h1", 0);

        repo.put(&original).await.unwrap();

        assert_eq!(repo.get("h1").await.unwrap(), Some(original));
        assert_eq!(repo.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let repo = SqliteRepository::new_in_memory().await.unwrap();
        repo.put(&record("h1", 0)).await.unwrap();

        let mut newer = record("h1", 10);
        newer.credential_id = "other".to_string();
        repo.put(&newer).await.unwrap();

        let stored = repo.get("h1").await.unwrap().unwrap();
        assert_eq!(stored.credential_id, "other");
        assert_eq!(stored.created_at, record("h1", 0).created_at);
        assert_eq!(stored.updated_at, newer.updated_at);
        assert_eq!(repo.stats().await.unwrap().entries, 1);
    }

    #[tokio::test]
    async fn test_prune_keeps_most_recent() {
        let repo = SqliteRepository::new_in_memory().await.unwrap();
        for (i, hash) in ["a", "b", "c"].iter().enumerate() {
            repo.put(&record(hash, i as i64)).await.unwrap();
        }

        assert_eq!(repo.prune(1).await.unwrap(), 2);
        assert_eq!(repo.stats().await.unwrap().entries, 1);
        assert!(repo.get("c").await.unwrap().is_some());
        assert_eq!(repo.prune(5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/gemproxy.db");

        let repo = SqliteRepository::new(path.to_str().unwrap()).await.unwrap();
        repo.put(&record("h1", 0)).await.unwrap();

        assert!(path.exists());
    }
}
