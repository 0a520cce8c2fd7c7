use crate::error::AppError;

use super::types::StoredObject;
use std::{ops::Deref, sync::Arc};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};
use tracing::warn;

/// Analyzer backing every full-text index; english stemming, no stop-word
/// customization.
pub const FTS_ANALYZER_NAME: &str = "wiki_en_analyzer";

/// Full-text search indexes. Match references in queries (`@0@`, `@1@`)
/// resolve against these definitions.
const FTS_INDEXES: [(&str, &str, &str); 4] = [
    ("page_chunk_fts_idx", "page_chunk", "chunk_text"),
    ("page_extension_resume_fts_idx", "page_extension", "resume"),
    (
        "page_extension_keywords_fts_idx",
        "page_extension",
        "keywords",
    ),
    (
        "page_extension_title_fts_idx",
        "page_extension",
        "page_title",
    ),
];

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    /// Define the analyzer, unique keys and search indexes. Idempotent;
    /// every binary calls this at startup.
    pub async fn ensure_schema(&self) -> Result<(), AppError> {
        self.create_fts_analyzer().await?;

        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_source_page_identity ON TABLE source_page FIELDS source_type, source_id UNIQUE;
                 DEFINE INDEX IF NOT EXISTS idx_source_page_url ON TABLE source_page FIELDS url UNIQUE;
                 DEFINE INDEX IF NOT EXISTS idx_page_url ON TABLE page FIELDS url UNIQUE;
                 DEFINE INDEX IF NOT EXISTS idx_page_extension_url ON TABLE page_extension FIELDS url UNIQUE;
                 DEFINE INDEX IF NOT EXISTS idx_entity_identity ON TABLE entity FIELDS entity_type, entity_name UNIQUE;
                 DEFINE INDEX IF NOT EXISTS idx_task_queue_status ON TABLE task_queue FIELDS status;
                 DEFINE INDEX IF NOT EXISTS idx_task_queue_page ON TABLE task_queue FIELDS page_id, task_type;
                 DEFINE INDEX IF NOT EXISTS idx_page_chunk_page ON TABLE page_chunk FIELDS page_id;",
            )
            .await?
            .check()?;

        for (index, table, field) in FTS_INDEXES {
            self.client
                .query(format!(
                    "DEFINE INDEX IF NOT EXISTS {index} ON TABLE {table} FIELDS {field} \
                     SEARCH ANALYZER {FTS_ANALYZER_NAME} BM25;"
                ))
                .await?
                .check()?;
        }

        Ok(())
    }

    async fn create_fts_analyzer(&self) -> Result<(), AppError> {
        let snowball_sql = format!(
            "DEFINE ANALYZER IF NOT EXISTS {FTS_ANALYZER_NAME} \
             TOKENIZERS class, punct FILTERS lowercase, ascii, snowball(english);"
        );

        let fallback_needed = match self.client.query(snowball_sql).await {
            Ok(res) => res.check().is_err(),
            Err(_) => true,
        };

        if fallback_needed {
            // Snowball filter is unavailable in some Surreal builds
            warn!(
                analyzer = FTS_ANALYZER_NAME,
                "snowball analyzer unavailable; falling back to lowercase+ascii"
            );
            self.client
                .query(format!(
                    "DEFINE ANALYZER IF NOT EXISTS {FTS_ANALYZER_NAME} \
                     TOKENIZERS class, punct FILTERS lowercase, ascii;"
                ))
                .await?
                .check()?;
        }

        Ok(())
    }

    /// Rebuild the search indexes so freshly written rows become matchable.
    /// Needed after bulk inserts in tests and batch repopulation.
    pub async fn rebuild_search_indexes(&self) -> Result<(), Error> {
        for (index, table, _) in FTS_INDEXES {
            self.client
                .query(format!("REBUILD INDEX IF EXISTS {index} ON TABLE {table};"))
                .await?;
        }
        Ok(())
    }

    /// Store an object in its table, keyed by its own id.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn test_schema_and_crud() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.ensure_schema().await.expect("Failed to ensure schema");

        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let stored = db.store_item(dummy.clone()).await.expect("Failed to store");
        assert!(stored.is_some());

        let fetched = db
            .get_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(fetched, Some(dummy.clone()));

        let all = db
            .get_all_stored_items::<Dummy>()
            .await
            .expect("Failed to fetch all");
        assert!(all.contains(&dummy));

        let deleted = db
            .delete_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Some(dummy));

        let fetch_post = db
            .get_item::<Dummy>("abc")
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.ensure_schema().await.expect("first ensure");
        db.ensure_schema().await.expect("second ensure");
        db.rebuild_search_indexes().await.expect("rebuild");
    }
}
