use surrealdb::RecordId;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(PageChunk, "page_chunk", {
    page_id: RecordId,
    chunk_index: i64,
    chunk_text: String
});

impl PageChunk {
    pub fn new(page_id: RecordId, chunk_index: i64, chunk_text: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            page_id,
            chunk_index,
            chunk_text,
        }
    }

    /// Replace the chunk set for a page in one transaction. Readers see
    /// either the old full set or the new full set, never a mix.
    pub async fn replace_for_page(
        page_id: &RecordId,
        chunk_texts: &[String],
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        let chunks: Vec<PageChunk> = chunk_texts
            .iter()
            .enumerate()
            .map(|(index, text)| PageChunk::new(page_id.clone(), index as i64, text.clone()))
            .collect();

        let mut request = db
            .client
            .query("BEGIN TRANSACTION;")
            .query("DELETE page_chunk WHERE page_id = $page_id;");

        for index in 0..chunks.len() {
            request = request.query(format!(
                "CREATE type::thing('page_chunk', $chunk_id_{index}) CONTENT $chunk_{index};"
            ));
        }

        request = request
            .query("COMMIT TRANSACTION;")
            .bind(("page_id", page_id.clone()));

        for (index, chunk) in chunks.iter().enumerate() {
            request = request
                .bind((format!("chunk_id_{index}"), chunk.id.clone()))
                .bind((format!("chunk_{index}"), chunk.clone()));
        }

        request.await?.check()?;

        Ok(chunks.len())
    }

    pub async fn get_for_page(
        page_id: &RecordId,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let chunks: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE page_id = $page_id \
                 ORDER BY chunk_index ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("page_id", page_id.clone()))
            .await?
            .take(0)?;

        Ok(chunks)
    }

    /// The first chunk of a page; user-page template parsing reads it.
    pub async fn first_for_page(
        page_id: &RecordId,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let chunk: Option<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE page_id = $page_id AND chunk_index = 0 LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("page_id", page_id.clone()))
            .await?
            .take(0)?;

        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_schema().await.expect("schema");
        db
    }

    fn page_record(id: &str) -> RecordId {
        RecordId::from_table_key("page", id)
    }

    #[tokio::test]
    async fn test_replace_creates_ordered_chunks() {
        let db = setup_db().await;
        let page_id = page_record("p1");

        let written = PageChunk::replace_for_page(
            &page_id,
            &["first".to_string(), "second".to_string()],
            &db,
        )
        .await
        .expect("replace");
        assert_eq!(written, 2);

        let chunks = PageChunk::get_for_page(&page_id, &db).await.expect("get");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].chunk_text, "first");
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[1].chunk_text, "second");
    }

    #[tokio::test]
    async fn test_replace_removes_previous_set() {
        let db = setup_db().await;
        let page_id = page_record("p1");

        PageChunk::replace_for_page(
            &page_id,
            &["a".to_string(), "b".to_string(), "c".to_string()],
            &db,
        )
        .await
        .expect("first replace");

        PageChunk::replace_for_page(&page_id, &["only".to_string()], &db)
            .await
            .expect("second replace");

        let chunks = PageChunk::get_for_page(&page_id, &db).await.expect("get");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_text, "only");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn test_replace_with_empty_set_clears_page() {
        let db = setup_db().await;
        let page_id = page_record("p1");

        PageChunk::replace_for_page(&page_id, &["a".to_string()], &db)
            .await
            .expect("seed");
        let written = PageChunk::replace_for_page(&page_id, &[], &db)
            .await
            .expect("clear");

        assert_eq!(written, 0);
        let chunks = PageChunk::get_for_page(&page_id, &db).await.expect("get");
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_replace_does_not_touch_other_pages() {
        let db = setup_db().await;
        let page_a = page_record("a");
        let page_b = page_record("b");

        PageChunk::replace_for_page(&page_a, &["alpha".to_string()], &db)
            .await
            .expect("page a");
        PageChunk::replace_for_page(&page_b, &["beta".to_string()], &db)
            .await
            .expect("page b");

        PageChunk::replace_for_page(&page_a, &["alpha2".to_string()], &db)
            .await
            .expect("page a again");

        let b_chunks = PageChunk::get_for_page(&page_b, &db).await.expect("get b");
        assert_eq!(b_chunks.len(), 1);
        assert_eq!(b_chunks[0].chunk_text, "beta");
    }

    #[tokio::test]
    async fn test_first_for_page() {
        let db = setup_db().await;
        let page_id = page_record("p1");

        PageChunk::replace_for_page(
            &page_id,
            &["head".to_string(), "tail".to_string()],
            &db,
        )
        .await
        .expect("replace");

        let first = PageChunk::first_for_page(&page_id, &db)
            .await
            .expect("first")
            .expect("present");
        assert_eq!(first.chunk_text, "head");

        let missing = PageChunk::first_for_page(&page_record("other"), &db)
            .await
            .expect("first");
        assert!(missing.is_none());
    }
}
