use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            page::Page,
            page_chunk::PageChunk,
            source_page::SourcePage,
            task_queue::{QueueTask, TaskType},
            StoredObject,
        },
    },
};
use surrealdb::RecordId;
use tracing::{info, warn};

use crate::{chunking::chunk_content, QueueWorker};

/// Drains `chunks` tasks: reads canonical text and atomically replaces
/// the page's chunk rows.
pub struct ChunkWorker {
    chunk_size: usize,
}

impl ChunkWorker {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

#[async_trait]
impl QueueWorker for ChunkWorker {
    fn task_type(&self) -> TaskType {
        TaskType::Chunks
    }

    async fn process(&self, task: &QueueTask, db: &SurrealDbClient) -> Result<(), AppError> {
        let content =
            SourcePage::get_for_derivation(&task.page_id, Some(&task.source_page_id), db).await?;

        let chunk_texts = if content.content_text.trim().is_empty() {
            warn!(page_id = %task.page_id, title = %content.title, "empty content; clearing chunks");
            Vec::new()
        } else {
            chunk_content(&content.content_text, self.chunk_size)
        };

        let page_link = RecordId::from_table_key(Page::table_name(), &task.page_id);
        let written = PageChunk::replace_for_page(&page_link, &chunk_texts, db).await?;

        info!(
            page_id = %task.page_id,
            title = %content.title,
            chunks = written,
            "re-chunked page"
        );

        Ok(())
    }
}
