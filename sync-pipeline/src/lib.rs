#![allow(clippy::missing_docs_in_private_items)]

pub mod html;
pub mod http;
pub mod planet;
pub mod wiki;
pub mod wordpress;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            source_page::UpsertOutcome,
            task_queue::{QueueTask, TaskType},
        },
    },
};
use serde::Serialize;

/// Per-run statistics every syncer reports. Item-level failures land in
/// `errors` instead of aborting the run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncStats {
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub tasks_queued: usize,
    pub errors: Vec<String>,
}

impl SyncStats {
    pub fn record_error(&mut self, context: &str, error: &AppError) {
        self.errors.push(format!("{context}: {error}"));
    }
}

/// Queue the derivation work for a freshly changed page. Duplicate
/// enqueues are absorbed by the queue and not counted.
pub async fn enqueue_derivations(
    outcome: &UpsertOutcome,
    with_entities: bool,
    db: &SurrealDbClient,
) -> Result<usize, AppError> {
    let mut task_types = vec![TaskType::Chunks, TaskType::Extensions];
    if with_entities {
        task_types.push(TaskType::Entities);
    }

    let mut queued = 0;
    for task_type in task_types {
        if QueueTask::enqueue(&outcome.page_id, &outcome.source_page_id, task_type, 0, db)
            .await?
            .is_some()
        {
            queued += 1;
        }
    }

    Ok(queued)
}
