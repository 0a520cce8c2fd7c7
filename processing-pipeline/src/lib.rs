#![allow(clippy::missing_docs_in_private_items)]

pub mod chunk_worker;
pub mod chunking;
pub mod entity_worker;
pub mod extension_worker;
pub mod user_pages;

use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::task_queue::{QueueTask, TaskCompletion, TaskOutcome, TaskType, DEFAULT_CLAIM_TTL},
    },
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// One derivation worker. Implementations read page content from the
/// content store and write their derived artifact; they never touch the
/// queue row themselves.
#[async_trait]
pub trait QueueWorker: Send + Sync {
    fn task_type(&self) -> TaskType;

    async fn process(&self, task: &QueueTask, db: &SurrealDbClient) -> Result<(), AppError>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Reap expired claims, then claim-process-complete up to `limit` tasks.
/// Per-task errors are captured on the queue row and never escape to the
/// process level.
pub async fn drain_queue(
    worker: &dyn QueueWorker,
    limit: usize,
    db: &Arc<SurrealDbClient>,
) -> Result<WorkerStats, AppError> {
    let worker_id = format!("{}-worker-{}", worker.task_type(), Uuid::new_v4());

    let reaped = QueueTask::reap_expired(db).await?;
    if reaped > 0 {
        info!(reaped, "returned expired claims to pending");
    }

    let mut stats = WorkerStats::default();

    for _ in 0..limit {
        let Some(task) =
            QueueTask::claim(worker.task_type(), &worker_id, DEFAULT_CLAIM_TTL, db).await?
        else {
            break;
        };

        info!(
            %worker_id,
            task_id = %task.id,
            page_id = %task.page_id,
            attempt = task.attempts,
            "claimed task"
        );

        let outcome = match worker.process(&task, db).await {
            Ok(()) => TaskOutcome::Success,
            Err(err) => {
                error!(task_id = %task.id, error = %err, "task failed");
                TaskOutcome::Failure {
                    message: err.to_string(),
                    permanent: !err.is_retryable(),
                }
            }
        };

        let succeeded = matches!(outcome, TaskOutcome::Success);
        match QueueTask::complete(&task.id, &worker_id, outcome, db).await? {
            TaskCompletion::ClaimLost => {
                warn!(task_id = %task.id, "claim expired mid-task; result discarded");
            }
            completion => {
                info!(task_id = %task.id, ?completion, "task finalized");
            }
        }

        stats.processed += 1;
        if succeeded {
            stats.succeeded += 1;
        } else {
            stats.failed += 1;
        }
    }

    Ok(stats)
}
