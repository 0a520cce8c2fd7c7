use std::time::Duration;

use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Chunks,
    Extensions,
    Entities,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Chunks => "chunks",
            TaskType::Extensions => "extensions",
            TaskType::Entities => "entities",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Claimed,
    Succeeded,
    Failed,
    Dead,
}

stored_object!(QueueTask, "task_queue", {
    page_id: String,
    source_page_id: String,
    task_type: TaskType,
    priority: i64,
    attempts: u32,
    max_attempts: u32,
    status: TaskStatus,
    worker_id: Option<String>,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    claimed_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_option_datetime", deserialize_with = "deserialize_option_datetime", default)]
    claim_expires_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    enqueued_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    next_eligible_at: DateTime<Utc>,
    last_error: Option<String>
});

pub const MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_CLAIM_TTL: Duration = Duration::from_secs(600);

const BACKOFF_BASE_SECS: u64 = 30;
const BACKOFF_CAP_SECS: u64 = 3600;
const CLAIM_RACE_RETRIES: usize = 5;
const ERROR_MESSAGE_LIMIT: usize = 500;

/// Exponential backoff with a cap, keyed on how many attempts the task
/// has burned so far.
pub fn retry_backoff(attempts: u32) -> Duration {
    let exponent = attempts.saturating_sub(1).min(10);
    let delay = BACKOFF_BASE_SECS.saturating_mul(2_u64.pow(exponent));
    Duration::from_secs(delay.min(BACKOFF_CAP_SECS))
}

/// Result of finishing a claimed task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success,
    Failure { message: String, permanent: bool },
}

/// What `complete` actually did to the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskCompletion {
    Succeeded,
    Retrying,
    Failed,
    Dead,
    /// The claim expired and was reaped (possibly re-claimed elsewhere);
    /// this worker's result is discarded.
    ClaimLost,
}

impl QueueTask {
    pub fn new(
        page_id: String,
        source_page_id: String,
        task_type: TaskType,
        priority: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            page_id,
            source_page_id,
            task_type,
            priority,
            attempts: 0,
            max_attempts: MAX_ATTEMPTS,
            status: TaskStatus::Pending,
            worker_id: None,
            claimed_at: None,
            claim_expires_at: None,
            enqueued_at: now,
            next_eligible_at: now,
            last_error: None,
        }
    }

    /// Insert a pending task unless one is already pending or claimed for
    /// the same `(page_id, task_type)`. Duplicate attempts are absorbed
    /// and reported as `None`.
    pub async fn enqueue(
        page_id: &str,
        source_page_id: &str,
        task_type: TaskType,
        priority: i64,
        db: &SurrealDbClient,
    ) -> Result<Option<String>, AppError> {
        let task = Self::new(page_id.to_owned(), source_page_id.to_owned(), task_type, priority);
        let queue_id = task.id.clone();

        db.client
            .query("BEGIN TRANSACTION;")
            .query(
                "LET $existing = (SELECT VALUE id FROM task_queue \
                 WHERE page_id = $page_id AND task_type = $task_type \
                 AND (status = 'pending' OR status = 'claimed') LIMIT 1)[0];",
            )
            .query("IF $existing = NONE { CREATE type::thing('task_queue', $new_id) CONTENT $task; };")
            .query("COMMIT TRANSACTION;")
            .bind(("page_id", page_id.to_owned()))
            .bind(("task_type", task_type))
            .bind(("new_id", queue_id.clone()))
            .bind(("task", task))
            .await?
            .check()?;

        let created: Option<Self> = db.get_item(&queue_id).await?;
        Ok(created.map(|task| task.id))
    }

    /// Claim the oldest eligible pending task of one type. The conditional
    /// update re-checks the status, so two concurrent claimers can never
    /// walk away with the same row.
    pub async fn claim(
        task_type: TaskType,
        worker_id: &str,
        claim_ttl: Duration,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        #[derive(Deserialize)]
        struct IdRow {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            id: String,
        }

        for _ in 0..CLAIM_RACE_RETRIES {
            let now = Utc::now();
            let now_dt = surrealdb::sql::Datetime::from(now);

            let candidate: Option<IdRow> = db
                .client
                .query(
                    "SELECT id FROM task_queue \
                     WHERE task_type = $task_type AND status = 'pending' \
                     AND next_eligible_at <= $now \
                     ORDER BY priority DESC, enqueued_at ASC LIMIT 1",
                )
                .bind(("task_type", task_type))
                .bind(("now", now_dt.clone()))
                .await?
                .take(0)?;

            let Some(candidate) = candidate else {
                return Ok(None);
            };

            let expires = surrealdb::sql::Datetime::from(
                now + chrono::Duration::from_std(claim_ttl)
                    .unwrap_or_else(|_| chrono::Duration::seconds(600)),
            );

            let claimed: Vec<Self> = db
                .client
                .query(
                    "UPDATE type::thing('task_queue', $id) SET \
                     status = 'claimed', \
                     worker_id = $worker_id, \
                     claimed_at = $now, \
                     claim_expires_at = $expires, \
                     attempts += 1, \
                     updated_at = $now \
                     WHERE status = 'pending' AND next_eligible_at <= $now \
                     RETURN AFTER",
                )
                .bind(("id", candidate.id))
                .bind(("worker_id", worker_id.to_owned()))
                .bind(("now", now_dt))
                .bind(("expires", expires))
                .await?
                .take(0)?;

            if let Some(task) = claimed.into_iter().next() {
                return Ok(Some(task));
            }
            // Lost the race for this candidate; pick the next one
        }

        Ok(None)
    }

    /// Finalize a claimed task. The update is guarded on the claim still
    /// belonging to this worker, so a reaped-and-reclaimed row is never
    /// double-finalized.
    pub async fn complete(
        queue_id: &str,
        worker_id: &str,
        outcome: TaskOutcome,
        db: &SurrealDbClient,
    ) -> Result<TaskCompletion, AppError> {
        let task: Self = db
            .get_item(queue_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("queue task {queue_id} not found")))?;

        if task.status != TaskStatus::Claimed || task.worker_id.as_deref() != Some(worker_id) {
            return Ok(TaskCompletion::ClaimLost);
        }

        let now = Utc::now();
        let now_dt = surrealdb::sql::Datetime::from(now);

        let (completion, sql, error_message, next_eligible) = match outcome {
            TaskOutcome::Success => (
                TaskCompletion::Succeeded,
                "UPDATE type::thing('task_queue', $id) SET \
                 status = 'succeeded', worker_id = NONE, claimed_at = NONE, \
                 claim_expires_at = NONE, updated_at = $now \
                 WHERE status = 'claimed' AND worker_id = $worker_id RETURN AFTER",
                None,
                None,
            ),
            TaskOutcome::Failure { message, permanent } => {
                let message: String = message.chars().take(ERROR_MESSAGE_LIMIT).collect();
                if permanent {
                    (
                        TaskCompletion::Failed,
                        "UPDATE type::thing('task_queue', $id) SET \
                         status = 'failed', worker_id = NONE, claimed_at = NONE, \
                         claim_expires_at = NONE, last_error = $error, updated_at = $now \
                         WHERE status = 'claimed' AND worker_id = $worker_id RETURN AFTER",
                        Some(message),
                        None,
                    )
                } else if task.attempts >= task.max_attempts {
                    (
                        TaskCompletion::Dead,
                        "UPDATE type::thing('task_queue', $id) SET \
                         status = 'dead', worker_id = NONE, claimed_at = NONE, \
                         claim_expires_at = NONE, last_error = $error, updated_at = $now \
                         WHERE status = 'claimed' AND worker_id = $worker_id RETURN AFTER",
                        Some(message),
                        None,
                    )
                } else {
                    let next = now
                        + chrono::Duration::from_std(retry_backoff(task.attempts))
                            .unwrap_or_else(|_| chrono::Duration::seconds(60));
                    (
                        TaskCompletion::Retrying,
                        "UPDATE type::thing('task_queue', $id) SET \
                         status = 'pending', worker_id = NONE, claimed_at = NONE, \
                         claim_expires_at = NONE, next_eligible_at = $next_eligible, \
                         last_error = $error, updated_at = $now \
                         WHERE status = 'claimed' AND worker_id = $worker_id RETURN AFTER",
                        Some(message),
                        Some(surrealdb::sql::Datetime::from(next)),
                    )
                }
            }
        };

        let mut request = db
            .client
            .query(sql)
            .bind(("id", queue_id.to_owned()))
            .bind(("worker_id", worker_id.to_owned()))
            .bind(("now", now_dt));

        if let Some(error) = error_message {
            request = request.bind(("error", error));
        }
        if let Some(next_eligible) = next_eligible {
            request = request.bind(("next_eligible", next_eligible));
        }

        let updated: Vec<Self> = request.await?.take(0)?;
        if updated.is_empty() {
            return Ok(TaskCompletion::ClaimLost);
        }

        Ok(completion)
    }

    /// Return expired claims to pending so crashed workers cannot starve
    /// the queue. Attempts are left untouched.
    pub async fn reap_expired(db: &SurrealDbClient) -> Result<usize, AppError> {
        let now = surrealdb::sql::Datetime::from(Utc::now());

        let reaped: Vec<Self> = db
            .client
            .query(
                "UPDATE task_queue SET \
                 status = 'pending', worker_id = NONE, claimed_at = NONE, \
                 claim_expires_at = NONE, updated_at = $now \
                 WHERE status = 'claimed' AND claim_expires_at != NONE \
                 AND claim_expires_at < $now \
                 RETURN AFTER",
            )
            .bind(("now", now))
            .await?
            .take(0)?;

        Ok(reaped.len())
    }

    /// Number of live (pending or claimed) rows for one `(page_id,
    /// task_type)` pair; the queue invariant keeps this at most 1.
    pub async fn live_count(
        page_id: &str,
        task_type: TaskType,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: usize,
        }

        let rows: Vec<CountRow> = db
            .client
            .query(
                "SELECT count() AS count FROM task_queue \
                 WHERE page_id = $page_id AND task_type = $task_type \
                 AND (status = 'pending' OR status = 'claimed') GROUP ALL",
            )
            .bind(("page_id", page_id.to_owned()))
            .bind(("task_type", task_type))
            .await?
            .take(0)?;

        Ok(rows.first().map_or(0, |row| row.count))
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

    fn page(id: &str) -> String {
        format!("page-{id}")
    }

    fn source_page(id: &str) -> String {
        format!("source-page-{id}")
    }

    #[test]
    fn test_retry_backoff_is_exponential_and_capped() {
        assert_eq!(retry_backoff(1), Duration::from_secs(30));
        assert_eq!(retry_backoff(2), Duration::from_secs(60));
        assert_eq!(retry_backoff(3), Duration::from_secs(120));
        assert_eq!(retry_backoff(20), Duration::from_secs(BACKOFF_CAP_SECS));
    }

    #[tokio::test]
    async fn test_enqueue_absorbs_duplicates() {
        let db = setup_db().await;
        let page_id = page("7");
        let source_page_id = source_page("7");

        let first = QueueTask::enqueue(&page_id, &source_page_id, TaskType::Chunks, 0, &db)
            .await
            .expect("first enqueue");
        assert!(first.is_some());

        let second = QueueTask::enqueue(&page_id, &source_page_id, TaskType::Chunks, 0, &db)
            .await
            .expect("second enqueue");
        assert!(second.is_none());

        assert_eq!(
            QueueTask::live_count(&page_id, TaskType::Chunks, &db)
                .await
                .expect("count"),
            1
        );
    }

    #[tokio::test]
    async fn test_enqueue_different_task_types_coexist() {
        let db = setup_db().await;
        let page_id = page("7");
        let source_page_id = source_page("7");

        let chunks = QueueTask::enqueue(&page_id, &source_page_id, TaskType::Chunks, 0, &db)
            .await
            .expect("chunks");
        let extensions =
            QueueTask::enqueue(&page_id, &source_page_id, TaskType::Extensions, 0, &db)
                .await
                .expect("extensions");

        assert!(chunks.is_some());
        assert!(extensions.is_some());
    }

    #[tokio::test]
    async fn test_enqueue_after_success_creates_fresh_task() {
        let db = setup_db().await;
        let page_id = page("7");
        let source_page_id = source_page("7");

        let first = QueueTask::enqueue(&page_id, &source_page_id, TaskType::Chunks, 0, &db)
            .await
            .expect("enqueue")
            .expect("queue id");

        let claimed = QueueTask::claim(TaskType::Chunks, "w1", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim")
            .expect("task");
        QueueTask::complete(&claimed.id, "w1", TaskOutcome::Success, &db)
            .await
            .expect("complete");

        let second = QueueTask::enqueue(&page_id, &source_page_id, TaskType::Chunks, 0, &db)
            .await
            .expect("re-enqueue");
        assert!(second.is_some());
        assert_ne!(second, Some(first));
    }

    #[tokio::test]
    async fn test_claim_sets_lease_and_attempts() {
        let db = setup_db().await;
        QueueTask::enqueue(&page("1"), &source_page("1"), TaskType::Chunks, 0, &db)
            .await
            .expect("enqueue");

        let task = QueueTask::claim(TaskType::Chunks, "worker-a", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim")
            .expect("claimed task");

        assert_eq!(task.status, TaskStatus::Claimed);
        assert_eq!(task.worker_id.as_deref(), Some("worker-a"));
        assert_eq!(task.attempts, 1);
        assert!(task.claimed_at.is_some());
        assert!(task.claim_expires_at.expect("expiry") > Utc::now());
    }

    #[tokio::test]
    async fn test_claim_empty_queue_returns_none() {
        let db = setup_db().await;
        let claimed = QueueTask::claim(TaskType::Entities, "w", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim");
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_claim_respects_priority_then_age() {
        let db = setup_db().await;

        let mut old_low = QueueTask::new(page("a"), source_page("a"), TaskType::Chunks, 0);
        old_low.enqueued_at = Utc::now() - chrono::Duration::minutes(10);
        let mut new_high = QueueTask::new(page("b"), source_page("b"), TaskType::Chunks, 5);
        new_high.enqueued_at = Utc::now() - chrono::Duration::minutes(1);
        let mut old_mid = QueueTask::new(page("c"), source_page("c"), TaskType::Chunks, 0);
        old_mid.enqueued_at = Utc::now() - chrono::Duration::minutes(5);

        db.store_item(old_low.clone()).await.expect("store");
        db.store_item(new_high.clone()).await.expect("store");
        db.store_item(old_mid.clone()).await.expect("store");

        let first = QueueTask::claim(TaskType::Chunks, "w", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim")
            .expect("task");
        assert_eq!(first.id, new_high.id, "priority wins");

        let second = QueueTask::claim(TaskType::Chunks, "w", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim")
            .expect("task");
        assert_eq!(second.id, old_low.id, "older task first within priority");

        let third = QueueTask::claim(TaskType::Chunks, "w", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim")
            .expect("task");
        assert_eq!(third.id, old_mid.id);
    }

    #[tokio::test]
    async fn test_claim_skips_backoff_window() {
        let db = setup_db().await;

        let mut task = QueueTask::new(page("a"), source_page("a"), TaskType::Chunks, 0);
        task.next_eligible_at = Utc::now() + chrono::Duration::minutes(5);
        db.store_item(task).await.expect("store");

        let claimed = QueueTask::claim(TaskType::Chunks, "w", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim");
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_share_a_task() {
        let db = setup_db().await;
        QueueTask::enqueue(&page("1"), &source_page("1"), TaskType::Chunks, 0, &db)
            .await
            .expect("enqueue");
        QueueTask::enqueue(&page("2"), &source_page("2"), TaskType::Chunks, 0, &db)
            .await
            .expect("enqueue");

        let (a, b) = tokio::join!(
            QueueTask::claim(TaskType::Chunks, "worker-a", DEFAULT_CLAIM_TTL, &db),
            QueueTask::claim(TaskType::Chunks, "worker-b", DEFAULT_CLAIM_TTL, &db),
        );

        let a = a.expect("claim a");
        let b = b.expect("claim b");

        if let (Some(a), Some(b)) = (&a, &b) {
            assert_ne!(a.id, b.id, "two claimers must never share a task");
        }
    }

    #[tokio::test]
    async fn test_complete_success() {
        let db = setup_db().await;
        QueueTask::enqueue(&page("1"), &source_page("1"), TaskType::Extensions, 0, &db)
            .await
            .expect("enqueue");

        let task = QueueTask::claim(TaskType::Extensions, "w", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim")
            .expect("task");

        let completion = QueueTask::complete(&task.id, "w", TaskOutcome::Success, &db)
            .await
            .expect("complete");
        assert_eq!(completion, TaskCompletion::Succeeded);

        let stored: QueueTask = db.get_item(&task.id).await.unwrap().expect("row");
        assert_eq!(stored.status, TaskStatus::Succeeded);
        assert!(stored.worker_id.is_none());
        assert!(stored.claim_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_complete_retryable_failure_requeues_with_backoff() {
        let db = setup_db().await;
        QueueTask::enqueue(&page("1"), &source_page("1"), TaskType::Extensions, 0, &db)
            .await
            .expect("enqueue");

        let task = QueueTask::claim(TaskType::Extensions, "w", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim")
            .expect("task");

        let completion = QueueTask::complete(
            &task.id,
            "w",
            TaskOutcome::Failure {
                message: "LLM rate limited".to_string(),
                permanent: false,
            },
            &db,
        )
        .await
        .expect("complete");
        assert_eq!(completion, TaskCompletion::Retrying);

        let stored: QueueTask = db.get_item(&task.id).await.unwrap().expect("row");
        assert_eq!(stored.status, TaskStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert!(stored.next_eligible_at > Utc::now());
        assert_eq!(stored.last_error.as_deref(), Some("LLM rate limited"));

        // The backoff window keeps it out of reach for now
        let reclaim = QueueTask::claim(TaskType::Extensions, "w", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim");
        assert!(reclaim.is_none());
    }

    #[tokio::test]
    async fn test_complete_exhausted_attempts_goes_dead() {
        let db = setup_db().await;

        let mut task = QueueTask::new(page("1"), source_page("1"), TaskType::Entities, 0);
        task.attempts = MAX_ATTEMPTS;
        task.status = TaskStatus::Claimed;
        task.worker_id = Some("w".to_string());
        task.claimed_at = Some(Utc::now());
        task.claim_expires_at = Some(Utc::now() + chrono::Duration::minutes(10));
        db.store_item(task.clone()).await.expect("store");

        let completion = QueueTask::complete(
            &task.id,
            "w",
            TaskOutcome::Failure {
                message: "still failing".to_string(),
                permanent: false,
            },
            &db,
        )
        .await
        .expect("complete");
        assert_eq!(completion, TaskCompletion::Dead);

        let stored: QueueTask = db.get_item(&task.id).await.unwrap().expect("row");
        assert_eq!(stored.status, TaskStatus::Dead);
        assert_eq!(stored.last_error.as_deref(), Some("still failing"));
    }

    #[tokio::test]
    async fn test_complete_permanent_failure_is_failed() {
        let db = setup_db().await;
        QueueTask::enqueue(&page("1"), &source_page("1"), TaskType::Chunks, 0, &db)
            .await
            .expect("enqueue");

        let task = QueueTask::claim(TaskType::Chunks, "w", DEFAULT_CLAIM_TTL, &db)
            .await
            .expect("claim")
            .expect("task");

        let completion = QueueTask::complete(
            &task.id,
            "w",
            TaskOutcome::Failure {
                message: "page 1 not found".to_string(),
                permanent: true,
            },
            &db,
        )
        .await
        .expect("complete");
        assert_eq!(completion, TaskCompletion::Failed);

        let stored: QueueTask = db.get_item(&task.id).await.unwrap().expect("row");
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_reap_expired_returns_claims_to_pending() {
        let db = setup_db().await;

        let mut expired = QueueTask::new(page("1"), source_page("1"), TaskType::Chunks, 0);
        expired.status = TaskStatus::Claimed;
        expired.worker_id = Some("crashed".to_string());
        expired.attempts = 2;
        expired.claimed_at = Some(Utc::now() - chrono::Duration::minutes(30));
        expired.claim_expires_at = Some(Utc::now() - chrono::Duration::minutes(20));
        db.store_item(expired.clone()).await.expect("store");

        let mut live = QueueTask::new(page("2"), source_page("2"), TaskType::Chunks, 0);
        live.status = TaskStatus::Claimed;
        live.worker_id = Some("alive".to_string());
        live.claimed_at = Some(Utc::now());
        live.claim_expires_at = Some(Utc::now() + chrono::Duration::minutes(10));
        db.store_item(live.clone()).await.expect("store");

        let reaped = QueueTask::reap_expired(&db).await.expect("reap");
        assert_eq!(reaped, 1);

        let stored: QueueTask = db.get_item(&expired.id).await.unwrap().expect("row");
        assert_eq!(stored.status, TaskStatus::Pending);
        assert_eq!(stored.attempts, 2, "reaping does not burn attempts");
        assert!(stored.worker_id.is_none());

        let untouched: QueueTask = db.get_item(&live.id).await.unwrap().expect("row");
        assert_eq!(untouched.status, TaskStatus::Claimed);
    }

    #[tokio::test]
    async fn test_complete_after_reap_reports_claim_lost() {
        let db = setup_db().await;

        let mut task = QueueTask::new(page("1"), source_page("1"), TaskType::Chunks, 0);
        task.status = TaskStatus::Claimed;
        task.worker_id = Some("slow-worker".to_string());
        task.attempts = 1;
        task.claimed_at = Some(Utc::now() - chrono::Duration::minutes(30));
        task.claim_expires_at = Some(Utc::now() - chrono::Duration::minutes(20));
        db.store_item(task.clone()).await.expect("store");

        QueueTask::reap_expired(&db).await.expect("reap");

        let completion = QueueTask::complete(&task.id, "slow-worker", TaskOutcome::Success, &db)
            .await
            .expect("complete");
        assert_eq!(completion, TaskCompletion::ClaimLost);

        let stored: QueueTask = db.get_item(&task.id).await.unwrap().expect("row");
        assert_eq!(stored.status, TaskStatus::Pending, "no double finalize");
    }
}
