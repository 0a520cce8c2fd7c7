use surrealdb::RecordId;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(EntityRelationship, "entity_relationship", {
    subject_id: RecordId,
    predicate: String,
    object_id: RecordId,
    source_page_id: RecordId,
    confidence: f32
});

impl EntityRelationship {
    pub fn new(
        subject_id: RecordId,
        predicate: String,
        object_id: RecordId,
        source_page_id: RecordId,
        confidence: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            subject_id,
            predicate,
            object_id,
            source_page_id,
            confidence,
        }
    }

    /// Insert unless the identical triple from the same source page
    /// already exists. Returns whether a row was created.
    pub async fn insert_unique(&self, db: &SurrealDbClient) -> Result<bool, AppError> {
        let before = Self::exists(self, db).await?;
        if before {
            return Ok(false);
        }

        db.client
            .query("BEGIN TRANSACTION;")
            .query(
                "LET $existing = (SELECT VALUE id FROM entity_relationship \
                 WHERE subject_id = $subject_id AND predicate = $predicate \
                 AND object_id = $object_id AND source_page_id = $source_page_id LIMIT 1)[0];",
            )
            .query(
                "IF $existing = NONE { \
                 CREATE type::thing('entity_relationship', $new_id) CONTENT $relationship; };",
            )
            .query("COMMIT TRANSACTION;")
            .bind(("subject_id", self.subject_id.clone()))
            .bind(("predicate", self.predicate.clone()))
            .bind(("object_id", self.object_id.clone()))
            .bind(("source_page_id", self.source_page_id.clone()))
            .bind(("new_id", self.id.clone()))
            .bind(("relationship", self.clone()))
            .await?
            .check()?;

        Ok(true)
    }

    async fn exists(relationship: &Self, db: &SurrealDbClient) -> Result<bool, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: usize,
        }

        let rows: Vec<CountRow> = db
            .client
            .query(
                "SELECT count() AS count FROM entity_relationship \
                 WHERE subject_id = $subject_id AND predicate = $predicate \
                 AND object_id = $object_id AND source_page_id = $source_page_id GROUP ALL",
            )
            .bind(("subject_id", relationship.subject_id.clone()))
            .bind(("predicate", relationship.predicate.clone()))
            .bind(("object_id", relationship.object_id.clone()))
            .bind(("source_page_id", relationship.source_page_id.clone()))
            .await?
            .take(0)?;

        Ok(rows.first().is_some_and(|row| row.count > 0))
    }

    pub async fn count_for_page(
        source_page_id: &RecordId,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: usize,
        }

        let rows: Vec<CountRow> = db
            .client
            .query(
                "SELECT count() AS count FROM entity_relationship \
                 WHERE source_page_id = $source_page_id GROUP ALL",
            )
            .bind(("source_page_id", source_page_id.clone()))
            .await?
            .take(0)?;

        Ok(rows.first().map_or(0, |row| row.count))
    }
}
