use surrealdb::RecordId;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Closed set of entity kinds. Writers canonicalize; legacy labels from
/// older writers survive as `Other` on read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Person,
    Project,
    Organization,
    Location,
    Event,
    Year,
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Person => "person",
            EntityType::Project => "project",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Event => "event",
            EntityType::Year => "year",
            EntityType::Other(label) => label,
        }
    }
}

impl From<String> for EntityType {
    fn from(label: String) -> Self {
        match label.to_lowercase().as_str() {
            "person" | "people" => EntityType::Person,
            "project" | "projects" => EntityType::Project,
            "organization" | "organizations" => EntityType::Organization,
            "location" | "locations" => EntityType::Location,
            "event" | "conference" | "conferences" | "meeting" | "meetings" | "sprint"
            | "sprints" => EntityType::Event,
            "year" => EntityType::Year,
            _ => EntityType::Other(label),
        }
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

stored_object!(Entity, "entity", {
    entity_type: EntityType,
    entity_name: String
});

impl Entity {
    pub fn new(entity_type: EntityType, entity_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            entity_type,
            entity_name,
        }
    }

    pub fn record_id(&self) -> RecordId {
        RecordId::from_table_key(Self::table_name(), &self.id)
    }

    pub async fn get_by_identity(
        entity_type: &EntityType,
        entity_name: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let row: Option<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE entity_type = $entity_type AND entity_name = $entity_name LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("entity_type", entity_type.clone()))
            .bind(("entity_name", entity_name.to_owned()))
            .await?
            .take(0)?;

        Ok(row)
    }

    /// Deduplicated create keyed on `(entity_type, entity_name)`; returns
    /// the id of the existing or freshly created row.
    pub async fn get_or_create(
        entity_type: EntityType,
        entity_name: &str,
        db: &SurrealDbClient,
    ) -> Result<String, AppError> {
        let entity = Self::new(entity_type.clone(), entity_name.to_string());

        db.client
            .query("BEGIN TRANSACTION;")
            .query(
                "LET $existing = (SELECT VALUE id FROM entity \
                 WHERE entity_type = $entity_type AND entity_name = $entity_name LIMIT 1)[0];",
            )
            .query("IF $existing = NONE { CREATE type::thing('entity', $new_id) CONTENT $entity; };")
            .query("COMMIT TRANSACTION;")
            .bind(("entity_type", entity_type.clone()))
            .bind(("entity_name", entity_name.to_owned()))
            .bind(("new_id", entity.id.clone()))
            .bind(("entity", entity))
            .await?
            .check()?;

        Self::get_by_identity(&entity_type, entity_name, db)
            .await?
            .map(|row| row.id)
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "entity ({entity_type}, {entity_name}) missing after get_or_create"
                ))
            })
    }
}
