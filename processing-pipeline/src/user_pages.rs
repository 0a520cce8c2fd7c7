use std::collections::HashMap;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            entity::{Entity, EntityType},
            entity_relationship::EntityRelationship,
            page::Page,
            StoredObject,
        },
    },
};
use surrealdb::RecordId;
use tracing::debug;

/// Confidence for template-derived facts; higher than LLM extraction.
pub const STRUCTURED_CONFIDENCE: f32 = 1.0;

const PLACEHOLDER_SENTINELS: [&str; 2] = ["Loading map...", "OSGeo Member"];

/// Whitelisted template fields and the entity/predicate they map to.
pub fn entity_fields() -> [(&'static str, EntityType, &'static str); 7] {
    [
        ("name", EntityType::Person, "is_alias_of"),
        ("address", EntityType::Location, "lives_at"),
        ("city", EntityType::Location, "lives_in_city"),
        ("state", EntityType::Location, "lives_in_state"),
        ("country", EntityType::Location, "lives_in_country"),
        ("company", EntityType::Organization, "works_for"),
        ("local_chapter", EntityType::Organization, "member_of"),
    ]
}

/// Values that mean "the user never filled this in".
pub fn is_placeholder(value: &str) -> bool {
    value.is_empty()
        || value.starts_with("[[")
        || value.starts_with("{{{")
        || PLACEHOLDER_SENTINELS.contains(&value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPageFields {
    pub username: String,
    pub fields: HashMap<String, String>,
}

/// Parse the `Field:` / value-on-next-line template used on `User:`
/// pages. Returns `None` when the title carries no username.
pub fn parse_user_template(title: &str, chunk_text: &str) -> Option<UserPageFields> {
    let username = title.strip_prefix("User:")?.trim().to_string();
    if username.is_empty() {
        return None;
    }

    let lines: Vec<&str> = chunk_text.lines().collect();
    let mut fields = HashMap::new();

    for (index, line) in lines.iter().enumerate() {
        let line = line.trim();
        let Some(raw_name) = line.strip_suffix(':') else {
            continue;
        };
        if raw_name.is_empty() {
            continue;
        }

        let field_name = raw_name
            .to_lowercase()
            .replace(' ', "_")
            .replace(['(', ')'], "");

        if let Some(next_line) = lines.get(index + 1) {
            let value = next_line.trim();
            if !value.is_empty() && !value.ends_with(':') && !is_placeholder(value) {
                fields.insert(field_name, value.to_string());
            }
        }
    }

    Some(UserPageFields { username, fields })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserPageOutcome {
    pub entities: usize,
    pub relationships: usize,
}

/// Populate entities and relationships from a user-page template, no LLM
/// involved. Relationships hang off the username entity.
pub async fn apply_user_page(
    page_id: &str,
    title: &str,
    chunk_text: &str,
    db: &SurrealDbClient,
) -> Result<UserPageOutcome, AppError> {
    let parsed = parse_user_template(title, chunk_text)
        .ok_or_else(|| AppError::Validation(format!("no username in page title {title:?}")))?;

    let username_id = Entity::get_or_create(EntityType::Person, &parsed.username, db).await?;
    let username_link = RecordId::from_table_key(Entity::table_name(), &username_id);
    let page_link = RecordId::from_table_key(Page::table_name(), page_id);

    let mut outcome = UserPageOutcome {
        entities: 1,
        relationships: 0,
    };

    for (field_name, entity_type, predicate) in entity_fields() {
        let Some(value) = parsed.fields.get(field_name) else {
            continue;
        };

        let entity_id = Entity::get_or_create(entity_type, value, db).await?;
        outcome.entities += 1;
        debug!(username = %parsed.username, field = field_name, value = %value, "template field accepted");

        let relationship = EntityRelationship::new(
            username_link.clone(),
            predicate.to_string(),
            RecordId::from_table_key(Entity::table_name(), &entity_id),
            page_link.clone(),
            STRUCTURED_CONFIDENCE,
        );
        if relationship.insert_unique(db).await? {
            outcome.relationships += 1;
        }
    }

    Ok(outcome)
}
