use std::{collections::HashMap, sync::LazyLock};

use async_trait::async_trait;
use common::{
    error::AppError,
    llm::LlmClient,
    storage::{
        db::SurrealDbClient,
        types::{
            entity::{Entity, EntityType},
            entity_relationship::EntityRelationship,
            page::Page,
            page_chunk::PageChunk,
            source_page::SourcePage,
            task_queue::{QueueTask, TaskType},
            StoredObject,
        },
    },
};
use regex::Regex;
use serde::Deserialize;
use surrealdb::RecordId;
use tracing::{info, warn};

use crate::{chunking, user_pages, QueueWorker};

pub const MAX_CONTENT_LENGTH: usize = 8_000;
pub const MAX_RELATIONSHIPS: usize = 50;

/// Confidence recorded for LLM-extracted triples.
pub const LLM_CONFIDENCE: f32 = 0.8;

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap_or_else(|_| unreachable!()));

/// Entity lists as the extraction prompt returns them; missing keys
/// default to empty arrays.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
pub struct ExtractedEntities {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub conferences: Vec<String>,
    #[serde(default)]
    pub meetings: Vec<String>,
    #[serde(default)]
    pub sprints: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
}

impl ExtractedEntities {
    pub fn total(&self) -> usize {
        self.grouped().iter().map(|(_, names, _)| names.len()).sum()
    }

    /// Canonical entity type per group; the bool marks temporal groups
    /// that feed year extraction.
    pub fn grouped(&self) -> Vec<(EntityType, &[String], bool)> {
        vec![
            (EntityType::Person, self.people.as_slice(), false),
            (EntityType::Project, self.projects.as_slice(), false),
            (EntityType::Organization, self.organizations.as_slice(), false),
            (EntityType::Event, self.conferences.as_slice(), true),
            (EntityType::Event, self.meetings.as_slice(), true),
            (EntityType::Event, self.sprints.as_slice(), true),
            (EntityType::Location, self.locations.as_slice(), false),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse the extraction response defensively: malformed JSON logs a
/// warning and yields no entities rather than failing the task.
pub fn parse_entity_response(raw: &str) -> ExtractedEntities {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str(&cleaned) {
        Ok(entities) => entities,
        Err(err) => {
            warn!(error = %err, payload = %cleaned.chars().take(200).collect::<String>(),
                  "entity extraction returned malformed JSON");
            ExtractedEntities::default()
        }
    }
}

pub fn normalize_predicate(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// Parse `Subject | predicate | Object` lines, one triple per line.
pub fn parse_relationship_lines(raw: &str) -> Vec<RelationshipTriple> {
    if raw.to_uppercase().contains("NONE") {
        return Vec::new();
    }

    let mut triples = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if !line.contains('|') {
            continue;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() >= 3 && !parts[0].is_empty() && !parts[2].is_empty() {
            triples.push(RelationshipTriple {
                subject: parts[0].to_string(),
                predicate: normalize_predicate(parts[1]),
                object: parts[2].to_string(),
            });
        }
    }

    triples.truncate(MAX_RELATIONSHIPS);
    triples
}

/// First 4-digit year mentioned in an entity name.
pub fn extract_year(name: &str) -> Option<String> {
    YEAR.find(name).map(|found| found.as_str().to_string())
}

pub fn entity_prompt(title: &str, content: &str) -> String {
    let content: String = content.chars().take(MAX_CONTENT_LENGTH).collect();
    format!(
        "Extract entities from this OSGeo wiki page: \"{title}\"\n\
         \n\
         ONLY extract entities explicitly mentioned in the text.\n\
         \n\
         Return ONLY valid JSON:\n\
         {{\n\
           \"people\": [\"First Last\", \"First Last\"],\n\
           \"projects\": [\"ProjectName\", \"ProjectName\"],\n\
           \"organizations\": [\"Org Name\", \"Org Name\"],\n\
           \"conferences\": [\"FOSS4G 2022\", \"Regional Conference 2023\"],\n\
           \"meetings\": [\"Board Meeting March 2023\", \"General Assembly 2022\"],\n\
           \"sprints\": [\"Code Sprint 2023\", \"Developer Sprint 2022\"],\n\
           \"locations\": [\"City, Country\", \"City, Country\"]\n\
         }}\n\
         \n\
         Rules:\n\
         - Extract names exactly as written\n\
         - Conferences: FOSS4G events and regional conferences\n\
         - Meetings: Board meetings, committee meetings, assemblies\n\
         - Sprints: Code sprints, development events\n\
         - No explanations, just JSON\n\
         - Empty arrays if none found\n\
         - Maximum 20 entities per type\n\
         \n\
         Text:\n\
         {content}\n\
         \n\
         JSON:"
    )
}

pub fn relationship_prompt(title: &str, content: &str, entity_names: &[String]) -> String {
    let content: String = content.chars().take(MAX_CONTENT_LENGTH).collect();
    let listed = entity_names
        .iter()
        .take(30)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "From \"{title}\", extract relationships between these entities:\n\
         \n\
         Entities: {listed}\n\
         \n\
         Format each relationship as:\n\
         Subject | predicate | Object\n\
         \n\
         Common predicates:\n\
         - is_member_of, works_for\n\
         - is_project_of, founded_by\n\
         - located_in, happened_in\n\
         - contributed_to, created\n\
         - organized_by, hosted_by\n\
         \n\
         Return ONLY relationships found in text. One per line.\n\
         If none found, return: NONE\n\
         \n\
         Text:\n\
         {content}\n\
         \n\
         RELATIONSHIPS:"
    )
}

/// Drains `entities` tasks. `User:` pages go through the structured
/// template path without any LLM call; everything else is extracted with
/// two LLM passes (entities, then pairwise relationships).
pub struct EntityWorker {
    llm: LlmClient,
}

impl EntityWorker {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    async fn process_structured(
        &self,
        task: &QueueTask,
        title: &str,
        content_text: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let page_link = RecordId::from_table_key(Page::table_name(), &task.page_id);

        let first_chunk = match PageChunk::first_for_page(&page_link, db).await? {
            Some(chunk) => chunk.chunk_text,
            // Chunk worker may not have run yet; derive the head directly
            None => chunking::chunk_content(content_text, chunking::DEFAULT_CHUNK_SIZE)
                .into_iter()
                .next()
                .unwrap_or_default(),
        };

        let outcome = user_pages::apply_user_page(&task.page_id, title, &first_chunk, db).await?;
        info!(
            title,
            entities = outcome.entities,
            relationships = outcome.relationships,
            "populated entities from user page template"
        );

        Ok(())
    }

    async fn process_unstructured(
        &self,
        task: &QueueTask,
        title: &str,
        content_text: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        info!(title, "extracting entities");
        let raw = self
            .llm
            .generate(&entity_prompt(title, content_text), 0.1, 2048)
            .await?;
        let extracted = parse_entity_response(&raw.text);

        if extracted.total() == 0 {
            info!(title, "no entities found");
            return Ok(());
        }

        let page_link = RecordId::from_table_key(Page::table_name(), &task.page_id);
        let mut entity_links: HashMap<String, RecordId> = HashMap::new();
        let mut entities_created = 0;

        for (entity_type, names, temporal) in extracted.grouped() {
            for name in names {
                let name = name.trim();
                if name.len() < 2 {
                    continue;
                }

                let entity_id = Entity::get_or_create(entity_type.clone(), name, db).await?;
                let entity_link = RecordId::from_table_key(Entity::table_name(), &entity_id);
                entity_links.insert(name.to_string(), entity_link.clone());
                entities_created += 1;

                if temporal {
                    if let Some(year) = extract_year(name) {
                        let year_id = Entity::get_or_create(EntityType::Year, &year, db).await?;
                        EntityRelationship::new(
                            entity_link,
                            "happened_in".to_string(),
                            RecordId::from_table_key(Entity::table_name(), &year_id),
                            page_link.clone(),
                            LLM_CONFIDENCE,
                        )
                        .insert_unique(db)
                        .await?;
                    }
                }
            }
        }

        let mut relationships_created = 0;
        if entity_links.len() >= 2 {
            let names: Vec<String> = entity_links.keys().cloned().collect();

            info!(title, "extracting relationships");
            let raw = self
                .llm
                .generate(&relationship_prompt(title, content_text, &names), 0.1, 2048)
                .await?;

            for triple in parse_relationship_lines(&raw.text) {
                let (Some(subject), Some(object)) = (
                    entity_links.get(&triple.subject),
                    entity_links.get(&triple.object),
                ) else {
                    // Triples over entities we never extracted are dropped
                    continue;
                };

                let created = EntityRelationship::new(
                    subject.clone(),
                    triple.predicate,
                    object.clone(),
                    page_link.clone(),
                    LLM_CONFIDENCE,
                )
                .insert_unique(db)
                .await?;
                if created {
                    relationships_created += 1;
                }
            }
        }

        info!(
            page_id = %task.page_id,
            title,
            entities = entities_created,
            relationships = relationships_created,
            "processed entities"
        );

        Ok(())
    }
}

#[async_trait]
impl QueueWorker for EntityWorker {
    fn task_type(&self) -> TaskType {
        TaskType::Entities
    }

    async fn process(&self, task: &QueueTask, db: &SurrealDbClient) -> Result<(), AppError> {
        let content =
            SourcePage::get_for_derivation(&task.page_id, Some(&task.source_page_id), db).await?;

        if content.content_text.trim().is_empty() {
            warn!(page_id = %task.page_id, title = %content.title, "empty content; nothing to extract");
            return Ok(());
        }

        if content.title.starts_with("User:") {
            self.process_structured(task, &content.title, &content.content_text, db)
                .await
        } else {
            self.process_unstructured(task, &content.title, &content.content_text, db)
                .await
        }
    }
}
