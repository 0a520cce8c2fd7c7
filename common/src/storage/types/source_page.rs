use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::page::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Wiki,
    WordpressPage,
    PlanetPost,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Wiki => "wiki",
            SourceType::WordpressPage => "wordpress_page",
            SourceType::PlanetPost => "planet_post",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

stored_object!(SourcePage, "source_page", {
    source_type: SourceType,
    source_id: String,
    title: String,
    url: String,
    last_revid: Option<i64>,
    content_hash: String,
    content_text: String,
    content_html: String,
    categories: Vec<String>,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    last_synced: DateTime<Utc>,
    status: String
});

/// Everything a syncer knows about one fetched page.
#[derive(Debug, Clone)]
pub struct SourcePageDraft {
    pub source_type: SourceType,
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub content_text: String,
    pub content_html: String,
    pub last_revid: Option<i64>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub source_page_id: String,
    pub page_id: String,
    pub changed: bool,
}

/// The content slice workers derive from; the content store is their sole
/// source of page text.
#[derive(Debug, Clone)]
pub struct DerivationContent {
    pub title: String,
    pub url: String,
    pub content_text: String,
    pub content_hash: String,
}

impl SourcePage {
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn get_by_identity(
        source_type: SourceType,
        source_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let row: Option<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE source_type = $source_type AND source_id = $source_id LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("source_type", source_type))
            .bind(("source_id", source_id.to_owned()))
            .await?
            .take(0)?;

        Ok(row)
    }

    /// Upsert the canonical record and its paired `page` row in one
    /// transaction. `changed` is true iff the row is new or the content
    /// hash differs; `last_synced` is refreshed either way.
    pub async fn upsert(
        draft: SourcePageDraft,
        db: &SurrealDbClient,
    ) -> Result<UpsertOutcome, AppError> {
        let now = Utc::now();
        let content_hash = Self::hash_content(&draft.content_text);

        let existing = Self::get_by_identity(draft.source_type, &draft.source_id, db).await?;
        let existing_page = Page::get_by_url(&draft.url, db).await?;

        let changed = existing
            .as_ref()
            .is_none_or(|row| row.content_hash != content_hash);

        let source_page = SourcePage {
            id: existing
                .as_ref()
                .map_or_else(|| Uuid::new_v4().to_string(), |row| row.id.clone()),
            created_at: existing.as_ref().map_or(now, |row| row.created_at),
            updated_at: now,
            source_type: draft.source_type,
            source_id: draft.source_id,
            title: draft.title.clone(),
            url: draft.url.clone(),
            last_revid: draft.last_revid,
            content_hash,
            content_text: draft.content_text,
            content_html: draft.content_html,
            categories: draft.categories,
            last_synced: now,
            status: "active".to_string(),
        };

        let page = Page {
            id: existing_page
                .as_ref()
                .map_or_else(|| Uuid::new_v4().to_string(), |row| row.id.clone()),
            created_at: existing_page.as_ref().map_or(now, |row| row.created_at),
            updated_at: now,
            title: draft.title,
            url: draft.url,
            last_crawled: now,
        };

        let outcome = UpsertOutcome {
            source_page_id: source_page.id.clone(),
            page_id: page.id.clone(),
            changed,
        };

        db.client
            .query("BEGIN TRANSACTION;")
            .query("UPSERT type::thing('page', $page_id) CONTENT $page;")
            .query("UPSERT type::thing('source_page', $source_page_id) CONTENT $source_page;")
            .query("COMMIT TRANSACTION;")
            .bind(("page_id", page.id.clone()))
            .bind(("page", page))
            .bind(("source_page_id", source_page.id.clone()))
            .bind(("source_page", source_page))
            .await?
            .check()?;

        Ok(outcome)
    }

    /// Resolve worker input, preferring the direct source_page id and
    /// falling back to the page-url join.
    pub async fn get_for_derivation(
        page_id: &str,
        source_page_id: Option<&str>,
        db: &SurrealDbClient,
    ) -> Result<DerivationContent, AppError> {
        if let Some(source_page_id) = source_page_id {
            if let Some(row) = db.get_item::<Self>(source_page_id).await? {
                return Ok(row.into_derivation_content());
            }
        }

        let page = db
            .get_item::<Page>(page_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("page {page_id} not found")))?;

        let row: Option<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE url = $url LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("url", page.url.clone()))
            .await?
            .take(0)?;

        row.map(Self::into_derivation_content).ok_or_else(|| {
            AppError::NotFound(format!("no source content for page {} ({})", page.id, page.url))
        })
    }

    fn into_derivation_content(self) -> DerivationContent {
        DerivationContent {
            title: self.title,
            url: self.url,
            content_text: self.content_text,
            content_hash: self.content_hash,
        }
    }

    /// Delete rows of one source type not synced within the window,
    /// cascading to the page row and everything derived from it.
    pub async fn prune_old(
        source_type: SourceType,
        older_than_days: i64,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
        let cutoff = surrealdb::sql::Datetime::from(cutoff);

        #[derive(Deserialize)]
        struct CountRow {
            count: usize,
        }

        let stale: Vec<CountRow> = db
            .client
            .query(
                "SELECT count() AS count FROM type::table($table) \
                 WHERE source_type = $source_type AND last_synced < $cutoff GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("source_type", source_type))
            .bind(("cutoff", cutoff.clone()))
            .await?
            .take(0)?;

        let count = stale.first().map_or(0, |row| row.count);
        if count == 0 {
            return Ok(0);
        }

        db.client
            .query("BEGIN TRANSACTION;")
            .query(
                "LET $stale_urls = (SELECT VALUE url FROM source_page \
                 WHERE source_type = $source_type AND last_synced < $cutoff);",
            )
            .query("LET $stale_pages = (SELECT VALUE id FROM page WHERE url IN $stale_urls);")
            .query("DELETE page_chunk WHERE page_id IN $stale_pages;")
            .query("DELETE entity_relationship WHERE source_page_id IN $stale_pages;")
            .query("DELETE page_extension WHERE url IN $stale_urls;")
            .query("DELETE page WHERE url IN $stale_urls;")
            .query(
                "DELETE source_page \
                 WHERE source_type = $source_type AND last_synced < $cutoff;",
            )
            .query("COMMIT TRANSACTION;")
            .bind(("source_type", source_type))
            .bind(("cutoff", cutoff))
            .await?
            .check()?;

        Ok(count)
    }
}
