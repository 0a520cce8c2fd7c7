use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::source_page::{SourcePage, SourcePageDraft, SourceType},
    },
    utils::config::AppConfig,
};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{enqueue_derivations, html::html_to_text, http, SyncStats};

const RC_LIMIT: usize = 50;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap_or_else(|_| unreachable!()));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").unwrap_or_else(|_| unreachable!()));

#[derive(Debug, Clone)]
pub struct WikiSyncOptions {
    pub since: DateTime<Utc>,
    pub max_pages: Option<usize>,
    pub dry_run: bool,
    pub with_entities: bool,
}

/// One page change from the recentchanges listing.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PageChange {
    pub pageid: i64,
    pub title: String,
    pub revid: i64,
    #[serde(default)]
    pub old_revid: i64,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct RecentChangesResponse {
    #[serde(rename = "continue")]
    continue_token: Option<ContinueToken>,
    #[serde(default)]
    query: Option<RecentChangesQuery>,
}

#[derive(Debug, Deserialize)]
struct ContinueToken {
    rccontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentChangesQuery {
    #[serde(default)]
    recentchanges: Vec<PageChange>,
}

#[derive(Debug, Deserialize)]
struct ParseResponse {
    parse: Option<ParsePayload>,
}

#[derive(Debug, Deserialize)]
struct ParsePayload {
    title: String,
    revid: Option<i64>,
    text: ParseText,
    #[serde(default)]
    categories: Vec<ParseCategory>,
}

#[derive(Debug, Deserialize)]
struct ParseText {
    #[serde(rename = "*")]
    html: String,
}

#[derive(Debug, Deserialize)]
struct ParseCategory {
    #[serde(rename = "*")]
    name: String,
}

/// Fetched content of one wiki page, ready for the content store.
#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub title: String,
    pub revid: Option<i64>,
    pub html: String,
    pub categories: Vec<String>,
}

/// Incremental syncer over the MediaWiki recentchanges feed.
pub struct WikiSyncer {
    client: Client,
    api_url: String,
    base_url: String,
    dump_dir: Option<PathBuf>,
}

/// Keep only the latest revision per pageid.
pub fn deduplicate_changes(changes: Vec<PageChange>) -> Vec<PageChange> {
    let mut latest_by_page: HashMap<i64, PageChange> = HashMap::new();
    for change in changes {
        match latest_by_page.get(&change.pageid) {
            Some(existing) if existing.revid >= change.revid => {}
            _ => {
                latest_by_page.insert(change.pageid, change);
            }
        }
    }

    let mut unique: Vec<PageChange> = latest_by_page.into_values().collect();
    unique.sort_by_key(|change| change.pageid);
    unique
}

pub fn page_url(base_url: &str, title: &str) -> String {
    format!("{base_url}{}", title.replace(' ', "_"))
}

fn sanitize_filename(title: &str) -> String {
    let safe = UNSAFE_FILENAME_CHARS.replace_all(title, "_");
    let safe = WHITESPACE_RUN.replace_all(&safe, "_");
    safe.chars().take(200).collect()
}

impl WikiSyncer {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http::build_client()?,
            api_url: config.wiki_api_url.clone(),
            base_url: config.wiki_base_url.clone(),
            dump_dir: config.wiki_dump_dir.clone().map(PathBuf::from),
        })
    }

    pub async fn sync(
        &self,
        options: &WikiSyncOptions,
        db: &SurrealDbClient,
    ) -> Result<SyncStats, AppError> {
        info!(since = %options.since, "starting wiki sync");

        let changes = self.fetch_recent_changes(options.since).await?;
        let mut stats = SyncStats {
            fetched: changes.len(),
            ..SyncStats::default()
        };

        let unique = deduplicate_changes(changes);
        let unique_count = unique.len();
        debug!(fetched = stats.fetched, unique = unique_count, "deduplicated changes");

        let mut to_update = Vec::new();
        for change in unique {
            let stored_revid = SourcePage::get_by_identity(
                SourceType::Wiki,
                &change.pageid.to_string(),
                db,
            )
            .await?
            .and_then(|row| row.last_revid);

            match stored_revid {
                Some(revid) if revid >= change.revid => {
                    debug!(title = %change.title, revid, "already at this revision");
                }
                _ => to_update.push((change, stored_revid.is_none())),
            }
        }
        stats.skipped = unique_count - to_update.len();

        if let Some(max) = options.max_pages {
            to_update.truncate(max);
        }

        for (change, is_new) in to_update {
            if options.dry_run {
                info!(title = %change.title, "[dry run] would update");
                stats.updated += 1;
                continue;
            }

            match self.fetch_page_content(&change.title).await {
                Ok(Some(parsed)) => {
                    match self.apply_change(&change, parsed, options, db).await {
                        Ok(queued) => {
                            stats.tasks_queued += queued;
                            if is_new {
                                stats.created += 1;
                            } else {
                                stats.updated += 1;
                            }
                        }
                        Err(err) => stats.record_error(&change.title, &err),
                    }
                }
                Ok(None) => {
                    stats
                        .errors
                        .push(format!("{}: no parseable content", change.title));
                }
                Err(err) => stats.record_error(&change.title, &err),
            }
        }

        info!(
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            tasks_queued = stats.tasks_queued,
            errors = stats.errors.len(),
            "wiki sync complete"
        );

        Ok(stats)
    }

    async fn fetch_recent_changes(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PageChange>, AppError> {
        let mut changes = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut params: Vec<(String, String)> = vec![
                ("action".into(), "query".into()),
                ("list".into(), "recentchanges".into()),
                ("rcprop".into(), "title|timestamp|ids".into()),
                ("rclimit".into(), RC_LIMIT.to_string()),
                ("rctype".into(), "edit|new".into()),
                ("rcnamespace".into(), "0".into()),
                ("format".into(), "json".into()),
                // rcend is the older boundary of the window
                ("rcend".into(), since.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ];
            if let Some(token) = &continue_token {
                params.push(("rccontinue".into(), token.clone()));
            }

            let response: RecentChangesResponse =
                http::get_json(&self.client, &self.api_url, &params).await?;

            if let Some(query) = response.query {
                changes.extend(query.recentchanges);
            }

            continue_token = response
                .continue_token
                .and_then(|token| token.rccontinue);
            if continue_token.is_none() {
                break;
            }
        }

        Ok(changes)
    }

    async fn fetch_page_content(&self, title: &str) -> Result<Option<ParsedPage>, AppError> {
        let params: Vec<(String, String)> = vec![
            ("action".into(), "parse".into()),
            ("page".into(), title.to_string()),
            ("prop".into(), "text|categories|revid".into()),
            ("format".into(), "json".into()),
        ];

        let response: ParseResponse = http::get_json(&self.client, &self.api_url, &params).await?;

        Ok(response.parse.map(|payload| ParsedPage {
            title: payload.title,
            revid: payload.revid,
            html: payload.text.html,
            categories: payload
                .categories
                .into_iter()
                .map(|category| category.name)
                .collect(),
        }))
    }

    async fn apply_change(
        &self,
        change: &PageChange,
        parsed: ParsedPage,
        options: &WikiSyncOptions,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        let url = page_url(&self.base_url, &change.title);
        let content_text = html_to_text(&parsed.html);

        if let Some(dump_dir) = &self.dump_dir {
            if let Err(err) = dump_page(dump_dir, &url, &parsed, &content_text) {
                warn!(title = %parsed.title, error = %err, "failed to write dump file");
            }
        }

        let outcome = SourcePage::upsert(
            SourcePageDraft {
                source_type: SourceType::Wiki,
                source_id: change.pageid.to_string(),
                title: parsed.title.clone(),
                url,
                content_text,
                content_html: parsed.html,
                last_revid: Some(parsed.revid.unwrap_or(change.revid)),
                categories: parsed.categories,
            },
            db,
        )
        .await?;

        if !outcome.changed {
            return Ok(0);
        }

        enqueue_derivations(&outcome, options.with_entities, db).await
    }
}

/// Legacy on-disk dump, kept compatible with the crawler's file format.
fn dump_page(
    dump_dir: &Path,
    url: &str,
    parsed: &ParsedPage,
    content_text: &str,
) -> Result<(), AppError> {
    std::fs::create_dir_all(dump_dir)?;

    let categories = parsed
        .categories
        .iter()
        .map(|category| format!("- {category}"))
        .collect::<Vec<_>>()
        .join("\n");

    let body = format!(
        "URL: {url}\nTitle: {title}\n\nCategories:\n{categories}\n\nContent:\n{content_text}\n",
        title = parsed.title,
    );

    std::fs::write(dump_dir.join(sanitize_filename(&parsed.title)), body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::task_queue::{QueueTask, TaskType};
    use uuid::Uuid;

    fn change(pageid: i64, title: &str, revid: i64) -> PageChange {
        PageChange {
            pageid,
            title: title.to_string(),
            revid,
            old_revid: 0,
            timestamp: String::new(),
        }
    }

    #[test]
    fn test_deduplicate_keeps_latest_revision() {
        let changes = vec![
            change(100, "QGIS", 5),
            change(100, "QGIS", 7),
            change(100, "QGIS", 6),
            change(200, "GDAL", 3),
        ];

        let unique = deduplicate_changes(changes);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0], change(100, "QGIS", 7));
        assert_eq!(unique[1], change(200, "GDAL", 3));
    }

    #[test]
    fn test_page_url_replaces_spaces() {
        assert_eq!(
            page_url("https://wiki.osgeo.org/wiki/", "Board Meeting 2023"),
            "https://wiki.osgeo.org/wiki/Board_Meeting_2023"
        );
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("User:Foo/Bar baz?"), "User_Foo_Bar_baz_");
        let long = "a".repeat(300);
        assert_eq!(sanitize_filename(&long).len(), 200);
    }

    #[test]
    fn test_recentchanges_response_parses() {
        let payload = serde_json::json!({
            "continue": { "rccontinue": "20240101|42", "continue": "-||" },
            "query": {
                "recentchanges": [
                    {
                        "type": "edit",
                        "ns": 0,
                        "title": "QGIS",
                        "pageid": 100,
                        "revid": 5,
                        "old_revid": 4,
                        "timestamp": "2024-01-01T10:00:00Z"
                    }
                ]
            }
        });

        let response: RecentChangesResponse = serde_json::from_value(payload).expect("parse");
        let query = response.query.expect("query");
        assert_eq!(query.recentchanges, vec![change_with_old(100, "QGIS", 5, 4)]);
        assert_eq!(
            response.continue_token.and_then(|token| token.rccontinue),
            Some("20240101|42".to_string())
        );
    }

    fn change_with_old(pageid: i64, title: &str, revid: i64, old_revid: i64) -> PageChange {
        PageChange {
            pageid,
            title: title.to_string(),
            revid,
            old_revid,
            timestamp: "2024-01-01T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_parse_response_parses() {
        let payload = serde_json::json!({
            "parse": {
                "title": "QGIS",
                "pageid": 100,
                "revid": 5,
                "text": { "*": "<p>QGIS is a GIS.</p>" },
                "categories": [ { "sortkey": "", "*": "Software" } ]
            }
        });

        let response: ParseResponse = serde_json::from_value(payload).expect("parse");
        let parse = response.parse.expect("payload");
        assert_eq!(parse.title, "QGIS");
        assert_eq!(parse.revid, Some(5));
        assert_eq!(parse.text.html, "<p>QGIS is a GIS.</p>");
        assert_eq!(parse.categories[0].name, "Software");
    }

    #[tokio::test]
    async fn test_apply_change_upserts_and_enqueues_once() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.ensure_schema().await.expect("schema");

        let syncer = WikiSyncer {
            client: http::build_client().expect("client"),
            api_url: "https://wiki.osgeo.org/w/api.php".to_string(),
            base_url: "https://wiki.osgeo.org/wiki/".to_string(),
            dump_dir: None,
        };
        let options = WikiSyncOptions {
            since: Utc::now(),
            max_pages: None,
            dry_run: false,
            with_entities: false,
        };

        let parsed = ParsedPage {
            title: "QGIS".to_string(),
            revid: Some(5),
            html: "<p>QGIS is a GIS.</p>".to_string(),
            categories: vec!["Software".to_string()],
        };

        let queued = syncer
            .apply_change(&change(100, "QGIS", 5), parsed.clone(), &options, &db)
            .await
            .expect("apply");
        assert_eq!(queued, 2);

        let stored = SourcePage::get_by_identity(SourceType::Wiki, "100", &db)
            .await
            .expect("query")
            .expect("row");
        assert_eq!(stored.url, "https://wiki.osgeo.org/wiki/QGIS");
        assert_eq!(stored.last_revid, Some(5));
        assert!(stored.content_text.contains("QGIS is a GIS."));

        // Same content again: no change, no new tasks
        let queued_again = syncer
            .apply_change(&change(100, "QGIS", 5), parsed, &options, &db)
            .await
            .expect("apply again");
        assert_eq!(queued_again, 0);

        let page = common::storage::types::page::Page::get_by_url(
            "https://wiki.osgeo.org/wiki/QGIS",
            &db,
        )
        .await
        .expect("page query")
        .expect("page");
        assert_eq!(
            QueueTask::live_count(&page.id, TaskType::Chunks, &db)
                .await
                .expect("count"),
            1
        );
    }
}
