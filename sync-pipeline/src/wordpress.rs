use chrono::{DateTime, Duration, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::source_page::{SourcePage, SourcePageDraft, SourceType},
    },
    utils::config::AppConfig,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    enqueue_derivations,
    html::{extract_main_region, html_to_text, strip_tags},
    http, SyncStats,
};

const PER_PAGE: usize = 100;
const LISTING_FIELDS: &str = "id,title,link,modified";
const DEFAULT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct WordPressSyncOptions {
    pub modified_after: Option<DateTime<Utc>>,
    /// Ignore the date filter and walk every published page.
    pub full: bool,
    pub max_pages: Option<usize>,
    pub dry_run: bool,
    pub with_entities: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WpPage {
    pub id: i64,
    pub link: String,
    #[serde(default)]
    pub modified: Option<String>,
    pub title: WpRendered,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WpRendered {
    pub rendered: String,
}

/// Syncer over the WordPress REST pages listing.
pub struct WordPressSyncer {
    client: Client,
    api_url: String,
}

impl WordPressSyncer {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http::build_client()?,
            api_url: config.wordpress_api_url.clone(),
        })
    }

    pub async fn sync(
        &self,
        options: &WordPressSyncOptions,
        db: &SurrealDbClient,
    ) -> Result<SyncStats, AppError> {
        let modified_after = if options.full {
            None
        } else {
            Some(
                options
                    .modified_after
                    .unwrap_or_else(|| Utc::now() - Duration::days(DEFAULT_WINDOW_DAYS)),
            )
        };

        match modified_after {
            Some(cutoff) => info!(%cutoff, "starting wordpress sync"),
            None => info!("starting full wordpress sync"),
        }

        if let Ok(Some(total)) = self.total_pages().await {
            debug!(total, "wordpress reports published pages");
        }

        let mut listing = self.fetch_pages(modified_after).await?;
        if let Some(max) = options.max_pages {
            listing.truncate(max);
        }

        let mut stats = SyncStats {
            fetched: listing.len(),
            ..SyncStats::default()
        };

        for page in listing {
            let title = strip_tags(&page.title.rendered);

            if options.dry_run {
                info!(%title, "[dry run] would update");
                stats.updated += 1;
                continue;
            }

            match self.sync_page(&page, &title, options, db).await {
                Ok(Some(queued)) => {
                    stats.tasks_queued += queued.tasks;
                    if queued.created {
                        stats.created += 1;
                    } else {
                        stats.updated += 1;
                    }
                }
                Ok(None) => {
                    stats.errors.push(format!("{title}: no <main> content found"));
                }
                Err(err) => stats.record_error(&title, &err),
            }
        }

        info!(
            created = stats.created,
            updated = stats.updated,
            tasks_queued = stats.tasks_queued,
            errors = stats.errors.len(),
            "wordpress sync complete"
        );

        Ok(stats)
    }

    async fn total_pages(&self) -> Result<Option<usize>, AppError> {
        let params: Vec<(String, String)> = vec![("per_page".into(), "1".into())];
        let total = http::head_header(
            &self.client,
            &format!("{}/pages", self.api_url),
            &params,
            "X-WP-Total",
        )
        .await?;

        Ok(total.and_then(|value| value.parse().ok()))
    }

    async fn fetch_pages(
        &self,
        modified_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<WpPage>, AppError> {
        let mut pages = Vec::new();
        let mut page_number = 1;

        loop {
            let mut params: Vec<(String, String)> = vec![
                ("per_page".into(), PER_PAGE.to_string()),
                ("page".into(), page_number.to_string()),
                ("_fields".into(), LISTING_FIELDS.into()),
                ("status".into(), "publish".into()),
            ];
            if let Some(cutoff) = modified_after {
                params.push((
                    "modified_after".into(),
                    cutoff.format("%Y-%m-%dT%H:%M:%S").to_string(),
                ));
            }

            let batch: Vec<WpPage> = http::get_json(
                &self.client,
                &format!("{}/pages", self.api_url),
                &params,
            )
            .await?;

            let batch_len = batch.len();
            pages.extend(batch);

            if batch_len < PER_PAGE {
                break;
            }
            page_number += 1;
        }

        Ok(pages)
    }

    async fn sync_page(
        &self,
        page: &WpPage,
        title: &str,
        options: &WordPressSyncOptions,
        db: &SurrealDbClient,
    ) -> Result<Option<SyncedPage>, AppError> {
        let html = http::get_text(&self.client, &page.link).await?;

        let Some(main_region) = extract_main_region(&html) else {
            warn!(url = %page.link, "no <main> tag found");
            return Ok(None);
        };

        let content_text = html_to_text(&main_region);

        let created = SourcePage::get_by_identity(
            SourceType::WordpressPage,
            &page.id.to_string(),
            db,
        )
        .await?
        .is_none();

        let outcome = SourcePage::upsert(
            SourcePageDraft {
                source_type: SourceType::WordpressPage,
                source_id: page.id.to_string(),
                title: title.to_string(),
                url: page.link.clone(),
                content_text,
                content_html: main_region,
                last_revid: None,
                categories: vec![],
            },
            db,
        )
        .await?;

        let tasks = if outcome.changed {
            enqueue_derivations(&outcome, options.with_entities, db).await?
        } else {
            0
        };

        Ok(Some(SyncedPage { created, tasks }))
    }
}

struct SyncedPage {
    created: bool,
    tasks: usize,
}
