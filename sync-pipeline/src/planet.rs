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
use tracing::{info, warn};

use crate::{enqueue_derivations, html::html_to_text, http, SyncStats};

#[derive(Debug, Clone)]
pub struct PlanetSyncOptions {
    /// Only ingest posts published within this many days.
    pub max_age_days: i64,
    pub max_items: Option<usize>,
    /// Delete planet posts not synced within this many days; disabled
    /// when `None` or zero.
    pub prune_days: Option<i64>,
    pub dry_run: bool,
    pub with_entities: bool,
}

/// One `<item>` out of the RSS 2.0 channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub description_html: String,
}

pub fn parse_rss_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Parse an RSS 2.0 document into feed items. Items without a guid fall
/// back to the link as their identifier; items with neither are dropped.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, AppError> {
    let document = roxmltree::Document::parse(xml)
        .map_err(|err| AppError::FeedParse(format!("invalid RSS document: {err}")))?;

    fn child_text(node: roxmltree::Node, name: &str) -> Option<String> {
        node.children()
            .find(|child| child.has_tag_name(name))
            .and_then(|child| child.text())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }

    let mut items = Vec::new();
    for item in document
        .descendants()
        .filter(|node| node.has_tag_name("item"))
    {
        let link = child_text(item, "link").unwrap_or_default();
        let Some(guid) = child_text(item, "guid").or_else(|| {
            if link.is_empty() {
                None
            } else {
                Some(link.clone())
            }
        }) else {
            warn!("skipping feed item without guid or link");
            continue;
        };

        items.push(FeedItem {
            guid,
            title: child_text(item, "title").unwrap_or_else(|| "(untitled)".to_string()),
            link,
            published: child_text(item, "pubDate").and_then(|date| parse_rss_date(&date)),
            description_html: child_text(item, "description").unwrap_or_default(),
        });
    }

    Ok(items)
}

/// Filter to items inside the age window; undated items are kept.
pub fn filter_by_age(items: Vec<FeedItem>, max_age_days: i64, now: DateTime<Utc>) -> Vec<FeedItem> {
    let cutoff = now - Duration::days(max_age_days);
    items
        .into_iter()
        .filter(|item| item.published.is_none_or(|published| published >= cutoff))
        .collect()
}

/// Syncer over a Planet-style RSS feed.
pub struct PlanetSyncer {
    client: Client,
    feed_url: String,
}

impl PlanetSyncer {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http::build_client()?,
            feed_url: config.planet_feed_url.clone(),
        })
    }

    pub async fn sync(
        &self,
        options: &PlanetSyncOptions,
        db: &SurrealDbClient,
    ) -> Result<SyncStats, AppError> {
        info!(feed = %self.feed_url, max_age_days = options.max_age_days, "starting planet sync");

        let xml = http::get_text(&self.client, &self.feed_url).await?;
        let items = parse_feed(&xml)?;

        let mut stats = SyncStats {
            fetched: items.len(),
            ..SyncStats::default()
        };

        let mut fresh = filter_by_age(items, options.max_age_days, Utc::now());
        stats.skipped = stats.fetched - fresh.len();
        if let Some(max) = options.max_items {
            fresh.truncate(max);
        }

        for item in fresh {
            if options.dry_run {
                info!(title = %item.title, "[dry run] would update");
                stats.updated += 1;
                continue;
            }

            match self.sync_item(&item, options, db).await {
                Ok(synced) => {
                    stats.tasks_queued += synced.tasks;
                    if synced.created {
                        stats.created += 1;
                    } else {
                        stats.updated += 1;
                    }
                }
                Err(err) => stats.record_error(&item.title, &err),
            }
        }

        if let Some(prune_days) = options.prune_days.filter(|days| *days > 0) {
            if options.dry_run {
                info!(prune_days, "[dry run] skipping prune");
            } else {
                let pruned = SourcePage::prune_old(SourceType::PlanetPost, prune_days, db).await?;
                info!(pruned, prune_days, "pruned stale planet posts");
            }
        }

        info!(
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            tasks_queued = stats.tasks_queued,
            errors = stats.errors.len(),
            "planet sync complete"
        );

        Ok(stats)
    }

    async fn sync_item(
        &self,
        item: &FeedItem,
        options: &PlanetSyncOptions,
        db: &SurrealDbClient,
    ) -> Result<SyncedItem, AppError> {
        let created = SourcePage::get_by_identity(SourceType::PlanetPost, &item.guid, db)
            .await?
            .is_none();

        let outcome = SourcePage::upsert(
            SourcePageDraft {
                source_type: SourceType::PlanetPost,
                source_id: item.guid.clone(),
                title: item.title.clone(),
                url: if item.link.is_empty() {
                    item.guid.clone()
                } else {
                    item.link.clone()
                },
                content_text: html_to_text(&item.description_html),
                content_html: item.description_html.clone(),
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

        Ok(SyncedItem { created, tasks })
    }
}

struct SyncedItem {
    created: bool,
    tasks: usize,
}
