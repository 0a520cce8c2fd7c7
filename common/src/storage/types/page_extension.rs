use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(PageExtension, "page_extension", {
    url: String,
    page_title: String,
    resume: String,
    keywords: String,
    content_hash: String,
    model_used: String,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    last_updated: DateTime<Utc>
});

impl PageExtension {
    pub async fn get_by_url(url: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let row: Option<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE url = $url LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("url", url.to_owned()))
            .await?
            .take(0)?;

        Ok(row)
    }

    /// Hash of the content the stored extension was produced from. Equal
    /// hash means reprocessing is a guaranteed no-op.
    pub async fn content_hash_for_url(
        url: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<String>, AppError> {
        Ok(Self::get_by_url(url, db).await?.map(|row| row.content_hash))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert(
        url: &str,
        page_title: &str,
        resume: &str,
        keywords: &str,
        content_hash: &str,
        model_used: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let now = Utc::now();
        let existing = Self::get_by_url(url, db).await?;

        let extension = PageExtension {
            id: existing
                .as_ref()
                .map_or_else(|| Uuid::new_v4().to_string(), |row| row.id.clone()),
            created_at: existing.as_ref().map_or(now, |row| row.created_at),
            updated_at: now,
            url: url.to_string(),
            page_title: page_title.to_string(),
            resume: resume.to_string(),
            keywords: keywords.to_string(),
            content_hash: content_hash.to_string(),
            model_used: model_used.to_string(),
            last_updated: now,
        };

        db.client
            .query("UPSERT type::thing('page_extension', $id) CONTENT $extension;")
            .bind(("id", extension.id.clone()))
            .bind(("extension", extension.clone()))
            .await?
            .check()?;

        Ok(extension)
    }
}
