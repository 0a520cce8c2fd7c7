use surrealdb::RecordId;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(Page, "page", {
    title: String,
    url: String,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
    last_crawled: DateTime<Utc>
});

impl Page {
    pub fn new(title: String, url: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            url,
            last_crawled: now,
        }
    }

    pub fn record_id(&self) -> RecordId {
        RecordId::from_table_key(Self::table_name(), &self.id)
    }

    pub async fn get_by_url(url: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let page: Option<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE url = $url LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("url", url.to_owned()))
            .await?
            .take(0)?;

        Ok(page)
    }
}
