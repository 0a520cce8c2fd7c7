use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub llm_api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    /// Comma-separated model fallback chain, tried in order.
    #[serde(default = "default_llm_models")]
    pub llm_models: String,
    #[serde(default = "default_llm_request_delay_secs")]
    pub llm_request_delay_secs: u64,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default = "default_wiki_api_url")]
    pub wiki_api_url: String,
    #[serde(default = "default_wiki_base_url")]
    pub wiki_base_url: String,
    #[serde(default = "default_wordpress_api_url")]
    pub wordpress_api_url: String,
    #[serde(default = "default_planet_feed_url")]
    pub planet_feed_url: String,
    /// Legacy on-disk dump of synced wiki pages; disabled when unset.
    #[serde(default)]
    pub wiki_dump_dir: Option<String>,
    #[serde(default = "default_planet_retention_days")]
    pub planet_retention_days: i64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_llm_models() -> String {
    "mistralai/devstral-2512:free,google/gemma-3-12b-it:free".to_string()
}

fn default_llm_request_delay_secs() -> u64 {
    5
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_wiki_api_url() -> String {
    "https://wiki.osgeo.org/w/api.php".to_string()
}

fn default_wiki_base_url() -> String {
    "https://wiki.osgeo.org/wiki/".to_string()
}

fn default_wordpress_api_url() -> String {
    "https://www.osgeo.org/wp-json/wp/v2".to_string()
}

fn default_planet_feed_url() -> String {
    "https://planet.osgeo.org/rss20.xml".to_string()
}

fn default_planet_retention_days() -> i64 {
    60
}

fn default_chunk_size() -> usize {
    500
}

impl AppConfig {
    /// The model fallback chain, in priority order.
    pub fn model_chain(&self) -> Vec<String> {
        self.llm_models
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> AppConfig {
        let config = Config::builder()
            .set_override("surrealdb_address", "mem://")
            .unwrap()
            .set_override("surrealdb_username", "root")
            .unwrap()
            .set_override("surrealdb_password", "root")
            .unwrap()
            .set_override("surrealdb_namespace", "test")
            .unwrap()
            .set_override("surrealdb_database", "test")
            .unwrap()
            .set_override("llm_api_key", "test-key")
            .unwrap()
            .build()
            .unwrap();
        config.try_deserialize().unwrap()
    }

    #[test]
    fn defaults_cover_endpoints_and_tuning() {
        let config = minimal_config();
        assert_eq!(config.llm_base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.wiki_api_url, "https://wiki.osgeo.org/w/api.php");
        assert_eq!(config.llm_timeout_secs, 120);
        assert_eq!(config.llm_request_delay_secs, 5);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.planet_retention_days, 60);
        assert!(config.wiki_dump_dir.is_none());
    }

    #[test]
    fn model_chain_splits_and_trims() {
        let mut config = minimal_config();
        config.llm_models = "a/b:free, c/d ,".to_string();
        assert_eq!(config.model_chain(), vec!["a/b:free", "c/d"]);
    }
}
