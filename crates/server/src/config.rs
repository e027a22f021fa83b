//! Runtime configuration.
//!
//! Settings come from an optional `sanscreen` config file overridden by
//! environment variables (`INDEX_URL`, `UPDATE_TOKEN`, ...). Defaults are
//! chosen so a bare `sanscreen` against a local cluster works.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Hard cap on the page size of search results.
pub const MAX_PAGE: usize = 500;

/// Highest reachable offset, keeping `offset + limit` under the result cap.
pub const MAX_OFFSET: usize = index::MAX_RESULTS - MAX_PAGE;

/// Service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Search backend connection.
    #[serde(default = "default_index_url")]
    pub index_url: String,
    #[serde(default)]
    pub index_username: Option<String>,
    #[serde(default)]
    pub index_password: Option<String>,
    /// `elasticsearch` or `opensearch`.
    #[serde(default = "default_index_type")]
    pub index_type: String,
    /// Prefix of every index this deployment owns.
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Three-character code bumped on mapping-breaking changes.
    #[serde(default = "default_index_version")]
    pub index_version: String,
    #[serde(default = "default_shards")]
    pub index_shards: u32,

    /// Path or URL of the dataset manifest.
    #[serde(default = "default_manifest")]
    pub manifest: String,
    /// Shared secret gating the reindex trigger endpoint.
    #[serde(default)]
    pub update_token: String,
    /// Whether to reindex in the background of the API process.
    #[serde(default = "default_true")]
    pub auto_reindex: bool,
    #[serde(default = "default_true")]
    pub delta_updates: bool,
    /// Crontab for scheduled update checks; a process-specific hourly
    /// schedule when unset.
    #[serde(default)]
    pub crontab: Option<String>,
    /// Proxy for outgoing data fetches.
    #[serde(default)]
    pub http_proxy: String,

    /// Matcher defaults.
    #[serde(default = "default_true")]
    pub match_fuzzy: bool,
    #[serde(default = "default_match_page")]
    pub match_page: usize,
    #[serde(default = "default_max_matches")]
    pub max_matches: usize,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// Candidate pool multiplier per match query.
    #[serde(default = "default_match_candidates")]
    pub match_candidates: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    #[serde(default = "default_score_cutoff")]
    pub score_cutoff: f64,
    /// Bound on concurrent queries against the backend.
    #[serde(default = "default_query_concurrency")]
    pub query_concurrency: usize,

    #[serde(default)]
    pub log_json: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: default_host(),
            port: default_port(),
            index_url: default_index_url(),
            index_username: None,
            index_password: None,
            index_type: default_index_type(),
            index_name: default_index_name(),
            index_version: default_index_version(),
            index_shards: default_shards(),
            manifest: default_manifest(),
            update_token: String::new(),
            auto_reindex: true,
            delta_updates: true,
            crontab: None,
            http_proxy: String::new(),
            match_fuzzy: true,
            match_page: default_match_page(),
            max_matches: default_max_matches(),
            max_batch: default_max_batch(),
            match_candidates: default_match_candidates(),
            score_threshold: default_score_threshold(),
            score_cutoff: default_score_cutoff(),
            query_concurrency: default_query_concurrency(),
            log_json: false,
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load configuration from the optional config file and environment.
    pub fn load() -> anyhow::Result<Settings> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("sanscreen").required(false))
            .add_source(config::Environment::default());
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.index_type.as_str(), "elasticsearch" | "opensearch") {
            anyhow::bail!("invalid index type: {}", self.index_type);
        }
        if self.index_version.len() != 3 {
            anyhow::bail!("index version must be 3 characters: {:?}", self.index_version);
        }
        if !(0.0..=1.0).contains(&self.score_threshold) || !(0.0..=1.0).contains(&self.score_cutoff)
        {
            anyhow::bail!("score threshold and cutoff must be within [0, 1]");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_index_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index_type() -> String {
    "elasticsearch".to_string()
}

fn default_index_name() -> String {
    "sanscreen".to_string()
}

fn default_index_version() -> String {
    "001".to_string()
}

fn default_shards() -> u32 {
    1
}

fn default_manifest() -> String {
    "manifests/default.yml".to_string()
}

fn default_true() -> bool {
    true
}

fn default_match_page() -> usize {
    5
}

fn default_max_matches() -> usize {
    500
}

fn default_max_batch() -> usize {
    100
}

fn default_match_candidates() -> usize {
    10
}

fn default_score_threshold() -> f64 {
    0.70
}

fn default_score_cutoff() -> f64 {
    0.50
}

fn default_query_concurrency() -> usize {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}
