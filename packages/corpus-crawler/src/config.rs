use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Crawler configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    pub corpus_name: String,
    pub data_dir: PathBuf,
    pub credentials_file: PathBuf,
    pub rate_limit_window: Duration,
    pub pass_interval: Duration,
    pub write_queue_capacity: usize,
    pub seed_handles: Vec<String>,
    pub accept_keywords: Vec<String>,
}

impl CrawlConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let corpus_name = lookup("CORPUS_NAME")
            .filter(|name| !name.trim().is_empty())
            .context("CORPUS_NAME must be set")?;

        Ok(Self {
            corpus_name: corpus_name.trim().to_string(),
            data_dir: lookup("CORPUS_DATA_DIR")
                .unwrap_or_else(|| ".".to_string())
                .into(),
            credentials_file: lookup("SOCIAL_CREDENTIALS_FILE")
                .unwrap_or_else(|| "auth.json".to_string())
                .into(),
            rate_limit_window: Duration::from_secs(
                lookup("RATE_LIMIT_WINDOW_SECS")
                    .unwrap_or_else(|| "900".to_string())
                    .parse()
                    .context("RATE_LIMIT_WINDOW_SECS must be a valid number")?,
            ),
            pass_interval: Duration::from_secs(
                lookup("PASS_INTERVAL_SECS")
                    .unwrap_or_else(|| "2".to_string())
                    .parse()
                    .context("PASS_INTERVAL_SECS must be a valid number")?,
            ),
            write_queue_capacity: lookup("WRITE_QUEUE_CAPACITY")
                .unwrap_or_else(|| "100".to_string())
                .parse()
                .context("WRITE_QUEUE_CAPACITY must be a valid number")?,
            seed_handles: split_list(lookup("SEED_HANDLES")),
            accept_keywords: split_list(lookup("ACCEPT_KEYWORDS")),
        })
    }

    /// Path of the corpus database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.corpus_name))
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<CrawlConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CrawlConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("CORPUS_NAME", "rustaceans")]).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("./rustaceans.db"));
        assert_eq!(config.credentials_file, PathBuf::from("auth.json"));
        assert_eq!(config.rate_limit_window, Duration::from_secs(900));
        assert_eq!(config.pass_interval, Duration::from_secs(2));
        assert_eq!(config.write_queue_capacity, 100);
        assert!(config.seed_handles.is_empty());
    }

    #[test]
    fn corpus_name_is_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("CORPUS_NAME", "  ")]).is_err());
    }

    #[test]
    fn lists_are_split_and_trimmed() {
        let config = config(&[
            ("CORPUS_NAME", "c"),
            ("SEED_HANDLES", "alice, @bob,,"),
            ("ACCEPT_KEYWORDS", "rust"),
        ])
        .unwrap();
        assert_eq!(config.seed_handles, vec!["alice", "@bob"]);
        assert_eq!(config.accept_keywords, vec!["rust"]);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = config(&[("CORPUS_NAME", "c"), ("PASS_INTERVAL_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("PASS_INTERVAL_SECS"));
    }
}
