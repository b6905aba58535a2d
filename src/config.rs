use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

/// Runtime settings. Read from an optional TOML file, then overridden by `VODHUB_*` env vars.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    pub data_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Upper bound on sites queried at once by a multi-site search.
    pub search_concurrency: usize,
    pub check_interval_secs: u64,
    /// Consecutive failed checks before a site is disabled. 0 never disables.
    pub failure_threshold: u32,
    pub pool_max_idle_per_host: usize,
    pub max_in_flight: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            request_timeout_secs: 10,
            user_agent: "Mozilla/5.0".to_string(),
            search_concurrency: 6,
            check_interval_secs: 60 * 60,
            failure_threshold: 3,
            pool_max_idle_per_host: 4,
            max_in_flight: 8,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading settings file: {}", p.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing settings file: {}", p.display()))?
            }
            None => Settings::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("VODHUB_TIMEOUT_SECS") { self.request_timeout_secs = v; }
        if let Some(v) = env_parse("VODHUB_SEARCH_CONCURRENCY") { self.search_concurrency = v; }
        if let Some(v) = env_parse("VODHUB_CHECK_INTERVAL_SECS") { self.check_interval_secs = v; }
        if let Some(v) = env_parse("VODHUB_FAILURE_THRESHOLD") { self.failure_threshold = v; }
        if let Ok(dir) = std::env::var("VODHUB_DATA_DIR") {
            if !dir.trim().is_empty() { self.data_dir = Some(PathBuf::from(dir)); }
        }
    }

    pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs.max(1)) }
    pub fn check_interval(&self) -> Duration { Duration::from_secs(self.check_interval_secs.max(1)) }

    /// Configured data directory, or the platform data dir (e.g. `~/.local/share/vodhub`).
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir { return Ok(dir.clone()); }
        let proj = ProjectDirs::from("dev", "vodhub", "vodhub")
            .context("unable to determine data directory")?;
        Ok(proj.data_dir().to_path_buf())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let s: Settings = toml::from_str("request_timeout_secs = 30\nfailure_threshold = 0\n").unwrap();
        assert_eq!(s.request_timeout_secs, 30);
        assert_eq!(s.failure_threshold, 0);
        assert_eq!(s.search_concurrency, 6);
        assert_eq!(s.pool_max_idle_per_host, 4);
        assert_eq!(s.max_in_flight, 8);
        assert_eq!(s.check_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let s = Settings { data_dir: Some(PathBuf::from("/tmp/vodhub-test")), ..Settings::default() };
        assert_eq!(s.resolve_data_dir().unwrap(), PathBuf::from("/tmp/vodhub-test"));
    }
}
