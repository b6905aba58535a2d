pub mod aggregator;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod http;
pub mod playlist;
pub mod sites;
pub mod storage;
pub mod types;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{FetchError, MalformedReason, SearchError, SiteError};
    pub use crate::history::{HistoryItem, UpdateReport};
    pub use crate::sites::{Direction, NewSite, SiteUpdate};
    pub use crate::types::{
        DetailData, DetailResult, HealthCheckResult, HealthStatus, ListParams, MultiSearchResult, Outcome, PlaySource,
        SearchResults, Site, VideoList, VideoListResult, VideoSummary,
    };
    pub use crate::{ServiceHealth, VodHub};
}

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::client::SiteClient;
use crate::config::Settings;
use crate::health::{HealthPolicy, HealthProbe, HealthScheduler};
use crate::history::{HistoryItem, UpdateReport};
use crate::http::{clean_base, HttpClients};
use crate::sites::{Direction, NewSite, SiteUpdate};
use crate::storage::{JsonStore, SiteStore};
use crate::types::{
    lenient, DetailData, DetailResult, HealthCheckResult, ListParams, MultiSearchResult, Outcome, Site, VideoListResult,
};

/// Store config key that overrides `request_timeout_secs`.
pub const TIMEOUT_CONFIG_KEY: &str = "timeout";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: i64,
}

/// Async library entry point. Owns the site store, the pooled HTTP clients and the health scheduler.
pub struct VodHub {
    settings: Settings,
    store: Arc<dyn SiteStore>,
    client: SiteClient,
    aggregator: Aggregator<SiteClient>,
    scheduler: Arc<HealthScheduler<HealthProbe>>,
    // serializes read-modify-write of the site collection
    edit_lock: Arc<Mutex<()>>,
}

impl VodHub {
    /// Open the JSON store in the configured data directory.
    pub async fn open(settings: Settings) -> Result<Self> {
        let dir = settings.resolve_data_dir()?;
        let store = JsonStore::open(&dir).await?;
        info!(data_dir = %dir.display(), "opened site store");
        Self::with_store(settings, Arc::new(store)).await
    }

    pub async fn with_store(mut settings: Settings, store: Arc<dyn SiteStore>) -> Result<Self> {
        if let Some(secs) = store.get_config(TIMEOUT_CONFIG_KEY).await?.as_ref().and_then(lenient::as_i64) {
            if secs > 0 {
                settings.request_timeout_secs = secs as u64;
            }
        }
        let http = HttpClients::new(&settings).context("building HTTP client")?;
        let client = SiteClient::new(http.clone());
        let aggregator = Aggregator::new(Arc::new(client.clone()), settings.search_concurrency);
        let edit_lock = Arc::new(Mutex::new(()));
        let policy = HealthPolicy { failure_threshold: settings.failure_threshold };
        let scheduler = Arc::new(HealthScheduler::new(store.clone(), HealthProbe::new(http), policy, edit_lock.clone()));
        Ok(Self { settings, store, client, aggregator, scheduler, edit_lock })
    }

    pub fn settings(&self) -> &Settings { &self.settings }
    pub fn store(&self) -> &Arc<dyn SiteStore> { &self.store }

    // --- Sites ---

    /// Sites sorted by display order; disabled ones only with `include_disabled`.
    pub async fn list_sites(&self, include_disabled: bool) -> Result<Vec<Site>> {
        Ok(sites::sorted(self.store.get_sites().await?, include_disabled))
    }

    pub async fn add_site(&self, new: NewSite) -> Result<Site> {
        let site = self.edit_sites(|list| sites::add_site(list, new, now_millis())).await?;
        info!(site = %site.name, url = %site.url, "site added");
        Ok(site)
    }

    pub async fn update_site(&self, id: i64, update: SiteUpdate) -> Result<Site> {
        self.edit_sites(|list| sites::update_site(list, id, update)).await
    }

    pub async fn remove_site(&self, id: i64) -> Result<Site> {
        let site = self.edit_sites(|list| sites::remove_site(list, id)).await?;
        info!(site = %site.name, "site removed");
        Ok(site)
    }

    pub async fn move_site(&self, id: i64, direction: Direction) -> Result<()> {
        self.edit_sites(|list| sites::move_site(list, id, direction)).await
    }

    async fn edit_sites<T, E>(&self, edit: impl FnOnce(&mut Vec<Site>) -> Result<T, E>) -> Result<T>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let _guard = self.edit_lock.lock().await;
        let mut sites = self.store.get_sites().await?;
        let out = edit(&mut sites)?;
        self.store.save_sites(&sites).await?;
        Ok(out)
    }

    /// Site registered under `url`, if any. Unregistered URLs can still be queried.
    async fn site_for_url(&self, url: &str) -> Option<Site> {
        let wanted = clean_base(url);
        match self.store.get_sites().await {
            Ok(sites) => sites.into_iter().find(|s| s.url == url || clean_base(&s.url) == wanted),
            Err(e) => {
                warn!(error = %e, "site lookup failed, using defaults");
                None
            }
        }
    }

    // --- Queries ---

    /// Browse or search one site's catalog.
    pub async fn list_videos(&self, url: &str, params: &ListParams) -> VideoListResult {
        let site = self.site_for_url(url).await;
        let ssl_verify = site.as_ref().map_or(true, |s| s.ssl_verify);
        let name = site.as_ref().map(|s| s.name.as_str());
        self.client.fetch_list(url, params, ssl_verify, name).await.into()
    }

    pub async fn video_detail(&self, url: &str, vod_id: &str) -> DetailResult {
        let site = self.site_for_url(url).await;
        let ssl_verify = site.as_ref().map_or(true, |s| s.ssl_verify);
        let name = site.as_ref().map(|s| s.name.as_str());
        self.client.fetch_detail(url, vod_id, ssl_verify, name).await.map(|data| DetailData { data }).into()
    }

    /// Keyword search across the given sites.
    pub async fn multi_site_search(&self, site_ids: &[i64], keyword: &str, page: u32) -> MultiSearchResult {
        let sites = match self.store.get_sites().await {
            Ok(s) => s,
            Err(e) => return Outcome::Error { message: format!("reading sites: {e:#}") },
        };
        self.aggregator.search(&sites, site_ids, keyword, page).await.into()
    }

    // --- Health ---

    pub async fn check_sites_now(&self, include_disabled: bool) -> Result<Vec<HealthCheckResult>> {
        self.scheduler.check_all(include_disabled).await
    }

    pub async fn check_site(&self, id: i64) -> Result<HealthCheckResult> { self.scheduler.check_one(id).await }

    /// Start the periodic health loop. It stops once `shutdown` carries `true`.
    pub fn spawn_health_loop(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let scheduler = self.scheduler.clone();
        let interval = self.settings.check_interval();
        tokio::spawn(async move { scheduler.run(interval, shutdown).await })
    }

    /// Look for new episodes of watched videos.
    pub async fn check_history_updates(&self, items: &[HistoryItem]) -> Outcome<UpdateReport> {
        if items.is_empty() {
            return Outcome::Error { message: "no history items to check".to_string() };
        }
        match self.store.get_sites().await {
            Ok(sites) => Outcome::Success(history::check_updates(&self.client, &sites, items).await),
            Err(e) => Outcome::Error { message: format!("reading sites: {e:#}") },
        }
    }

    /// Liveness of the service itself: data directory present and sites readable.
    pub async fn service_health(&self) -> ServiceHealth {
        let timestamp = current_epoch();
        let unhealthy = |reason: String| ServiceHealth { status: "unhealthy".into(), sites_count: None, reason: Some(reason), timestamp };
        if let Some(dir) = self.store.data_dir() {
            if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
                return unhealthy(format!("data directory missing: {}", dir.display()));
            }
        }
        match self.store.get_sites().await {
            Ok(sites) => ServiceHealth { status: "healthy".into(), sites_count: Some(sites.len()), reason: None, timestamp },
            Err(e) => unhealthy(format!("{e:#}")),
        }
    }

    // --- Config ---

    pub async fn config_value(&self, key: &str) -> Result<Option<Value>> { self.store.get_config(key).await }
    pub async fn set_config_value(&self, key: &str, value: Value) -> Result<()> { self.store.set_config(key, value).await }
}

fn current_epoch() -> i64 { chrono::Utc::now().timestamp() }
fn now_millis() -> i64 { chrono::Utc::now().timestamp_millis() }

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn hub() -> (tempfile::TempDir, VodHub) {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings { data_dir: Some(dir.path().to_path_buf()), ..Settings::default() };
        let hub = VodHub::open(settings).await.unwrap();
        (dir, hub)
    }

    #[tokio::test]
    async fn site_admin_round_trip() {
        let (_dir, hub) = hub().await;
        let a = hub.add_site(NewSite { url: "https://www.alpha.com/api.php".into(), name: None }).await.unwrap();
        let b = hub.add_site(NewSite { url: "https://beta.net".into(), name: Some("beta".into()) }).await.unwrap();
        assert_eq!(a.name, "Alpha");
        assert_eq!(a.url, "https://www.alpha.com");

        hub.move_site(b.id, Direction::Up).await.unwrap();
        let ids: Vec<i64> = hub.list_sites(true).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        hub.update_site(a.id, SiteUpdate { enabled: Some(false), ..Default::default() }).await.unwrap();
        assert_eq!(hub.list_sites(false).await.unwrap().len(), 1);

        let err = hub.add_site(NewSite { url: "https://beta.net/x".into(), name: None }).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<error::SiteError>(), Some(error::SiteError::DuplicateUrl(_))));

        hub.remove_site(a.id).await.unwrap();
        assert_eq!(hub.list_sites(true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_without_sites_is_an_error_envelope() {
        let (_dir, hub) = hub().await;
        let res = hub.multi_site_search(&[1, 2], "film", 1).await;
        assert_eq!(
            serde_json::to_value(&res).unwrap(),
            json!({"status": "error", "message": "no enabled site matches the requested site ids"})
        );
        assert!(!hub.check_history_updates(&[]).await.is_success());
    }

    #[tokio::test]
    async fn stored_timeout_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::open(dir.path()).await.unwrap());
        store.set_config(TIMEOUT_CONFIG_KEY, json!("25")).await.unwrap();
        let hub = VodHub::with_store(Settings::default(), store).await.unwrap();
        assert_eq!(hub.settings().request_timeout_secs, 25);
    }

    #[tokio::test]
    async fn service_health_reports_site_count() {
        let (dir, hub) = hub().await;
        hub.add_site(NewSite { url: "https://alpha.com".into(), name: None }).await.unwrap();
        let health = hub.service_health().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.sites_count, Some(1));

        let path = dir.path().to_path_buf();
        drop(dir);
        let health = hub.service_health().await;
        assert_eq!(health.status, "unhealthy");
        assert!(health.reason.unwrap().contains(&path.display().to_string()));
    }
}
