//! Checks watched-history entries for newly published episodes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::SiteClient;
use crate::error::FetchError;
use crate::playlist::max_episode_count;
use crate::types::{lenient, PlaySource, Site};

/// At most this many history entries are checked per call.
pub const MAX_HISTORY_ITEMS: usize = 10;

#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn detail(&self, site: &Site, vod_id: &str) -> Result<Vec<PlaySource>, FetchError>;
}

#[async_trait]
impl DetailSource for SiteClient {
    async fn detail(&self, site: &Site, vod_id: &str) -> Result<Vec<PlaySource>, FetchError> {
        self.fetch_detail(&site.url, vod_id, site.ssl_verify, Some(&site.name)).await
    }
}

/// A video the user has watched, with the episode count seen at the time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(default, deserialize_with = "lenient::string")]
    pub video_id: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub site_id: Option<i64>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub total_episodes: usize,
    #[serde(default)]
    pub video_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub video_id: String,
    pub site_id: Option<i64>,
    pub status: UpdateStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_episodes: Option<usize>,
    pub has_update: bool,
    pub new_episodes_count: usize,
}

impl UpdateCheck {
    fn not_checked(item: &HistoryItem, status: UpdateStatus, reason: impl Into<String>) -> Self {
        Self {
            video_id: item.video_id.clone(),
            site_id: item.site_id,
            status,
            reason: Some(reason.into()),
            total_episodes: None,
            has_update: false,
            new_episodes_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSummary {
    pub total: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    pub results: Vec<UpdateCheck>,
    pub summary: UpdateSummary,
}

fn resolve_site<'a>(sites: &'a [Site], item: &HistoryItem) -> Option<&'a Site> {
    item.site_id
        .and_then(|id| sites.iter().find(|s| s.id == id))
        .or_else(|| item.site_name.as_deref().and_then(|n| sites.iter().find(|s| s.name == n)))
}

/// Compare each entry's episode count with what its site lists now. Entries
/// past [`MAX_HISTORY_ITEMS`] are ignored.
pub async fn check_updates<D: DetailSource + ?Sized>(source: &D, sites: &[Site], items: &[HistoryItem]) -> UpdateReport {
    let items = &items[..items.len().min(MAX_HISTORY_ITEMS)];
    let mut summary = UpdateSummary { total: items.len(), ..Default::default() };
    let mut results = Vec::with_capacity(items.len());

    for item in items {
        let site = match resolve_site(sites, item) {
            Some(s) if s.enabled && !s.url.is_empty() => s,
            _ => {
                results.push(UpdateCheck::not_checked(item, UpdateStatus::Skipped, "site missing, without URL or disabled"));
                continue;
            }
        };
        let sources = match source.detail(site, &item.video_id).await {
            Ok(sources) if !sources.is_empty() => sources,
            Ok(_) => {
                summary.failed += 1;
                results.push(UpdateCheck::not_checked(item, UpdateStatus::Failed, "no play sources"));
                continue;
            }
            Err(e) => {
                warn!(site = %site.name, video = %item.video_id, error = %e, "history detail lookup failed");
                summary.failed += 1;
                results.push(UpdateCheck::not_checked(item, UpdateStatus::Failed, e.to_string()));
                continue;
            }
        };

        let current = max_episode_count(&sources);
        let new_episodes = if item.total_episodes == 0 { 0 } else { current.saturating_sub(item.total_episodes) };
        if new_episodes > 0 {
            summary.updated += 1;
            info!(video = item.video_name.as_deref().unwrap_or(&item.video_id), new_episodes, "new episodes found");
        }
        results.push(UpdateCheck {
            video_id: item.video_id.clone(),
            site_id: item.site_id,
            status: UpdateStatus::Success,
            reason: None,
            total_episodes: Some(current),
            has_update: new_episodes > 0,
            new_episodes_count: new_episodes,
        });
    }

    info!(total = summary.total, updated = summary.updated, failed = summary.failed, "history check done");
    UpdateReport { results, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Episode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns `vod_id` episodes, or fails for "bad".
    struct Episodes(AtomicUsize);

    #[async_trait]
    impl DetailSource for Episodes {
        async fn detail(&self, _site: &Site, vod_id: &str) -> Result<Vec<PlaySource>, FetchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            let n: usize = vod_id.parse().map_err(|_| FetchError::MissingDetail)?;
            let episodes = (1..=n).map(|i| Episode { name: format!("ep{i}"), url: format!("u{i}") }).collect();
            Ok(vec![PlaySource { flag: "m3u8".into(), episodes }])
        }
    }

    fn item(video_id: &str, site_id: i64, seen: usize) -> HistoryItem {
        HistoryItem { video_id: video_id.into(), site_id: Some(site_id), total_episodes: seen, ..Default::default() }
    }

    #[tokio::test]
    async fn reports_new_episodes_and_failures() {
        let mut off = Site::new(2, "Off", "https://off.example");
        off.enabled = false;
        let sites = vec![Site::new(1, "A", "https://a.example"), off];
        let items = vec![item("12", 1, 10), item("8", 1, 0), item("5", 1, 5), item("bad", 1, 3), item("9", 2, 1), item("9", 7, 1)];
        let source = Episodes(AtomicUsize::new(0));

        let report = check_updates(&source, &sites, &items).await;
        let r = &report.results;
        assert!(r[0].has_update);
        assert_eq!(r[0].new_episodes_count, 2);
        assert_eq!(r[1].total_episodes, Some(8));
        assert!(!r[1].has_update);
        assert!(!r[2].has_update);
        assert_eq!(r[3].status, UpdateStatus::Failed);
        assert_eq!(r[4].status, UpdateStatus::Skipped);
        assert_eq!(r[5].status, UpdateStatus::Skipped);
        assert_eq!(report.summary, UpdateSummary { total: 6, updated: 1, failed: 1 });
        assert_eq!(source.0.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn falls_back_to_site_name_and_caps_items() {
        let sites = vec![Site::new(1, "A", "https://a.example")];
        let by_name = HistoryItem { video_id: "3".into(), site_id: None, site_name: Some("A".into()), total_episodes: 1, ..Default::default() };
        let items = vec![by_name; 15];
        let source = Episodes(AtomicUsize::new(0));
        let report = check_updates(&source, &sites, &items).await;
        assert_eq!(report.summary.total, MAX_HISTORY_ITEMS);
        assert_eq!(report.summary.updated, MAX_HISTORY_ITEMS);
        assert_eq!(source.0.load(Ordering::SeqCst), MAX_HISTORY_ITEMS);
    }

    #[test]
    fn items_read_camel_case_and_numeric_ids() {
        let item: HistoryItem = serde_json::from_str(r#"{"videoId": 42, "siteId": "7", "totalEpisodes": 3}"#).unwrap();
        assert_eq!(item.video_id, "42");
        assert_eq!(item.site_id, Some(7));
        assert_eq!(item.total_episodes, 3);
    }
}
