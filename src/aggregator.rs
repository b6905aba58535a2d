use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::client::SiteClient;
use crate::error::{FetchError, SearchError};
use crate::types::{ListParams, SearchResults, SearchStats, Site, VideoList, VideoSummary};

/// Default ceiling on sites queried at once.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Anything that can answer a list query for a site.
#[async_trait]
pub trait VodSource: Send + Sync + 'static {
    async fn list(&self, site: &Site, params: &ListParams) -> Result<VideoList, FetchError>;
}

#[async_trait]
impl VodSource for SiteClient {
    async fn list(&self, site: &Site, params: &ListParams) -> Result<VideoList, FetchError> {
        self.fetch_list(&site.url, params, site.ssl_verify, Some(&site.name)).await
    }
}

/// Fans a keyword search out over several sites and merges what comes back.
pub struct Aggregator<S: VodSource> {
    source: Arc<S>,
    max_concurrency: usize,
}

impl<S: VodSource> Aggregator<S> {
    pub fn new(source: Arc<S>, max_concurrency: usize) -> Self {
        Self { source, max_concurrency: max_concurrency.max(1) }
    }

    pub fn source(&self) -> &Arc<S> { &self.source }

    /// Search `keyword` on every enabled site in `site_ids`.
    ///
    /// A failing (or panicking) site contributes nothing; only an empty set of
    /// searchable sites is an error.
    pub async fn search(&self, sites: &[Site], site_ids: &[i64], keyword: &str, page: u32) -> Result<SearchResults, SearchError> {
        let targets: Vec<Site> = sites.iter().filter(|s| s.enabled && site_ids.contains(&s.id)).cloned().collect();
        if targets.is_empty() {
            return Err(SearchError::NoSites);
        }
        let width = targets.len().min(self.max_concurrency);
        let params = ListParams::search(keyword, page);
        info!(%keyword, page, sites = targets.len(), width, "multi-site search");

        let mut results_by_site: BTreeMap<String, usize> = targets.iter().map(|s| (s.name.clone(), 0)).collect();

        let per_site: Vec<(Vec<VideoSummary>, u64)> = stream::iter(targets.iter().cloned())
            .map(|site| {
                let source = self.source.clone();
                let params = params.clone();
                async move {
                    let name = site.name.clone();
                    match tokio::spawn(async move { search_one(source.as_ref(), &site, &params).await }).await {
                        Ok(res) => res,
                        Err(e) => {
                            warn!(site = %name, error = %e, "search task aborted");
                            (Vec::new(), 0)
                        }
                    }
                }
            })
            .buffer_unordered(width)
            .collect()
            .await;

        let mut list = Vec::new();
        let mut pagecount = 0u64;
        for (videos, pc) in per_site {
            pagecount = pagecount.max(pc);
            list.extend(videos);
        }
        if pagecount == 0 && list.is_empty() {
            pagecount = u64::from(page);
        }

        for video in &list {
            if let Some(count) = video.from_site.as_ref().and_then(|n| results_by_site.get_mut(n)) {
                *count += 1;
            }
        }
        let sites_with_results = results_by_site.values().filter(|&&n| n > 0).count();
        info!(
            total = list.len(),
            sites = targets.len(),
            sites_with_results,
            ?results_by_site,
            "multi-site search done"
        );

        Ok(SearchResults {
            total: list.len(),
            list,
            page,
            pagecount,
            search_stats: SearchStats { total_sites_searched: targets.len(), sites_with_results, results_by_site },
        })
    }
}

async fn search_one<S: VodSource + ?Sized>(source: &S, site: &Site, params: &ListParams) -> (Vec<VideoSummary>, u64) {
    match source.list(site, params).await {
        Ok(res) => {
            let mut videos = res.list;
            for v in &mut videos {
                v.from_site = Some(site.name.clone());
                v.from_site_id = Some(site.id);
            }
            (videos, res.pagecount)
        }
        Err(e) => {
            warn!(site = %site.name, error = %e, "site search failed");
            (Vec::new(), 0)
        }
    }
}
