//! Site liveness probing and the health bookkeeping kept on each `Site`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::SUCCESS_CODE;
use crate::error::{FetchError, SiteError};
use crate::http::{api_url, HttpClients};
use crate::storage::SiteStore;
use crate::types::{lenient, CheckStatus, HealthCheckResult, HealthStatus, Site};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    Healthy,
    Unhealthy(String),
    /// No request was sent (e.g. the site URL cannot be parsed); the site's record is left alone.
    Error(String),
}

#[async_trait]
pub trait SiteProbe: Send + Sync {
    async fn probe(&self, site: &Site) -> ProbeVerdict;
}

/// Asks the list endpoint with no parameters and expects `code == 1`.
#[derive(Clone)]
pub struct HealthProbe {
    http: HttpClients,
}

impl HealthProbe {
    pub fn new(http: HttpClients) -> Self { Self { http } }
}

#[async_trait]
impl SiteProbe for HealthProbe {
    async fn probe(&self, site: &Site) -> ProbeVerdict {
        if !site.enabled {
            return ProbeVerdict::Healthy;
        }
        let url = api_url(&site.url);
        if let Err(e) = Url::parse(&url) {
            return ProbeVerdict::Error(format!("invalid site URL {}: {e}", site.url));
        }
        let raw = match self.http.get(&url, &[], site.ssl_verify).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(site = %site.name, error = %e, "probe request failed");
                return ProbeVerdict::Unhealthy(e.to_string());
            }
        };
        if raw.status != 200 {
            return ProbeVerdict::Unhealthy(FetchError::HttpStatus(raw.status).to_string());
        }
        let body: serde_json::Value = match serde_json::from_str(&raw.body) {
            Ok(v) => v,
            Err(e) => return ProbeVerdict::Unhealthy(format!("invalid API response: {e}")),
        };
        match body.get("code").and_then(lenient::as_i64) {
            Some(SUCCESS_CODE) => {
                debug!(site = %site.name, "probe ok");
                ProbeVerdict::Healthy
            }
            code => {
                let msg = body.get("msg").and_then(|m| m.as_str()).unwrap_or("unknown error");
                warn!(site = %site.name, ?code, %msg, "probe got unexpected code");
                ProbeVerdict::Unhealthy(format!("unexpected code {code:?}: {msg}"))
            }
        }
    }
}

/// Counter-with-threshold: `failure_threshold` consecutive failures disable a site. 0 never disables.
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub failure_threshold: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self { Self { failure_threshold: 3 } }
}

impl HealthPolicy {
    /// Record one verdict on `site` and describe it.
    pub fn apply(&self, site: &mut Site, verdict: &ProbeVerdict) -> HealthCheckResult {
        let (status, message) = match verdict {
            ProbeVerdict::Healthy => {
                site.last_check = Some(Utc::now());
                site.consecutive_errors = 0;
                site.check_status = CheckStatus::Success;
                (HealthStatus::Success, "check succeeded".to_string())
            }
            ProbeVerdict::Unhealthy(reason) => {
                site.last_check = Some(Utc::now());
                site.consecutive_errors += 1;
                site.check_status = CheckStatus::Failed;
                let mut message = format!("check failed, {} consecutive errors", site.consecutive_errors);
                warn!(site = %site.name, errors = site.consecutive_errors, %reason, "site check failed");
                if self.failure_threshold > 0 && site.consecutive_errors >= self.failure_threshold && site.enabled {
                    site.enabled = false;
                    message.push_str(", site disabled");
                    warn!(site = %site.name, "site disabled after repeated failures");
                }
                (HealthStatus::Failed, message)
            }
            ProbeVerdict::Error(reason) => {
                error!(site = %site.name, %reason, "site check errored");
                (HealthStatus::Error, format!("check error: {reason}"))
            }
        };
        HealthCheckResult { name: site.name.clone(), url: site.url.clone(), status, message }
    }
}

/// Runs probes and writes the results back to the store.
pub struct HealthScheduler<P: SiteProbe> {
    store: Arc<dyn SiteStore>,
    probe: P,
    policy: HealthPolicy,
    edit_lock: Arc<Mutex<()>>,
}

impl<P: SiteProbe> HealthScheduler<P> {
    /// `edit_lock` must be the lock every other read-modify-write of the site collection takes.
    pub fn new(store: Arc<dyn SiteStore>, probe: P, policy: HealthPolicy, edit_lock: Arc<Mutex<()>>) -> Self {
        Self { store, probe, policy, edit_lock }
    }

    pub fn policy(&self) -> HealthPolicy { self.policy }

    /// Probe every enabled site (every site with `include_disabled`), one at a time, and save once.
    pub async fn check_all(&self, include_disabled: bool) -> Result<Vec<HealthCheckResult>> {
        let mut sites = self.store.get_sites().await?;
        sites.retain(|s| include_disabled || s.enabled);
        info!(count = sites.len(), include_disabled, "checking sites");
        let results = self.probe_and_record(&mut sites).await;
        self.write_back(&sites).await?;
        info!(count = results.len(), "site check done");
        Ok(results)
    }

    pub async fn check_one(&self, id: i64) -> Result<HealthCheckResult> {
        let sites = self.store.get_sites().await?;
        let site = sites.into_iter().find(|s| s.id == id).ok_or(SiteError::NotFound(id))?;
        let mut batch = vec![site];
        let mut results = self.probe_and_record(&mut batch).await;
        self.write_back(&batch).await?;
        let result = results.pop().ok_or(SiteError::NotFound(id))?;
        info!(site = %result.name, status = ?result.status, "site check done");
        Ok(result)
    }

    /// Re-probe enabled sites whose last check is older than `interval` until `shutdown` flips to true.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "health loop started");
        loop {
            let wait = match self.check_due(interval).await {
                Ok(wait) => wait,
                Err(e) => {
                    error!(error = %e, "health cycle failed");
                    interval
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() { break; }
                }
            }
        }
        info!("health loop stopped");
    }

    /// One loop cycle. Returns how long until the next site falls due.
    async fn check_due(&self, interval: Duration) -> Result<Duration> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::days(365));
        let sites = self.store.get_sites().await?;
        let mut due: Vec<Site> = sites
            .into_iter()
            .filter(|s| s.enabled && s.last_check.map_or(true, |t| now - t >= window))
            .collect();
        if !due.is_empty() {
            info!(count = due.len(), "periodic site check");
            self.probe_and_record(&mut due).await;
            self.write_back(&due).await?;
        }

        let next = self
            .store
            .get_sites()
            .await?
            .iter()
            .filter(|s| s.enabled)
            .filter_map(|s| s.last_check.map(|t| t + window - Utc::now()))
            .min()
            .and_then(|d| d.to_std().ok())
            .unwrap_or(interval);
        Ok(next.clamp(Duration::from_secs(1), interval.max(Duration::from_secs(1))))
    }

    async fn probe_and_record(&self, sites: &mut [Site]) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(sites.len());
        for site in sites.iter_mut() {
            let verdict = self.probe.probe(site).await;
            results.push(self.policy.apply(site, &verdict));
        }
        results
    }

    /// Copy health fields onto a fresh snapshot so concurrent edits survive.
    async fn write_back(&self, checked: &[Site]) -> Result<()> {
        let _guard = self.edit_lock.lock().await;
        let by_id: HashMap<i64, &Site> = checked.iter().map(|s| (s.id, s)).collect();
        let mut sites = self.store.get_sites().await?;
        for site in sites.iter_mut() {
            if let Some(c) = by_id.get(&site.id) {
                site.last_check = c.last_check;
                site.check_status = c.check_status;
                site.consecutive_errors = c.consecutive_errors;
                if !c.enabled { site.enabled = false; }
            }
        }
        self.store.save_sites(&sites).await.inspect_err(|e| error!(error = %e, "saving check results failed"))
    }
}
