use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One upstream API provider as kept by the site store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
    #[serde(default = "unordered")]
    pub order: i64,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "CheckStatus::is_unset")]
    pub check_status: CheckStatus,
    #[serde(default)]
    pub consecutive_errors: u32,
}

impl Site {
    pub fn new(id: i64, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            enabled: true,
            ssl_verify: true,
            order: 0,
            note: String::new(),
            last_check: None,
            check_status: CheckStatus::Unset,
            consecutive_errors: 0,
        }
    }
}

fn default_true() -> bool { true }
fn unordered() -> i64 { i64::MAX }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    #[default]
    Unset,
    Success,
    Failed,
}

impl CheckStatus {
    fn is_unset(&self) -> bool { matches!(self, CheckStatus::Unset) }
}

/// Query parameters of a list request. Falsy values are left out of the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub type_id: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
}

impl ListParams {
    pub fn browse(page: u32, type_id: Option<String>) -> Self {
        Self { page, type_id, keyword: None }
    }

    /// Search mode: keyword and page only, never a type filter.
    pub fn search(keyword: impl Into<String>, page: u32) -> Self {
        Self { page, type_id: None, keyword: Some(keyword.into()) }
    }

    pub fn has_keyword(&self) -> bool {
        self.keyword.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub(crate) fn query(&self) -> Vec<(&'static str, String)> {
        let mut q = Vec::with_capacity(3);
        if self.page > 0 { q.push(("pg", self.page.to_string())); }
        if let Some(t) = self.type_id.as_deref().filter(|t| !t.is_empty()) { q.push(("t", t.to_string())); }
        if let Some(k) = self.keyword.as_deref().filter(|k| !k.is_empty()) { q.push(("wd", k.to_string())); }
        q
    }
}

/// One catalog entry of a list response. Unknown upstream fields are carried through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    #[serde(default, deserialize_with = "lenient::string")]
    pub vod_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub vod_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub vod_pic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_site_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A successful list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoList {
    pub page: u64,
    pub pagecount: u64,
    pub total: u64,
    pub list: Vec<VideoSummary>,
    pub class: Value,
}

impl VideoList {
    pub(crate) fn empty(class: Value) -> Self {
        Self { page: 0, pagecount: 0, total: 0, list: Vec::new(), class }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub name: String,
    pub url: String,
}

/// A named play source (CDN/line) and its episodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaySource {
    pub flag: String,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailData {
    pub data: Vec<PlaySource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub total_sites_searched: usize,
    pub sites_with_results: usize,
    pub results_by_site: BTreeMap<String, usize>,
}

/// Merged output of a multi-site search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub list: Vec<VideoSummary>,
    pub page: u32,
    pub pagecount: u64,
    pub total: usize,
    pub search_stats: SearchStats,
}

/// `{"status": "success", ...}` or `{"status": "error", "message": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome<T> {
    Success(T),
    Error { message: String },
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool { matches!(self, Outcome::Success(_)) }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Error { .. } => None,
        }
    }
}

impl<T, E: Display> From<Result<T, E>> for Outcome<T> {
    fn from(res: Result<T, E>) -> Self {
        match res {
            Ok(v) => Outcome::Success(v),
            Err(e) => Outcome::Error { message: e.to_string() },
        }
    }
}

pub type VideoListResult = Outcome<VideoList>;
pub type DetailResult = Outcome<DetailData>;
pub type MultiSearchResult = Outcome<SearchResults>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Success,
    Failed,
    Error,
}

/// Outcome of checking one site in one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub url: String,
    pub status: HealthStatus,
    pub message: String,
}

/// Upstream payloads disagree on whether numbers are numbers or strings.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        Ok(as_i64(&Value::deserialize(d)?))
    }

    pub fn as_i64(v: &Value) -> Option<i64> {
        match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
