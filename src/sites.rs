//! Administrative edits of the site collection.
//!
//! Everything here works on an in-memory `Vec<Site>`; callers load the whole
//! collection from the store, apply one edit and save it back.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SiteError;
use crate::types::Site;

const COMMON_TLDS: &[&str] = &["com", "net", "org", "xyz", "top", "cn", "cc"];
const FALLBACK_NAME: &str = "Unnamed site";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSite {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Partial edit; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub enabled: Option<bool>,
    pub ssl_verify: Option<bool>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Reduce a URL to `scheme://host[:port]`.
pub fn clean_base_url(raw: &str) -> Result<String, SiteError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(SiteError::EmptyUrl);
    }
    let parsed = Url::parse(raw).map_err(|_| SiteError::InvalidUrl(raw.to_string()))?;
    let host = parsed.host_str().filter(|h| !h.is_empty()).ok_or_else(|| SiteError::InvalidUrl(raw.to_string()))?;
    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Display name guessed from the host: `www.foo.com` -> `Foo`.
pub fn derive_name(clean_url: &str) -> String {
    let host = Url::parse(clean_url).ok().and_then(|u| u.host_str().map(str::to_string));
    let Some(host) = host else { return FALLBACK_NAME.to_string() };
    let domain = host.strip_prefix("www.").or_else(|| host.strip_prefix("api.")).unwrap_or(&host);
    let parts: Vec<&str> = domain.split('.').collect();
    let label = match parts.as_slice() {
        [.., name, tld] if COMMON_TLDS.contains(tld) => *name,
        [first, ..] => *first,
        [] => FALLBACK_NAME,
    };
    if label.is_empty() { FALLBACK_NAME.to_string() } else { capitalize(label) }
}

fn capitalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Search results are keyed by site name, so names must be unique.
fn ensure_unique_name(sites: &[Site], name: &str, except_id: Option<i64>) -> Result<(), SiteError> {
    if sites.iter().any(|s| Some(s.id) != except_id && s.name == name) {
        return Err(SiteError::DuplicateName(name.to_string()));
    }
    Ok(())
}

/// Ids are creation time in milliseconds, bumped past any existing id.
fn next_id(sites: &[Site], now_ms: i64) -> i64 {
    let max = sites.iter().map(|s| s.id).max().unwrap_or(0);
    now_ms.max(max + 1)
}

pub fn add_site(sites: &mut Vec<Site>, new: NewSite, now_ms: i64) -> Result<Site, SiteError> {
    let url = clean_base_url(&new.url)?;
    if sites.iter().any(|s| s.url == url) {
        return Err(SiteError::DuplicateUrl(url));
    }
    let name = match new.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => capitalize(n),
        None => derive_name(&url),
    };
    ensure_unique_name(sites, &name, None)?;
    let mut site = Site::new(next_id(sites, now_ms), name, url);
    site.order = sites.len() as i64;
    sites.push(site.clone());
    Ok(site)
}

pub fn update_site(sites: &mut [Site], id: i64, update: SiteUpdate) -> Result<Site, SiteError> {
    let url = update.url.as_deref().map(clean_base_url).transpose()?;
    if let Some(u) = &url {
        if sites.iter().any(|s| s.id != id && &s.url == u) {
            return Err(SiteError::DuplicateUrl(u.clone()));
        }
    }
    if let Some(name) = &update.name {
        ensure_unique_name(sites, name, Some(id))?;
    }
    let site = sites.iter_mut().find(|s| s.id == id).ok_or(SiteError::NotFound(id))?;
    if let Some(name) = update.name { site.name = name; }
    if let Some(url) = url { site.url = url; }
    if let Some(enabled) = update.enabled {
        // Re-enabling gives the site a fresh failure budget.
        if enabled && !site.enabled { site.consecutive_errors = 0; }
        site.enabled = enabled;
    }
    if let Some(v) = update.ssl_verify { site.ssl_verify = v; }
    if let Some(note) = update.note { site.note = note; }
    Ok(site.clone())
}

pub fn remove_site(sites: &mut Vec<Site>, id: i64) -> Result<Site, SiteError> {
    let idx = sites.iter().position(|s| s.id == id).ok_or(SiteError::NotFound(id))?;
    Ok(sites.remove(idx))
}

/// Move one position and renumber every `order` to its index.
pub fn move_site(sites: &mut Vec<Site>, id: i64, direction: Direction) -> Result<(), SiteError> {
    let idx = sites.iter().position(|s| s.id == id).ok_or(SiteError::NotFound(id))?;
    let target = match direction {
        Direction::Up if idx > 0 => idx - 1,
        Direction::Down if idx + 1 < sites.len() => idx + 1,
        _ => return Err(SiteError::CannotMove),
    };
    let site = sites.remove(idx);
    sites.insert(target, site);
    for (i, s) in sites.iter_mut().enumerate() {
        s.order = i as i64;
    }
    Ok(())
}

/// Sites sorted by `order`; disabled ones dropped unless `include_disabled`.
pub fn sorted(sites: Vec<Site>, include_disabled: bool) -> Vec<Site> {
    let mut out: Vec<Site> = sites.into_iter().filter(|s| include_disabled || s.enabled).collect();
    out.sort_by_key(|s| s.order);
    out
}
