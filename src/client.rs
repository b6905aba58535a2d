use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{FetchError, MalformedReason};
use crate::http::{clean_base, HttpClients, API_PATH};
use crate::playlist::parse_play_sources;
use crate::types::{lenient, ListParams, PlaySource, VideoList, VideoSummary};

/// Value of the upstream `code` field that means success.
pub const SUCCESS_CODE: i64 = 1;

/// Plain-text bodies some sites send instead of JSON when a feature is switched off.
pub const SENTINELS: &[&str] = &[
    "暂不支持搜索",
    "暫不支持搜索",
    "不支持搜索",
    "暂不支持",
    "search not supported",
    "not supported",
];

/// Bodies shorter than this cannot be a list payload.
const MIN_BODY_CHARS: usize = 20;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default, deserialize_with = "lenient::number")]
    code: Option<i64>,
    #[serde(default, deserialize_with = "lenient::string")]
    msg: String,
    #[serde(default, deserialize_with = "lenient::number")]
    page: Option<i64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pagecount: Option<i64>,
    #[serde(default, deserialize_with = "lenient::number")]
    total: Option<i64>,
    #[serde(default)]
    list: Option<Value>,
    #[serde(default)]
    class: Option<Value>,
}

impl ApiResponse {
    fn is_success(&self) -> bool { self.code == Some(SUCCESS_CODE) }

    fn items<T: DeserializeOwned>(&mut self) -> Vec<T> {
        let Some(Value::Array(list)) = self.list.take() else { return Vec::new() };
        list.into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(v) => Some(v),
                Err(e) => { debug!(error = %e, "skipping unreadable list item"); None }
            })
            .collect()
    }

    fn class(&mut self) -> Value {
        self.class.take().filter(|c| !c.is_null()).unwrap_or_else(|| Value::Array(Vec::new()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct DetailRecord {
    #[serde(default, deserialize_with = "lenient::string")]
    vod_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    vod_pic: String,
    #[serde(default, deserialize_with = "lenient::string")]
    vod_play_from: String,
    #[serde(default, deserialize_with = "lenient::string")]
    vod_play_url: String,
}

/// Client for one CMS10 VOD API at a time. Cheap to clone; the pooled clients are shared.
#[derive(Clone)]
pub struct SiteClient {
    http: HttpClients,
}

impl SiteClient {
    pub fn new(http: HttpClients) -> Self { Self { http } }

    pub fn http(&self) -> &HttpClients { &self.http }

    /// List or search query. Pictures are taken from a follow-up detail request and made absolute.
    pub async fn fetch_list(
        &self,
        base_url: &str,
        params: &ListParams,
        ssl_verify: bool,
        site_name: Option<&str>,
    ) -> Result<VideoList, FetchError> {
        let label = site_name.unwrap_or(base_url);
        let base = clean_base(base_url);
        let url = format!("{base}{API_PATH}");
        info!(site = %label, ?params, ssl_verify, "list query");

        let mut resp = self.fetch_envelope(&url, &params.query(), ssl_verify).await.inspect_err(|e| {
            warn!(site = %label, error = %e, "list query failed");
        })?;

        if !resp.is_success() {
            if params.has_keyword() && resp.total == Some(0) {
                info!(site = %label, "search returned no results");
                return Ok(VideoList::empty(resp.class()));
            }
            let message = if resp.msg.is_empty() {
                format!("unexpected status code {}", resp.code.map_or_else(|| "(none)".to_string(), |c| c.to_string()))
            } else {
                resp.msg.clone()
            };
            warn!(site = %label, code = ?resp.code, %message, "list query rejected by site");
            return Err(FetchError::Upstream(message));
        }

        let mut videos: Vec<VideoSummary> = resp.items();
        let mut out = VideoList {
            page: non_negative(resp.page),
            pagecount: non_negative(resp.pagecount),
            total: non_negative(resp.total),
            list: Vec::new(),
            class: resp.class(),
        };
        if videos.is_empty() {
            return Ok(out);
        }

        let pictures = self.detail_pictures(&url, &videos, ssl_verify, label).await;
        for video in &mut videos {
            video.vod_pic = pictures.get(&video.vod_id).map(|pic| absolute_pic(&base, pic)).unwrap_or_default();
        }
        info!(site = %label, count = videos.len(), total = out.total, "list query done");
        out.list = videos;
        Ok(out)
    }

    /// Play sources of one video.
    pub async fn fetch_detail(
        &self,
        base_url: &str,
        vod_id: &str,
        ssl_verify: bool,
        site_name: Option<&str>,
    ) -> Result<Vec<PlaySource>, FetchError> {
        let label = site_name.unwrap_or(base_url);
        let url = format!("{}{API_PATH}", clean_base(base_url));
        info!(site = %label, %vod_id, ssl_verify, "detail query");
        let query = [("ac", "videolist".to_string()), ("ids", vod_id.to_string())];

        let mut resp = self.fetch_envelope(&url, &query, ssl_verify).await.inspect_err(|e| {
            warn!(site = %label, %vod_id, error = %e, "detail query failed");
        })?;
        let Some(record) = resp.items::<DetailRecord>().into_iter().next() else {
            warn!(site = %label, %vod_id, "detail response has no usable list");
            return Err(FetchError::MissingDetail);
        };
        let sources = parse_play_sources(&record.vod_play_from, &record.vod_play_url);
        debug!(site = %label, %vod_id, sources = sources.len(), "detail parsed");
        Ok(sources)
    }

    async fn detail_pictures(&self, url: &str, videos: &[VideoSummary], ssl_verify: bool, label: &str) -> HashMap<String, String> {
        let ids = videos.iter().map(|v| v.vod_id.as_str()).collect::<Vec<_>>().join(",");
        let query = [("ac", "videolist".to_string()), ("ids", ids)];
        match self.fetch_envelope(url, &query, ssl_verify).await {
            Ok(mut resp) if resp.is_success() => resp
                .items::<DetailRecord>()
                .into_iter()
                .map(|r| (r.vod_id, r.vod_pic))
                .collect(),
            Ok(resp) => {
                warn!(site = %label, code = ?resp.code, "picture lookup rejected, dropping pictures");
                HashMap::new()
            }
            Err(e) => {
                warn!(site = %label, error = %e, "picture lookup failed, dropping pictures");
                HashMap::new()
            }
        }
    }

    async fn fetch_envelope(&self, url: &str, query: &[(&str, String)], ssl_verify: bool) -> Result<ApiResponse, FetchError> {
        let raw = self.http.get(url, query, ssl_verify).await?;
        if is_sentinel(&raw.body) {
            return Err(FetchError::Unsupported);
        }
        if raw.status != 200 {
            return Err(FetchError::HttpStatus(raw.status));
        }
        decode(&raw.body)
    }
}

fn decode(body: &str) -> Result<ApiResponse, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::MalformedJson(classify_malformed(body, &e)))
}

fn is_sentinel(body: &str) -> bool {
    let t = body.trim();
    SENTINELS.iter().any(|s| t.eq_ignore_ascii_case(s))
}

fn classify_malformed(body: &str, err: &serde_json::Error) -> MalformedReason {
    let t = body.trim();
    if t.is_empty() {
        return MalformedReason::EmptyBody;
    }
    let lower = t.to_lowercase();
    if lower.starts_with("<!doctype") || lower.starts_with("<html") || lower.contains("<body") {
        return MalformedReason::HtmlBody;
    }
    if let Some(s) = SENTINELS.iter().find(|s| lower.contains(&s.to_lowercase())) {
        return MalformedReason::SentinelText(s.to_string());
    }
    if t.chars().count() < MIN_BODY_CHARS {
        return MalformedReason::TooShort(t.to_string());
    }
    MalformedReason::Generic(err.to_string())
}

/// Relative and scheme-relative pictures are resolved against the site base.
fn absolute_pic(base: &str, pic: &str) -> String {
    let pic = pic.trim();
    if pic.is_empty() || pic.starts_with("http") {
        return pic.to_string();
    }
    if let Some(rest) = pic.strip_prefix("//") {
        let scheme = base.split("://").next().unwrap_or("http");
        return format!("{scheme}://{rest}");
    }
    format!("{base}/{}", pic.trim_start_matches('/'))
}

fn non_negative(v: Option<i64>) -> u64 {
    v.map_or(0, |n| n.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_err(body: &str) -> serde_json::Error {
        serde_json::from_str::<ApiResponse>(body).unwrap_err()
    }

    #[test]
    fn malformed_bodies_are_classified() {
        assert_eq!(classify_malformed("  ", &json_err("  ")), MalformedReason::EmptyBody);
        let html = "<!DOCTYPE html><html><body>502 Bad Gateway</body></html>";
        assert_eq!(classify_malformed(html, &json_err(html)), MalformedReason::HtmlBody);
        assert_eq!(classify_malformed("oops", &json_err("oops")), MalformedReason::TooShort("oops".into()));
        let notice = "抱歉，本站暂不支持搜索功能";
        assert_eq!(
            classify_malformed(notice, &json_err(notice)),
            MalformedReason::SentinelText("暂不支持搜索".into())
        );
        let junk = "{\"code\": 1, \"list\": [ this is not json at all ]}";
        assert!(matches!(classify_malformed(junk, &json_err(junk)), MalformedReason::Generic(_)));
    }

    #[test]
    fn sentinel_must_be_the_whole_body() {
        assert!(is_sentinel(" Search not supported \n"));
        assert!(is_sentinel("暂不支持搜索"));
        assert!(!is_sentinel("{\"msg\":\"not supported\"}"));
    }

    #[test]
    fn pictures_become_absolute() {
        let base = "https://cms.example";
        assert_eq!(absolute_pic(base, "/upload/a.jpg"), "https://cms.example/upload/a.jpg");
        assert_eq!(absolute_pic(base, "upload/a.jpg"), "https://cms.example/upload/a.jpg");
        assert_eq!(absolute_pic(base, "//img.example/a.jpg"), "https://img.example/a.jpg");
        assert_eq!(absolute_pic(base, "http://img.example/a.jpg"), "http://img.example/a.jpg");
        assert_eq!(absolute_pic(base, ""), "");
    }

    #[test]
    fn envelope_reads_string_numbers() {
        let mut resp = decode(r#"{"code":"1","page":"2","pagecount":"7","total":"130","list":[{"vod_id":"9"}],"class":null}"#).unwrap();
        assert!(resp.is_success());
        assert_eq!(non_negative(resp.pagecount), 7);
        assert_eq!(resp.items::<DetailRecord>().len(), 1);
        assert_eq!(resp.class(), Value::Array(Vec::new()));
    }
}
