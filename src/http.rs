use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::Settings;
use crate::error::FetchError;

/// Fixed path of the CMS10 VOD endpoint, appended to a site's base URL.
pub const API_PATH: &str = "/api.php/provide/vod/";

/// Status and body of a completed request. Non-2xx statuses are not errors at this level.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Shared, connection-pooled HTTP clients.
///
/// Certificate validation is a client-level switch in reqwest, so one client is
/// kept per mode. Both share one cap on requests in flight.
#[derive(Clone)]
pub struct HttpClients {
    verified: Client,
    insecure: Client,
    timeout: Duration,
    in_flight: Arc<Semaphore>,
}

impl HttpClients {
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        let timeout = settings.request_timeout();
        let build = |accept_invalid: bool| {
            let mut headers = header::HeaderMap::new();
            if let Ok(ua) = header::HeaderValue::from_str(&settings.user_agent) {
                headers.insert(header::USER_AGENT, ua);
            }
            Client::builder()
                .default_headers(headers)
                .timeout(timeout)
                .connect_timeout(timeout)
                .pool_max_idle_per_host(settings.pool_max_idle_per_host)
                .danger_accept_invalid_certs(accept_invalid)
                .build()
        };
        Ok(Self {
            verified: build(false)?,
            insecure: build(true)?,
            timeout,
            in_flight: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
        })
    }

    pub fn timeout(&self) -> Duration { self.timeout }

    fn client(&self, ssl_verify: bool) -> &Client {
        if ssl_verify { &self.verified } else { &self.insecure }
    }

    /// One GET, one attempt.
    pub async fn get(&self, url: &str, query: &[(&str, String)], ssl_verify: bool) -> Result<RawResponse, FetchError> {
        let _permit = self.in_flight.acquire().await.map_err(|e| FetchError::Unknown(e.to_string()))?;
        debug!(%url, ?query, ssl_verify, "GET");
        let resp = self
            .client(ssl_verify)
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, self.timeout))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| FetchError::from_reqwest(e, self.timeout))?;
        Ok(RawResponse { status, body })
    }
}

/// `<base>/api.php/provide/vod/`, adding `http://` when the base has no scheme.
pub fn api_url(base_url: &str) -> String {
    format!("{}{}", clean_base(base_url), API_PATH)
}

pub(crate) fn clean_base(base_url: &str) -> String {
    let base = base_url.trim();
    let base = if base.starts_with("http") { base.to_string() } else { format!("http://{base}") };
    base.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_normalizes_scheme_and_slash() {
        assert_eq!(api_url("https://a.example/"), "https://a.example/api.php/provide/vod/");
        assert_eq!(api_url("a.example"), "http://a.example/api.php/provide/vod/");
        assert_eq!(api_url(" http://a.example:8080// "), "http://a.example:8080/api.php/provide/vod/");
    }
}
