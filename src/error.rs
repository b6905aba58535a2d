use std::time::Duration;

use thiserror::Error;

/// Why a response body could not be decoded as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("the site returned an empty response")]
    EmptyBody,
    #[error("the site returned an HTML page instead of API data")]
    HtmlBody,
    #[error("the response is too short to be API data: {0:?}")]
    TooShort(String),
    #[error("the site answered with a notice instead of data: {0:?}")]
    SentinelText(String),
    #[error("malformed JSON: {0}")]
    Generic(String),
}

/// Failure of one request cycle against one site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out after {}s, the site may be down or the network is slow", .0.as_secs())]
    Timeout(Duration),
    #[error("could not connect to the site, check the URL or your network: {0}")]
    Connection(String),
    #[error("the site responded with HTTP {0}")]
    HttpStatus(u16),
    #[error("the site does not support this query")]
    Unsupported,
    #[error("invalid API response: {0}")]
    MalformedJson(MalformedReason),
    #[error("the site reported an error: {0}")]
    Upstream(String),
    #[error("the detail response contained no usable record")]
    MissingDetail,
    #[error("unexpected error: {0}")]
    Unknown(String),
}

impl FetchError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if err.is_connect() || err.is_request() {
            FetchError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else {
            FetchError::Unknown(err.to_string())
        }
    }
}

/// Failure of a multi-site search as a whole. Per-site failures never end up here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("no enabled site matches the requested site ids")]
    NoSites,
}

/// Rejected site administration request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiteError {
    #[error("URL must not be empty")]
    EmptyUrl,
    #[error("invalid URL {0:?}, it must include http:// or https://")]
    InvalidUrl(String),
    #[error("a site with URL {0} already exists")]
    DuplicateUrl(String),
    #[error("a site named {0:?} already exists, pick another name")]
    DuplicateName(String),
    #[error("no site with id {0}")]
    NotFound(i64),
    #[error("site cannot be moved further in that direction")]
    CannotMove,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let err = FetchError::Timeout(Duration::from_secs(10));
        assert!(err.to_string().contains("10s"));
        let err = FetchError::MalformedJson(MalformedReason::HtmlBody);
        assert_eq!(
            err.to_string(),
            "invalid API response: the site returned an HTML page instead of API data"
        );
        assert_eq!(FetchError::HttpStatus(503).to_string(), "the site responded with HTTP 503");
    }
}
