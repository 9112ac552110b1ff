//! Site document sources.

use bandit_core::constants::{HEADER_SESSION, HEADER_SITE, PARAM_SELECT, PARAM_TIMESTAMP};
use bandit_core::{BanditError, BanditResult, ClientConfig, Site};
use bandit_metrics::BoxFut;
use chrono::Utc;
use tracing::debug;
use url::Url;

/// Parameters of a single site fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteRequest {
    pub site: Option<String>,
    /// Explicit variant override forwarded to the server.
    pub select: Option<String>,
    /// Session id of the current origin, when one has been issued.
    pub session: Option<String>,
}

pub trait SiteSource: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a SiteRequest) -> BoxFut<'a, BanditResult<Site>>;
}

/// `GET <base_url><site_path>` returning a JSON site document.
///
/// The endpoint is resolved on every fetch, so a malformed base URL surfaces
/// as a load error rather than at construction.
pub struct HttpSiteSource {
    client: reqwest::Client,
    base_url: String,
    site_path: String,
    append_timestamp: bool,
}

impl HttpSiteSource {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            site_path: config.site_path.clone(),
            append_timestamp: config.append_timestamp,
        }
    }

    pub fn request_url(&self, request: &SiteRequest) -> BanditResult<Url> {
        let mut url = Url::parse(&self.base_url)?.join(&self.site_path)?;
        if let Some(select) = &request.select {
            url.query_pairs_mut().append_pair(PARAM_SELECT, select);
        }
        if self.append_timestamp {
            url.query_pairs_mut()
                .append_pair(PARAM_TIMESTAMP, &Utc::now().timestamp_millis().to_string());
        }
        Ok(url)
    }
}

impl SiteSource for HttpSiteSource {
    fn fetch<'a>(&'a self, request: &'a SiteRequest) -> BoxFut<'a, BanditResult<Site>> {
        Box::pin(async move {
            let url = self.request_url(request)?;
            debug!(url = %url, "Fetching site document");

            let mut req = self
                .client
                .get(url.clone())
                .header(reqwest::header::ACCEPT, "application/json");
            if let Some(session) = request.session.as_deref().filter(|s| !s.is_empty()) {
                req = req.header(HEADER_SESSION, session);
            }
            if let Some(site) = &request.site {
                req = req.header(HEADER_SITE, site);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| BanditError::Transport(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(BanditError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            let body = resp
                .text()
                .await
                .map_err(|e| BanditError::Transport(e.to_string()))?;
            Ok(serde_json::from_str(&body)?)
        })
    }
}

/// Serves a site document supplied by the caller.
pub struct StaticSiteSource {
    site: Site,
}

impl StaticSiteSource {
    pub fn new(site: Site) -> Self {
        Self { site }
    }
}

impl SiteSource for StaticSiteSource {
    fn fetch<'a>(&'a self, _request: &'a SiteRequest) -> BoxFut<'a, BanditResult<Site>> {
        let site = self.site.clone();
        Box::pin(async move { Ok(site) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_without_timestamp_by_default() {
        let source = HttpSiteSource::new(&ClientConfig::default());
        let url = source.request_url(&SiteRequest::default()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/site");
    }

    #[test]
    fn test_request_url_with_select_and_timestamp() {
        let config = ClientConfig {
            append_timestamp: true,
            ..Default::default()
        };
        let source = HttpSiteSource::new(&config);
        let url = source
            .request_url(&SiteRequest {
                select: Some("B".into()),
                ..Default::default()
            })
            .unwrap();

        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(params[0], ("select".to_string(), "B".to_string()));
        assert_eq!(params[1].0, "ts");
        assert!(params[1].1.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_request_url_rejects_relative_base() {
        for base_url in ["", "localhost:3000/", "not a url"] {
            let source = HttpSiteSource::new(&ClientConfig {
                base_url: base_url.into(),
                ..Default::default()
            });
            assert!(matches!(
                source.request_url(&SiteRequest::default()),
                Err(BanditError::InvalidUrl(_))
            ));
        }
    }
}
