//! HTTP-backed remote session.
//!
//! A session is a `reqwest` client that presents itself like the catalog's
//! own web front-end (browser user agent, landing-page referer) and has
//! visited the landing page once. Probing revisits the landing page; a fetch
//! is a single GET against the search endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use icongate_core::{RemoteSession, ResourceError, SearchQuery, SessionFactory, UpstreamError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use serde_json::Value;

use crate::config::ApiConfig;
use crate::constants::UPSTREAM_USER_AGENT;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Settings shared by every session the factory creates.
#[derive(Debug, Clone)]
pub struct HttpSessionConfig {
    /// Search API base, without trailing slash.
    pub base_url: String,
    /// Landing page used as referer, warm-up and probe target.
    pub referer: String,
    /// Per-request timeout.
    pub timeout: Duration,
    pub user_agent: String,
}

impl HttpSessionConfig {
    pub fn from_api_config(config: &ApiConfig) -> Self {
        Self {
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            referer: config.upstream_referer.clone(),
            timeout: config.upstream_timeout,
            user_agent: UPSTREAM_USER_AGENT.to_string(),
        }
    }

    /// URL of the search endpoint.
    pub fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Creates [`HttpSession`]s.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    config: HttpSessionConfig,
}

impl HttpSessionFactory {
    pub fn new(config: HttpSessionConfig) -> Self {
        Self { config }
    }

    fn build_client(&self) -> Result<reqwest::Client, ResourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let referer =
            HeaderValue::from_str(&self.config.referer).map_err(|e| ResourceError::CreationFailed {
                reason: format!("invalid referer header: {}", e),
            })?;
        headers.insert(REFERER, referer);

        reqwest::Client::builder()
            .user_agent(self.config.user_agent.clone())
            .default_headers(headers)
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| ResourceError::CreationFailed {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn create(&self) -> Result<Box<dyn RemoteSession>, ResourceError> {
        let client = self.build_client()?;

        let response = client
            .get(&self.config.referer)
            .send()
            .await
            .map_err(|e| ResourceError::CreationFailed {
                reason: format!("warm-up request failed: {}", e),
            })?;
        if !response.status().is_success() {
            return Err(ResourceError::CreationFailed {
                reason: format!("warm-up returned HTTP {}", response.status().as_u16()),
            });
        }

        Ok(Box::new(HttpSession {
            client,
            config: self.config.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn describe(&self) -> String {
        format!("http session against {}", self.config.base_url)
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// One warmed-up HTTP client.
#[derive(Debug)]
pub struct HttpSession {
    client: reqwest::Client,
    config: HttpSessionConfig,
    closed: AtomicBool,
}

impl HttpSession {
    fn map_send_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout {
                timeout_ms: self.config.timeout.as_millis() as u64,
            }
        } else if let Some(status) = err.status() {
            status_error(status)
        } else {
            UpstreamError::Transport {
                reason: err.to_string(),
            }
        }
    }
}

fn status_error(status: reqwest::StatusCode) -> UpstreamError {
    UpstreamError::Status {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}

#[async_trait]
impl RemoteSession for HttpSession {
    async fn probe(&self) -> Result<(), ResourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ResourceError::ProbeFailed {
                reason: "session closed".to_string(),
            });
        }

        let response = self
            .client
            .get(&self.config.referer)
            .send()
            .await
            .map_err(|e| ResourceError::ProbeFailed {
                reason: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ResourceError::ProbeFailed {
                reason: format!("landing page returned HTTP {}", response.status().as_u16()),
            })
        }
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Value, UpstreamError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(UpstreamError::Transport {
                reason: "session closed".to_string(),
            });
        }

        let limit = query.limit().to_string();
        let response = self
            .client
            .get(self.config.search_url())
            .query(&[("query", query.query()), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.map_send_error(e)
                } else {
                    UpstreamError::MalformedPayload {
                        reason: e.to_string(),
                    }
                }
            })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_api_config() {
        let mut api = ApiConfig::default();
        api.upstream_base_url = "http://127.0.0.1:9000/".to_string();
        let config = HttpSessionConfig::from_api_config(&api);
        assert_eq!(config.search_url(), "http://127.0.0.1:9000/search");
        assert_eq!(config.timeout, api.upstream_timeout);
        assert!(config.user_agent.contains("Chrome/143"));
    }

    #[test]
    fn test_status_error_reason() {
        let err = status_error(reqwest::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            err,
            UpstreamError::Status {
                status: 429,
                reason: "Too Many Requests".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_referer_fails_creation() {
        let factory = HttpSessionFactory::new(HttpSessionConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            referer: "bad\nreferer".to_string(),
            timeout: Duration::from_secs(1),
            user_agent: UPSTREAM_USER_AGENT.to_string(),
        });
        assert!(matches!(
            factory.build_client(),
            Err(ResourceError::CreationFailed { .. })
        ));
    }

    #[test]
    fn test_describe_names_base_url() {
        let factory = HttpSessionFactory::new(HttpSessionConfig::from_api_config(
            &ApiConfig::default(),
        ));
        assert!(factory.describe().contains("api.iconify.design"));
    }
}
