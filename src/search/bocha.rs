use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use super::{SearchError, SearchOutcome, SearchResult, WebSearch};
use crate::config::SearchConfig;
use crate::utils::retry::{retry_with_backoff, RetryPolicy};

/// Web Search API 请求体
#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    freshness: &'a str,
    summary: bool,
    count: u32,
}

/// Web Search API 响应体，只取用到的字段
#[derive(Deserialize)]
struct SearchResponse {
    data: Option<SearchData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    web_pages: Option<WebPages>,
}

#[derive(Deserialize)]
struct WebPages {
    value: Option<Vec<WebPage>>,
}

#[derive(Deserialize)]
struct WebPage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    summary: Option<String>,
}

pub struct BochaSearch {
    client: Client,
    config: SearchConfig,
}

impl BochaSearch {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("创建搜索 HTTP 客户端失败")?;
        Ok(Self { client, config })
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.max_attempts,
            Duration::from_millis(self.config.retry_base_ms),
        )
    }

    async fn do_request(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let body = SearchRequest {
            query,
            freshness: &self.config.freshness,
            summary: true,
            count: self.config.count,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::ServerError {
                status: status.as_u16(),
                body: text,
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let text = response.text().await?;
        parse_search_response(&text)
    }
}

#[async_trait]
impl WebSearch for BochaSearch {
    async fn search(&self, query: &str) -> SearchOutcome {
        let query = if query.trim().is_empty() {
            warn!("搜索查询为空，使用兜底查询: {}", self.config.fallback_query);
            self.config.fallback_query.as_str()
        } else {
            query.trim()
        };

        info!("正在搜索: {}", query);

        let result = retry_with_backoff(
            self.retry_policy(),
            |_| self.do_request(query),
            SearchError::is_retryable,
        )
        .await;

        match result {
            Ok(results) => {
                info!("搜索到 {} 条结果", results.len());
                SearchOutcome::ok(results)
            }
            Err(e) => {
                warn!("搜索在 {} 次尝试内失败: {}", self.config.max_attempts, e);
                SearchOutcome::failed(format!("Web search failed: {}", e))
            }
        }
    }
}

fn parse_search_response(text: &str) -> Result<Vec<SearchResult>, SearchError> {
    let response: SearchResponse =
        serde_json::from_str(text).map_err(|e| SearchError::Malformed(e.to_string()))?;

    let pages = response
        .data
        .and_then(|d| d.web_pages)
        .and_then(|p| p.value)
        .ok_or_else(|| SearchError::Malformed("missing data.webPages.value".to_string()))?;

    Ok(pages
        .into_iter()
        .map(|page| SearchResult {
            summary: page.summary.unwrap_or_else(|| page.snippet.clone()),
            title: page.name,
            url: page.url,
            snippet: page.snippet,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::utils::testing::spawn_server;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn client_for(addr: std::net::SocketAddr) -> BochaSearch {
        let mut config = AppConfig::default().search;
        config.api_url = format!("http://{}/v1/web-search", addr);
        config.api_key = "test-key".to_string();
        config.retry_base_ms = 20;
        BochaSearch::new(config).unwrap()
    }

    fn status_router(status: AxumStatus, hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/v1/web-search",
                post(move |State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (status, "upstream failure")
                }),
            )
            .with_state(hits)
    }

    #[tokio::test]
    async fn parses_results_and_sends_bearer_credential() {
        let seen: Arc<Mutex<Option<(String, Value)>>> = Arc::default();
        let router = Router::new()
            .route(
                "/v1/web-search",
                post(
                    |State(seen): State<Arc<Mutex<Option<(String, Value)>>>>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        *seen.lock().unwrap() = Some((auth, body));
                        Json(json!({
                            "code": 200,
                            "data": {"webPages": {"value": [
                                {"name": "Entanglement", "url": "https://example.org/e",
                                 "snippet": "short", "summary": "long summary"},
                                {"name": "Bell test", "url": "https://example.org/b",
                                 "snippet": "only snippet"}
                            ]}}
                        }))
                    },
                ),
            )
            .with_state(seen.clone());
        let addr = spawn_server(router).await;

        let outcome = client_for(addr).search("  quantum entanglement ").await;

        assert_eq!(outcome.error, None);
        assert_eq!(
            outcome.results,
            vec![
                SearchResult {
                    title: "Entanglement".to_string(),
                    url: "https://example.org/e".to_string(),
                    snippet: "short".to_string(),
                    summary: "long summary".to_string(),
                },
                SearchResult {
                    title: "Bell test".to_string(),
                    url: "https://example.org/b".to_string(),
                    snippet: "only snippet".to_string(),
                    summary: "only snippet".to_string(),
                },
            ]
        );

        let (auth, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(auth, "Bearer test-key");
        assert_eq!(body["query"], "quantum entanglement");
        assert_eq!(body["freshness"], "noLimit");
    }

    #[tokio::test]
    async fn blank_query_uses_fallback() {
        let seen: Arc<Mutex<String>> = Arc::default();
        let router = Router::new()
            .route(
                "/v1/web-search",
                post(
                    |State(seen): State<Arc<Mutex<String>>>, Json(body): Json<Value>| async move {
                        *seen.lock().unwrap() = body["query"].as_str().unwrap_or_default().to_string();
                        Json(json!({"data": {"webPages": {"value": []}}}))
                    },
                ),
            )
            .with_state(seen.clone());
        let addr = spawn_server(router).await;

        let outcome = client_for(addr).search("   ").await;

        assert!(outcome.error.is_none());
        assert!(outcome.results.is_empty());
        assert_eq!(*seen.lock().unwrap(), "latest research developments");
    }

    #[tokio::test]
    async fn server_error_is_retried_three_times_then_degrades() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = spawn_server(status_router(AxumStatus::INTERNAL_SERVER_ERROR, hits.clone())).await;

        let started = std::time::Instant::now();
        let outcome = client_for(addr).search("anything").await;

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(outcome.results.is_empty());
        assert!(outcome.error.unwrap().contains("500"));
        // 20ms + 40ms 的线性退避
        assert!(started.elapsed() >= std::time::Duration::from_millis(60));
    }

    #[tokio::test]
    async fn unavailable_status_is_retried_like_other_server_errors() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = spawn_server(status_router(AxumStatus::SERVICE_UNAVAILABLE, hits.clone())).await;

        let outcome = client_for(addr).search("anything").await;

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(outcome.results.is_empty());
        assert!(outcome.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = spawn_server(status_router(AxumStatus::UNAUTHORIZED, hits.clone())).await;

        let outcome = client_for(addr).search("anything").await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(outcome.results.is_empty());
        assert!(outcome.error.unwrap().contains("401"));
    }

    #[tokio::test]
    async fn unreachable_host_degrades_to_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = client_for(addr).search("anything").await;

        assert!(outcome.results.is_empty());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn missing_result_array_is_malformed() {
        let err = parse_search_response(r#"{"code":200,"data":{}}"#).unwrap_err();
        assert!(matches!(err, SearchError::Malformed(_)));
        assert!(!err.is_retryable());

        let err = parse_search_response("<html>").unwrap_err();
        assert!(matches!(err, SearchError::Malformed(_)));
    }
}
