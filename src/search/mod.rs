pub mod bocha;

pub use bocha::BochaSearch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 单条网页搜索结果，仅用于拼接提示词，不落库
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub summary: String,
}

/// 搜索结果与可选的错误描述
///
/// 搜索是尽力而为的增强：失败时返回空列表加错误信息，而不是 `Err`。
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn ok(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("搜索服务返回 {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("搜索服务返回错误 {status}: {body}")]
    Status { status: u16, body: String },

    #[error("搜索请求失败: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("搜索响应格式错误: {0}")]
    Malformed(String),
}

impl SearchError {
    /// 5xx 与网络层错误可重试，其余状态码和格式错误直接放弃
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::ServerError { .. } | SearchError::Transport(_))
    }
}

/// 网页搜索提供方
///
/// 取消由调用方丢弃 future 完成（例如外层 `tokio::time::timeout`）。
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> SearchOutcome;
}
