use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::utils::ResearchError;

/// 对外的错误信封：400/504 只有 error，500 附带 details
#[derive(Debug)]
pub enum ApiError {
    InvalidRequest(String),
    /// 搜索阶段超时
    Timeout,
    /// 整个请求超过执行上限
    DeadlineExceeded,
    Internal { error: String, details: String },
}

impl From<ResearchError> for ApiError {
    fn from(err: ResearchError) -> Self {
        match err {
            ResearchError::Validation(msg) => ApiError::InvalidRequest(msg),
            ResearchError::Timeout => ApiError::Timeout,
            ResearchError::Generation(e) => ApiError::Internal {
                error: "Failed to generate research report".to_string(),
                details: format!("{:#}", e),
            },
            ResearchError::Storage(e) => ApiError::Internal {
                error: "Failed to save research report".to_string(),
                details: format!("{:#}", e),
            },
            ResearchError::Config(msg) => ApiError::Internal {
                error: "Server configuration error".to_string(),
                details: msg,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "error": "Request timed out" })),
            )
                .into_response(),
            ApiError::DeadlineExceeded => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "error": "Request exceeded execution time limit" })),
            )
                .into_response(),
            ApiError::Internal { error, details } => {
                tracing::error!("请求失败: {} ({})", error, details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": error, "details": details })),
                )
                    .into_response()
            }
        }
    }
}
