use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::error::ApiError;
use super::AppState;
use crate::pipeline::{ResearchRequest, ResearchResponse};
use crate::storage::ConversationTurn;

#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    pub id: String,
    pub conversation: Vec<ConversationTurn>,
}

/// GET /api/research
pub async fn health() -> Json<Value> {
    Json(json!({ "message": "Research API is working" }))
}

/// POST /api/research
pub async fn create_report(
    State(state): State<AppState>,
    payload: Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Json<ResearchResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    match tokio::time::timeout(state.request_timeout, state.pipeline.run(request)).await {
        Ok(result) => Ok(Json(result?)),
        Err(_) => {
            warn!("请求超过执行上限 ({}s)，放弃生成", state.request_timeout.as_secs());
            Err(ApiError::DeadlineExceeded)
        }
    }
}

/// PUT /api/research：只更新对话内容
pub async fn update_conversation(
    State(state): State<AppState>,
    payload: Result<Json<UpdateConversationRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let matched = state
        .pipeline
        .update_conversation(&request.id, &request.conversation)
        .await?;
    info!(
        "对话已更新: {} ({} 轮, 命中: {})",
        request.id,
        request.conversation.len(),
        matched
    );

    Ok(Json(json!({ "success": true })))
}
