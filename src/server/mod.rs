//! 研究报告 HTTP 接口
//!
//! 单一路径 `/api/research`：GET 健康检查，POST 生成报告，PUT 更新对话。

pub mod error;
pub mod research;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::pipeline::ResearchPipeline;

/// 所有请求共享的只读状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ResearchPipeline>,
    /// 单次请求的执行上限
    pub request_timeout: Duration,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/research",
            get(research::health)
                .post(research::create_report)
                .put(research::update_conversation),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动服务，Ctrl+C 时优雅退出
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听地址失败: {}", addr))?;

    info!("研究服务已启动: http://{}/api/research", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("收到停止信号");
        })
        .await
        .context("HTTP 服务异常退出")?;

    Ok(())
}
