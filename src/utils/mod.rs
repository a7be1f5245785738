pub mod logger;
pub mod retry;

use thiserror::Error;

/// 研究流水线的错误分类，决定对外的 HTTP 状态码
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("Request timed out")]
    Timeout,

    #[error("报告生成失败: {0:#}")]
    Generation(anyhow::Error),

    #[error("数据库错误: {0:#}")]
    Storage(anyhow::Error),
}

pub type ResearchResult<T> = Result<T, ResearchError>;

#[cfg(test)]
pub mod testing;
