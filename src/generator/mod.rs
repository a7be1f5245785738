pub mod anthropic;
pub mod prompt;

pub use anthropic::AnthropicGenerator;
pub use prompt::{compose, ComposedPrompt, PromptInput};

use anyhow::Result;
use async_trait::async_trait;

/// 报告生成提供方：一次调用，返回模型输出的全部文本
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, prompt: &ComposedPrompt) -> Result<String>;
}
