use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::{ComposedPrompt, ReportGenerator};
use crate::config::GeneratorConfig;

/// Messages API 请求体
#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Messages API 响应体
#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl AnthropicGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .context("创建生成 HTTP 客户端失败")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ReportGenerator for AnthropicGenerator {
    async fn generate(&self, prompt: &ComposedPrompt) -> Result<String> {
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: &prompt.system,
            messages: vec![Message {
                role: "user",
                content: &prompt.user,
            }],
        };

        info!("调用生成模型: {}", self.config.model);

        let response = self
            .client
            .post(&self.config.api_url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&request)
            .send()
            .await
            .context("发送生成请求失败")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("生成 API 返回错误 {}: {}", status, body);
        }

        let messages: MessagesResponse = response.json().await.context("解析生成 API 响应失败")?;
        join_text_blocks(messages.content)
    }
}

/// 拼接所有文本片段；没有片段或拼接结果为空都视为失败
fn join_text_blocks(blocks: Vec<ContentBlock>) -> Result<String> {
    if blocks.is_empty() {
        anyhow::bail!("生成 API 响应中没有内容");
    }

    let text: String = blocks
        .into_iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text)
        .collect();

    if text.trim().is_empty() {
        anyhow::bail!("生成 API 返回了空文本");
    }

    info!("生成完成，共 {} 字符", text.chars().count());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::utils::testing::spawn_server;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn generator_for(addr: std::net::SocketAddr) -> AnthropicGenerator {
        let mut config = AppConfig::default().generator;
        config.api_url = format!("http://{}/v1/messages", addr);
        config.api_key = "llm-key".to_string();
        AnthropicGenerator::new(config).unwrap()
    }

    fn prompt() -> ComposedPrompt {
        ComposedPrompt {
            system: "system text".to_string(),
            user: "user text".to_string(),
        }
    }

    #[tokio::test]
    async fn concatenates_text_blocks() {
        let router = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("x-api-key").unwrap(), "llm-key");
                assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");
                assert_eq!(body["system"], "system text");
                assert_eq!(body["messages"][0]["role"], "user");
                assert_eq!(body["messages"][0]["content"], "user text");
                Json(json!({
                    "content": [
                        {"type": "text", "text": "Part one. "},
                        {"type": "tool_use", "id": "x", "name": "n", "input": {}},
                        {"type": "text", "text": "Part two."}
                    ]
                }))
            }),
        );
        let addr = spawn_server(router).await;

        let text = generator_for(addr).generate(&prompt()).await.unwrap();
        assert_eq!(text, "Part one. Part two.");
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { Json(json!({"content": []})) }),
        );
        let addr = spawn_server(router).await;

        let err = generator_for(addr).generate(&prompt()).await.unwrap_err();
        assert!(err.to_string().contains("没有内容"));
    }

    #[tokio::test]
    async fn blank_text_is_an_error() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { Json(json!({"content": [{"type": "text", "text": "  "}]})) }),
        );
        let addr = spawn_server(router).await;

        assert!(generator_for(addr).generate(&prompt()).await.is_err());
    }

    #[tokio::test]
    async fn provider_error_status_is_propagated() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let addr = spawn_server(router).await;

        let err = generator_for(addr).generate(&prompt()).await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
