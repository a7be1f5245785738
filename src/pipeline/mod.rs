use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::ResearchConfig;
use crate::generator::{compose, PromptInput, ReportGenerator};
use crate::parser::extract_references_and_content;
use crate::search::WebSearch;
use crate::storage::{ConversationTurn, Database, NewReport, Role};
use crate::utils::{ResearchError, ResearchResult};

/// POST /api/research 请求体
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResearchRequest {
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "wordLimit")]
    pub word_limit: Option<u32>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchResponse {
    pub success: bool,
    pub role: Role,
    pub content: String,
    pub references: Vec<String>,
    #[serde(rename = "noSearchResults", skip_serializing_if = "Option::is_none")]
    pub no_search_results: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub id: String,
}

/// 研究报告流水线：校验 → 搜索 → 组装提示 → 生成 → 拆分引用 → 存储
///
/// 每个阶段顺序等待，不在请求之间共享可变状态。
pub struct ResearchPipeline {
    search: Arc<dyn WebSearch>,
    generator: Arc<dyn ReportGenerator>,
    db: Database,
    settings: ResearchConfig,
    search_timeout: Duration,
}

impl ResearchPipeline {
    pub fn new(
        search: Arc<dyn WebSearch>,
        generator: Arc<dyn ReportGenerator>,
        db: Database,
        settings: ResearchConfig,
    ) -> Self {
        let search_timeout = Duration::from_secs(settings.search_timeout_secs);
        Self {
            search,
            generator,
            db,
            settings,
            search_timeout,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    pub async fn run(&self, request: ResearchRequest) -> ResearchResult<ResearchResponse> {
        let (query, history) = validate(&request.messages)?;
        let email = request
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(&self.settings.anonymous_email);

        info!("收到研究请求: {} (thread: {:?})", query, request.thread_id);

        // 搜索阶段：只有这一段受取消计时器约束
        let outcome = match tokio::time::timeout(self.search_timeout, self.search.search(query)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("搜索阶段超时 ({}s)", self.search_timeout.as_secs());
                return Err(ResearchError::Timeout);
            }
        };
        if let Some(ref e) = outcome.error {
            warn!("搜索失败，不使用搜索上下文继续: {}", e);
        }

        let prompt = compose(
            &PromptInput {
                query,
                history,
                search_results: &outcome.results,
                word_limit: request.word_limit,
            },
            self.settings.history_turns,
        );

        let generated = self.generator.generate(&prompt).await.map_err(|e| {
            error!("报告生成失败: {:#}", e);
            ResearchError::Generation(e)
        })?;

        let parsed = extract_references_and_content(&generated);
        info!(
            "报告拆分完成: 正文 {} 字符, {} 条引用",
            parsed.content.chars().count(),
            parsed.references.len()
        );

        let id = self
            .db
            .save_report(&NewReport {
                thread_id: request.thread_id.as_deref(),
                email,
                prompt: query,
                response: &parsed.content,
                references: &parsed.references,
                user_turn: ConversationTurn::user(query),
                assistant_turn: ConversationTurn::assistant(parsed.content.clone()),
            })
            .await
            .map_err(|e| {
                error!("保存研究报告失败: {:#}", e);
                ResearchError::Storage(e)
            })?;

        info!("研究报告已保存，ID: {}", id);

        Ok(ResearchResponse {
            success: true,
            role: Role::Assistant,
            content: parsed.content,
            references: parsed.references,
            no_search_results: outcome.results.is_empty().then_some(true),
            thread_id: request.thread_id,
            id,
        })
    }

    /// 客户端编辑对话后只更新 conversation 列
    pub async fn update_conversation(
        &self,
        id: &str,
        conversation: &[ConversationTurn],
    ) -> ResearchResult<bool> {
        self.db
            .update_conversation(id, conversation)
            .await
            .map_err(ResearchError::Storage)
    }
}

/// 返回最后一条用户消息和之前的历史
fn validate(messages: &[ConversationTurn]) -> ResearchResult<(&str, &[ConversationTurn])> {
    let (last, history) = messages.split_last().ok_or_else(|| {
        ResearchError::Validation("Messages array is required and must not be empty".to_string())
    })?;

    let query = last.content.trim();
    if last.role != Role::User || query.is_empty() {
        return Err(ResearchError::Validation(
            "Last message must be a non-empty user message".to_string(),
        ));
    }

    Ok((query, history))
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::generator::{ComposedPrompt, ReportGenerator};
    use crate::search::{SearchOutcome, SearchResult, WebSearch};

    #[derive(Default)]
    pub struct FakeSearch {
        pub outcome: SearchOutcome,
        pub hang: bool,
        pub calls: AtomicUsize,
    }

    impl FakeSearch {
        pub fn with_results(titles: &[&str]) -> Self {
            let results = titles
                .iter()
                .enumerate()
                .map(|(i, t)| SearchResult {
                    title: t.to_string(),
                    url: format!("https://source{}.example", i + 1),
                    snippet: format!("{} snippet", t),
                    summary: format!("{} summary", t),
                })
                .collect();
            Self {
                outcome: SearchOutcome::ok(results),
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                outcome: SearchOutcome::failed("Web search failed: 500"),
                ..Default::default()
            }
        }

        pub fn hanging() -> Self {
            Self {
                hang: true,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WebSearch for FakeSearch {
        async fn search(&self, _query: &str) -> SearchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.outcome.clone()
        }
    }

    pub struct FakeGenerator {
        pub output: Option<String>,
        pub hang: bool,
        pub prompts: Mutex<Vec<ComposedPrompt>>,
    }

    impl FakeGenerator {
        pub fn returning(text: &str) -> Self {
            Self {
                output: Some(text.to_string()),
                hang: false,
                prompts: Mutex::default(),
            }
        }

        pub fn failing() -> Self {
            Self {
                output: None,
                hang: false,
                prompts: Mutex::default(),
            }
        }

        pub fn hanging() -> Self {
            Self {
                output: None,
                hang: true,
                prompts: Mutex::default(),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        pub fn last_prompt(&self) -> Option<ComposedPrompt> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl ReportGenerator for FakeGenerator {
        async fn generate(&self, prompt: &ComposedPrompt) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.clone());
            if self.hang {
                std::future::pending::<()>().await;
            }
            match self.output {
                Some(ref text) => Ok(text.clone()),
                None => anyhow::bail!("生成 API 响应中没有内容"),
            }
        }
    }
}
