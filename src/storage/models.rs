use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 一轮对话，只追加不修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// research_threads 表的原始行，JSON 列以文本形式读取
#[derive(Debug, Clone, FromRow)]
pub struct ThreadRow {
    pub id: String,
    pub email: String,
    pub prompt: String,
    pub response: String,
    pub references_json: String,
    pub timestamp: String,
    pub thread_id: Option<String>,
    pub conversation: String,
}

/// 一个研究会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchThread {
    pub id: String,
    pub email: String,
    pub prompt: String,
    pub response: String,
    pub references: Vec<String>,
    pub timestamp: String,
    pub thread_id: Option<String>,
    pub conversation: Vec<ConversationTurn>,
}

impl TryFrom<ThreadRow> for ResearchThread {
    type Error = anyhow::Error;

    fn try_from(row: ThreadRow) -> Result<Self> {
        let references = serde_json::from_str(&row.references_json)
            .with_context(|| format!("解析引用列失败: {}", row.id))?;
        let conversation = serde_json::from_str(&row.conversation)
            .with_context(|| format!("解析对话列失败: {}", row.id))?;
        Ok(Self {
            id: row.id,
            email: row.email,
            prompt: row.prompt,
            response: row.response,
            references,
            timestamp: row.timestamp,
            thread_id: row.thread_id,
            conversation,
        })
    }
}

/// 一次报告生成后需要写入的内容
#[derive(Debug, Clone)]
pub struct NewReport<'a> {
    pub thread_id: Option<&'a str>,
    pub email: &'a str,
    pub prompt: &'a str,
    pub response: &'a str,
    pub references: &'a [String],
    pub user_turn: ConversationTurn,
    pub assistant_turn: ConversationTurn,
}
