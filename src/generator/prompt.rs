use crate::search::SearchResult;
use crate::storage::models::{ConversationTurn, Role};

/// 发送给模型的系统指令与用户提示
#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
}

/// 组装提示词所需的全部输入
pub struct PromptInput<'a> {
    pub query: &'a str,
    /// 最后一条用户消息之前的对话
    pub history: &'a [ConversationTurn],
    pub search_results: &'a [SearchResult],
    pub word_limit: Option<u32>,
}

const SYSTEM_PROMPT: &str = "You are an expert research assistant for students and educators. \
You write accurate, well-organized, evidence-based answers and reports. \
You only cite sources that actually exist, and you never invent URLs.";

const REFERENCES_INSTRUCTION: &str = r#"Finish with a section headed "References" on its own line. List every source you cited as sequentially numbered HTML paragraphs, starting at 1, exactly in this shape:
<p id="ref1">[1] "<a href="URL">TITLE</a>," DESCRIPTION</p>
<p id="ref2">[2] "<a href="URL">TITLE</a>," DESCRIPTION</p>
Use the same numbers for the in-text citations."#;

pub fn is_direct_question(query: &str) -> bool {
    query.trim_end().ends_with('?')
}

pub fn compose(input: &PromptInput<'_>, history_turns: usize) -> ComposedPrompt {
    let query = input.query.trim();
    let mut user = String::new();

    let start = input.history.len().saturating_sub(history_turns);
    let history = &input.history[start..];
    if !history.is_empty() {
        user.push_str("Conversation so far:\n");
        for turn in history {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            user.push_str(&format!("{}: {}\n", speaker, turn.content.trim()));
        }
        user.push('\n');
    }

    user.push_str(&format!("Research query: {}\n\n", query));

    if is_direct_question(query) {
        user.push_str(
            "This is a direct question. Answer it directly and thoroughly instead of producing a formal research report.\n\n",
        );
    } else {
        user.push_str(
            "Write a comprehensive, well-structured research report on this topic with clear headings.\n\n",
        );
    }

    if input.search_results.is_empty() {
        user.push_str(
            "No web search results are available. Rely on your general knowledge, and still cite real, trustworthy sources such as peer-reviewed papers, official publications and reputable organizations.\n\n",
        );
    } else {
        user.push_str(
            "Use the following web search results as your primary sources. Prioritize them over general knowledge and cite them where relevant:\n\n",
        );
        for (i, result) in input.search_results.iter().enumerate() {
            user.push_str(&format!(
                "[{}] {}\nURL: {}\nSnippet: {}\nSummary: {}\n\n",
                i + 1,
                result.title,
                result.url,
                result.snippet,
                result.summary
            ));
        }
    }

    if let Some(limit) = input.word_limit.filter(|l| *l > 0) {
        user.push_str(&format!(
            "Keep the response to approximately {} words, not counting the references.\n\n",
            limit
        ));
    }

    user.push_str(REFERENCES_INSTRUCTION);

    ComposedPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}
