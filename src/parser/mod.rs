pub mod references;

pub use references::extract_references_and_content;

use serde::{Deserialize, Serialize};

/// 拆分后的报告：正文与按出现顺序排列的参考文献条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReport {
    pub content: String,
    pub references: Vec<String>,
}

impl ParsedReport {
    pub fn new(content: &str, references: Vec<String>) -> Self {
        Self {
            content: content.trim().to_string(),
            references,
        }
    }
}
