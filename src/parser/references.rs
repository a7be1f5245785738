use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::ParsedReport;

/// 独占一行的 "References" 标题，允许 markdown 标题符号、加粗和冒号
fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^[ \t]*(?:#{1,6}[ \t]*)?(?:\*\*)?References(?:\*\*)?:?(?:\*\*)?[ \t]*\r?$")
            .expect("references heading regex")
    })
}

/// `<p id="refN">...</p>`，非贪婪，可跨行
fn html_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<p\s+id=["']ref\d+["']\s*>.*?</p>"#).expect("html reference regex")
    })
}

/// `[N]: ...` 开头的行，连同其后不以 `[` 开头的续行
fn markdown_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\[\d+\]:.*(?:\n[^\[\n].*)*").expect("markdown reference regex")
    })
}

fn ref_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"id=["']ref(\d+)["']"#).expect("reference id regex"))
}

/// 将模型输出拆分为正文和参考文献列表
///
/// 按置信度递减依次尝试，命中即返回：
/// 1. 标题 + HTML 引用
/// 2. 标题 + markdown 引用
/// 3. 无标题时全文查找 HTML 引用，在第一个匹配处切分
/// 4. 无标题时全文查找 markdown 引用，在第一个匹配处切分
/// 5. 都不匹配：全文作为正文，引用为空
pub fn extract_references_and_content(text: &str) -> ParsedReport {
    if let Some(heading) = heading_re().find(text) {
        let head = &text[..heading.start()];
        let tail = &text[heading.end()..];

        let html = collect_matches(html_ref_re(), tail);
        if !html.is_empty() {
            debug!("按标题切分，找到 {} 条 HTML 引用", html.len());
            check_reference_ids(&html);
            return ParsedReport::new(head, html);
        }

        let markdown = collect_matches(markdown_ref_re(), tail);
        if !markdown.is_empty() {
            debug!("按标题切分，找到 {} 条 markdown 引用", markdown.len());
            return ParsedReport::new(head, markdown);
        }

        warn!("找到 References 标题但没有可识别的引用条目");
    } else if let Some(parsed) = split_at_first(html_ref_re(), text) {
        debug!("无标题，全文找到 {} 条 HTML 引用", parsed.references.len());
        check_reference_ids(&parsed.references);
        return parsed;
    } else if let Some(parsed) = split_at_first(markdown_ref_re(), text) {
        debug!("无标题，全文找到 {} 条 markdown 引用", parsed.references.len());
        return parsed;
    }

    ParsedReport {
        content: text.to_string(),
        references: Vec::new(),
    }
}

fn collect_matches(re: &Regex, text: &str) -> Vec<String> {
    re.find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

fn split_at_first(re: &Regex, text: &str) -> Option<ParsedReport> {
    let first = re.find(text)?;
    let references = collect_matches(re, &text[first.start()..]);
    Some(ParsedReport::new(&text[..first.start()], references))
}

/// 引用编号不连续或重复时只记录警告，不拒绝输出
fn check_reference_ids(references: &[String]) {
    let ids: Vec<u32> = references
        .iter()
        .filter_map(|r| ref_id_re().captures(r))
        .filter_map(|c| c[1].parse().ok())
        .collect();

    let sequential = ids.iter().enumerate().all(|(i, id)| *id as usize == i + 1);
    if !sequential {
        warn!("引用编号不连续或重复: {:?}", ids);
    }
}
