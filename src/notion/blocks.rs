//! Block fetching and markdown rendering.
//!
//! Page content arrives as a tree of blocks. The tree is fetched recursively
//! (children are a separate paginated endpoint), rendered to markdown, and
//! the course-content section is cut out along its `##` heading.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use serde_json::Value;

use crate::error::AppError;
use crate::notion::client::NotionClient;
use crate::notion::text::normalize;

/// H2 titles (normalized) that mark the video-script section of a page.
const VIDEO_SECTION_KEYS: &[&str] = &[
    "video szoveg",
    "video: szoveg",
    "video - szoveg",
    "video tartalom",
];

/// H2 titles (normalized) that mark the written-lesson section of a page.
const LESSON_SECTION_KEYS: &[&str] = &[
    "lecke szoveg",
    "lecke: szoveg",
    "lecke - szoveg",
    "lecke tartalom",
    "lesson text",
];

/// One block with its resolved children.
#[derive(Debug, Clone)]
pub struct Block {
    pub value: Value,
    pub children: Vec<Block>,
}

impl Block {
    fn block_type(&self) -> &str {
        self.value.get("type").and_then(Value::as_str).unwrap_or("")
    }

    /// The type-keyed payload object (`value[value.type]`).
    fn payload(&self) -> &Value {
        static NULL: Value = Value::Null;
        self.value.get(self.block_type()).unwrap_or(&NULL)
    }
}

#[derive(Debug, Deserialize)]
struct WireChildrenResponse {
    results: Vec<Value>,
    has_more: bool,
    next_cursor: Option<String>,
}

/// Fetches the direct children of a block, following pagination.
async fn fetch_children(client: &NotionClient, block_id: &str) -> Result<Vec<Value>, AppError> {
    let mut results = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let path = match &cursor {
            Some(cursor) => format!(
                "/v1/blocks/{}/children?page_size=100&start_cursor={}",
                block_id, cursor
            ),
            None => format!("/v1/blocks/{}/children?page_size=100", block_id),
        };

        let response = client.get(&path).await?;
        let wire: WireChildrenResponse = serde_json::from_value(response)
            .map_err(|e| AppError::Internal(format!("Failed to parse block children: {}", e)))?;

        results.extend(wire.results);
        if wire.has_more {
            cursor = wire.next_cursor;
            if cursor.is_none() {
                break;
            }
        } else {
            break;
        }
    }

    Ok(results)
}

/// Fetches the full block tree under a page or block.
pub fn fetch_blocks_recursive<'a>(
    client: &'a NotionClient,
    block_id: String,
) -> Pin<Box<dyn Future<Output = Result<Vec<Block>, AppError>> + Send + 'a>> {
    Box::pin(async move {
        let raw = fetch_children(client, &block_id).await?;

        let mut blocks = Vec::with_capacity(raw.len());
        for value in raw {
            let has_children = value
                .get("has_children")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let child_id = value.get("id").and_then(Value::as_str).map(str::to_string);

            let children = match (has_children, child_id) {
                (true, Some(id)) => fetch_blocks_recursive(client, id).await?,
                _ => Vec::new(),
            };

            blocks.push(Block { value, children });
        }

        Ok(blocks)
    })
}

/// Renders a rich-text array to inline markdown with annotations applied.
pub fn rich_text_to_md(rich_text: &[Value]) -> String {
    let mut out = String::new();
    for t in rich_text {
        let mut text = t
            .get("plain_text")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let annotations = t.get("annotations").cloned().unwrap_or(Value::Null);
        let flag = |key: &str| annotations.get(key).and_then(Value::as_bool).unwrap_or(false);

        if flag("code") {
            text = format!("`{}`", text);
        }
        if flag("bold") {
            text = format!("**{}**", text);
        }
        if flag("italic") {
            text = format!("*{}*", text);
        }
        if flag("strikethrough") {
            text = format!("~~{}~~", text);
        }
        if flag("underline") {
            text = format!("<u>{}</u>", text);
        }
        out.push_str(&text);
    }
    out
}

fn payload_rich_text(payload: &Value) -> String {
    payload
        .get("rich_text")
        .and_then(Value::as_array)
        .map(|rt| rich_text_to_md(rt))
        .unwrap_or_default()
}

fn walk(block: &Block, indent: usize, lines: &mut Vec<String>) {
    let t = block.block_type();
    let payload = block.payload();
    let prefix = " ".repeat(indent);

    match t {
        "paragraph" | "quote" | "callout" | "to_do" | "toggle" | "bulleted_list_item"
        | "numbered_list_item" => {
            let content = payload_rich_text(payload);
            match t {
                "paragraph" => {
                    if content.trim().is_empty() {
                        lines.push(String::new());
                    } else {
                        lines.push(format!("{}{}", prefix, content));
                    }
                }
                "quote" => lines.push(format!("{}> {}", prefix, content)),
                "callout" => {
                    let emoji = payload
                        .get("icon")
                        .and_then(|i| i.get("emoji"))
                        .and_then(Value::as_str)
                        .unwrap_or("💡");
                    lines.push(format!("{}> {} {}", prefix, emoji, content));
                }
                "to_do" => {
                    let checked = payload
                        .get("checked")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    let mark = if checked { "[x]" } else { "[ ]" };
                    lines.push(format!("{}- {} {}", prefix, mark, content));
                }
                "bulleted_list_item" | "toggle" => {
                    lines.push(format!("{}- {}", prefix, content))
                }
                "numbered_list_item" => lines.push(format!("{}1. {}", prefix, content)),
                _ => unreachable!(),
            }
            for child in &block.children {
                walk(child, indent + 2, lines);
            }
        }
        "heading_1" | "heading_2" | "heading_3" => {
            let level = match t {
                "heading_1" => "#",
                "heading_2" => "##",
                _ => "###",
            };
            lines.push(format!("{} {}", level, payload_rich_text(payload)));
        }
        "divider" => lines.push("\n---\n".to_string()),
        "equation" => {
            if let Some(expr) = payload.get("expression").and_then(Value::as_str) {
                if !expr.is_empty() {
                    lines.push(format!("$$ {} $$", expr));
                }
            }
        }
        "image" | "video" | "file" | "pdf" => {
            let caption = payload
                .get("caption")
                .and_then(Value::as_array)
                .map(|c| rich_text_to_md(c))
                .unwrap_or_default();
            lines.push(
                format!("*[{}]* {}", t.to_uppercase(), caption)
                    .trim_end()
                    .to_string(),
            );
        }
        other => lines.push(format!("*[{}]*", other.to_uppercase())),
    }
}

/// Renders a block tree to markdown: walks every block, collapses blank-line
/// runs, and renumbers ordered lists.
pub fn blocks_to_md(blocks: &[Block]) -> String {
    let mut lines = Vec::new();
    for block in blocks {
        walk(block, 0, &mut lines);
    }

    let md = lines.join("\n");
    let md = collapse_blank_lines(&md);
    fix_numbered_lists(&md)
}

/// Collapses runs of three or more newlines into exactly two.
fn collapse_blank_lines(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    let mut newline_run = 0;
    for c in md.chars() {
        if c == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push(c);
            }
        } else {
            newline_run = 0;
            out.push(c);
        }
    }
    out
}

/// Returns the leading-space count when the line is a numbered list item
/// (`<spaces><digits>. <rest>`), otherwise `None`.
fn numbered_item_indent(line: &str) -> Option<usize> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    let rest = &line[indent..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let after = &rest[digits.len()..];
    if after.starts_with(". ") {
        Some(indent)
    } else {
        None
    }
}

/// Renumbers `1.`-style items so each indentation level counts up from 1,
/// resetting nested counters when the list dedents. Code fences are left
/// untouched.
pub fn fix_numbered_lists(md: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_code = false;
    let mut counters: std::collections::BTreeMap<usize, usize> = std::collections::BTreeMap::new();

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            out.push(line.to_string());
            continue;
        }
        if in_code {
            out.push(line.to_string());
            continue;
        }

        let Some(indent) = numbered_item_indent(line) else {
            out.push(line.to_string());
            continue;
        };

        counters.retain(|&k, _| k <= indent);
        let counter = counters.entry(indent).or_insert(0);
        *counter += 1;
        let new_idx = *counter;

        let after_digits = line[indent..].trim_start_matches(|c: char| c.is_ascii_digit());
        let rest = after_digits.strip_prefix(". ").unwrap_or(after_digits);
        out.push(format!("{}{}. {}", " ".repeat(indent), new_idx, rest));
    }

    out.join("\n")
}

/// Byte offsets and titles of every `## ` heading.
fn find_h2_positions(md: &str) -> Vec<(usize, String)> {
    let mut positions = Vec::new();
    let mut offset = 0;
    for line in md.split('\n') {
        if let Some(title) = line.strip_prefix("## ") {
            positions.push((offset, title.trim().to_string()));
        }
        offset += line.len() + 1;
    }
    positions
}

/// Cuts out the section starting at the first H2 whose normalized title
/// matches one of `target_keys`, running to the end of the document.
fn extract_section_by_h2(md: &str, target_keys: &[&str]) -> String {
    let h2s = find_h2_positions(md);
    let target = h2s
        .iter()
        .find(|(_, title)| target_keys.contains(&normalize(title).as_str()));
    match target {
        Some((pos, _)) => md[*pos..].trim().to_string(),
        None => String::new(),
    }
}

/// Extracts the exportable content of a page: the video-script section if
/// present, otherwise the lesson section, otherwise empty.
pub fn select_video_or_lesson(md: &str) -> String {
    let section = extract_section_by_h2(md, VIDEO_SECTION_KEYS);
    if !section.trim().is_empty() {
        return fix_numbered_lists(&section);
    }
    let section = extract_section_by_h2(md, LESSON_SECTION_KEYS);
    if !section.trim().is_empty() {
        return fix_numbered_lists(&section);
    }
    String::new()
}
