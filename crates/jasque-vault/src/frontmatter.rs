use std::sync::LazyLock;

use regex::Regex;

static WIKILINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]|]+)(?:\|[^\]]+)?\]\]").unwrap());
static TASK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)-\s*\[([ xX])\][ \t]*(.+)$").unwrap());
static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([a-zA-Z][a-zA-Z0-9_/-]*)").unwrap());

/// Split a note into its raw YAML frontmatter (without fences) and body.
/// Returns `(None, content)` when there is no frontmatter block.
pub fn split(content: &str) -> (Option<&str>, &str) {
    let rest = match content.strip_prefix("---") {
        Some(rest) => rest,
        None => return (None, content),
    };
    let rest = match rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) {
        Some(rest) => rest,
        None => return (None, content),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, content)
}

/// Parse frontmatter metadata strictly. `Err` carries the YAML message.
pub fn parse(content: &str) -> Result<(serde_json::Value, &str), String> {
    let (yaml, body) = split(content);
    let metadata = match yaml {
        Some(yaml) => {
            let value: serde_yaml::Value =
                serde_yaml::from_str(yaml).map_err(|e| e.to_string())?;
            serde_json::to_value(&value).map_err(|e| e.to_string())?
        }
        None => serde_json::Value::Object(Default::default()),
    };
    if metadata.is_null() {
        return Ok((serde_json::Value::Object(Default::default()), body));
    }
    Ok((metadata, body))
}

/// Parse frontmatter metadata, tolerating malformed YAML (empty metadata,
/// whole content treated as body).
pub fn parse_lenient(content: &str) -> (serde_json::Value, &str) {
    parse(content).unwrap_or_else(|_| (serde_json::Value::Object(Default::default()), content))
}

/// Note title: frontmatter `title` if present, otherwise the filename stem.
pub fn title(content: &str, fallback_stem: &str) -> String {
    let (metadata, _) = parse_lenient(content);
    match metadata.get("title") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => fallback_stem.to_string(),
    }
}

/// All tags in a note: frontmatter `tags` (list or scalar) plus inline
/// `#tag` occurrences. Sorted, deduplicated.
pub fn tags(content: &str) -> Vec<String> {
    let mut tags = std::collections::BTreeSet::new();

    let (metadata, _) = parse_lenient(content);
    match metadata.get("tags") {
        Some(serde_json::Value::Array(items)) => {
            for item in items {
                match item {
                    serde_json::Value::String(s) => {
                        tags.insert(s.clone());
                    }
                    other if !other.is_null() => {
                        tags.insert(other.to_string());
                    }
                    _ => {}
                }
            }
        }
        Some(serde_json::Value::String(s)) => {
            tags.insert(s.clone());
        }
        _ => {}
    }

    for capture in TAG_PATTERN.captures_iter(content) {
        tags.insert(capture[1].to_string());
    }

    tags.into_iter().collect()
}

/// Replace the body while keeping the raw frontmatter block byte-for-byte.
pub fn replace_body(content: &str, new_body: &str) -> String {
    match split(content) {
        (Some(yaml), _) => format!("---\n{yaml}---\n{new_body}"),
        (None, _) => new_body.to_string(),
    }
}

/// Wikilink targets (`[[Target]]` or `[[Target|alias]]`) in order.
pub fn wikilink_targets(content: &str) -> Vec<&str> {
    WIKILINK_PATTERN
        .captures_iter(content)
        .map(|c| c.get(1).map(|m| m.as_str()).unwrap_or_default())
        .collect()
}

/// One task checkbox match, with enough position info to rewrite it.
#[derive(Clone, Debug)]
pub struct TaskMatch {
    pub start: usize,
    pub end: usize,
    pub indent: String,
    pub text: String,
    pub completed: bool,
    pub line_number: usize,
}

/// All task checkboxes in a note, in document order.
pub fn tasks(content: &str) -> Vec<TaskMatch> {
    TASK_PATTERN
        .captures_iter(content)
        .map(|capture| {
            let whole = capture.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            let line_number = content[..whole.0].matches('\n').count() + 1;
            TaskMatch {
                start: whole.0,
                end: whole.1,
                indent: capture[1].to_string(),
                text: capture[3].trim().to_string(),
                completed: capture[2].eq_ignore_ascii_case("x"),
                line_number,
            }
        })
        .collect()
}
