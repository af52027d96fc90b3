//! Code-block extractor.
//!
//! Some backends answer in prose with fenced code instead of tool calls.
//! The extractor harvests those regions and writes each one through the
//! `createFile` tool, so the store only ever changes through the registry.

use std::collections::HashSet;
use std::sync::LazyLock;

use codeloop_core::tool::ToolRegistry;
use regex_lite::Regex;
use serde::Serialize;
use tracing::debug;

/// Name of the tool the extractor writes through.
pub const CREATE_FILE_TOOL: &str = "createFile";

/// A fenced region: an info line with an optional language, then the body.
static FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```([A-Za-z0-9_+#.-]*)[^\n]*\n(.*?)```").ok());

/// Request keywords that name the file, checked in order.
const INTENT_KEYWORDS: &[(&str, &str)] = &[
    ("calculator", "calculator"),
    ("todo", "todo"),
    ("to-do", "todo"),
    ("task", "todo"),
    ("weather", "weather"),
    ("portfolio", "portfolio"),
    ("landing", "landing"),
    ("game", "game"),
    ("timer", "timer"),
    ("counter", "counter"),
    ("quiz", "quiz"),
];

/// One harvested region and what happened when it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFile {
    pub file_name: String,
    pub language: Option<String>,
    /// The `createFile` input, `{fileName, content}`
    pub input: serde_json::Value,
    pub success: bool,
    /// The `createFile` result text
    pub outcome: String,
    pub duration_ms: u64,
}

/// A fenced region found in a response, before naming.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CodeRegion {
    language: Option<String>,
    body: String,
}

fn scan(response: &str) -> Vec<CodeRegion> {
    let Some(fence) = FENCE.as_ref() else {
        return Vec::new();
    };
    fence
        .captures_iter(response)
        .filter_map(|caps| {
            let body = caps.get(2)?.as_str().trim();
            if body.is_empty() {
                return None;
            }
            let language = caps
                .get(1)
                .map(|m| m.as_str().to_ascii_lowercase())
                .filter(|l| !l.is_empty());
            Some(CodeRegion {
                language,
                body: body.to_string(),
            })
        })
        .collect()
}

/// File extension for a language tag.
fn extension(language: &str) -> &str {
    match language {
        "html" | "htm" => "html",
        "css" => "css",
        "js" | "javascript" => "js",
        "jsx" => "jsx",
        "ts" | "typescript" => "ts",
        "tsx" => "tsx",
        "json" => "json",
        "py" | "python" => "py",
        "md" | "markdown" => "md",
        "sh" | "bash" | "shell" => "sh",
        other => other,
    }
}

fn generic_name(language: &str) -> Option<&'static str> {
    match language {
        "html" | "htm" => Some("index.html"),
        "css" => Some("styles.css"),
        "js" | "javascript" => Some("script.js"),
        "json" => Some("data.json"),
        "py" | "python" => Some("app.py"),
        "ts" | "typescript" => Some("app.ts"),
        _ => None,
    }
}

fn intent_stem(request: &str) -> Option<&'static str> {
    let request = request.to_lowercase();
    INTENT_KEYWORDS
        .iter()
        .find(|(keyword, _)| request.contains(keyword))
        .map(|(_, stem)| *stem)
}

/// Pick a name for the `ordinal`-th (1-based) non-empty region.
///
/// Preference: intent keyword, then the language's generic name, then
/// `file{ordinal}.{ext}`. Names already used in this call are skipped so
/// two regions never overwrite each other.
fn file_name(
    language: Option<&str>,
    stem: Option<&str>,
    ordinal: usize,
    used: &HashSet<String>,
) -> String {
    let ext = language.map(extension).unwrap_or("txt");

    let mut candidates = Vec::with_capacity(3);
    if let (Some(stem), Some(_)) = (stem, language) {
        candidates.push(format!("{stem}.{ext}"));
    }
    if let Some(generic) = language.and_then(generic_name) {
        candidates.push(generic.to_string());
    }

    candidates
        .into_iter()
        .find(|name| !used.contains(name))
        .unwrap_or_else(|| format!("file{ordinal}.{ext}"))
}

/// Harvest fenced code regions from `response` and write them as files.
///
/// `request` is the user's message; intent keywords in it name the files.
/// Outcomes are returned in extraction order. No regions means an empty
/// result and no writes.
pub async fn extract(registry: &ToolRegistry, response: &str, request: &str) -> Vec<ExtractedFile> {
    let regions = scan(response);
    if regions.is_empty() {
        return Vec::new();
    }

    let stem = intent_stem(request);
    let mut used = HashSet::new();
    let mut files = Vec::with_capacity(regions.len());

    for (index, region) in regions.into_iter().enumerate() {
        let name = file_name(region.language.as_deref(), stem, index + 1, &used);
        used.insert(name.clone());

        let input = serde_json::json!({ "fileName": name, "content": region.body });
        let outcome = registry.invoke(CREATE_FILE_TOOL, input.clone()).await;
        debug!(file = %name, success = outcome.success, "Extracted code block");

        files.push(ExtractedFile {
            file_name: name,
            language: region.language,
            input,
            success: outcome.success,
            outcome: outcome.output,
            duration_ms: outcome.duration_ms,
        });
    }

    files
}
