//! Tolerant parsing of agent replies
//!
//! Models are instructed to answer with raw JSON, and frequently don't.
//! Extraction tries three strategies in order: direct parse, fenced code
//! block, outermost brace slice. Failures carry diagnostics instead of
//! silently vanishing.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Result of a JSON extraction attempt
#[derive(Debug, Clone)]
pub enum JsonExtraction {
    Parsed(Value),
    Failed(ParseDiagnostics),
}

impl JsonExtraction {
    pub fn ok(self) -> Option<Value> {
        match self {
            JsonExtraction::Parsed(value) => Some(value),
            JsonExtraction::Failed(_) => None,
        }
    }
}

/// Why extraction failed, with excerpts for the log
#[derive(Debug, Clone)]
pub struct ParseDiagnostics {
    pub response_len: usize,
    pub head: String,
    pub tail: String,
    pub hint: String,
}

impl ParseDiagnostics {
    fn from_response(response: &str) -> Self {
        let hint = if response.contains("```") && response.to_lowercase().contains("json") {
            "Response contains markdown code blocks - JSON inside them is malformed".to_string()
        } else if !response.contains('{') {
            "Response contains no JSON objects - agent may have returned an error message".to_string()
        } else {
            "Response contains braces but JSON is malformed".to_string()
        };

        Self {
            response_len: response.len(),
            head: response.chars().take(300).collect(),
            tail: response.chars().rev().take(100).collect::<Vec<_>>().into_iter().rev().collect(),
            hint,
        }
    }
}

fn fenced_blocks(response: &str) -> Vec<String> {
    let fence = Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").expect("static regex");
    fence.captures_iter(response).map(|c| c[1].trim().to_string()).collect()
}

/// Extract a JSON object from a model reply
///
/// Strategies in order: direct parse, fenced code block, outermost
/// `{...}` slice.
pub fn extract_json(response: &str) -> JsonExtraction {
    // Strategy 1: direct parse
    if let Ok(value) = serde_json::from_str::<Value>(response.trim())
        && value.is_object()
    {
        return JsonExtraction::Parsed(value);
    }

    // Strategy 2: fenced code block
    for block in fenced_blocks(response) {
        if let Ok(value) = serde_json::from_str::<Value>(&block)
            && value.is_object()
        {
            return JsonExtraction::Parsed(value);
        }
    }

    // Strategy 3: outermost brace slice
    if let (Some(first), Some(last)) = (response.find('{'), response.rfind('}'))
        && last > first
        && let Ok(value) = serde_json::from_str::<Value>(&response[first..=last])
    {
        return JsonExtraction::Parsed(value);
    }

    debug!(response_len = response.len(), "extract_json: all strategies failed");
    JsonExtraction::Failed(ParseDiagnostics::from_response(response))
}

/// Extract a JSON array of strings from a model reply
///
/// Same strategies as `extract_json`, plus a dict with an `items` key.
pub fn extract_json_list(response: &str) -> Option<Vec<String>> {
    let to_strings = |value: &Value| -> Option<Vec<String>> {
        value
            .as_array()
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
    };

    // Strategy 1: direct parse
    if let Ok(value) = serde_json::from_str::<Value>(response.trim())
        && let Some(list) = to_strings(&value)
    {
        return Some(list);
    }

    // Strategy 2: fenced code block
    for block in fenced_blocks(response) {
        if let Ok(value) = serde_json::from_str::<Value>(&block)
            && let Some(list) = to_strings(&value)
        {
            return Some(list);
        }
    }

    // Strategy 3: outermost bracket slice
    if let (Some(first), Some(last)) = (response.find('['), response.rfind(']'))
        && last > first
        && let Ok(value) = serde_json::from_str::<Value>(&response[first..=last])
        && let Some(list) = to_strings(&value)
    {
        return Some(list);
    }

    // Strategy 4: object with an "items" key
    if let JsonExtraction::Parsed(value) = extract_json(response)
        && let Some(items) = value.get("items")
        && let Some(list) = to_strings(items)
    {
        return Some(list);
    }

    None
}

/// Parsed auditor verdict
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub compliance_score: f64,
    pub phase_scores: Value,
    pub implementation_exists: bool,
    pub markers_present: u64,
    pub markers_missing: u64,
    pub files_checked: Vec<String>,
    pub environment_issues: Vec<String>,
    pub implementation_issues: Vec<String>,
    /// Legacy alias for implementation_issues, echoed into audit reports
    pub violations: Vec<String>,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

impl AuditReport {
    /// Build a report from extracted audit JSON
    ///
    /// `implementation_issues` is authoritative; the legacy `violations`
    /// field is accepted as an alias when the former is absent.
    pub fn from_json(data: &Value) -> Self {
        let implementation_issues = string_list(data.get("implementation_issues"));
        let violations = string_list(data.get("violations"));

        let implementation_issues = if implementation_issues.is_empty() && !violations.is_empty() {
            violations.clone()
        } else {
            implementation_issues
        };

        Self {
            compliance_score: data.get("compliance_score").and_then(Value::as_f64).unwrap_or(0.0),
            phase_scores: data.get("phase_scores").cloned().unwrap_or(Value::Null),
            implementation_exists: data.get("implementation_exists").and_then(Value::as_bool).unwrap_or(false),
            markers_present: data.get("markers_present").and_then(Value::as_u64).unwrap_or(0),
            markers_missing: data.get("markers_missing").and_then(Value::as_u64).unwrap_or(0),
            files_checked: string_list(data.get("files_checked")),
            environment_issues: string_list(data.get("environment_issues")),
            implementation_issues,
            violations,
        }
    }
}

/// Parsed evaluator verdict
#[derive(Debug, Clone)]
pub struct EvaluatorVerdict {
    pub satisfied: bool,
    pub feedback: String,
}

/// Parse the evaluator reply
///
/// Tolerant of markdown-fenced JSON and of a nested "FINAL_VERDICT"
/// object; an unparseable reply is treated as not satisfied with the raw
/// text as feedback.
pub fn parse_evaluator(response: &str) -> EvaluatorVerdict {
    let Some(mut data) = extract_json(response).ok() else {
        return EvaluatorVerdict {
            satisfied: false,
            feedback: response.to_string(),
        };
    };

    if let Some(nested) = data.get("FINAL_VERDICT").cloned()
        && nested.is_object()
    {
        data = nested;
    }

    EvaluatorVerdict {
        satisfied: data.get("satisfied").and_then(Value::as_bool).unwrap_or(false),
        feedback: data
            .get("feedback")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
    }
}

/// Group implementation issues by the file paths they mention
///
/// Issues reference files as "... in src/main.py:15" or "... at
/// src/models.rs". Issues without an extractable path are dropped; the
/// caller falls back to the stub work list.
pub fn issues_by_file(implementation_issues: &[String]) -> BTreeMap<String, Vec<String>> {
    let path = Regex::new(r"(?:in|at)\s+([\w./-]+\.(?:py|rs|go|js|ts|java|c|cc|cpp|h|hpp))").expect("static regex");

    let mut files: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for issue in implementation_issues {
        if let Some(captures) = path.captures(issue) {
            files.entry(captures[1].to_string()).or_default().push(issue.clone());
        }
    }
    files
}
