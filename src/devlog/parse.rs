//! Turning raw generator text into validated entries.
//!
//! Coercion rule for the top-level value:
//! - an array is the entry list;
//! - an object with a `date` key is a single entry;
//! - an object with exactly one array-valued field (`{"entries": [...]}`)
//!   is unwrapped to that array;
//! - anything else is malformed.
//!
//! A list is accepted only when every element validates. One bad element
//! rejects the whole batch so the notes are retried instead of partly lost.

use crate::devlog::entries::{EntryStatus, LogEntry};
use crate::devlog::util::STAMP_FORMAT;
use crate::error::IngestError;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};

/// Remove a leading ```` ```lang ```` and a trailing ```` ``` ```` from one line.
fn strip_fence_tokens(line: &str) -> &str {
    let mut rest = line.trim();
    if let Some(after) = rest.strip_prefix("```") {
        rest = after.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }
    if let Some(before) = rest.strip_suffix("```") {
        rest = before;
    }
    rest.trim()
}

/// Drop markdown code fences and anything outside the outermost JSON value.
pub fn strip_fences(raw: &str) -> String {
    let mut body = String::with_capacity(raw.len());
    for line in raw.lines() {
        let kept = strip_fence_tokens(line);
        if kept.is_empty() {
            continue;
        }
        body.push_str(kept);
        body.push('\n');
    }
    let trimmed = body.trim();

    let start = trimmed.find(['[', '{']);
    let end = trimmed.rfind([']', '}']);
    match (start, end) {
        (Some(s), Some(e)) if s < e => trimmed[s..=e].to_string(),
        _ => trimmed.to_string(),
    }
}

fn decode(text: &str) -> Result<Value, IngestError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(strict_err) => json5::from_str::<Value>(text).map_err(|_| {
            IngestError::MalformedOutput(format!("response is not valid JSON: {strict_err}"))
        }),
    }
}

fn coerce_to_list(value: Value) -> Result<Vec<Value>, IngestError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) if map.contains_key("date") => Ok(vec![Value::Object(map)]),
        Value::Object(map) => {
            let mut arrays = map
                .into_iter()
                .filter_map(|(_, v)| match v {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .collect::<Vec<_>>();
            if arrays.len() == 1 {
                Ok(arrays.remove(0))
            } else {
                Err(IngestError::MalformedOutput(
                    "object response is neither an entry nor a single-list wrapper".to_string(),
                ))
            }
        }
        other => Err(IngestError::MalformedOutput(format!(
            "expected a list of entries, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
    idx: usize,
) -> Result<&'a str, IngestError> {
    let value = obj
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("");
    if value.is_empty() {
        return Err(IngestError::MalformedOutput(format!(
            "entry {idx}: field `{field}` is missing or empty"
        )));
    }
    Ok(value)
}

/// Uppercase, with runs of whitespace and hyphens folded into `_`.
pub fn normalize_title(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.extend(ch.to_uppercase());
            prev_sep = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

fn validate_entry(value: &Value, idx: usize) -> Result<LogEntry, IngestError> {
    let Some(obj) = value.as_object() else {
        return Err(IngestError::MalformedOutput(format!(
            "entry {idx}: expected an object, got {}",
            json_kind(value)
        )));
    };

    let raw_date = required_str(obj, "date", idx)?;
    let date = NaiveDateTime::parse_from_str(raw_date, STAMP_FORMAT).map_err(|_| {
        IngestError::MalformedOutput(format!(
            "entry {idx}: date `{raw_date}` is not in YYYY-MM-DD HH:MM:SS form"
        ))
    })?;

    let raw_status = required_str(obj, "status", idx)?;
    let status = EntryStatus::parse(raw_status).ok_or_else(|| {
        IngestError::MalformedOutput(format!("entry {idx}: unknown status `{raw_status}`"))
    })?;

    let title = normalize_title(required_str(obj, "title", idx)?);
    if title.is_empty() {
        return Err(IngestError::MalformedOutput(format!(
            "entry {idx}: title has no usable characters"
        )));
    }
    let content = required_str(obj, "content", idx)?.to_string();

    let tags = match obj.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        _ => {
            return Err(IngestError::MalformedOutput(format!(
                "entry {idx}: field `tags` must be a list"
            )));
        }
    };

    // Zero-padded so string order stays chronological.
    Ok(LogEntry {
        date: date.format(STAMP_FORMAT).to_string(),
        status,
        title,
        content,
        tags,
    })
}

/// Re-read one stored entry with the generator rules, tolerating a missing
/// `tags` field written by older versions.
pub fn salvage_entry(value: &Value, idx: usize) -> Result<LogEntry, IngestError> {
    match value {
        Value::Object(obj) if !obj.contains_key("tags") => {
            let mut patched = obj.clone();
            patched.insert("tags".to_string(), Value::Array(Vec::new()));
            validate_entry(&Value::Object(patched), idx)
        }
        _ => validate_entry(value, idx),
    }
}

pub fn parse_entries(raw: &str) -> Result<Vec<LogEntry>, IngestError> {
    let body = strip_fences(raw);
    if body.is_empty() {
        return Err(IngestError::MalformedOutput("response was empty".to_string()));
    }
    let items = coerce_to_list(decode(&body)?)?;
    if items.is_empty() {
        return Err(IngestError::MalformedOutput(
            "response contained no entries".to_string(),
        ));
    }
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| validate_entry(item, idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{normalize_title, parse_entries, salvage_entry, strip_fences};
    use crate::devlog::entries::EntryStatus;
    use crate::error::IngestError;

    const ONE: &str = r##"{"date": "2024-01-02 08:30:00", "status": "SUCCESS", "title": "WIFI_RESTORED", "content": "Battled the radio waves.<br>Won.", "tags": ["#Homelab"]}"##;

    fn assert_malformed(raw: &str) {
        match parse_entries(raw) {
            Err(IngestError::MalformedOutput(_)) => {}
            other => panic!("expected MalformedOutput, got {other:?}"),
        }
    }

    #[test]
    fn strips_code_fences_around_the_list() {
        let raw = format!("```json\n[{ONE}]\n```\n");
        let entries = parse_entries(&raw).expect("fenced list parses");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "WIFI_RESTORED");
        assert_eq!(entries[0].content, "Battled the radio waves.<br>Won.");
    }

    #[test]
    fn strips_chatter_outside_the_json_value() {
        let raw = format!("Here you go!\n[{ONE}]\nHope that helps.");
        assert_eq!(strip_fences(&raw), format!("[{ONE}]"));
        assert_eq!(parse_entries(&raw).expect("parses").len(), 1);
    }

    #[test]
    fn promotes_single_object_to_list() {
        let entries = parse_entries(ONE).expect("object parses");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Success);
    }

    #[test]
    fn unwraps_single_list_wrapper_object() {
        let raw = format!("{{\"entries\": [{ONE}, {ONE}]}}");
        assert_eq!(parse_entries(&raw).expect("wrapper parses").len(), 2);
    }

    #[test]
    fn rejects_ambiguous_wrapper_object() {
        assert_malformed(&format!("{{\"a\": [{ONE}], \"b\": [{ONE}]}}"));
    }

    #[test]
    fn rejects_non_json_text() {
        assert_malformed("Sorry, I can't help with that.");
    }

    #[test]
    fn rejects_empty_list() {
        assert_malformed("[]");
    }

    #[test]
    fn rejects_whole_batch_when_one_element_is_bad() {
        let bad = r#"{"date": "2024-01-02 09:00:00", "status": "SUCCESS", "title": "", "content": "x", "tags": []}"#;
        assert_malformed(&format!("[{ONE}, {bad}]"));
    }

    #[test]
    fn rejects_unparseable_date_and_unknown_status() {
        assert_malformed(
            r#"[{"date": "yesterday", "status": "SUCCESS", "title": "T", "content": "c", "tags": []}]"#,
        );
        assert_malformed(
            r#"[{"date": "2024-01-02 09:00:00", "status": "MEH", "title": "T", "content": "c", "tags": []}]"#,
        );
    }

    #[test]
    fn rejects_missing_tags() {
        assert_malformed(
            r#"[{"date": "2024-01-02 09:00:00", "status": "SUCCESS", "title": "T", "content": "c"}]"#,
        );
    }

    #[test]
    fn accepts_trailing_commas_through_json5() {
        let raw = r##"[{"date": "2024-01-02 09:00:00", "status": "warning", "title": "spine error codes", "content": "Nap.", "tags": ["#Health", " ",],},]"##;
        let entries = parse_entries(raw).expect("json5 fallback parses");
        assert_eq!(entries[0].status, EntryStatus::Warning);
        assert_eq!(entries[0].title, "SPINE_ERROR_CODES");
        assert_eq!(entries[0].tags, vec!["#Health".to_string()]);
    }

    #[test]
    fn keeps_payload_of_single_line_fence() {
        let raw = format!("```json [{ONE}] ```");
        let entries = parse_entries(&raw).expect("one-line fence parses");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "WIFI_RESTORED");
    }

    #[test]
    fn unpadded_date_is_stored_zero_padded() {
        let raw = r#"[{"date": "2024-1-5 8:30:00", "status": "SUCCESS", "title": "T", "content": "c", "tags": []}]"#;
        let entries = parse_entries(raw).expect("unpadded date parses");
        assert_eq!(entries[0].date, "2024-01-05 08:30:00");
        assert!(entries[0].date.as_str() < "2024-01-10 00:00:00");
    }

    #[test]
    fn salvage_defaults_missing_tags() {
        let value = serde_json::json!({
            "date": "2023-12-31 23:59:00",
            "status": "Success",
            "title": "old entry",
            "content": "from an older run"
        });
        let entry = salvage_entry(&value, 0).expect("salvaged");
        assert_eq!(entry.status, EntryStatus::Success);
        assert_eq!(entry.title, "OLD_ENTRY");
        assert!(entry.tags.is_empty());
    }

    #[test]
    fn normalize_title_folds_separators() {
        assert_eq!(normalize_title("  system - reboot  initiated "), "SYSTEM_REBOOT_INITIATED");
        assert_eq!(normalize_title("ALREADY_FINE"), "ALREADY_FINE");
    }
}
