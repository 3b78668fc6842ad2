//! Normalization: turn the model's raw answer into a storage-ready patch list.
//!
//! The model is asked for a JSON object, but it is untrusted text. It may
//! wrap the JSON in a ` ```json ` fence, drop columns from some rows, or drift
//! to a different shape between model versions. This stage handles all of
//! that deterministically and without I/O:
//!
//! ```text
//! raw text ──▶ unwrap_code_fence ──▶ parse_record ──▶ validate_record ──▶ sanitize_storage_key
//!               (strip ```json)       (serde_json)      (filter rows)        (collection name)
//! ```
//!
//! The parsed answer is kept as a permissive [`serde_json::Value`]; only the
//! fields below are read, by exact name:
//!
//! | Field | Kind | Required |
//! |-------|------|----------|
//! | `main_artist` | string | yes |
//! | `patch_list_table` | array of rows | yes |
//! | `instruments_and_backlines` | array of strings | no |
//!
//! A row needs all of `channelNumber`, `micOrDi`, `patchName` and
//! `commentsOrStand` as keys. Rows missing any key are dropped and counted,
//! never defaulted. A present key is kept with whatever value it holds,
//! `null`, `0` and `""` included.

use crate::error::{NormalizeError, ParseError, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use tracing::{debug, warn};

pub const MAIN_ARTIST: &str = "main_artist";
pub const PATCH_LIST_TABLE: &str = "patch_list_table";
pub const INSTRUMENTS_AND_BACKLINES: &str = "instruments_and_backlines";

const CHANNEL_NUMBER: &str = "channelNumber";
const MIC_OR_DI: &str = "micOrDi";
const PATCH_NAME: &str = "patchName";
const COMMENTS_OR_STAND: &str = "commentsOrStand";

// ── Types ────────────────────────────────────────────────────────────────────

/// The model's answer parsed as JSON, with no schema applied yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractionRecord(Value);

impl ExtractionRecord {
    /// Look up a top-level field. Non-object documents have no fields.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The `instruments_and_backlines` list, if the model produced one.
    ///
    /// Scalars are stringified; nested objects and arrays are skipped.
    pub fn instruments_and_backlines(&self) -> Vec<String> {
        self.field(INSTRUMENTS_AND_BACKLINES)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(scalar_to_string).collect())
            .unwrap_or_default()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ExtractionRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Console channel of a patch list row. Riders use both `12` and `"12a"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelNumber {
    Number(Number),
    Text(String),
    /// Anything else the model put in the column, kept verbatim.
    Other(Value),
}

impl From<&Value> for ChannelNumber {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => ChannelNumber::Number(n.clone()),
            Value::String(s) => ChannelNumber::Text(s.clone()),
            other => ChannelNumber::Other(other.clone()),
        }
    }
}

impl fmt::Display for ChannelNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelNumber::Number(n) => write!(f, "{n}"),
            ChannelNumber::Text(s) => f.write_str(s),
            ChannelNumber::Other(v) => write!(f, "{v}"),
        }
    }
}

/// One complete row of a patch list.
///
/// Text columns hold the model's value as-is; usually a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchEntry {
    pub channel_number: ChannelNumber,
    pub mic_or_di: Value,
    pub patch_name: Value,
    pub comments_or_stand: Value,
}

impl PatchEntry {
    /// Document id this row is stored under.
    pub fn document_id(&self) -> String {
        self.channel_number.to_string()
    }

    /// Read a row by exact column names. `None` when any key is absent or
    /// the row is not an object.
    fn from_row(row: &Value) -> Option<Self> {
        Some(Self {
            channel_number: ChannelNumber::from(row.get(CHANNEL_NUMBER)?),
            mic_or_di: row.get(MIC_OR_DI)?.clone(),
            patch_name: row.get(PATCH_NAME)?.clone(),
            comments_or_stand: row.get(COMMENTS_OR_STAND)?.clone(),
        })
    }
}

/// A record that passed validation, with its rows filtered.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub record: ExtractionRecord,
    pub main_artist: String,
    pub entries: Vec<PatchEntry>,
    /// Rows dropped because a key was missing.
    pub excluded: usize,
}

/// The normalizer's final output, ready for the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedExtraction {
    pub main_artist: String,
    pub storage_key: String,
    pub entries: Vec<PatchEntry>,
    pub excluded_entries: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instruments_and_backlines: Vec<String>,
}

// ── Stage 1: unwrap ```json fences ───────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A\s*```(?:json)?[ \t]*\r?\n(.*)\r?\n[ \t]*```\s*\z").unwrap()
});

/// Return the body of a fenced block when the fence spans the whole string.
///
/// Anything else, including prose around a fence, comes back unchanged.
pub fn unwrap_code_fence(text: &str) -> &str {
    match RE_JSON_FENCE.captures(text).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str(),
        None => text,
    }
}

// ── Stage 2: parse ───────────────────────────────────────────────────────────

/// Strict JSON parse. No schema is applied.
pub fn parse_record(text: &str) -> Result<ExtractionRecord, ParseError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(ExtractionRecord(value))
}

// ── Stage 3: validate and filter rows ────────────────────────────────────────

/// Check the required fields and drop incomplete rows.
pub fn validate_record(record: ExtractionRecord) -> Result<ValidatedRecord, ValidationError> {
    let artist = record.field(MAIN_ARTIST).filter(|v| !is_falsy(v));
    let table = record.field(PATCH_LIST_TABLE).filter(|v| !is_falsy(v));

    let mut missing = Vec::new();
    if artist.is_none() {
        missing.push(MAIN_ARTIST);
    }
    if table.is_none() {
        missing.push(PATCH_LIST_TABLE);
    }
    if !missing.is_empty() {
        return Err(ValidationError::MissingRequiredField { fields: missing });
    }

    let main_artist = artist
        .and_then(scalar_to_string)
        .ok_or(ValidationError::InvalidField {
            field: MAIN_ARTIST,
            expected: "a string",
        })?;

    let rows = table
        .and_then(Value::as_array)
        .ok_or(ValidationError::InvalidField {
            field: PATCH_LIST_TABLE,
            expected: "an array",
        })?;

    let entries: Vec<PatchEntry> = rows.iter().filter_map(PatchEntry::from_row).collect();
    let excluded = rows.len() - entries.len();

    if entries.is_empty() {
        return Err(ValidationError::NoValidEntries { excluded });
    }

    Ok(ValidatedRecord {
        record,
        main_artist,
        entries,
        excluded,
    })
}

// ── Stage 4: storage key ─────────────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_KEY_DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());

/// Derive a collection name from the artist name.
///
/// Whitespace runs become one `_`, then everything outside `[A-Za-z0-9_]` is
/// removed. May return an empty string; [`normalize`] rejects that.
pub fn sanitize_storage_key(main_artist: &str) -> String {
    let underscored = RE_WHITESPACE.replace_all(main_artist, "_");
    RE_KEY_DISALLOWED.replace_all(&underscored, "").into_owned()
}

// ── All stages ───────────────────────────────────────────────────────────────

/// Run every stage over the model's raw text.
pub fn normalize(raw: &str) -> Result<NormalizedExtraction, NormalizeError> {
    let record = parse_record(unwrap_code_fence(raw))?;
    let validated = validate_record(record)?;

    let storage_key = sanitize_storage_key(&validated.main_artist);
    if storage_key.is_empty() {
        return Err(ValidationError::EmptyStorageKey {
            main_artist: validated.main_artist,
        }
        .into());
    }

    if validated.excluded > 0 {
        warn!(
            "Dropped {} incomplete patch list row(s) for '{}'",
            validated.excluded, validated.main_artist
        );
    } else {
        debug!(
            "All {} patch list rows complete for '{}'",
            validated.entries.len(),
            validated.main_artist
        );
    }

    Ok(NormalizedExtraction {
        instruments_and_backlines: validated.record.instruments_and_backlines(),
        main_artist: validated.main_artist,
        storage_key,
        entries: validated.entries,
        excluded_entries: validated.excluded,
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// JavaScript-style falsiness, plus the empty array.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fenced(body: &str) -> String {
        format!("```json\n{body}\n```")
    }

    fn row(channel: Value, mic: &str, name: &str, comment: &str) -> Value {
        json!({
            "channelNumber": channel,
            "micOrDi": mic,
            "patchName": name,
            "commentsOrStand": comment,
        })
    }

    #[test]
    fn test_unwrap_returns_fence_body_exactly() {
        for body in [
            "",
            "{}",
            "{\"a\": 1}",
            "  indented\n\ttabs  ",
            "line one\n```\nnested fence\n```\nline two",
            "trailing cr\r",
        ] {
            assert_eq!(unwrap_code_fence(&fenced(body)), body, "body: {body:?}");
        }
    }

    #[test]
    fn test_unwrap_untagged_fence() {
        assert_eq!(unwrap_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_unwrap_tolerates_outer_whitespace() {
        assert_eq!(unwrap_code_fence("\n```json\n[1]\n```\n"), "[1]");
    }

    #[test]
    fn test_unwrap_identity_when_not_whole_fence() {
        for text in [
            "{\"a\": 1}",
            "Here you go: ```json\n{}\n```",
            "```json\n{}\n``` thanks!",
            "```json\n{}",
            "```json{}```",
            "```markdown\n# title\n```",
            "",
        ] {
            assert_eq!(unwrap_code_fence(text), text, "text: {text:?}");
        }
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(parse_record("not json").is_err());
        assert!(parse_record("{unterminated").is_err());
        assert!(parse_record("").is_err());
    }

    #[test]
    fn test_parse_accepts_any_json_document() {
        for text in ["{}", "[]", "null", "42", "\"text\"", "{\"main_artist\": null}"] {
            assert!(parse_record(text).is_ok(), "text: {text}");
        }
    }

    #[test]
    fn test_missing_artist_with_good_table() {
        let record = ExtractionRecord::from(json!({
            "main_artist": null,
            "patch_list_table": [row(json!(1), "SM58", "Vox", "tall boom")],
        }));
        assert_eq!(
            validate_record(record).unwrap_err(),
            ValidationError::MissingRequiredField {
                fields: vec![MAIN_ARTIST]
            }
        );
    }

    #[test]
    fn test_missing_both_fields_names_both() {
        let record = ExtractionRecord::from(json!({ "patch_list_table": [] }));
        assert_eq!(
            validate_record(record).unwrap_err(),
            ValidationError::MissingRequiredField {
                fields: vec![MAIN_ARTIST, PATCH_LIST_TABLE]
            }
        );
    }

    #[test]
    fn test_falsy_artist_values_are_missing() {
        for artist in [json!(""), json!(false), json!(0)] {
            let record = ExtractionRecord::from(json!({
                "main_artist": artist,
                "patch_list_table": [row(json!(1), "SM58", "Vox", "")],
            }));
            assert!(matches!(
                validate_record(record),
                Err(ValidationError::MissingRequiredField { .. })
            ));
        }
    }

    #[test]
    fn test_non_object_document_is_missing_fields() {
        let record = parse_record("[1, 2, 3]").unwrap();
        assert!(matches!(
            validate_record(record),
            Err(ValidationError::MissingRequiredField { fields }) if fields.len() == 2
        ));
    }

    #[test]
    fn test_table_of_wrong_kind() {
        let record = ExtractionRecord::from(json!({
            "main_artist": "Band",
            "patch_list_table": { "1": "Kick" },
        }));
        assert_eq!(
            validate_record(record).unwrap_err(),
            ValidationError::InvalidField {
                field: PATCH_LIST_TABLE,
                expected: "an array"
            }
        );
    }

    #[test]
    fn test_artist_of_wrong_kind() {
        let record = ExtractionRecord::from(json!({
            "main_artist": { "name": "Band" },
            "patch_list_table": [row(json!(1), "SM58", "Vox", "")],
        }));
        assert_eq!(
            validate_record(record).unwrap_err(),
            ValidationError::InvalidField {
                field: MAIN_ARTIST,
                expected: "a string"
            }
        );
    }

    #[test]
    fn test_incomplete_row_is_dropped_and_counted() {
        let record = ExtractionRecord::from(json!({
            "main_artist": "Band",
            "patch_list_table": [
                { "channelNumber": 1, "micOrDi": "SM58", "patchName": "Kick", "commentsOrStand": "boom" },
                { "channelNumber": 2, "micOrDi": "DI" },
            ],
        }));
        let validated = validate_record(record).unwrap();
        assert_eq!(validated.entries.len(), 1);
        assert_eq!(validated.entries[0].channel_number.to_string(), "1");
        assert_eq!(validated.entries[0].patch_name, "Kick");
        assert_eq!(validated.excluded, 1);
    }

    #[test]
    fn test_every_row_incomplete() {
        let record = ExtractionRecord::from(json!({
            "main_artist": "Band",
            "patch_list_table": [
                { "channelNumber": 1, "micOrDi": "SM58" },
                { "patchName": "Snare" },
                "not a row",
            ],
        }));
        assert_eq!(
            validate_record(record).unwrap_err(),
            ValidationError::NoValidEntries { excluded: 3 }
        );
    }

    #[test]
    fn test_zero_and_empty_string_are_present() {
        let record = ExtractionRecord::from(json!({
            "main_artist": "Band",
            "patch_list_table": [row(json!(0), "", "Talkback", "")],
        }));
        let validated = validate_record(record).unwrap();
        assert_eq!(validated.entries[0].document_id(), "0");
        assert_eq!(validated.excluded, 0);
    }

    #[test]
    fn test_present_keys_keep_the_row_whatever_the_value() {
        let record = ExtractionRecord::from(json!({
            "main_artist": "Band",
            "patch_list_table": [
                row(json!(1), "SM58", "Kick", "boom"),
                { "channelNumber": 2, "micOrDi": "DI", "patchName": "Bass", "commentsOrStand": null },
                { "channelNumber": true, "micOrDi": "DI", "patchName": "Keys", "commentsOrStand": "" },
            ],
        }));
        let validated = validate_record(record).unwrap();
        assert_eq!(validated.entries.len(), 3);
        assert_eq!(validated.excluded, 0);
        assert_eq!(validated.entries[1].comments_or_stand, Value::Null);
        assert_eq!(
            validated.entries[2].channel_number,
            ChannelNumber::Other(json!(true))
        );
        assert_eq!(validated.entries[2].document_id(), "true");
    }

    #[test]
    fn test_text_channel_and_numeric_columns() {
        let record = ExtractionRecord::from(json!({
            "main_artist": "Band",
            "patch_list_table": [
                { "channelNumber": "12a", "micOrDi": 57, "patchName": "Snare", "commentsOrStand": true },
            ],
        }));
        let entry = &validate_record(record).unwrap().entries[0];
        assert_eq!(entry.channel_number, ChannelNumber::Text("12a".into()));
        assert_eq!(entry.mic_or_di, json!(57));
        assert_eq!(entry.comments_or_stand, json!(true));
    }

    #[test]
    fn test_sanitize_storage_key() {
        assert_eq!(sanitize_storage_key("Foo Bar & Baz!!"), "Foo_Bar__Baz");
        assert_eq!(sanitize_storage_key("The  Quiet\tOnes"), "The_Quiet_Ones");
        assert_eq!(sanitize_storage_key("Björk"), "Bjrk");
        assert_eq!(sanitize_storage_key("snake_case_99"), "snake_case_99");
    }

    #[test]
    fn test_sanitize_to_empty() {
        assert_eq!(sanitize_storage_key(""), "");
        assert_eq!(sanitize_storage_key("!!!"), "");
    }

    #[test]
    fn test_normalize_rejects_empty_storage_key() {
        let raw = json!({
            "main_artist": "!!!",
            "patch_list_table": [row(json!(1), "SM58", "Vox", "")],
        })
        .to_string();
        assert!(matches!(
            normalize(&raw),
            Err(NormalizeError::Validation(ValidationError::EmptyStorageKey { .. }))
        ));
    }

    #[test]
    fn test_normalize_parse_failure() {
        assert!(matches!(
            normalize("```json\n{\"main_artist\": \n```"),
            Err(NormalizeError::Parse(_))
        ));
    }

    #[test]
    fn test_normalize_end_to_end() {
        let raw = "```json\n{\"main_artist\":\"Test\",\"patch_list_table\":[{\"channelNumber\":1,\"micOrDi\":\"SM57\",\"patchName\":\"Snare\",\"commentsOrStand\":\"clip\"}]}\n```";
        let out = normalize(raw).unwrap();
        assert_eq!(out.main_artist, "Test");
        assert_eq!(out.storage_key, "Test");
        assert_eq!(out.excluded_entries, 0);
        assert_eq!(
            out.entries,
            vec![PatchEntry {
                channel_number: ChannelNumber::Number(Number::from(1u64)),
                mic_or_di: "SM57".into(),
                patch_name: "Snare".into(),
                comments_or_stand: "clip".into(),
            }]
        );
    }

    #[test]
    fn test_normalized_serialises_camel_case() {
        let raw = json!({
            "main_artist": "Test Band",
            "instruments_and_backlines": ["Drum kit", 2, { "skip": true }],
            "patch_list_table": [row(json!(1), "SM57", "Snare", "clip")],
        })
        .to_string();
        let out = normalize(&raw).unwrap();
        assert_eq!(out.instruments_and_backlines, vec!["Drum kit", "2"]);

        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["mainArtist"], "Test Band");
        assert_eq!(value["storageKey"], "Test_Band");
        assert_eq!(value["entries"][0]["channelNumber"], 1);
        assert_eq!(value["entries"][0]["commentsOrStand"], "clip");
        assert_eq!(value["excludedEntries"], 0);
    }
}
