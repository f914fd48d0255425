//! Wire types and validation for bookmark sync.
//!
//! This crate is shared by the sync engine and every collaborator
//! implementation to prevent schema drift. The engine remains the authority on
//! validation, but backends can reuse the same types to produce valid payloads.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_COLLECTION: &str = "bookmarks";
pub const DEFAULT_SCHEMA: &str = "public";
pub const MAX_ID_LEN: usize = 128;

/// A synchronized bookmark row as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "user_id", default)]
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            owner_id: owner_id.into(),
            created_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_id(&self.id)?;
        require_text(&self.title, "title")?;
        require_text(&self.url, "url")?;
        if let Some(created_at) = self.created_at.as_deref() {
            require_timestamp(created_at, "created_at")?;
        }
        Ok(())
    }
}

/// Insert payload submitted for a new bookmark. The remote store assigns `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    pub title: String,
    pub url: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayloadEventType {
    Insert,
    Update,
    Delete,
}

/// Filter passed when registering for table events. `All` mirrors `"*"`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    #[serde(rename = "*")]
    All,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "DELETE")]
    Delete,
}

impl EventFilter {
    pub fn matches(&self, event_type: PayloadEventType) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Insert => event_type == PayloadEventType::Insert,
            EventFilter::Delete => event_type == PayloadEventType::Delete,
        }
    }
}

/// Raw change notification as pushed by the realtime channel.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChangePayload {
    #[serde(rename = "eventType")]
    pub event_type: PayloadEventType,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

impl ChangePayload {
    pub fn insert(table: &str, record: &Record) -> Self {
        Self {
            event_type: PayloadEventType::Insert,
            schema: Some(DEFAULT_SCHEMA.to_string()),
            table: Some(table.to_string()),
            commit_timestamp: None,
            new: serde_json::to_value(record).ok(),
            old: None,
        }
    }

    pub fn delete(table: &str, id: &str) -> Self {
        Self {
            event_type: PayloadEventType::Delete,
            schema: Some(DEFAULT_SCHEMA.to_string()),
            table: Some(table.to_string()),
            commit_timestamp: None,
            new: None,
            old: Some(serde_json::json!({ "id": id })),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Decoded, typed mutation consumed by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(Record),
    Deleted { id: String },
}

impl ChangeEvent {
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Created(record) => &record.id,
            ChangeEvent::Deleted { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OldRow {
    id: String,
}

/// Decodes a typed payload. `Ok(None)` means the event kind is not modeled
/// (field updates) and should be ignored.
pub fn decode_change(payload: ChangePayload) -> Result<Option<ChangeEvent>, ErrorInfo> {
    if let Some(timestamp) = payload.commit_timestamp.as_deref() {
        require_timestamp(timestamp, "commit_timestamp")?;
    }

    match payload.event_type {
        PayloadEventType::Insert => {
            let new = payload
                .new
                .ok_or_else(|| ErrorInfo::new("missing_field", "new is required for INSERT"))?;
            let record: Record = serde_json::from_value(new).map_err(|err| {
                ErrorInfo::new("invalid_record", format!("new row is invalid: {}", err))
            })?;
            record.validate()?;
            Ok(Some(ChangeEvent::Created(record)))
        }
        PayloadEventType::Delete => {
            let old = payload
                .old
                .ok_or_else(|| ErrorInfo::new("missing_field", "old is required for DELETE"))?;
            let row: OldRow = serde_json::from_value(old).map_err(|err| {
                ErrorInfo::new("invalid_record", format!("old row is invalid: {}", err))
            })?;
            require_id(&row.id)?;
            Ok(Some(ChangeEvent::Deleted { id: row.id }))
        }
        PayloadEventType::Update => Ok(None),
    }
}

/// Parses and decodes an untyped JSON payload from the channel.
pub fn parse_change(value: Value) -> Result<Option<ChangeEvent>, ErrorInfo> {
    let payload: ChangePayload = serde_json::from_value(value).map_err(|err| {
        ErrorInfo::new(
            "invalid_payload",
            format!("change payload is invalid JSON: {}", err),
        )
    })?;
    decode_change(payload)
}

fn require_id(id: &str) -> Result<(), ErrorInfo> {
    if id.trim().is_empty() {
        return Err(ErrorInfo::new("invalid_id", "id is required"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(ErrorInfo::new(
            "invalid_id",
            format!("id must be {} characters or fewer", MAX_ID_LEN),
        ));
    }
    Ok(())
}

fn require_text(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    Ok(())
}

fn require_timestamp(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if DateTime::parse_from_rfc3339(value).is_err() {
        return Err(ErrorInfo::new(
            "invalid_timestamp",
            format!("{} must be RFC3339", field),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_insert_payload() {
        let value = json!({
            "eventType": "INSERT",
            "schema": "public",
            "table": "bookmarks",
            "commit_timestamp": "2026-01-30T12:00:00Z",
            "new": {"id": "2", "title": "Rust", "url": "https://rust-lang.org", "user_id": "u-1"},
            "old": {}
        });

        let event = parse_change(value).expect("decode").expect("modeled");
        assert_eq!(
            event,
            ChangeEvent::Created(Record::new("2", "Rust", "https://rust-lang.org", "u-1"))
        );
    }

    #[test]
    fn decodes_delete_payload() {
        let value = json!({"eventType": "DELETE", "old": {"id": "1"}});
        let event = parse_change(value).expect("decode").expect("modeled");
        assert_eq!(event, ChangeEvent::Deleted { id: "1".to_string() });
    }

    #[test]
    fn ignores_update_payload() {
        let value = json!({
            "eventType": "UPDATE",
            "new": {"id": "1", "title": "Go", "url": "https://go.dev"},
            "old": {"id": "1"}
        });
        assert_eq!(parse_change(value).expect("decode"), None);
    }

    #[test]
    fn insert_without_owner_defaults_to_empty() {
        let value = json!({
            "eventType": "INSERT",
            "new": {"id": "1", "title": "Go", "url": "https://go.dev"}
        });
        let event = parse_change(value).expect("decode").expect("modeled");
        match event {
            ChangeEvent::Created(record) => assert!(record.owner_id.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn rejects_insert_without_new() {
        let err = parse_change(json!({"eventType": "INSERT"})).unwrap_err();
        assert_eq!(err.code, "missing_field");
    }

    #[test]
    fn rejects_insert_with_empty_title() {
        let value = json!({
            "eventType": "INSERT",
            "new": {"id": "1", "title": "  ", "url": "https://go.dev"}
        });
        let err = parse_change(value).unwrap_err();
        assert_eq!(err.code, "missing_field");
    }

    #[test]
    fn rejects_delete_with_blank_id() {
        let err = parse_change(json!({"eventType": "DELETE", "old": {"id": ""}})).unwrap_err();
        assert_eq!(err.code, "invalid_id");
    }

    #[test]
    fn rejects_unknown_event_type() {
        let err = parse_change(json!({"eventType": "TRUNCATE"})).unwrap_err();
        assert_eq!(err.code, "invalid_payload");
    }

    #[test]
    fn rejects_bad_commit_timestamp() {
        let value = json!({
            "eventType": "DELETE",
            "commit_timestamp": "yesterday",
            "old": {"id": "1"}
        });
        let err = parse_change(value).unwrap_err();
        assert_eq!(err.code, "invalid_timestamp");
    }

    #[test]
    fn rejects_long_id() {
        let record = Record::new("a".repeat(256), "Go", "https://go.dev", "u-1");
        assert!(record.validate().is_err());
    }

    #[test]
    fn builder_payloads_decode() {
        let record = Record::new("7", "Docs", "https://docs.rs", "u-1");
        let insert = decode_change(ChangePayload::insert(DEFAULT_COLLECTION, &record))
            .expect("decode insert");
        assert_eq!(insert, Some(ChangeEvent::Created(record)));

        let delete = decode_change(ChangePayload::delete(DEFAULT_COLLECTION, "7"))
            .expect("decode delete");
        assert_eq!(delete, Some(ChangeEvent::Deleted { id: "7".to_string() }));
    }

    #[test]
    fn record_serializes_owner_as_user_id() {
        let record = Record::new("1", "Go", "https://go.dev", "u-1");
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["user_id"], "u-1");
        assert!(value.get("owner_id").is_none());
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn event_filter_matches() {
        assert!(EventFilter::All.matches(PayloadEventType::Update));
        assert!(EventFilter::Insert.matches(PayloadEventType::Insert));
        assert!(!EventFilter::Insert.matches(PayloadEventType::Delete));
        assert_eq!(serde_json::to_value(EventFilter::All).unwrap(), json!("*"));
    }
}
