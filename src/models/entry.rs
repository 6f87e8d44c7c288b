use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;

use super::date;

/// `_type` given to entries written from the shell or the web page.
pub const USER_TYPE: &str = "user";

/// Projection used when only the editable parts of an entry are needed.
pub const EDIT_FIELDS: [&str; 4] = ["_id", "_date", "_user", "summary"];

/// A journal entry as it travels over the API.
///
/// Underscore fields are owned by the service; anything else the caller sent
/// is carried in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        rename = "_date",
        default,
        with = "date::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<DateTime<Utc>>,
    #[serde(rename = "_user", default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entry {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn is_owned_by(&self, viewer: Option<&str>) -> bool {
        matches!((self.user.as_deref(), viewer), (Some(owner), Some(viewer)) if owner == viewer)
    }
}

/// Fields changed by an update, sent under `$set`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(
        rename = "_date",
        serialize_with = "date::option::serialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<DateTime<Utc>>,
}

/// Row of the `entries` table. Non-underscore fields live in the JSON `body`.
#[derive(Debug, Clone, FromRow)]
pub struct StoredEntry {
    pub id: String,
    pub date: String,
    pub user: Option<String>,
    #[sqlx(rename = "type")]
    pub kind: Option<String>,
    pub body: String,
}

impl StoredEntry {
    pub fn into_document(self) -> Map<String, Value> {
        let mut document: Map<String, Value> = serde_json::from_str(&self.body).unwrap_or_default();
        document.insert("_id".to_string(), Value::String(self.id));
        document.insert("_date".to_string(), Value::String(self.date));
        if let Some(user) = self.user {
            document.insert("_user".to_string(), Value::String(user));
        }
        if let Some(kind) = self.kind {
            document.insert("_type".to_string(), Value::String(kind));
        }
        document
    }
}
