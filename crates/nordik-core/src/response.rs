//! Read-only response shapes from the activity endpoints.
//!
//! Missing or `null` members fall back to defaults instead of failing the
//! whole response.

use std::collections::BTreeMap;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decodes a list item by item, skipping entries that do not fit `T`.
/// A missing, `null` or non-array member yields an empty list.
fn lenient_items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                debug!(error = %err, "skipping malformed item");
                None
            }
        })
        .collect())
}

/// Review item ids arrive as numbers or numeric strings.
fn item_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("id {n} is not an integer"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("id {s:?} is not an integer"))),
        other => Err(de::Error::custom(format!("unusable id {other}"))),
    }
}

/// Opaque server-defined record. Only the display fields have accessors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityRow(pub Map<String, Value>);

impl ActivityRow {
    pub fn request_id(&self) -> Option<i64> {
        match self.0.get("request_id")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregationBucket {
    #[serde(default, deserialize_with = "nullable")]
    pub key: String,
    #[serde(default, deserialize_with = "nullable")]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default, deserialize_with = "nullable")]
    pub data: Vec<ActivityRow>,
    #[serde(default, deserialize_with = "nullable")]
    pub page: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub total_pages: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub total_rows: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub total_changes: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub aggregations: BTreeMap<String, Vec<AggregationBucket>>,
}

/// Pagination counters of a search response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub page: u32,
    pub total_pages: u32,
    pub total_rows: u64,
    pub total_changes: u64,
}

impl SearchSummary {
    /// `None` means no search has produced results yet.
    pub fn from_response(response: Option<&SearchResult>) -> Option<Self> {
        response.map(|r| Self {
            page: r.page,
            total_pages: r.total_pages,
            total_rows: r.total_rows,
            total_changes: r.total_changes,
        })
    }
}

impl SearchResult {
    pub fn summary(&self) -> SearchSummary {
        SearchSummary {
            page: self.page,
            total_pages: self.total_pages,
            total_rows: self.total_rows,
            total_changes: self.total_changes,
        }
    }

    pub fn aggregation(&self, key: &str) -> &[AggregationBucket] {
        self.aggregations.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Review state of a photo or document; `null` on the wire means pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReviewStatus {
    Approved,
    Rejected,
    #[default]
    Pending,
}

/// Maps a raw status to the three known states. Anything unrecognised,
/// including `null`, is pending.
pub fn normalize_status(raw: Option<&str>) -> ReviewStatus {
    match raw.map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case("approved") => ReviewStatus::Approved,
        Some(s) if s.eq_ignore_ascii_case("rejected") => ReviewStatus::Rejected,
        _ => ReviewStatus::Pending,
    }
}

impl ReviewStatus {
    pub fn as_wire(self) -> Option<&'static str> {
        match self {
            ReviewStatus::Approved => Some("approved"),
            ReviewStatus::Rejected => Some("rejected"),
            ReviewStatus::Pending => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Pending => "pending",
        }
    }
}

impl Serialize for ReviewStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ReviewStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Non-string payloads (numbers, objects) are treated like unknown strings.
        let raw = Value::deserialize(deserializer)?;
        Ok(normalize_status(raw.as_str()))
    }
}

/// Decision an admin can record on a photo or document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl From<ReviewDecision> for ReviewStatus {
    fn from(decision: ReviewDecision) -> Self {
        match decision {
            ReviewDecision::Approved => ReviewStatus::Approved,
            ReviewDecision::Rejected => ReviewStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Option<Value>,
    #[serde(default)]
    pub changed_at: Option<String>,
    #[serde(default)]
    pub changed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Photo {
    #[serde(deserialize_with = "item_id")]
    pub id: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub status: ReviewStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(deserialize_with = "item_id")]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangesResponse {
    #[serde(default, deserialize_with = "lenient_items")]
    pub data: Vec<FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhotosResponse {
    #[serde(default, deserialize_with = "lenient_items")]
    pub photos: Vec<Photo>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentsResponse {
    #[serde(default, deserialize_with = "lenient_items")]
    pub docs: Vec<Document>,
}

/// Expanded view of one request: field-level changes plus review items.
/// Photos and documents come from separate endpoints; a failure there is
/// kept next to the part it concerns and leaves the changes intact.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RequestDetail {
    pub request_id: i64,
    pub changes: Vec<FieldChange>,
    pub photos: Vec<Photo>,
    pub documents: Vec<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents_error: Option<String>,
}

impl RequestDetail {
    pub fn pending_reviews(&self) -> usize {
        self.photos
            .iter()
            .map(|p| p.status)
            .chain(self.documents.iter().map(|d| d.status))
            .filter(|s| *s == ReviewStatus::Pending)
            .count()
    }
}
