//! Core domain types for linkbak archives.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Well-known metadata field names.
pub mod fields {
    /// Link hash, identical to the workspace directory name.
    pub const ID: &str = "id";
    /// The original link.
    pub const LINK: &str = "link";
    /// Coarse content classification (see [`super::ContentKind`]).
    pub const KIND: &str = "kind";
    /// Raw `Content-Type` header of the fetched link.
    pub const CONTENT_TYPE: &str = "content_type";
    /// Document title.
    pub const TITLE: &str = "title";
    /// URL after redirects.
    pub const FINAL_URL: &str = "final_url";
    /// HTTP status of the classification fetch.
    pub const HTTP_STATUS: &str = "http_status";
}

// ---------------------------------------------------------------------------
// LinkId
// ---------------------------------------------------------------------------

/// Full-width SHA-256 of a link, hex encoded. Names the link's workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    /// Hash a link.
    pub fn of(link: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(link.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ContentKind
// ---------------------------------------------------------------------------

/// Coarse classification of what a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Html,
    Pdf,
    Image,
    Text,
    Other,
    /// Not classified yet, or the classification fetch failed.
    Unknown,
}

impl ContentKind {
    /// Classify from a `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => Self::Html,
            "application/pdf" => Self::Pdf,
            m if m.starts_with("image/") => Self::Image,
            m if m.starts_with("text/") => Self::Text,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Text => "text",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the value stored under [`fields::KIND`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "html" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            "image" => Some(Self::Image),
            "text" => Some(Self::Text),
            "other" => Some(Self::Other),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Accumulating key/value record threaded through one link's pipeline.
///
/// Fields are only ever added or overwritten, never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// The fields every record starts with: `id`, `link` and an `unknown`
    /// classification that the metadata step overwrites.
    pub fn base(id: &LinkId, link: &str) -> Self {
        let mut metadata = Self::new();
        metadata.insert(fields::ID, id.as_str());
        metadata.insert(fields::LINK, link);
        metadata.insert(fields::KIND, ContentKind::Unknown.as_str());
        metadata
    }

    /// Right-biased merge: fields in `delta` overwrite fields in `self`.
    pub fn merge(&mut self, delta: Metadata) {
        for (key, value) in delta.0 {
            self.0.insert(key, value);
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The content classification, if the metadata step recorded one.
    pub fn kind(&self) -> Option<ContentKind> {
        self.get_str(fields::KIND).and_then(ContentKind::parse)
    }

    /// Bookkeeping entry recorded for a completed step.
    pub fn step_record(&self, step: &str) -> Option<StepRecord> {
        self.get(step)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// StepRecord
// ---------------------------------------------------------------------------

/// Bookkeeping for a completed step: `[artifact path, completion time]`.
///
/// The path is relative to the output root (`<link hash>/<output>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "(String, String)", try_from = "(String, String)")]
pub struct StepRecord {
    pub path: String,
    pub completed_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(path: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            completed_at,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            Value::String(self.path.clone()),
            Value::String(format_timestamp(&self.completed_at)),
        ])
    }
}

impl From<StepRecord> for (String, String) {
    fn from(record: StepRecord) -> Self {
        let ts = format_timestamp(&record.completed_at);
        (record.path, ts)
    }
}

impl TryFrom<(String, String)> for StepRecord {
    type Error = chrono::ParseError;

    fn try_from((path, ts): (String, String)) -> std::result::Result<Self, Self::Error> {
        let completed_at = DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc);
        Ok(Self { path, completed_at })
    }
}

/// ISO 8601 / RFC 3339 timestamp with microsecond precision.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
