//! Memory entry types and builders
//!
//! A [`MemoryEntry`] is the only stored record. Its `entry_type` is an open
//! string tag; type-specific creation rules live on [`NewEntry`] and are
//! selected through the closed [`EntryKind`] enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{MemoryError, Result};

/// Entry metadata: unordered key to scalar value mapping
pub type Metadata = serde_json::Map<String, Value>;

/// Unique identifier for memory entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    /// Create a new random EntryId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kinds of entries with type-specific creation rules
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Event,
    Decision,
    Insight,
    Project,
    Error,
    /// Caller-defined tag the store does not interpret
    Custom(String),
}

impl EntryKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Event => "event",
            Self::Decision => "decision",
            Self::Insight => "insight",
            Self::Project => "project",
            Self::Error => "error",
            Self::Custom(tag) => tag,
        }
    }

    /// Map a stored type tag back to a kind
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "event" => Self::Event,
            "decision" => Self::Decision,
            "insight" => Self::Insight,
            "project" => Self::Project,
            "error" => Self::Error,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an error entry, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Numeric rank, higher is more severe
    pub fn rank(&self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Warning => 2,
            Self::Error => 3,
            Self::Critical => 4,
        }
    }

    /// Parse a severity name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A timestamped, typed record in the memory log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier
    pub id: EntryId,
    /// Creation time, never changed after store
    pub timestamp: DateTime<Utc>,
    /// Open type tag
    #[serde(rename = "type")]
    pub entry_type: String,
    /// Text payload, never empty
    pub content: String,
    /// Contextual key/value pairs
    #[serde(default)]
    pub metadata: Metadata,
}

impl MemoryEntry {
    /// Seconds elapsed since the entry was created
    pub fn age_in_seconds(&self) -> i64 {
        (Utc::now() - self.timestamp).num_seconds()
    }

    pub fn is_type(&self, entry_type: &str) -> bool {
        self.entry_type == entry_type
    }

    /// Stringified metadata value at `key`
    pub fn metadata_text(&self, key: &str) -> Option<String> {
        self.metadata.get(key).map(value_text)
    }

    /// Text the hashed embedding is computed from: content plus every metadata value
    pub fn embedding_text(&self) -> String {
        let mut text = self.content.clone();
        for value in self.metadata.values() {
            text.push(' ');
            text.push_str(&value_text(value));
        }
        text
    }
}

/// Render a metadata value as plain text (strings unquoted)
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builder for new entries
///
/// Constructors apply the metadata rules of each entry kind. Keys set by a
/// constructor (for example `project_name` on projects) win over keys merged
/// in later through [`NewEntry::metadata`].
#[derive(Debug, Clone)]
pub struct NewEntry {
    kind: EntryKind,
    content: String,
    metadata: Metadata,
    pinned: Metadata,
    timestamp: Option<DateTime<Utc>>,
}

impl NewEntry {
    pub fn new(kind: EntryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            metadata: Metadata::new(),
            pinned: Metadata::new(),
            timestamp: None,
        }
    }

    pub fn event(content: impl Into<String>) -> Self {
        Self::new(EntryKind::Event, content)
    }

    /// Decision entry; gets `decision_time` and a `decision_type` (default "system")
    pub fn decision(content: impl Into<String>) -> Self {
        Self::new(EntryKind::Decision, content)
    }

    pub fn project(content: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self::new(EntryKind::Project, content).pin("project_name", project_name.into())
    }

    pub fn insight(content: impl Into<String>, source: Option<&str>) -> Self {
        let entry = Self::new(EntryKind::Insight, content);
        match source {
            Some(source) => entry.pin("source", source),
            None => entry,
        }
    }

    /// Error entry; records `severity` and `error_time`
    pub fn error(content: impl Into<String>, severity: Severity) -> Self {
        Self::new(EntryKind::Error, content).pin("severity", severity.as_str())
    }

    pub fn custom(entry_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(EntryKind::Custom(entry_type.into()), content)
    }

    /// Merge caller metadata
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Set a single metadata value
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Backfill with an explicit creation time
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    fn pin(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.pinned.insert(key.to_string(), value.into());
        self
    }

    /// Validate and produce the stored entry
    pub fn build(self) -> Result<MemoryEntry> {
        if self.content.is_empty() {
            return Err(MemoryError::validation(
                "memory entry content cannot be empty",
            ));
        }

        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        let mut metadata = self.metadata;
        metadata.extend(self.pinned);

        match self.kind {
            EntryKind::Decision => {
                metadata.insert("decision_time".into(), timestamp.to_rfc3339().into());
                metadata
                    .entry("decision_type")
                    .or_insert_with(|| "system".into());
            }
            EntryKind::Error => {
                metadata.insert("error_time".into(), timestamp.to_rfc3339().into());
            }
            _ => {}
        }

        Ok(MemoryEntry {
            id: EntryId::new(),
            timestamp,
            entry_type: self.kind.as_str().to_string(),
            content: self.content,
            metadata,
        })
    }
}
