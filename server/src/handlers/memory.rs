//! Request and response types for the `memory/*` methods.

use almanac_memory::{MemoryEntry, Metadata, PatternGroup};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ==========================================
// Entry Creation
// ==========================================

/// Parameters for creating an entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryParams {
    /// Entry type: "event", "decision", "insight", "project", "error" or any custom tag
    #[serde(rename = "type", alias = "entryType")]
    pub entry_type: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

// ==========================================
// Lookup
// ==========================================

/// Parameters naming a single entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryIdParams {
    pub id: String,
}

/// Parameters for listing entries of one type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByTypeParams {
    #[serde(rename = "type", alias = "entryType")]
    pub entry_type: String,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

/// Parameters for the most recent entries.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastEntriesParams {
    #[serde(default = "default_last")]
    pub n: usize,
}

/// Parameters for listing insights.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsParams {
    #[serde(default = "default_insight_limit")]
    pub limit: usize,
}

/// A list of entries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryListResponse {
    /// Number of entries returned
    pub total: usize,
    pub entries: Vec<MemoryEntry>,
}

impl From<Vec<MemoryEntry>> for EntryListResponse {
    fn from(entries: Vec<MemoryEntry>) -> Self {
        Self {
            total: entries.len(),
            entries,
        }
    }
}

// ==========================================
// Mutation
// ==========================================

/// Parameters for updating an entry in place.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryParams {
    pub id: String,
    /// New content (keeps existing if not provided)
    #[serde(default)]
    pub content: Option<String>,
    /// Replacement metadata (keeps existing if not provided)
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Outcome of an update or delete; `false` means the id was unknown.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse {
    pub success: bool,
}

/// Parameters for clearing the log or one type.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearParams {
    #[serde(default, rename = "type", alias = "entryType")]
    pub entry_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub removed: usize,
}

// ==========================================
// Search
// ==========================================

/// Parameters for keyword search.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordSearchParams {
    #[serde(alias = "q")]
    pub keyword: String,
    #[serde(default)]
    pub type_filter: Option<String>,
}

/// Parameters for regex search.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexSearchParams {
    pub pattern: String,
    #[serde(default)]
    pub type_filter: Option<String>,
}

/// Parameters for exact metadata search.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSearchParams {
    pub key: String,
    pub value: Value,
}

/// Parameters for metadata substring search.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataValueSearchParams {
    pub key: String,
    /// Substring to look for in the value's text
    pub value: String,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

/// Parameters for semantic search.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSearchParams {
    #[serde(alias = "q")]
    pub query: String,
    #[serde(default = "default_top_n", alias = "topN")]
    pub n: usize,
    #[serde(default)]
    pub type_filter: Option<String>,
}

// ==========================================
// Summaries
// ==========================================

/// Parameters for the recent-events summary.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsSummaryParams {
    #[serde(default = "default_summary_events")]
    pub n: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsSummaryResponse {
    pub summary: String,
}

/// Parameters for event pattern mining.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternsParams {
    #[serde(default = "default_pattern_days")]
    pub days: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternsResponse {
    pub patterns: Vec<PatternGroup>,
}

/// Parameters for a project's decision history.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDecisionsParams {
    pub project_name: String,
}

fn default_list_limit() -> usize {
    50
}

fn default_last() -> usize {
    10
}

fn default_insight_limit() -> usize {
    20
}

fn default_top_n() -> usize {
    5
}

fn default_summary_events() -> usize {
    3
}

fn default_pattern_days() -> i64 {
    14
}
