//! Read-only analytical queries over the entry store
//!
//! [`MemoryRetriever`] holds nothing but a handle to the store and builds
//! keyword, timeframe and pattern queries on top of its public operations.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::entry::{value_text, MemoryEntry};
use crate::error::Result;
use crate::storage::MemoryStore;
use crate::timeframe::TimeWindow;

/// Metadata keys scanned for event patterns, in order
pub const PATTERN_KEYS: [&str; 3] = ["category", "activity_type", "project_name"];

/// Examples kept per pattern group
const MAX_PATTERN_EXAMPLES: usize = 3;

/// Events sharing one `key:value` metadata signature
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternGroup {
    /// Metadata key, one of [`PATTERN_KEYS`]
    pub pattern_type: String,
    pub pattern_value: Value,
    pub count: usize,
    /// Contents of the first events seen in the group
    pub examples: Vec<String>,
}

impl PatternGroup {
    /// Compound `key:value` signature
    pub fn key(&self) -> String {
        format!("{}:{}", self.pattern_type, value_text(&self.pattern_value))
    }
}

/// Query layer over [`MemoryStore`]
#[derive(Clone)]
pub struct MemoryRetriever {
    store: Arc<MemoryStore>,
}

impl MemoryRetriever {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Case-insensitive content search; an empty keyword yields nothing
    pub fn keyword_search(
        &self,
        keyword: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<MemoryEntry>> {
        let entries = self.store.search_by_text(keyword, true)?;
        Ok(filter_type(entries, type_filter))
    }

    /// Case-sensitive regex search with an optional type filter
    pub fn regex_search(
        &self,
        pattern: &str,
        type_filter: Option<&str>,
    ) -> Result<Vec<MemoryEntry>> {
        let entries = self.store.search_by_regex(pattern)?;
        Ok(filter_type(entries, type_filter))
    }

    /// Similarity search; the type filter is applied before truncating to `top_n`
    pub fn semantic_search(
        &self,
        query: &str,
        top_n: usize,
        type_filter: Option<&str>,
    ) -> Vec<MemoryEntry> {
        match type_filter {
            None => self.store.search_by_similarity(query, top_n),
            Some(entry_type) => {
                let mut entries = filter_type(
                    self.store.search_by_similarity(query, self.store.count(None)),
                    Some(entry_type),
                );
                entries.truncate(top_n);
                entries
            }
        }
    }

    /// Entries whose metadata `key` equals `value`
    pub fn related_entries(&self, key: &str, value: &Value) -> Vec<MemoryEntry> {
        self.store.search_by_metadata(key, value)
    }

    /// Entries inside `window`, oldest first
    pub fn entries_in_timeframe(
        &self,
        window: TimeWindow,
        type_filter: Option<&str>,
    ) -> Vec<MemoryEntry> {
        let entries = match type_filter {
            Some(entry_type) => self.store.retrieve_by_type(entry_type),
            None => self.store.get_all(),
        };
        let mut entries: Vec<MemoryEntry> = entries
            .into_iter()
            .filter(|e| window.contains(e.timestamp))
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        entries
    }

    /// The `n` newest entries of one type, newest first
    ///
    /// Equal timestamps keep insertion order.
    pub fn by_type_newest(&self, entry_type: &str, n: usize) -> Vec<MemoryEntry> {
        newest_first(self.store.retrieve_by_type(entry_type), n)
    }

    /// The `n` newest decisions, newest first
    pub fn recent_decisions(&self, n: usize) -> Vec<MemoryEntry> {
        self.by_type_newest("decision", n)
    }

    /// Errors logged in the last `window_days` days, newest first
    pub fn recent_errors(&self, window_days: i64) -> Vec<MemoryEntry> {
        let errors = self.entries_in_timeframe(TimeWindow::last_days(window_days), Some("error"));
        let count = errors.len();
        newest_first(errors, count)
    }

    pub fn counts_by_type(&self) -> BTreeMap<String, usize> {
        self.store.counts_by_type()
    }

    /// Bullet list of the `n` newest events
    pub fn summarize_recent_events(&self, n: usize) -> String {
        let events = self.by_type_newest("event", n);
        if events.is_empty() {
            return "No recent events recorded.".to_string();
        }

        let mut summary = String::from("Recent events:\n");
        for event in events {
            summary.push_str(&format!(
                "• {}: {}\n",
                event.timestamp.format("%Y-%m-%d %H:%M"),
                event.content
            ));
        }
        summary
    }

    /// Group events from the last `window_days` days by metadata signature
    ///
    /// An event carrying several pattern keys counts toward each of their
    /// groups. Groups are ranked by count; equal counts keep first-seen order.
    pub fn find_patterns_in_events(&self, window_days: i64) -> Vec<PatternGroup> {
        let events = self.entries_in_timeframe(TimeWindow::last_days(window_days), Some("event"));

        let mut groups: Vec<PatternGroup> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for event in &events {
            for key in PATTERN_KEYS {
                let Some(value) = event.metadata.get(key) else {
                    continue;
                };
                let signature = format!("{}:{}", key, value_text(value));
                let slot = *index.entry(signature).or_insert_with(|| {
                    groups.push(PatternGroup {
                        pattern_type: key.to_string(),
                        pattern_value: value.clone(),
                        count: 0,
                        examples: Vec::new(),
                    });
                    groups.len() - 1
                });

                let group = &mut groups[slot];
                group.count += 1;
                if group.examples.len() < MAX_PATTERN_EXAMPLES {
                    group.examples.push(event.content.clone());
                }
            }
        }

        groups.sort_by(|a, b| b.count.cmp(&a.count));
        groups
    }

    /// Decisions about a project, oldest first
    ///
    /// Includes decisions whose `related_to` points at any entry tagged with
    /// the project name, and decisions tagged with the name themselves.
    pub fn decision_history_for_project(&self, project_name: &str) -> Vec<MemoryEntry> {
        let name = Value::String(project_name.to_string());
        let project_ids: HashSet<String> = self
            .store
            .search_by_metadata("project_name", &name)
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();

        let mut decisions: Vec<MemoryEntry> = self
            .store
            .retrieve_by_type("decision")
            .into_iter()
            .filter(|d| {
                let related = d
                    .metadata
                    .get("related_to")
                    .and_then(Value::as_str)
                    .is_some_and(|id| project_ids.contains(id));
                related || d.metadata.get("project_name") == Some(&name)
            })
            .collect();
        decisions.sort_by_key(|d| d.timestamp);
        decisions
    }

    /// Entries created since `start`, oldest first
    pub fn entries_since(&self, start: DateTime<Utc>, type_filter: Option<&str>) -> Vec<MemoryEntry> {
        self.entries_in_timeframe(TimeWindow::since(start), type_filter)
    }

    /// Entries from the last `days` days, oldest first
    pub fn entries_in_last_days(&self, days: i64, type_filter: Option<&str>) -> Vec<MemoryEntry> {
        self.entries_since(Utc::now() - Duration::days(days), type_filter)
    }
}

fn filter_type(entries: Vec<MemoryEntry>, type_filter: Option<&str>) -> Vec<MemoryEntry> {
    match type_filter {
        Some(entry_type) => entries.into_iter().filter(|e| e.is_type(entry_type)).collect(),
        None => entries,
    }
}

/// Stable sort newest first (equal timestamps keep insertion order) and keep `n`
fn newest_first(mut entries: Vec<MemoryEntry>, n: usize) -> Vec<MemoryEntry> {
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries.truncate(n);
    entries
}
