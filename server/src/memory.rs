//! Memory service for the Almanac server
//!
//! Owns one memory log together with the retriever, reflector and scheduler
//! built on top of it. Every request handler goes through this type.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use almanac_memory::entry::value_text;
use almanac_memory::{
    EntryId, EntryKind, MemoryEntry, MemoryError, MemoryReflector, MemoryRetriever, MemoryStore,
    Metadata, NewEntry, PatternGroup, ReflectionScheduler, Severity, VectorEngine,
};

use crate::config::AlmanacConfig;
use crate::error::{ServiceError, ServiceResult};

/// Source recorded on insights created through the service
pub const MANUAL_SOURCE: &str = "manual_api";

/// Project name used when a project entry arrives without one
pub const UNNAMED_PROJECT: &str = "Unnamed Project";

/// Memory service
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct MemoryService {
    store: Arc<MemoryStore>,
    retriever: MemoryRetriever,
    reflector: Arc<MemoryReflector>,
    scheduler: Arc<ReflectionScheduler>,
}

impl MemoryService {
    /// Build an empty memory log wired according to `config`
    pub fn new(config: &AlmanacConfig) -> Self {
        tracing::info!(
            "[MemoryService::new] Embedding dimension: {}",
            config.embedding.dimension
        );
        let store = Arc::new(MemoryStore::new(VectorEngine::new(
            config.embedding.dimension,
        )));

        let mut reflector = MemoryReflector::new(Arc::clone(&store))
            .with_thresholds(config.reflection.thresholds());
        if let Some(seed) = config.scheduler.seed {
            reflector = reflector.with_seed(seed);
        }
        let reflector = Arc::new(reflector);

        let mut scheduler = ReflectionScheduler::new(Arc::clone(&reflector), Arc::clone(&store))
            .with_config(config.scheduler.scheduler_config());
        if let Some(seed) = config.scheduler.seed {
            // distinct stream from the reflector's
            scheduler = scheduler.with_seed(seed.wrapping_add(1));
        }

        Self {
            retriever: MemoryRetriever::new(Arc::clone(&store)),
            store,
            reflector,
            scheduler: Arc::new(scheduler),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn retriever(&self) -> &MemoryRetriever {
        &self.retriever
    }

    pub fn reflector(&self) -> &Arc<MemoryReflector> {
        &self.reflector
    }

    pub fn scheduler(&self) -> &Arc<ReflectionScheduler> {
        &self.scheduler
    }

    /// Start the periodic reflection loop
    pub fn spawn_scheduler(&self, token: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.scheduler).spawn(token)
    }

    // ==========================================
    // Creation and lookup
    // ==========================================

    /// Create an entry, applying the per-type constructor rules
    ///
    /// Insights default their `source` to [`MANUAL_SOURCE`], projects their
    /// `project_name` to [`UNNAMED_PROJECT`], and errors read `severity`
    /// from the metadata (default info).
    pub fn create_entry(
        &self,
        entry_type: &str,
        content: String,
        metadata: Metadata,
    ) -> ServiceResult<MemoryEntry> {
        if entry_type.is_empty() {
            return Err(ServiceError::invalid_params("entry type cannot be empty"));
        }

        let kind = EntryKind::from_tag(entry_type);
        let new_entry = match kind {
            EntryKind::Event => NewEntry::event(content),
            EntryKind::Decision => NewEntry::decision(content),
            EntryKind::Insight => {
                let source = metadata
                    .get("source")
                    .map(value_text)
                    .unwrap_or_else(|| MANUAL_SOURCE.to_string());
                NewEntry::insight(content, Some(&source))
            }
            EntryKind::Project => {
                let name = metadata
                    .get("project_name")
                    .map(value_text)
                    .unwrap_or_else(|| UNNAMED_PROJECT.to_string());
                NewEntry::project(content, name)
            }
            EntryKind::Error => {
                let severity = match metadata.get("severity") {
                    None => Severity::default(),
                    Some(value) => Severity::parse(&value_text(value)).ok_or_else(|| {
                        ServiceError::invalid_params(format!("unknown severity: {}", value))
                    })?,
                };
                NewEntry::error(content, severity)
            }
            EntryKind::Custom(tag) => NewEntry::custom(tag, content),
        };

        let id = self.store.store(new_entry.metadata(metadata))?;
        tracing::debug!("Created {} entry {}", entry_type, id);
        self.store
            .get_by_id(&id)
            .ok_or_else(|| MemoryError::not_found(id.to_string()).into())
    }

    pub fn get_entry(&self, id: &str) -> ServiceResult<Option<MemoryEntry>> {
        let id = parse_id(id)?;
        Ok(self.store.get_by_id(&id))
    }

    /// Entries of one type, newest first
    pub fn entries_by_type(&self, entry_type: &str, limit: usize) -> Vec<MemoryEntry> {
        self.retriever.by_type_newest(entry_type, limit)
    }

    /// Insight entries, newest first
    pub fn insights(&self, limit: usize) -> Vec<MemoryEntry> {
        self.entries_by_type("insight", limit)
    }

    pub fn last_entries(&self, n: usize) -> Vec<MemoryEntry> {
        self.store.get_last(n)
    }

    pub fn all_entries(&self) -> Vec<MemoryEntry> {
        self.store.get_all()
    }

    // ==========================================
    // Mutation
    // ==========================================

    pub fn update_entry(
        &self,
        id: &str,
        content: Option<String>,
        metadata: Option<Metadata>,
    ) -> ServiceResult<bool> {
        let id = parse_id(id)?;
        Ok(self.store.update(&id, content, metadata)?)
    }

    pub fn delete_entry(&self, id: &str) -> ServiceResult<bool> {
        let id = parse_id(id)?;
        Ok(self.store.delete(&id))
    }

    pub fn clear(&self, entry_type: Option<&str>) -> usize {
        let removed = self.store.clear(entry_type);
        tracing::info!("Cleared {} entries", removed);
        removed
    }

    // ==========================================
    // Search
    // ==========================================

    pub fn keyword_search(
        &self,
        keyword: &str,
        type_filter: Option<&str>,
    ) -> ServiceResult<Vec<MemoryEntry>> {
        Ok(self.retriever.keyword_search(keyword, type_filter)?)
    }

    pub fn regex_search(
        &self,
        pattern: &str,
        type_filter: Option<&str>,
    ) -> ServiceResult<Vec<MemoryEntry>> {
        Ok(self.retriever.regex_search(pattern, type_filter)?)
    }

    pub fn metadata_search(&self, key: &str, value: &Value) -> Vec<MemoryEntry> {
        self.retriever.related_entries(key, value)
    }

    pub fn metadata_value_search(&self, key: &str, needle: &str, limit: usize) -> Vec<MemoryEntry> {
        let mut entries = self.store.search_by_metadata_substring(key, needle);
        entries.truncate(limit);
        entries
    }

    pub fn semantic_search(
        &self,
        query: &str,
        top_n: usize,
        type_filter: Option<&str>,
    ) -> Vec<MemoryEntry> {
        self.retriever.semantic_search(query, top_n, type_filter)
    }

    // ==========================================
    // Summaries
    // ==========================================

    pub fn counts_by_type(&self) -> BTreeMap<String, usize> {
        self.retriever.counts_by_type()
    }

    pub fn stats(&self) -> Value {
        self.store.stats()
    }

    pub fn events_summary(&self, n: usize) -> String {
        self.retriever.summarize_recent_events(n)
    }

    pub fn patterns(&self, window_days: i64) -> Vec<PatternGroup> {
        self.retriever.find_patterns_in_events(window_days)
    }

    pub fn project_decisions(&self, project_name: &str) -> Vec<MemoryEntry> {
        self.retriever.decision_history_for_project(project_name)
    }

    // ==========================================
    // Reflection
    // ==========================================

    /// Run a reflection cycle; `None` when no insight was produced
    pub fn trigger_reflection(&self, force: bool) -> Option<String> {
        self.scheduler.run_cycle(force)
    }

    pub fn reflect_on_topic(&self, topic: &str) -> String {
        self.reflector.trigger_reflection_on_topic(topic)
    }

    /// Report a named event; important events force a reflection cycle
    pub fn notify_event(&self, event_type: &str) -> Option<String> {
        self.scheduler.handle_event(event_type)
    }
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new(&AlmanacConfig::default())
    }
}

fn parse_id(id: &str) -> ServiceResult<EntryId> {
    Ok(id.parse::<EntryId>().map_err(MemoryError::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> MemoryService {
        let mut config = AlmanacConfig::default();
        config.scheduler.seed = Some(7);
        MemoryService::new(&config)
    }

    fn meta(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("metadata must be an object"),
        }
    }

    #[test]
    fn test_create_event_keeps_metadata() {
        let svc = service();
        let entry = svc
            .create_entry("event", "Morning run".into(), meta(json!({"category": "health"})))
            .unwrap();
        assert_eq!(entry.entry_type, "event");
        assert_eq!(entry.metadata["category"], json!("health"));
        assert_eq!(svc.store().count(None), 1);
    }

    #[test]
    fn test_create_insight_defaults_source() {
        let svc = service();
        let entry = svc
            .create_entry("insight", "Mornings are productive".into(), Metadata::new())
            .unwrap();
        assert_eq!(entry.metadata["source"], json!(MANUAL_SOURCE));

        let entry = svc
            .create_entry(
                "insight",
                "Sleep matters".into(),
                meta(json!({"source": "activity_analysis"})),
            )
            .unwrap();
        assert_eq!(entry.metadata["source"], json!("activity_analysis"));
    }

    #[test]
    fn test_create_project_defaults_name() {
        let svc = service();
        let entry = svc
            .create_entry("project", "Something new".into(), Metadata::new())
            .unwrap();
        assert_eq!(entry.metadata["project_name"], json!(UNNAMED_PROJECT));
    }

    #[test]
    fn test_create_decision_gets_decision_fields() {
        let svc = service();
        let entry = svc
            .create_entry("decision", "Move standup to 10am".into(), Metadata::new())
            .unwrap();
        assert_eq!(entry.metadata["decision_type"], json!("system"));
        assert!(entry.metadata.contains_key("decision_time"));
    }

    #[test]
    fn test_create_error_reads_severity() {
        let svc = service();
        let entry = svc
            .create_entry("error", "Sync failed".into(), meta(json!({"severity": "Critical"})))
            .unwrap();
        assert_eq!(entry.metadata["severity"], json!("critical"));
        assert!(entry.metadata.contains_key("error_time"));

        let err = svc
            .create_entry("error", "Sync failed".into(), meta(json!({"severity": "loud"})))
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParams(_)));
    }

    #[test]
    fn test_create_custom_type() {
        let svc = service();
        let entry = svc
            .create_entry("mood", "Feeling rested".into(), Metadata::new())
            .unwrap();
        assert_eq!(entry.entry_type, "mood");
        assert_eq!(svc.entries_by_type("mood", 10).len(), 1);
    }

    #[test]
    fn test_create_rejects_empty_content_and_type() {
        let svc = service();
        assert!(svc.create_entry("event", String::new(), Metadata::new()).is_err());
        assert!(svc.create_entry("", "text".into(), Metadata::new()).is_err());
        assert_eq!(svc.store().count(None), 0);
    }

    #[test]
    fn test_malformed_id_is_rejected() {
        let svc = service();
        let err = svc.get_entry("not-a-uuid").unwrap_err();
        assert!(matches!(err, ServiceError::Memory(ref e) if e.is_validation()));
    }

    #[test]
    fn test_unknown_id_is_absent() {
        let svc = service();
        let id = EntryId::new().to_string();
        assert!(svc.get_entry(&id).unwrap().is_none());
        assert!(!svc.update_entry(&id, Some("x".into()), None).unwrap());
        assert!(!svc.delete_entry(&id).unwrap());
    }

    #[test]
    fn test_update_and_delete_round() {
        let svc = service();
        let entry = svc
            .create_entry("event", "Walked the dog".into(), Metadata::new())
            .unwrap();
        let id = entry.id.to_string();

        assert!(svc
            .update_entry(&id, Some("Walked the dog twice".into()), None)
            .unwrap());
        assert_eq!(
            svc.get_entry(&id).unwrap().unwrap().content,
            "Walked the dog twice"
        );
        assert!(svc.delete_entry(&id).unwrap());
        assert!(svc.get_entry(&id).unwrap().is_none());
    }

    #[test]
    fn test_entries_by_type_newest_first_with_limit() {
        let svc = service();
        let base = chrono::Utc::now();
        for i in 0..3 {
            svc.store()
                .store(NewEntry::event(format!("event {}", i)).at(base + chrono::Duration::minutes(i)))
                .unwrap();
        }
        let entries = svc.entries_by_type("event", 2);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, "event 2");
        assert_eq!(entries[1].content, "event 1");
    }

    #[test]
    fn test_entries_by_type_tie_keeps_insertion_order() {
        let svc = service();
        let at = chrono::Utc::now();
        for label in ["first", "second"] {
            svc.store().store(NewEntry::event(label).at(at)).unwrap();
        }
        let entries: Vec<_> = svc
            .entries_by_type("event", 2)
            .into_iter()
            .map(|e| e.content)
            .collect();
        assert_eq!(entries, vec!["first", "second"]);
    }

    #[test]
    fn test_create_dispatches_on_entry_kind() {
        let svc = service();
        for (tag, kind) in [
            ("event", EntryKind::Event),
            ("decision", EntryKind::Decision),
            ("insight", EntryKind::Insight),
            ("project", EntryKind::Project),
            ("error", EntryKind::Error),
            ("habit", EntryKind::Custom("habit".to_string())),
        ] {
            let entry = svc
                .create_entry(tag, format!("{} entry", tag), Metadata::new())
                .unwrap();
            assert_eq!(EntryKind::from_tag(&entry.entry_type), kind);
        }
        assert_eq!(svc.store().count(None), 6);
    }

    #[test]
    fn test_metadata_value_search_limit() {
        let svc = service();
        for activity in ["gym", "gymnastics", "yoga"] {
            svc.create_entry(
                "event",
                format!("Did {}", activity),
                meta(json!({"activity": activity})),
            )
            .unwrap();
        }
        assert_eq!(svc.metadata_value_search("activity", "gym", 10).len(), 2);
        assert_eq!(svc.metadata_value_search("activity", "gym", 1).len(), 1);
    }

    #[test]
    fn test_trigger_reflection_forced() {
        let svc = service();
        assert!(svc.trigger_reflection(true).is_none());

        for i in 0..5 {
            svc.create_entry("event", format!("event {}", i), Metadata::new())
                .unwrap();
        }
        assert!(svc.trigger_reflection(true).is_some());
        assert_eq!(svc.store().count(Some("insight")), 1);
    }

    #[test]
    fn test_reflect_on_topic_always_answers() {
        let svc = service();
        let prompt = svc.reflect_on_topic("balance");
        assert!(!prompt.is_empty());
        assert_eq!(svc.insights(10).len(), 1);
    }

    #[test]
    fn test_notify_important_event() {
        let svc = service();
        for i in 0..5 {
            svc.create_entry("event", format!("event {}", i), Metadata::new())
                .unwrap();
        }
        assert!(svc.notify_event("goal_achieved").is_some());
        assert!(svc.notify_event("user_input").is_none());
    }
}
