//! Reflection engine
//!
//! [`MemoryReflector`] runs a fixed, priority-ordered pipeline of heuristic
//! strategies over stored entries and turns the first pattern it finds into a
//! reflective prompt. Every prompt is written back as an `insight` entry, so
//! later cycles see their own output.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::sync::Arc;

use crate::entry::{value_text, MemoryEntry, NewEntry, Severity};
use crate::error::{MemoryError, Result};
use crate::retrieval::MemoryRetriever;
use crate::storage::MemoryStore;

/// `source` metadata on insights written by the reflector
pub const REFLECTOR_SOURCE: &str = "memory_reflector";

/// Words after which decision text is taken as the decision's topic
const TOPIC_CONNECTORS: [&str; 5] = ["about", "on", "regarding", "for", "to"];

/// Maximum span, in days, for repeated decisions on one topic
const TOPIC_SPAN_DAYS: i64 = 7;

/// Generic prompts used when no strategy finds a pattern
pub const FALLBACK_PROMPTS: [&str; 5] = [
    "Looking at your recent activities, are there any patterns that surprise you? \
     What might these patterns reveal about your current priorities?",
    "If you were to categorize your recent decisions, what themes would emerge? \
     Do these themes align with your long-term goals?",
    "How would you describe the balance between reactive and proactive decisions \
     in your recent activities? Is this balance serving you well?",
    "When you consider your current projects and commitments, which ones energize you? \
     Which ones deplete your energy? What might this tell you?",
    "What areas of your life or work have received less attention recently? \
     Is this a conscious choice or an unintended consequence of other priorities?",
];

/// Prompt pools for user-requested reflections, matched by keyword
pub const TOPIC_PROMPTS: [(&str, [&str; 3]); 5] = [
    (
        "time",
        [
            "How effectively do you feel you're allocating your time across different areas of your life?",
            "Are there activities that consume your time but don't provide proportional value?",
            "In what ways could you restructure your time to better align with your priorities?",
        ],
    ),
    (
        "projects",
        [
            "Which of your current projects is most aligned with your long-term vision?",
            "Are there projects you should consider delegating or eliminating?",
            "What criteria should you use to evaluate new project opportunities going forward?",
        ],
    ),
    (
        "balance",
        [
            "How would you describe the current balance between work, personal time, and rest?",
            "What areas of your life feel undernourished or over-extended?",
            "What small adjustments might create a more sustainable balance for you?",
        ],
    ),
    (
        "priorities",
        [
            "If you could only focus on three priorities for the next month, what would they be?",
            "Are your stated priorities aligned with how you actually spend your time and energy?",
            "What current commitments might you need to respectfully disengage from to honor your true priorities?",
        ],
    ),
    (
        "decisions",
        [
            "What decision-making patterns have served you well recently?",
            "Are there decisions you've been postponing that are creating friction in your progress?",
            "How might you improve your decision-making process for important choices?",
        ],
    ),
];

/// Prompt for topics that match no keyword
pub const GENERAL_TOPIC_PROMPT: &str =
    "What patterns or insights can you identify when you reflect on this area of your life and work?";

/// Named thresholds for the reflection pipeline
#[derive(Debug, Clone)]
pub struct ReflectionThresholds {
    /// Minimum projects before comparing them (default: 3)
    pub project_count: usize,
    /// Number of recent decisions analyzed together (default: 5)
    pub decision_sequence: usize,
    /// Minimum events in a pattern group (default: 3)
    pub event_pattern_threshold: usize,
    /// Minimum time between automatic reflections (default: 24h)
    pub reflection_interval: Duration,
    /// Minimum stored entries for any reflection (default: 5)
    pub min_entries: usize,
    /// Minimum errors in the error window (default: 3)
    pub min_errors: usize,
    /// Look-back for event patterns (default: 14 days)
    pub event_window_days: i64,
    /// Look-back for errors (default: 7 days)
    pub error_window_days: i64,
    /// Look-back for time allocation (default: 30 days)
    pub time_window_days: i64,
    /// Minimum recorded minutes for time allocation (default: 60)
    pub min_recorded_minutes: f64,
}

impl Default for ReflectionThresholds {
    fn default() -> Self {
        Self {
            project_count: 3,
            decision_sequence: 5,
            event_pattern_threshold: 3,
            reflection_interval: Duration::hours(24),
            min_entries: 5,
            min_errors: 3,
            event_window_days: 14,
            error_window_days: 7,
            time_window_days: 30,
            min_recorded_minutes: 60.0,
        }
    }
}

/// Reflection strategies in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ProjectPatterns,
    DecisionSequences,
    EventPatterns,
    RecentErrors,
    TimeAllocation,
}

impl Strategy {
    /// Evaluation order; the first strategy yielding a prompt wins
    pub const PIPELINE: [Strategy; 5] = [
        Strategy::ProjectPatterns,
        Strategy::DecisionSequences,
        Strategy::EventPatterns,
        Strategy::RecentErrors,
        Strategy::TimeAllocation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ProjectPatterns => "project_patterns",
            Self::DecisionSequences => "decision_sequences",
            Self::EventPatterns => "event_patterns",
            Self::RecentErrors => "recent_errors",
            Self::TimeAllocation => "time_allocation",
        }
    }
}

struct ReflectionState {
    last_time: Option<DateTime<Utc>>,
    last_topic: Option<String>,
    rng: StdRng,
}

/// Pattern-driven reflection over the memory log
///
/// Holding the state lock for a whole cycle serializes concurrent callers,
/// so a manual trigger racing the scheduler cannot write duplicate insights.
pub struct MemoryReflector {
    store: Arc<MemoryStore>,
    retriever: MemoryRetriever,
    thresholds: ReflectionThresholds,
    state: Mutex<ReflectionState>,
}

impl MemoryReflector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            retriever: MemoryRetriever::new(Arc::clone(&store)),
            store,
            thresholds: ReflectionThresholds::default(),
            state: Mutex::new(ReflectionState {
                last_time: None,
                last_topic: None,
                rng: StdRng::from_entropy(),
            }),
        }
    }

    pub fn with_thresholds(mut self, thresholds: ReflectionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Make prompt selection reproducible
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(self, rng: StdRng) -> Self {
        self.state.lock().rng = rng;
        self
    }

    pub fn thresholds(&self) -> &ReflectionThresholds {
        &self.thresholds
    }

    pub fn retriever(&self) -> &MemoryRetriever {
        &self.retriever
    }

    /// Time and 50-character topic of the last automatic reflection
    pub fn last_reflection(&self) -> Option<(DateTime<Utc>, String)> {
        let state = self.state.lock();
        state.last_time.zip(state.last_topic.clone())
    }

    /// Rate-limited automatic reflection
    pub fn analyze_and_respond(&self) -> Option<String> {
        self.reflect(false)
    }

    /// Run one reflection cycle
    ///
    /// `force` bypasses the reflection interval; the minimum sample size
    /// always applies.
    pub fn reflect(&self, force: bool) -> Option<String> {
        let mut state = self.state.lock();

        if !force {
            if let Some(last) = state.last_time {
                if Utc::now() - last < self.thresholds.reflection_interval {
                    log::debug!("Skipping reflection: last one was at {}", last);
                    return None;
                }
            }
        }

        let total = self.store.count(None);
        if total < self.thresholds.min_entries {
            log::debug!("Skipping reflection: only {} entries stored", total);
            return None;
        }

        let prompt = Strategy::PIPELINE
            .iter()
            .find_map(|strategy| self.run_strategy(*strategy))
            .unwrap_or_else(|| pick(&mut state.rng, &FALLBACK_PROMPTS).to_string());

        state.last_time = Some(Utc::now());
        state.last_topic = Some(prompt.chars().take(50).collect());

        let insight = NewEntry::insight(format!("Reflection initiated: {}", prompt), Some(REFLECTOR_SOURCE))
            .meta("reflection_type", "automatic")
            .meta("full_prompt", prompt.clone());
        if let Err(e) = self.store.store(insight) {
            log::warn!("Failed to record reflection insight: {}", e);
        }

        log::info!("Reflection generated: {}", snippet(&prompt, 50));
        Some(prompt)
    }

    /// Evaluate one strategy, logging and swallowing its faults
    fn run_strategy(&self, strategy: Strategy) -> Option<String> {
        match self.evaluate(strategy) {
            Ok(prompt) => prompt,
            Err(e) => {
                log::warn!("Reflection strategy {} failed: {}", strategy.name(), e);
                None
            }
        }
    }

    /// Evaluate a single strategy against the current store contents
    pub fn evaluate(&self, strategy: Strategy) -> Result<Option<String>> {
        match strategy {
            Strategy::ProjectPatterns => self.project_patterns(),
            Strategy::DecisionSequences => self.decision_sequences(),
            Strategy::EventPatterns => Ok(self.event_patterns()),
            Strategy::RecentErrors => Ok(self.recent_errors()),
            Strategy::TimeAllocation => Ok(self.time_allocation()),
        }
    }

    fn project_patterns(&self) -> Result<Option<String>> {
        let projects = self.store.retrieve_by_type("project");
        let min = self.thresholds.project_count;
        if projects.len() < min {
            return Ok(None);
        }

        let by_priority = tally(&projects, "priority");
        let by_category = tally(&projects, "category");

        // first-seen value wins ties
        let mut dominant: Option<&(String, usize)> = None;
        for group in &by_priority {
            if dominant.map_or(true, |d| group.1 > d.1) {
                dominant = Some(group);
            }
        }
        if let Some((priority, count)) = dominant {
            let percentage = *count as f64 / projects.len() as f64 * 100.0;
            if *count >= min && percentage > 70.0 {
                return Ok(Some(format!(
                    "I notice that {:.0}% of your projects are marked as '{}' priority. \
                     Is this an accurate reflection of your true priorities, or should some projects be reconsidered? \
                     How might this affect your ability to distinguish between what's truly important?",
                    percentage, priority
                )));
            }
        }

        if by_category.len() >= 2 {
            let mut sorted = by_category;
            sorted.sort_by(|a, b| b.1.cmp(&a.1));
            let (top, top_count) = &sorted[0];
            let (bottom, bottom_count) = &sorted[sorted.len() - 1];
            if *top_count >= 3 && *top_count >= bottom_count * 3 {
                return Ok(Some(format!(
                    "I've observed that you have {} projects in the '{}' category, but only {} in '{}'. \
                     Does this distribution align with your life goals and values? \
                     Would more balance between categories benefit your overall wellbeing?",
                    top_count, top, bottom_count, bottom
                )));
            }
        }

        Ok(None)
    }

    fn decision_sequences(&self) -> Result<Option<String>> {
        let window = self.thresholds.decision_sequence;
        let decisions = self.retriever.recent_decisions(window);
        if decisions.is_empty() || decisions.len() < window {
            return Ok(None);
        }

        let mut confidences = Vec::new();
        for decision in &decisions {
            match decision.metadata.get("confidence") {
                None | Some(Value::Null) => {}
                Some(value) => confidences.push(as_number(value).ok_or_else(|| {
                    MemoryError::analysis(format!(
                        "decision {} has non-numeric confidence {}",
                        decision.id, value
                    ))
                })?),
            }
        }

        if !confidences.is_empty() {
            let average = confidences.iter().sum::<f64>() / confidences.len() as f64;
            if average > 0.9 {
                return Ok(Some(format!(
                    "I notice your recent decisions have had very high confidence levels (averaging {:.2}). \
                     While confidence is good, are you perhaps not challenging yourself with more difficult decisions? \
                     Are there areas where calculated risk-taking might yield better long-term outcomes?",
                    average
                )));
            }
            if average < 0.6 {
                return Ok(Some(format!(
                    "Your recent decisions appear to have lower confidence levels (averaging {:.2}). \
                     What additional information or expertise might help increase your confidence? \
                     Are there patterns in the types of decisions where you feel less certain?",
                    average
                )));
            }
        }

        // decisions are newest first, so each topic's list is too
        let mut topics: Vec<(String, Vec<&MemoryEntry>)> = Vec::new();
        for decision in &decisions {
            for topic in extract_topics(&decision.content) {
                match topics.iter_mut().find(|(t, _)| *t == topic) {
                    Some((_, group)) => group.push(decision),
                    None => topics.push((topic, vec![decision])),
                }
            }
        }

        for (topic, group) in &topics {
            let (Some(newest), Some(oldest)) = (group.first(), group.last()) else {
                continue;
            };
            if group.len() < 2 {
                continue;
            }
            let span = (newest.timestamp - oldest.timestamp).num_days();
            if span <= TOPIC_SPAN_DAYS {
                return Ok(Some(format!(
                    "I notice you've made {} decisions about '{}' within {} days. \
                     Are you refining your approach as you learn, or perhaps reconsidering earlier decisions? \
                     What additional context or information has influenced these adjustments?",
                    group.len(),
                    topic,
                    span
                )));
            }
        }

        Ok(None)
    }

    fn event_patterns(&self) -> Option<String> {
        let patterns = self
            .retriever
            .find_patterns_in_events(self.thresholds.event_window_days);

        let pattern = patterns
            .iter()
            .find(|p| p.count >= self.thresholds.event_pattern_threshold)?;
        let example = pattern.examples.first().map(String::as_str).unwrap_or_default();
        Some(format!(
            "I've noticed a pattern of {} events related to '{}' in your recent activities. \
             For example: '{}'. How does this pattern align with your current goals and priorities? \
             Is this distribution of attention intentional or emergent?",
            pattern.count,
            value_text(&pattern.pattern_value),
            example
        ))
    }

    fn recent_errors(&self) -> Option<String> {
        let errors = self.retriever.recent_errors(self.thresholds.error_window_days);
        if errors.len() < self.thresholds.min_errors {
            return None;
        }

        let mut most_severe = errors.first()?;
        for error in &errors[1..] {
            if severity_rank(error) > severity_rank(most_severe) {
                most_severe = error;
            }
        }
        let severity = most_severe
            .metadata_text("severity")
            .unwrap_or_else(|| Severity::Info.as_str().to_string());

        Some(format!(
            "I noticed {} error events logged in the last week. \
             The most severe was '{}': '{}'. \
             What actions could help avoid similar issues?",
            errors.len(),
            severity,
            most_severe.content
        ))
    }

    fn time_allocation(&self) -> Option<String> {
        let entries = self
            .retriever
            .entries_in_last_days(self.thresholds.time_window_days, None);

        let mut minutes_by_category: Vec<(String, f64)> = Vec::new();
        let mut total = 0.0;
        for entry in &entries {
            let duration = ["duration_minutes", "time_spent"]
                .iter()
                .filter_map(|key| entry.metadata.get(*key))
                .find(|v| truthy(v));
            let category = entry.metadata.get("category").filter(|v| truthy(v));
            let (Some(duration), Some(category)) = (duration, category) else {
                continue;
            };
            let Some(minutes) = as_number(duration) else {
                continue;
            };

            let category = value_text(category);
            match minutes_by_category.iter_mut().find(|(c, _)| *c == category) {
                Some((_, sum)) => *sum += minutes,
                None => minutes_by_category.push((category, minutes)),
            }
            total += minutes;
        }

        if minutes_by_category.len() < 2 || total < self.thresholds.min_recorded_minutes {
            return None;
        }

        minutes_by_category
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let (top, top_minutes) = &minutes_by_category[0];
        let (bottom, bottom_minutes) = &minutes_by_category[minutes_by_category.len() - 1];
        let top_share = top_minutes / total * 100.0;
        let bottom_share = bottom_minutes / total * 100.0;

        (top_share > 50.0).then(|| {
            format!(
                "I notice that {:.1}% of your recorded time is spent on '{}' activities, \
                 while only {:.1}% goes to '{}'. Does this allocation reflect your ideal balance? \
                 Are there areas that might benefit from more attention or less focus?",
                top_share, top, bottom_share, bottom
            )
        })
    }

    /// User-requested reflection on a topic; never rate limited
    pub fn trigger_reflection_on_topic(&self, topic: &str) -> String {
        let mut state = self.state.lock();
        let lowered = topic.to_lowercase();

        let (prompt, content, topic_key) = match TOPIC_PROMPTS
            .iter()
            .find(|(key, _)| lowered.contains(key))
        {
            Some((key, pool)) => {
                let prompt = pick(&mut state.rng, pool).to_string();
                let content = format!("Manual reflection on {}: {}", key, prompt);
                (prompt, content, key.to_string())
            }
            None => (
                GENERAL_TOPIC_PROMPT.to_string(),
                format!("Manual reflection on unspecified topic: {}", GENERAL_TOPIC_PROMPT),
                topic.to_string(),
            ),
        };

        let insight = NewEntry::insight(content, Some(REFLECTOR_SOURCE))
            .meta("reflection_type", "manual")
            .meta("topic", topic_key)
            .meta("full_prompt", prompt.clone());
        if let Err(e) = self.store.store(insight) {
            log::warn!("Failed to record manual reflection: {}", e);
        }

        prompt
    }
}

/// Count entries per metadata value at `key`, in first-seen order
fn tally(entries: &[MemoryEntry], key: &str) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for entry in entries {
        let Some(value) = entry.metadata.get(key).filter(|v| truthy(v)) else {
            continue;
        };
        let value = value_text(value);
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }
    counts
}

/// Topics named after connector words, in connector order
fn extract_topics(content: &str) -> Vec<String> {
    let lowered = content.to_lowercase();
    TOPIC_CONNECTORS
        .iter()
        .filter_map(|connector| {
            let separator = format!(" {} ", connector);
            let after = lowered.split(separator.as_str()).nth(1)?;
            let topic = after.split('.').next().unwrap_or_default();
            Some(topic.trim().to_string())
        })
        .collect()
}

fn severity_rank(entry: &MemoryEntry) -> u8 {
    entry
        .metadata_text("severity")
        .and_then(|s| Severity::parse(&s))
        .unwrap_or_default()
        .rank()
}

/// Numeric reading of a metadata value; numeric strings are accepted
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Empty strings, zero, false and null count as absent
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn pick<'a>(rng: &mut StdRng, pool: &[&'a str]) -> &'a str {
    pool[rng.gen_range(0..pool.len())]
}

fn snippet(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}
