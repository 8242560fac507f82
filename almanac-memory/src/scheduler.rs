//! Periodic and event-driven reflection cycles
//!
//! [`ReflectionScheduler`] decides when the reflector runs. Unforced cycles
//! respect a minimum interval and a probability that grows with the size of
//! the memory log; forced cycles (manual triggers, important events) always
//! run. The periodic loop is a tokio task stopped through a
//! [`CancellationToken`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::entry::NewEntry;
use crate::hooks::EventHooks;
use crate::reflection::MemoryReflector;
use crate::storage::MemoryStore;

/// Content of the event logged after every cycle
pub const CYCLE_COMPLETED: &str = "Reflection cycle completed";

/// Events that force an immediate reflection cycle
pub const IMPORTANT_EVENTS: [&str; 4] = [
    "project_completed",
    "goal_achieved",
    "major_decision",
    "crisis_point",
];

/// Scheduler timing configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between periodic cycles before jitter (default: 6h)
    pub interval: Duration,
    /// Random variation of the interval, in percent (default: 10)
    pub jitter_percent: f64,
    /// Minimum time between unforced cycles (default: 6h)
    pub min_interval: chrono::Duration,
    /// Event types that force a cycle
    pub important_events: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6 * 3600),
            jitter_percent: 10.0,
            min_interval: chrono::Duration::hours(6),
            important_events: IMPORTANT_EVENTS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

struct SchedulerState {
    last_cycle: Option<DateTime<Utc>>,
    rng: StdRng,
}

/// Drives the reflector on a timer and on named events
pub struct ReflectionScheduler {
    reflector: Arc<MemoryReflector>,
    store: Arc<MemoryStore>,
    hooks: EventHooks,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl ReflectionScheduler {
    pub fn new(reflector: Arc<MemoryReflector>, store: Arc<MemoryStore>) -> Self {
        Self {
            reflector,
            store,
            hooks: EventHooks::new(),
            config: SchedulerConfig::default(),
            state: Mutex::new(SchedulerState {
                last_cycle: None,
                rng: StdRng::from_entropy(),
            }),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Make gating and jitter reproducible
    pub fn with_seed(self, seed: u64) -> Self {
        self.state.lock().rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn hooks(&self) -> &EventHooks {
        &self.hooks
    }

    pub fn reflector(&self) -> &Arc<MemoryReflector> {
        &self.reflector
    }

    pub fn last_cycle(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_cycle
    }

    /// Gate for unforced cycles
    fn should_run(&self) -> bool {
        let mut state = self.state.lock();
        let Some(last) = state.last_cycle else {
            return true;
        };
        if Utc::now() - last < self.config.min_interval {
            return false;
        }
        let chance = reflection_chance(self.store.count(None));
        state.rng.gen::<f64>() < chance
    }

    /// Run one reflection cycle and log its outcome as an event
    pub fn run_cycle(&self, force: bool) -> Option<String> {
        if !force && !self.should_run() {
            log::info!("Skipping reflection cycle - too soon since last reflection");
            return None;
        }

        log::info!("Running reflection cycle (forced: {})", force);
        let reflection = self.reflector.reflect(force);
        self.state.lock().last_cycle = Some(Utc::now());

        let trigger = if force { "forced" } else { "scheduled" };
        let mut event = NewEntry::event(CYCLE_COMPLETED)
            .meta("reflection_generated", reflection.is_some())
            .meta("trigger_type", trigger);
        match &reflection {
            Some(prompt) => {
                log::info!("Reflection generated: {}...", truncate(prompt, 50));
                event = event.meta("reflection_snippet", truncate(prompt, 100));
            }
            None => log::info!("Reflection cycle completed, but no reflection was generated"),
        }
        if let Err(e) = self.store.store(event) {
            log::warn!("Failed to log reflection cycle: {}", e);
        }

        reflection
    }

    /// Dispatch an event to registered handlers; important events force a cycle
    pub fn handle_event(&self, event_type: &str) -> Option<String> {
        log::info!("Event occurred: {}", event_type);
        self.hooks.dispatch(event_type);

        if self.config.important_events.iter().any(|e| e == event_type) {
            log::info!("Important event {} triggering reflection cycle", event_type);
            return self.run_cycle(true);
        }
        None
    }

    /// Interval with jitter applied
    pub fn next_delay(&self) -> Duration {
        let spread = (self.config.jitter_percent / 100.0).abs();
        if spread == 0.0 {
            return self.config.interval;
        }
        let factor = 1.0 + self.state.lock().rng.gen_range(-spread..=spread);
        self.config.interval.mul_f64(factor.max(0.0))
    }

    /// Start the periodic loop; it exits once `token` is cancelled
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            log::info!(
                "Starting periodic reflection scheduler (every ~{:.2} hours)",
                self.config.interval.as_secs_f64() / 3600.0
            );

            while !token.is_cancelled() {
                // a failed cycle only logs; the loop keeps going
                self.run_cycle(false);

                let delay = self.next_delay();
                log::info!("Next reflection in {:.2} hours", delay.as_secs_f64() / 3600.0);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            log::info!("Reflection scheduler stopped");
        })
    }
}

/// Chance an unforced cycle runs once the interval has passed
pub fn reflection_chance(entry_count: usize) -> f64 {
    (0.2 + entry_count as f64 / 100.0).min(0.8)
}

fn truncate(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}
