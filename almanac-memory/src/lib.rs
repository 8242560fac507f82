//! Almanac Memory Layer
//!
//! Episodic memory for the Almanac life-management backend: a concurrent,
//! in-process log of typed entries, query helpers over it, and a reflection
//! engine that writes its own insights back into the log.
//!
//! ## Features
//!
//! - **Synchronized indices** - id, type and embedding indices updated under one lock
//! - **Hashed semantic search** - deterministic bag-of-words vectors with cosine ranking
//! - **Pattern mining** - time-windowed grouping of events by metadata signature
//! - **Reflection pipeline** - ordered heuristic strategies producing reflective prompts
//! - **Scheduling** - cancellable periodic cycles plus event-triggered reflection
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use almanac_memory::{MemoryReflector, MemoryStore, NewEntry};
//!
//! let store = Arc::new(MemoryStore::default());
//! store.store(NewEntry::project("Started machine learning project", "ML"))?;
//! store.store(NewEntry::event("Went grocery shopping"))?;
//!
//! let hits = store.search_by_similarity("ML project", 1);
//! assert_eq!(hits[0].content, "Started machine learning project");
//!
//! let reflector = MemoryReflector::new(Arc::clone(&store));
//! let prompt = reflector.trigger_reflection_on_topic("priorities");
//! assert!(!prompt.is_empty());
//! # Ok::<(), almanac_memory::MemoryError>(())
//! ```

pub mod embedding;
pub mod entry;
pub mod error;
pub mod hooks;
pub mod reflection;
pub mod retrieval;
pub mod scheduler;
pub mod storage;
pub mod timeframe;

// Re-exports for convenience
pub use embedding::VectorEngine;
pub use entry::{EntryId, EntryKind, MemoryEntry, Metadata, NewEntry, Severity};
pub use error::{MemoryError, Result};
pub use hooks::{EventHandler, EventHooks};
pub use reflection::{MemoryReflector, ReflectionThresholds, Strategy};
pub use retrieval::{MemoryRetriever, PatternGroup};
pub use scheduler::{ReflectionScheduler, SchedulerConfig};
pub use storage::MemoryStore;
pub use timeframe::TimeWindow;
