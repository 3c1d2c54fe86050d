//! Forge Memory - agent memory log
//!
//! Append-only event log per `(user, conversation)` that serves both as the
//! audit trail of pipeline runs and as the source of the prompt context fed
//! to later language stages.
//!
//! - [`MemoryLog`]: tiered read-through / write-through access
//! - [`PersistenceQueue`]: supervised background durable writes
//! - [`projector::project`]: bounded, deterministic prompt context
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_memory::{ActionEvent, MemoryKey, MemoryLog, MessageRole};
//!
//! # async fn example() -> Result<(), forge_memory::MemoryError> {
//! let log = MemoryLog::in_memory();
//! let key = MemoryKey::new("user-1", "conv-1");
//! log.append(&key, ActionEvent::message("a brass lamp", MessageRole::User)).await?;
//! let context = log.prompt_context(&key).await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod log;
pub mod persist;
pub mod projector;
pub mod record;

pub use backend::{InMemoryMemoryStore, MemoryCache, MemoryStore, MokaMemoryCache};
pub use config::MemoryConfig;
pub use error::MemoryError;
pub use event::{
    ActionEvent, EventKind, MessagePayload, MessageRole, COMPLETED_TOOL_PREFIX, ERROR_TOOL_PREFIX,
    MESSAGE_ACTION,
};
pub use log::{DurableWrite, MemoryLog, SaveReport, SweepReport};
pub use persist::{
    DurableWriteMode, PendingWrite, PersistenceFailure, PersistenceQueue, PersistenceSupervisor,
};
pub use projector::{project, CONTEXT_END, CONTEXT_START, MAX_MESSAGES, TOOL_RESULT_LIMIT};
pub use record::{
    decode_events, EventEncoding, MemoryKey, MemoryRecord, StoredMemory, DEFAULT_MEMORY_TTL_DAYS,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
