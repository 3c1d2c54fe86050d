//! Memory records and their stored form
//!
//! A [`MemoryRecord`] is the ordered event list for one
//! `(user, conversation)` pair. Backends persist it as a [`StoredMemory`]:
//! the serialized event list plus timestamps, nothing more.

use crate::error::MemoryError;
use crate::event::ActionEvent;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default record lifetime
pub const DEFAULT_MEMORY_TTL_DAYS: i64 = 30;

/// Composite key identifying a memory record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryKey {
    /// Owning user
    pub user_id: String,
    /// Conversation within the user's history
    pub conversation_id: String,
}

impl MemoryKey {
    /// Create key
    #[inline]
    #[must_use]
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl fmt::Display for MemoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.conversation_id)
    }
}

/// Append-only event list for one key
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    /// Record identity
    pub key: MemoryKey,
    /// Events in insertion order
    pub events: Vec<ActionEvent>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time; swept by `MemoryLog::delete_expired`
    pub expires_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create empty record expiring `ttl` after `now`
    #[must_use]
    pub fn new(key: MemoryKey, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key,
            events: Vec::new(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if expired at `now`
    #[inline]
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Last event, if any
    #[inline]
    #[must_use]
    pub fn last_event(&self) -> Option<&ActionEvent> {
        self.events.last()
    }

    /// Serialize into the stored form
    ///
    /// # Errors
    /// `MemoryError::Serialization` if an event payload cannot be encoded.
    pub fn to_stored(&self) -> Result<StoredMemory, MemoryError> {
        Ok(StoredMemory {
            user_id: self.key.user_id.clone(),
            conversation_id: self.key.conversation_id.clone(),
            content: serde_json::to_string(&self.events)?,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }

    /// Rebuild from the stored form, recovering what can be recovered
    #[must_use]
    pub fn from_stored(stored: StoredMemory) -> Self {
        let (events, encoding) = decode_events(&stored.content);
        if encoding == EventEncoding::Unreadable {
            tracing::warn!(
                user_id = %stored.user_id,
                conversation_id = %stored.conversation_id,
                "memory content unreadable, starting from an empty event list"
            );
        }
        Self {
            key: MemoryKey::new(stored.user_id, stored.conversation_id),
            events,
            created_at: stored.created_at,
            expires_at: stored.expires_at,
        }
    }
}

/// Persisted form of a memory record
///
/// Explicit field list shared by every backend; `content` is the JSON
/// encoding of the event list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMemory {
    /// Owning user
    pub user_id: String,
    /// Conversation id
    pub conversation_id: String,
    /// Serialized event list
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
}

impl StoredMemory {
    /// Key of this record
    #[inline]
    #[must_use]
    pub fn key(&self) -> MemoryKey {
        MemoryKey::new(self.user_id.clone(), self.conversation_id.clone())
    }
}

/// How stored content was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEncoding {
    /// Empty content
    Empty,
    /// JSON array of events
    List,
    /// Legacy single-event object
    LegacySingle,
    /// Neither shape; treated as empty
    Unreadable,
}

/// Decode stored content into events
///
/// Tries the event-list encoding, then the legacy single-event encoding,
/// and otherwise yields an empty list.
#[must_use]
pub fn decode_events(content: &str) -> (Vec<ActionEvent>, EventEncoding) {
    if content.trim().is_empty() {
        return (Vec::new(), EventEncoding::Empty);
    }
    if let Ok(events) = serde_json::from_str::<Vec<ActionEvent>>(content) {
        return (events, EventEncoding::List);
    }
    if let Ok(event) = serde_json::from_str::<ActionEvent>(content) {
        return (vec![event], EventEncoding::LegacySingle);
    }
    (Vec::new(), EventEncoding::Unreadable)
}
