//! Memory log behaviour across both tiers

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use forge_memory::{
    ActionEvent, InMemoryMemoryStore, MemoryCache, MemoryConfig, MemoryError, MemoryKey,
    MemoryLog, MemoryRecord, MemoryStore, MessageRole, MokaMemoryCache, StoredMemory,
    CONTEXT_END, CONTEXT_START,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cache tier whose writes can be switched off
#[derive(Default)]
struct WriteFailingCache {
    inner: MokaMemoryCache,
    fail_puts: AtomicBool,
}

#[async_trait]
impl MemoryCache for WriteFailingCache {
    async fn get(&self, key: &MemoryKey) -> Result<Option<StoredMemory>, MemoryError> {
        self.inner.get(key).await
    }
    async fn put(&self, memory: StoredMemory) -> Result<(), MemoryError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(MemoryError::write("cache", "evicting"));
        }
        self.inner.put(memory).await
    }
    async fn remove(&self, key: &MemoryKey) -> Result<(), MemoryError> {
        self.inner.remove(key).await
    }
}

/// Durable tier that pauses a sweep between its scan and its deletes
#[derive(Default)]
struct PausingStore {
    inner: InMemoryMemoryStore,
    scanned: Notify,
    resume: Notify,
}

#[async_trait]
impl MemoryStore for PausingStore {
    async fn load(&self, key: &MemoryKey) -> Result<Option<StoredMemory>, MemoryError> {
        self.inner.load(key).await
    }
    async fn save(&self, memory: StoredMemory) -> Result<(), MemoryError> {
        self.inner.save(memory).await
    }
    async fn delete(&self, key: &MemoryKey) -> Result<bool, MemoryError> {
        self.inner.delete(key).await
    }
    async fn expired_keys(&self, now: DateTime<Utc>) -> Result<Vec<MemoryKey>, MemoryError> {
        let keys = self.inner.expired_keys(now).await?;
        self.scanned.notify_one();
        self.resume.notified().await;
        Ok(keys)
    }
}

fn actions_of(record: &MemoryRecord) -> Vec<&str> {
    record.events.iter().map(|e| e.action.as_str()).collect()
}

#[tokio::test]
async fn append_extends_existing_record() {
    let store = Arc::new(InMemoryMemoryStore::new());
    let (log, _) = MemoryLog::from_config(&MemoryConfig::default(), store.clone());
    let key = MemoryKey::new("user-1", "conv-1");

    log.append(&key, ActionEvent::message("first", MessageRole::User))
        .await
        .unwrap();
    log.append(&key, ActionEvent::message("second", MessageRole::Assistant))
        .await
        .unwrap();
    let last = ActionEvent::tool_completed("Vision", json!({"productName": "Lamp"}));
    log.append(&key, last.clone()).await.unwrap();

    let record = log.get_memory(&key).await.unwrap();
    assert_eq!(record.events.len(), 3);
    assert_eq!(record.last_event(), Some(&last));
    assert_eq!(record.events[0].data["text"], json!("first"));

    // Durable tier holds the same content.
    let stored = store.load(&key).await.unwrap().unwrap();
    assert_eq!(stored.key(), key);
    assert!(stored.expires_at > Utc::now() + Duration::days(29));
}

#[tokio::test]
async fn legacy_single_event_record_is_extended() {
    let store = Arc::new(InMemoryMemoryStore::new());
    let now = Utc::now();
    let legacy = ActionEvent::new("Message", json!({"text": "old", "isUser": true}));
    store
        .save(StoredMemory {
            user_id: "u".into(),
            conversation_id: "c".into(),
            content: serde_json::to_string(&legacy).unwrap(),
            created_at: now,
            expires_at: now + Duration::days(1),
        })
        .await
        .unwrap();

    let (log, _) = MemoryLog::from_config(&MemoryConfig::default(), store);
    let key = MemoryKey::new("u", "c");
    log.append(&key, ActionEvent::new("Started_VisionAnalysis", json!({})))
        .await
        .unwrap();

    let record = log.get_memory(&key).await.unwrap();
    let actions: Vec<&str> = record.events.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["Message", "Started_VisionAnalysis"]);
}

#[tokio::test]
async fn unreadable_record_restarts_empty() {
    let store = Arc::new(InMemoryMemoryStore::new());
    let now = Utc::now();
    store
        .save(StoredMemory {
            user_id: "u".into(),
            conversation_id: "c".into(),
            content: "not json at all".into(),
            created_at: now,
            expires_at: now + Duration::days(1),
        })
        .await
        .unwrap();

    let (log, _) = MemoryLog::from_config(&MemoryConfig::default(), store);
    let key = MemoryKey::new("u", "c");
    log.append(&key, ActionEvent::new("x", json!(1))).await.unwrap();

    let record = log.get_memory(&key).await.unwrap();
    assert_eq!(record.events.len(), 1);
}

#[tokio::test]
async fn prompt_context_wraps_rendered_events() {
    let log = MemoryLog::in_memory();
    let key = MemoryKey::new("u", "ctx");
    log.append(&key, ActionEvent::message("need a lamp", MessageRole::User))
        .await
        .unwrap();
    log.append(&key, ActionEvent::tool_errored("Scrape", "blocked"))
        .await
        .unwrap();

    let context = log.prompt_context(&key).await;
    assert_eq!(
        context,
        format!("{CONTEXT_START}\nUser: need a lamp\nTool Scrape error: blocked\n{CONTEXT_END}")
    );
}

#[tokio::test]
async fn failed_cache_write_does_not_shadow_durable_record() {
    let cache = Arc::new(WriteFailingCache::default());
    let store = Arc::new(InMemoryMemoryStore::new());
    let log = MemoryLog::new(cache.clone(), store.clone());
    let key = MemoryKey::new("u", "c");

    log.append(&key, ActionEvent::new("e1", json!(1))).await.unwrap();
    cache.fail_puts.store(true, Ordering::SeqCst);
    let report = log.append(&key, ActionEvent::new("e2", json!(2))).await.unwrap();
    assert!(!report.cache_written);
    cache.fail_puts.store(false, Ordering::SeqCst);
    log.append(&key, ActionEvent::new("e3", json!(3))).await.unwrap();

    let record = log.get_memory(&key).await.unwrap();
    assert_eq!(actions_of(&record), vec!["e1", "e2", "e3"]);

    let durable = MemoryRecord::from_stored(store.load(&key).await.unwrap().unwrap());
    assert_eq!(actions_of(&durable), vec!["e1", "e2", "e3"]);
}

#[tokio::test]
async fn sweep_keeps_record_refreshed_after_scan() {
    let store = Arc::new(PausingStore::default());
    let log = Arc::new(MemoryLog::new(
        Arc::new(MokaMemoryCache::default()),
        store.clone(),
    ));
    let key = MemoryKey::new("u", "c");
    let now = Utc::now();

    let mut stale = MemoryRecord::new(key.clone(), now - Duration::days(31), Duration::days(30));
    stale.events.push(ActionEvent::new("old", json!(null)));
    log.save_memory(&stale).await.unwrap();

    let sweep = tokio::spawn({
        let log = log.clone();
        async move { log.delete_expired(now).await }
    });
    store.scanned.notified().await;
    log.append(&key, ActionEvent::new("fresh", json!(null)))
        .await
        .unwrap();
    store.resume.notify_one();

    let report = sweep.await.unwrap();
    assert_eq!(report.examined, 1);
    assert!(report.deleted.is_empty());

    let record = log.get_memory(&key).await.unwrap();
    assert_eq!(actions_of(&record), vec!["fresh"]);
    assert!(store.inner.load(&key).await.unwrap().is_some());
}
