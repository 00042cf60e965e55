//! Per-user conversation history
//!
//! A [`HistoryStore`] is a key-value store of string lists with list-style
//! push-front, trim and range operations. [`ConversationHistory`] layers the
//! turn encoding and the length cap on top of it: every write is followed by a
//! trim, so a user's list never holds more than `max_turns` entries.
//!
//! [`InMemoryHistoryStore`] also bounds the number of keys: lists untouched
//! for longer than the idle TTL are dropped, and once the key cap is reached
//! the least recently touched list makes room for a new one.

use crate::error::{AppError, AppResult};
use crate::models::types::Turn;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default number of keys kept by [`InMemoryHistoryStore`]
pub const DEFAULT_MAX_KEYS: usize = 10_000;

/// Default idle time after which a key is dropped
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// List-valued key-value store
///
/// Each operation is atomic per key. Nothing orders a push and the following
/// trim against other writers of the same key.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert `entry` at the head of the list stored at `key`
    async fn push_front(&self, key: &str, entry: String) -> AppResult<()>;

    /// Keep only the first `len` entries of the list stored at `key`
    async fn trim(&self, key: &str, len: usize) -> AppResult<()>;

    /// Return up to `len` entries from the head of the list stored at `key`
    async fn range(&self, key: &str, len: usize) -> AppResult<Vec<String>>;
}

#[derive(Debug)]
struct StoredList {
    entries: VecDeque<String>,
    touched: Instant,
}

#[derive(Debug, Default)]
struct Lists {
    by_key: HashMap<String, StoredList>,
}

impl Lists {
    fn is_live(list: &StoredList, now: Instant, idle_ttl: Duration) -> bool {
        now.saturating_duration_since(list.touched) < idle_ttl
    }

    fn push_front(
        &mut self,
        key: &str,
        entry: String,
        now: Instant,
        max_keys: usize,
        idle_ttl: Duration,
    ) {
        if let Some(list) = self.by_key.get_mut(key)
            && Self::is_live(list, now, idle_ttl)
        {
            list.entries.push_front(entry);
            list.touched = now;
            return;
        }

        self.by_key.remove(key);
        self.evict(now, max_keys.saturating_sub(1), idle_ttl);
        self.by_key.insert(
            key.to_string(),
            StoredList {
                entries: VecDeque::from([entry]),
                touched: now,
            },
        );
    }

    /// Drop idle lists, then the least recently touched ones until at most
    /// `keep` remain
    fn evict(&mut self, now: Instant, keep: usize, idle_ttl: Duration) {
        let before = self.by_key.len();
        self.by_key
            .retain(|_, list| Self::is_live(list, now, idle_ttl));

        while self.by_key.len() > keep {
            let Some(oldest) = self
                .by_key
                .iter()
                .min_by_key(|(_, list)| list.touched)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.by_key.remove(&oldest);
        }

        let evicted = before - self.by_key.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.by_key.len(), "Evicted history keys");
        }
    }

    fn trim(&mut self, key: &str, len: usize) {
        if let Some(list) = self.by_key.get_mut(key) {
            list.entries.truncate(len);
            if list.entries.is_empty() {
                self.by_key.remove(key);
            }
        }
    }

    fn range(&self, key: &str, len: usize, now: Instant, idle_ttl: Duration) -> Vec<String> {
        self.by_key
            .get(key)
            .filter(|list| Self::is_live(list, now, idle_ttl))
            .map(|list| list.entries.iter().take(len).cloned().collect())
            .unwrap_or_default()
    }
}

/// Process-local [`HistoryStore`] with a key cap and idle expiry
///
/// Lists live only as long as the process.
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    lists: RwLock<Lists>,
    max_keys: usize,
    idle_ttl: Duration,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_KEYS, DEFAULT_IDLE_TTL)
    }

    /// Create a store holding at most `max_keys` lists, each dropped once it
    /// has gone `idle_ttl` without a write
    pub fn with_limits(max_keys: usize, idle_ttl: Duration) -> Self {
        Self {
            lists: RwLock::new(Lists::default()),
            max_keys: max_keys.max(1),
            idle_ttl,
        }
    }

    /// Number of lists currently held, idle ones included until evicted
    pub async fn key_count(&self) -> usize {
        self.lists.read().await.by_key.len()
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn push_front(&self, key: &str, entry: String) -> AppResult<()> {
        let mut lists = self.lists.write().await;
        lists.push_front(key, entry, Instant::now(), self.max_keys, self.idle_ttl);
        Ok(())
    }

    async fn trim(&self, key: &str, len: usize) -> AppResult<()> {
        self.lists.write().await.trim(key, len);
        Ok(())
    }

    async fn range(&self, key: &str, len: usize) -> AppResult<Vec<String>> {
        let lists = self.lists.read().await;
        Ok(lists.range(key, len, Instant::now(), self.idle_ttl))
    }
}

/// Bounded newest-first turn history keyed by user identifier
#[derive(Clone)]
pub struct ConversationHistory {
    store: Arc<dyn HistoryStore>,
    max_turns: usize,
    key_prefix: String,
}

impl ConversationHistory {
    pub fn new(store: Arc<dyn HistoryStore>, max_turns: usize, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            max_turns,
            key_prefix: key_prefix.into(),
        }
    }

    /// Maximum number of turns kept per user
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    fn key(&self, user_id: &str) -> String {
        format!("{}{}", self.key_prefix, user_id)
    }

    /// Record a turn for `user_id`, then trim to the cap
    pub async fn append(&self, user_id: &str, turn: &Turn) -> AppResult<()> {
        let key = self.key(user_id);
        let entry = serde_json::to_string(turn)
            .map_err(|e| AppError::History(format!("failed to encode turn: {}", e)))?;

        self.store.push_front(&key, entry).await?;
        self.store.trim(&key, self.max_turns).await
    }

    /// Stored turns for `user_id`, newest first
    ///
    /// Entries that fail to decode are skipped with a warning.
    pub async fn recent(&self, user_id: &str) -> AppResult<Vec<Turn>> {
        let key = self.key(user_id);
        let entries = self.store.range(&key, self.max_turns).await?;

        Ok(entries
            .iter()
            .filter_map(|entry| match serde_json::from_str::<Turn>(entry) {
                Ok(turn) => Some(turn),
                Err(e) => {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "Skipping undecodable history entry"
                    );
                    None
                }
            })
            .collect())
    }
}
