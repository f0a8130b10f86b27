use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex, RwLock, RwLockWriteGuard, Semaphore};
use tokio::time::Instant;

use crate::backend::Backend;
use crate::errors::StoreError;

const TOPIC_CAPACITY: usize = 256;

/// How long a semaphore nobody is waiting on survives its last use.
const SEMAPHORE_IDLE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
struct State {
    maps: HashMap<String, HashMap<String, Entry>>,
    lists: HashMap<String, Vec<String>>,
    multimaps: HashMap<String, HashMap<String, Vec<String>>>,
    /// Maps holding at least one TTL entry.
    expiring: HashSet<String>,
}

impl State {
    /// Drop expired entries, and maps left with none.
    fn evict_expired(&mut self, now: Instant) {
        let maps = &mut self.maps;
        self.expiring.retain(|key| {
            let Some(map) = maps.get_mut(key) else {
                return false;
            };
            map.retain(|_, e| e.is_live(now));
            if map.is_empty() {
                maps.remove(key);
                return false;
            }
            map.values().any(|e| e.expires_at.is_some())
        });
    }
}

struct SemaphoreSlot {
    semaphore: Arc<Semaphore>,
    touched: Instant,
}

/// In-process backend with the same per-key semantics as the shared store.
///
/// Used for tests and single-process deployments. `set_available(false)`
/// makes every call fail the way a lost connection would.
pub struct MemoryBackend {
    state: RwLock<State>,
    semaphores: Mutex<HashMap<String, SemaphoreSlot>>,
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
    available: AtomicBool,
    semaphore_idle_ttl: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            semaphores: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            semaphore_idle_ttl: SEMAPHORE_IDLE_TTL,
        }
    }

    /// Reclaim semaphores nobody waits on after `ttl` instead of the default.
    ///
    /// Late discovery responders recreate the per-query semaphore after the
    /// round has deleted it; this bounds how long that copy lingers.
    pub fn with_semaphore_idle_ttl(mut self, ttl: Duration) -> Self {
        self.semaphore_idle_ttl = ttl;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Subscribe to `topic`. Each live receiver counts toward `publish`'s return value.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    fn check(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("backend unavailable".to_string()).into());
        }
        Ok(())
    }

    async fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        let mut state = self.state.write().await;
        state.evict_expired(Instant::now());
        state
    }

    fn prune_idle(&self, semaphores: &mut HashMap<String, SemaphoreSlot>, now: Instant) {
        // A waiter holds its own Arc, so a semaphore in use is never pruned.
        semaphores.retain(|_, slot| {
            Arc::strong_count(&slot.semaphore) > 1
                || now.duration_since(slot.touched) < self.semaphore_idle_ttl
        });
    }

    async fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        let mut semaphores = self.semaphores.lock().await;
        let now = Instant::now();
        self.prune_idle(&mut semaphores, now);
        let slot = semaphores
            .entry(key.to_string())
            .or_insert_with(|| SemaphoreSlot {
                semaphore: Arc::new(Semaphore::new(0)),
                touched: now,
            });
        slot.touched = now;
        Arc::clone(&slot.semaphore)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn slice(values: &[String], from: usize, to: usize) -> Vec<String> {
    let end = to.min(values.len());
    if from >= end {
        return Vec::new();
    }
    values[from..end].to_vec()
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn map_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check()?;
        let state = self.state.read().await;
        let now = Instant::now();
        Ok(state
            .maps
            .get(key)
            .and_then(|m| m.get(field))
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn map_put(&self, key: &str, field: &str, value: String) -> Result<()> {
        self.check()?;
        let mut state = self.write_state().await;
        state.maps.entry(key.to_string()).or_default().insert(
            field.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn map_put_with_ttl(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Duration,
    ) -> Result<()> {
        self.check()?;
        let mut state = self.write_state().await;
        state.maps.entry(key.to_string()).or_default().insert(
            field.to_string(),
            Entry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        state.expiring.insert(key.to_string());
        Ok(())
    }

    async fn map_remove(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check()?;
        let mut state = self.write_state().await;
        let now = Instant::now();
        let Some(map) = state.maps.get_mut(key) else {
            return Ok(None);
        };
        let removed = map.remove(field).filter(|e| e.is_live(now));
        if map.is_empty() {
            state.maps.remove(key);
        }
        Ok(removed.map(|e| e.value))
    }

    async fn map_size(&self, key: &str) -> Result<usize> {
        self.check()?;
        let state = self.state.read().await;
        let now = Instant::now();
        Ok(state
            .maps
            .get(key)
            .map_or(0, |m| m.values().filter(|e| e.is_live(now)).count()))
    }

    async fn map_values(&self, key: &str) -> Result<Vec<String>> {
        self.check()?;
        let state = self.state.read().await;
        let now = Instant::now();
        Ok(state.maps.get(key).map_or_else(Vec::new, |m| {
            m.values()
                .filter(|e| e.is_live(now))
                .map(|e| e.value.clone())
                .collect()
        }))
    }

    async fn list_push(&self, key: &str, value: String) -> Result<()> {
        self.check()?;
        let mut state = self.write_state().await;
        state.lists.entry(key.to_string()).or_default().push(value);
        Ok(())
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<bool> {
        self.check()?;
        let mut state = self.write_state().await;
        let Some(list) = state.lists.get_mut(key) else {
            return Ok(false);
        };
        let removed = match list.iter().position(|v| v == value) {
            Some(idx) => {
                list.remove(idx);
                true
            }
            None => false,
        };
        if list.is_empty() {
            state.lists.remove(key);
        }
        Ok(removed)
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state.lists.get(key).map_or(0, Vec::len))
    }

    async fn list_range(&self, key: &str, from: usize, to: usize) -> Result<Vec<String>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .lists
            .get(key)
            .map_or_else(Vec::new, |l| slice(l, from, to)))
    }

    async fn multimap_put(&self, key: &str, field: &str, value: String) -> Result<()> {
        self.check()?;
        let mut state = self.write_state().await;
        state
            .multimaps
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_default()
            .push(value);
        Ok(())
    }

    async fn multimap_put_unique(&self, key: &str, field: &str, value: String) -> Result<bool> {
        self.check()?;
        let mut state = self.write_state().await;
        let bucket = state
            .multimaps
            .entry(key.to_string())
            .or_default()
            .entry(field.to_string())
            .or_default();
        if bucket.contains(&value) {
            return Ok(false);
        }
        bucket.push(value);
        Ok(true)
    }

    async fn multimap_get_all(&self, key: &str, field: &str) -> Result<Vec<String>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .multimaps
            .get(key)
            .and_then(|m| m.get(field))
            .cloned()
            .unwrap_or_default())
    }

    async fn multimap_range(
        &self,
        key: &str,
        field: &str,
        from: usize,
        to: usize,
    ) -> Result<Vec<String>> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .multimaps
            .get(key)
            .and_then(|m| m.get(field))
            .map_or_else(Vec::new, |b| slice(b, from, to)))
    }

    async fn multimap_len(&self, key: &str, field: &str) -> Result<usize> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .multimaps
            .get(key)
            .and_then(|m| m.get(field))
            .map_or(0, Vec::len))
    }

    async fn multimap_remove_all(&self, key: &str, field: &str) -> Result<Vec<String>> {
        self.check()?;
        let mut state = self.write_state().await;
        let Some(map) = state.multimaps.get_mut(key) else {
            return Ok(Vec::new());
        };
        let removed = map.remove(field).unwrap_or_default();
        if map.is_empty() {
            state.multimaps.remove(key);
        }
        Ok(removed)
    }

    async fn multimap_remove_value(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        self.check()?;
        let mut state = self.write_state().await;
        let Some(map) = state.multimaps.get_mut(key) else {
            return Ok(false);
        };
        let Some(bucket) = map.get_mut(field) else {
            return Ok(false);
        };
        let removed = match bucket.iter().position(|v| v == value) {
            Some(idx) => {
                bucket.remove(idx);
                true
            }
            None => false,
        };
        if bucket.is_empty() {
            map.remove(field);
        }
        if map.is_empty() {
            state.multimaps.remove(key);
        }
        Ok(removed)
    }

    async fn multimap_remove_first(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.check()?;
        let mut state = self.write_state().await;
        let Some(map) = state.multimaps.get_mut(key) else {
            return Ok(None);
        };
        let Some(bucket) = map.get_mut(field) else {
            return Ok(None);
        };
        let first = if bucket.is_empty() {
            None
        } else {
            Some(bucket.remove(0))
        };
        if bucket.is_empty() {
            map.remove(field);
        }
        if map.is_empty() {
            state.multimaps.remove(key);
        }
        Ok(first)
    }

    async fn semaphore_try_acquire(
        &self,
        key: &str,
        permits: usize,
        timeout: Duration,
    ) -> Result<bool> {
        self.check()?;
        let permits = u32::try_from(permits).map_err(StoreError::from)?;
        let semaphore = self.semaphore(key).await;
        let acquired = match tokio::time::timeout(timeout, semaphore.acquire_many(permits)).await {
            Ok(Ok(permit)) => {
                permit.forget();
                true
            }
            // Closed: the semaphore was deleted while we waited.
            Ok(Err(_)) => false,
            Err(_) => false,
        };
        Ok(acquired)
    }

    async fn semaphore_release(&self, key: &str, permits: usize) -> Result<()> {
        self.check()?;
        self.semaphore(key).await.add_permits(permits);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check()?;
        {
            let mut semaphores = self.semaphores.lock().await;
            self.prune_idle(&mut semaphores, Instant::now());
            if semaphores.contains_key(key) {
                return Ok(true);
            }
        }
        let state = self.state.read().await;
        let now = Instant::now();
        let live_map = state
            .maps
            .get(key)
            .is_some_and(|m| m.values().any(|e| e.is_live(now)));
        Ok(live_map || state.lists.contains_key(key) || state.multimaps.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        let mut deleted = false;
        if let Some(slot) = self.semaphores.lock().await.remove(key) {
            slot.semaphore.close();
            deleted = true;
        }
        let mut state = self.write_state().await;
        deleted |= state.maps.remove(key).is_some();
        deleted |= state.lists.remove(key).is_some();
        deleted |= state.multimaps.remove(key).is_some();
        Ok(deleted)
    }

    async fn publish(&self, topic: &str, message: String) -> Result<usize> {
        self.check()?;
        let topics = self.topics.lock().await;
        match topics.get(topic) {
            // send fails only when there are no receivers
            Some(sender) => Ok(sender.send(message).unwrap_or(0)),
            None => Ok(0),
        }
    }
}
