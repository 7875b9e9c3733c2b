use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dcron_core::{
    traits::{CoordinationStore, KeyValue, LockAttempt, LockToken, Snapshot, WatchEvent, WatchStream},
    SchedulerError, SchedulerResult,
};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::debug;

/// 保留的变更历史条数，更早的版本无法重放
const DEFAULT_HISTORY_LIMIT: usize = 10_000;

type WatchSender = mpsc::UnboundedSender<SchedulerResult<WatchEvent>>;

struct StoredValue {
    value: Vec<u8>,
    revision: u64,
}

struct LockEntry {
    value: Vec<u8>,
    revision: u64,
    ttl: Duration,
    expires_at: Instant,
}

struct Watcher {
    prefix: String,
    tx: WatchSender,
}

#[derive(Default)]
struct State {
    revision: u64,
    data: BTreeMap<String, StoredValue>,
    history: VecDeque<WatchEvent>,
    watchers: Vec<Watcher>,
    locks: HashMap<String, LockEntry>,
}

impl State {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn publish(&mut self, event: WatchEvent, history_limit: usize) {
        self.watchers.retain(|w| {
            if !event.key().starts_with(&w.prefix) {
                return !w.tx.is_closed();
            }
            w.tx.send(Ok(event.clone())).is_ok()
        });

        self.history.push_back(event);
        while self.history.len() > history_limit {
            self.history.pop_front();
        }
    }

    fn purge_expired_locks(&mut self, now: Instant) {
        self.locks.retain(|_, lock| lock.expires_at > now);
    }
}

/// 进程内协调服务
///
/// 实现完整的协调契约：全局版本号、可重放的变更历史、前缀监听和带TTL的锁。
/// 多个Worker共享同一个实例即可在单进程内验证跨Worker互斥。
#[derive(Clone)]
pub struct InMemoryCoordinationStore {
    state: Arc<Mutex<State>>,
    history_limit: usize,
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            history_limit: history_limit.max(1),
        }
    }

    /// 断开所有监听流，模拟与协调服务的连接中断
    pub async fn close_watchers(&self) {
        let mut state = self.state.lock().await;
        let count = state.watchers.len();
        state.watchers.clear();
        debug!("已断开 {} 个监听流", count);
    }

    pub async fn watcher_count(&self) -> usize {
        let mut state = self.state.lock().await;
        state.watchers.retain(|w| !w.tx.is_closed());
        state.watchers.len()
    }

    pub async fn current_revision(&self) -> u64 {
        self.state.lock().await.revision
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> SchedulerResult<u64> {
        let mut state = self.state.lock().await;
        let revision = state.next_revision();
        state.data.insert(
            key.to_string(),
            StoredValue {
                value: value.clone(),
                revision,
            },
        );
        state.publish(
            WatchEvent::Put {
                key: key.to_string(),
                value,
                revision,
            },
            self.history_limit,
        );
        Ok(revision)
    }

    async fn get(&self, key: &str) -> SchedulerResult<Option<KeyValue>> {
        let state = self.state.lock().await;
        Ok(state.data.get(key).map(|stored| KeyValue {
            key: key.to_string(),
            value: stored.value.clone(),
            revision: stored.revision,
        }))
    }

    async fn delete(&self, key: &str) -> SchedulerResult<Option<Vec<u8>>> {
        let mut state = self.state.lock().await;
        let Some(previous) = state.data.remove(key) else {
            return Ok(None);
        };
        let revision = state.next_revision();
        state.publish(
            WatchEvent::Delete {
                key: key.to_string(),
                revision,
            },
            self.history_limit,
        );
        Ok(Some(previous.value))
    }

    async fn list(&self, prefix: &str) -> SchedulerResult<Snapshot> {
        let state = self.state.lock().await;
        let entries = state
            .data
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, stored)| KeyValue {
                key: key.clone(),
                value: stored.value.clone(),
                revision: stored.revision,
            })
            .collect();

        Ok(Snapshot {
            entries,
            revision: state.revision,
        })
    }

    async fn watch(&self, prefix: &str, from_revision: Option<u64>) -> SchedulerResult<WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;

        if let Some(from) = from_revision {
            for event in state
                .history
                .iter()
                .filter(|e| e.revision() >= from && e.key().starts_with(prefix))
            {
                // 接收端就在本函数内，发送不会失败
                let _ = tx.send(Ok(event.clone()));
            }
        }

        state.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(stream.boxed())
    }

    async fn try_lock(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> SchedulerResult<LockAttempt> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.purge_expired_locks(now);

        if state.locks.contains_key(key) {
            return Ok(LockAttempt::Busy);
        }

        let revision = state.next_revision();
        state.locks.insert(
            key.to_string(),
            LockEntry {
                value: value.clone(),
                revision,
                ttl,
                expires_at: now + ttl,
            },
        );

        Ok(LockAttempt::Acquired(LockToken {
            key: key.to_string(),
            value,
            revision,
            ttl,
        }))
    }

    async fn keep_alive(&self, token: &LockToken) -> SchedulerResult<LockToken> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.purge_expired_locks(now);

        let held = state
            .locks
            .get(&token.key)
            .is_some_and(|lock| lock.revision == token.revision);
        if !held {
            return Err(SchedulerError::Coordination(format!(
                "锁已丢失: {}",
                token.key
            )));
        }

        let revision = state.next_revision();
        let lock = state
            .locks
            .get_mut(&token.key)
            .ok_or_else(|| SchedulerError::Coordination(format!("锁已丢失: {}", token.key)))?;
        lock.revision = revision;
        lock.expires_at = now + lock.ttl;

        Ok(LockToken {
            key: token.key.clone(),
            value: lock.value.clone(),
            revision,
            ttl: lock.ttl,
        })
    }

    async fn unlock(&self, token: &LockToken) -> SchedulerResult<()> {
        let mut state = self.state.lock().await;
        let owned = state
            .locks
            .get(&token.key)
            .is_some_and(|lock| lock.revision == token.revision);
        if owned {
            state.locks.remove(&token.key);
        } else {
            debug!("锁 {} 已不属于当前持有者，跳过释放", token.key);
        }
        Ok(())
    }

    async fn list_locks(&self, prefix: &str) -> SchedulerResult<Vec<KeyValue>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.purge_expired_locks(now);

        let mut locks: Vec<KeyValue> = state
            .locks
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, lock)| KeyValue {
                key: key.clone(),
                value: lock.value.clone(),
                revision: lock.revision,
            })
            .collect();
        locks.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(locks)
    }
}
