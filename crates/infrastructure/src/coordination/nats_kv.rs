//! 基于NATS JetStream KV的协调服务
//!
//! - 数据bucket保存任务目录和强杀目录，带历史
//! - 租约按TTL分bucket保存，bucket的 `max_age` 即租期，续约就是以当前版本号为前提的 `update`
//!
//! 目录形式的键 `/cron/jobs/backup` 映射为NATS键 `cron.jobs.backup`，
//! 前缀监听 `/cron/jobs/` 映射为主题过滤 `cron.jobs.>`。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, kv};
use async_trait::async_trait;
use bytes::Bytes;
use dcron_core::{
    config::CoordinationConfig,
    traits::{CoordinationStore, KeyValue, LockAttempt, LockToken, Snapshot, WatchEvent, WatchStream},
    SchedulerError, SchedulerResult,
};
use futures::{StreamExt, TryStreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

fn coordination_error(e: impl std::fmt::Display) -> SchedulerError {
    SchedulerError::Coordination(e.to_string())
}

/// `/cron/jobs/backup` -> `cron.jobs.backup`
pub fn to_nats_key(key: &str) -> String {
    key.trim_start_matches('/').replace('/', ".")
}

/// `cron.jobs.backup` -> `/cron/jobs/backup`
pub fn from_nats_key(key: &str) -> String {
    format!("/{}", key.replace('.', "/"))
}

/// `/cron/jobs/` -> `cron.jobs.>`
pub fn to_nats_filter(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        ">".to_string()
    } else {
        format!("{}.>", trimmed.replace('/', "."))
    }
}

/// 租期为 `ttl` 的租约所在的bucket，如 `dcron_locks_5000`
pub fn lease_bucket_name(lock_bucket: &str, ttl: Duration) -> String {
    format!("{}_{}", lock_bucket, ttl.as_millis())
}

fn to_watch_event(entry: kv::Entry) -> WatchEvent {
    let key = from_nats_key(&entry.key);
    match entry.operation {
        kv::Operation::Put => WatchEvent::Put {
            key,
            value: entry.value.to_vec(),
            revision: entry.revision,
        },
        kv::Operation::Delete | kv::Operation::Purge => WatchEvent::Delete {
            key,
            revision: entry.revision,
        },
    }
}

#[derive(Clone)]
pub struct NatsKvCoordinationStore {
    js: jetstream::Context,
    data: kv::Store,
    lock_bucket: String,
    leases: Arc<RwLock<BTreeMap<Duration, kv::Store>>>,
}

impl NatsKvCoordinationStore {
    pub fn new(js: jetstream::Context, data: kv::Store, lock_bucket: impl Into<String>) -> Self {
        Self {
            js,
            data,
            lock_bucket: lock_bucket.into(),
            leases: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// 连接NATS，准备数据bucket和 `lease_ttls` 中每个租期的bucket
    pub async fn connect(
        config: &CoordinationConfig,
        lease_ttls: &[Duration],
    ) -> SchedulerResult<Self> {
        let client = async_nats::ConnectOptions::new()
            .connection_timeout(config.connect_timeout())
            .connect(config.url.as_str())
            .await
            .map_err(coordination_error)?;
        let js = jetstream::new(client);

        let data = get_or_create(
            &js,
            kv::Config {
                bucket: config.data_bucket.clone(),
                history: 5,
                ..Default::default()
            },
        )
        .await?;

        let store = Self::new(js, data, config.lock_bucket.clone());
        for ttl in lease_ttls {
            store.lease_bucket(*ttl).await?;
        }

        info!(
            "已连接NATS协调服务 {}，数据bucket: {}，租约bucket: {:?}",
            config.url,
            config.data_bucket,
            lease_ttls
                .iter()
                .map(|ttl| lease_bucket_name(&config.lock_bucket, *ttl))
                .collect::<Vec<_>>()
        );
        Ok(store)
    }

    /// 取租期为 `ttl` 的bucket，不存在时创建
    async fn lease_bucket(&self, ttl: Duration) -> SchedulerResult<kv::Store> {
        if let Some(store) = self.leases.read().await.get(&ttl) {
            return Ok(store.clone());
        }

        let mut leases = self.leases.write().await;
        if let Some(store) = leases.get(&ttl) {
            return Ok(store.clone());
        }
        let bucket = lease_bucket_name(&self.lock_bucket, ttl);
        let store = get_or_create(
            &self.js,
            kv::Config {
                bucket: bucket.clone(),
                history: 1,
                max_age: ttl,
                ..Default::default()
            },
        )
        .await?;
        debug!("租约bucket {} 已就绪 (租期: {:?})", bucket, ttl);
        leases.insert(ttl, store.clone());
        Ok(store)
    }

    async fn list_store(store: &kv::Store, prefix: &str) -> SchedulerResult<Vec<KeyValue>> {
        let nats_prefix = to_nats_key(prefix);
        let keys: Vec<String> = store
            .keys()
            .await
            .map_err(coordination_error)?
            .try_collect()
            .await
            .map_err(coordination_error)?;

        let mut entries = Vec::new();
        for key in keys.into_iter().filter(|k| k.starts_with(&nats_prefix)) {
            if let Some(entry) = store.entry(&key).await.map_err(coordination_error)? {
                if entry.operation == kv::Operation::Put {
                    entries.push(KeyValue {
                        key: from_nats_key(&entry.key),
                        value: entry.value.to_vec(),
                        revision: entry.revision,
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

async fn get_or_create(js: &jetstream::Context, config: kv::Config) -> SchedulerResult<kv::Store> {
    let name = config.bucket.clone();
    match js.get_key_value(&name).await {
        Ok(store) => Ok(store),
        Err(_) => js
            .create_key_value(config)
            .await
            .map_err(coordination_error),
    }
}

#[async_trait]
impl CoordinationStore for NatsKvCoordinationStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> SchedulerResult<u64> {
        self.data
            .put(to_nats_key(key), Bytes::from(value))
            .await
            .map_err(coordination_error)
    }

    async fn get(&self, key: &str) -> SchedulerResult<Option<KeyValue>> {
        let entry = self
            .data
            .entry(to_nats_key(key))
            .await
            .map_err(coordination_error)?;

        Ok(entry
            .filter(|e| e.operation == kv::Operation::Put)
            .map(|e| KeyValue {
                key: key.to_string(),
                value: e.value.to_vec(),
                revision: e.revision,
            }))
    }

    async fn delete(&self, key: &str) -> SchedulerResult<Option<Vec<u8>>> {
        let Some(previous) = self.get(key).await? else {
            return Ok(None);
        };
        self.data
            .delete(to_nats_key(key))
            .await
            .map_err(coordination_error)?;
        Ok(Some(previous.value))
    }

    async fn list(&self, prefix: &str) -> SchedulerResult<Snapshot> {
        // 先取版本号再列举，快照之后的变化会在监听重放时再次收到
        let revision = self
            .data
            .status()
            .await
            .map_err(coordination_error)?
            .info
            .state
            .last_sequence;
        let entries = Self::list_store(&self.data, prefix).await?;
        Ok(Snapshot { entries, revision })
    }

    async fn watch(&self, prefix: &str, from_revision: Option<u64>) -> SchedulerResult<WatchStream> {
        let filter = to_nats_filter(prefix);
        let watch = match from_revision {
            Some(revision) => self
                .data
                .watch_from_revision(filter.as_str(), revision.max(1))
                .await
                .map_err(coordination_error)?,
            None => self
                .data
                .watch(filter.as_str())
                .await
                .map_err(coordination_error)?,
        };
        debug!("开始监听 {} (起始版本: {:?})", filter, from_revision);

        Ok(watch
            .map(|entry| entry.map(to_watch_event).map_err(coordination_error))
            .boxed())
    }

    /// 租约写入租期为 `ttl` 的bucket，过期时间由该bucket的 `max_age` 决定
    async fn try_lock(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> SchedulerResult<LockAttempt> {
        let leases = self.lease_bucket(ttl).await?;
        match leases.create(to_nats_key(key), Bytes::from(value.clone())).await {
            Ok(revision) => Ok(LockAttempt::Acquired(LockToken {
                key: key.to_string(),
                value,
                revision,
                ttl,
            })),
            Err(e) if e.kind() == kv::CreateErrorKind::AlreadyExists => Ok(LockAttempt::Busy),
            Err(e) => Err(coordination_error(e)),
        }
    }

    async fn keep_alive(&self, token: &LockToken) -> SchedulerResult<LockToken> {
        let leases = self.lease_bucket(token.ttl).await?;
        let revision = leases
            .update(
                to_nats_key(&token.key),
                Bytes::from(token.value.clone()),
                token.revision,
            )
            .await
            .map_err(|e| SchedulerError::Coordination(format!("锁已丢失: {}: {e}", token.key)))?;

        Ok(LockToken {
            key: token.key.clone(),
            value: token.value.clone(),
            revision,
            ttl: token.ttl,
        })
    }

    async fn unlock(&self, token: &LockToken) -> SchedulerResult<()> {
        let leases = self.lease_bucket(token.ttl).await?;
        let nats_key = to_nats_key(&token.key);
        match leases
            .delete_expect_revision(nats_key.as_str(), Some(token.revision))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                // 版本号不匹配说明锁已过期或被他人持有，视为已释放
                let current = leases.entry(nats_key.as_str()).await.map_err(coordination_error)?;
                match current {
                    Some(entry)
                        if entry.operation == kv::Operation::Put
                            && entry.revision == token.revision =>
                    {
                        warn!("释放锁 {} 失败: {}", token.key, e);
                        Err(coordination_error(e))
                    }
                    _ => {
                        debug!("锁 {} 已不属于当前持有者，跳过释放", token.key);
                        Ok(())
                    }
                }
            }
        }
    }

    async fn list_locks(&self, prefix: &str) -> SchedulerResult<Vec<KeyValue>> {
        let buckets: Vec<kv::Store> = self.leases.read().await.values().cloned().collect();
        let mut entries = Vec::new();
        for bucket in &buckets {
            entries.extend(Self::list_store(bucket, prefix).await?);
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(to_nats_key("/cron/jobs/backup"), "cron.jobs.backup");
        assert_eq!(from_nats_key("cron.jobs.backup"), "/cron/jobs/backup");
        assert_eq!(to_nats_key("/cron/jobs/"), "cron.jobs.");
        assert_eq!(to_nats_filter("/cron/jobs/"), "cron.jobs.>");
        assert_eq!(to_nats_filter("/cron/killer/"), "cron.killer.>");
    }

    #[test]
    fn test_lease_bucket_per_ttl() {
        assert_eq!(
            lease_bucket_name("dcron_locks", Duration::from_secs(5)),
            "dcron_locks_5000"
        );
        assert_ne!(
            lease_bucket_name("dcron_locks", Duration::from_secs(5)),
            lease_bucket_name("dcron_locks", Duration::from_secs(15))
        );
    }

    #[test]
    fn test_mapping_is_reversible_for_valid_names() {
        for key in ["/cron/jobs/a-b_c", "/cron/workers/host-01", "/cron/lock/x"] {
            assert_eq!(from_nats_key(&to_nats_key(key)), key);
        }
    }
}
