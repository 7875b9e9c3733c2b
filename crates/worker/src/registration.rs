//! Worker注册
//!
//! 每个Worker在注册目录下以自己的ID持有一把带租约的锁，值为 [`WorkerInfo`]。
//! 进程退出或失联后租约过期，条目自动消失，注册目录里只剩存活的Worker。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dcron_core::{
    config::{NamespaceConfig, WorkerConfig},
    models::WorkerInfo,
    traits::{CoordinationStore, LockAttempt, LockToken},
    SchedulerResult,
};
use dcron_infrastructure::StructuredLogger;

pub struct WorkerRegistration {
    store: Arc<dyn CoordinationStore>,
    key: String,
    info: WorkerInfo,
    heartbeat_interval: Duration,
    lease_ttl: Duration,
}

impl WorkerRegistration {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        namespace: &NamespaceConfig,
        config: &WorkerConfig,
    ) -> Self {
        let info = WorkerInfo::new(&config.worker_id, current_hostname(), &config.ip_address);
        Self {
            store,
            key: namespace.worker_key(&config.worker_id),
            info,
            heartbeat_interval: config.heartbeat_interval(),
            lease_ttl: config.registration_lease(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }

    /// 保持注册直到关闭，丢失后在下一个心跳重新注册
    pub async fn run(self, shutdown: CancellationToken) {
        let mut token: Option<LockToken> = None;

        loop {
            token = match token.take() {
                Some(current) => match self.store.keep_alive(&current).await {
                    Ok(renewed) => Some(renewed),
                    Err(e) => {
                        warn!("Worker注册续约失败，重新注册: {}", e);
                        self.register().await
                    }
                },
                None => self.register().await,
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.heartbeat_interval) => {}
            }
        }

        if let Some(token) = token {
            if let Err(e) = self.store.unlock(&token).await {
                warn!("注销Worker失败，等待租约过期: {}", e);
            }
        }
        info!("Worker {} 已注销", self.info.worker_id);
    }

    async fn register(&self) -> Option<LockToken> {
        let value = match self.info.to_json() {
            Ok(value) => value,
            Err(e) => {
                StructuredLogger::log_system_error("registration", "encode_worker_info", &e);
                return None;
            }
        };

        match self.store.try_lock(&self.key, value, self.lease_ttl).await {
            Ok(LockAttempt::Acquired(token)) => {
                StructuredLogger::log_worker_registered(
                    &self.info.worker_id,
                    &self.info.hostname,
                    &self.info.ip_address,
                );
                Some(token)
            }
            Ok(LockAttempt::Busy) => {
                warn!("Worker ID {} 已被占用，稍后重试注册", self.info.worker_id);
                None
            }
            Err(e) => {
                warn!("Worker注册失败: {}", e);
                None
            }
        }
    }
}

/// 列出注册目录下存活的Worker，无法解析的条目跳过
pub async fn list_workers(
    store: &dyn CoordinationStore,
    worker_prefix: &str,
) -> SchedulerResult<Vec<WorkerInfo>> {
    let entries = store.list_locks(worker_prefix).await?;
    let mut workers = Vec::with_capacity(entries.len());
    for entry in entries {
        match WorkerInfo::from_json(&entry.value) {
            Ok(worker) => workers.push(worker),
            Err(e) => warn!("跳过无法解析的Worker条目 {}: {}", entry.key, e),
        }
    }
    workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
    Ok(workers)
}

fn current_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
