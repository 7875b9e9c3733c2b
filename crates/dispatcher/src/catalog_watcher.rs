//! 任务目录监听
//!
//! 把协调服务中任务目录和强杀目录的变化转换成 [`JobEvent`]：
//!
//! - 任务目录：先列举快照，再从快照版本之后开始监听，保存/删除事件发给调度核心
//! - 强杀目录：只监听实时变化，直接调用执行引擎的 `cancel`，不经过时间表
//!
//! 监听流断开后按退避时间重连，任务目录从最后看到的版本继续。

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dcron_core::{
    config::NamespaceConfig,
    models::{strip_prefix, Job, JobEvent},
    traits::{CoordinationStore, ExecutionDispatcher, WatchEvent},
    SchedulerResult,
};

const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// 把一条目录变化转换成任务事件
///
/// 任务值无法解析、强杀键被删除或键不属于任何目录时返回 `None`。
pub fn decode_job_event(namespace: &NamespaceConfig, event: &WatchEvent) -> Option<JobEvent> {
    let key = event.key();

    if key.starts_with(&namespace.job_prefix) {
        return match event {
            WatchEvent::Put { value, .. } => match Job::from_json(value) {
                Ok(job) => Some(JobEvent::save(job)),
                Err(e) => {
                    warn!("无法解析任务 {}: {}", key, e);
                    None
                }
            },
            WatchEvent::Delete { .. } => Some(JobEvent::delete(strip_prefix(
                &namespace.job_prefix,
                key,
            ))),
        };
    }

    if key.starts_with(&namespace.kill_prefix) {
        return match event {
            WatchEvent::Put { .. } => Some(JobEvent::kill(strip_prefix(&namespace.kill_prefix, key))),
            WatchEvent::Delete { .. } => None,
        };
    }

    None
}

pub struct CatalogWatcher {
    store: Arc<dyn CoordinationStore>,
    namespace: NamespaceConfig,
    reconnect_backoff: Duration,
}

impl CatalogWatcher {
    pub fn new(store: Arc<dyn CoordinationStore>, namespace: NamespaceConfig) -> Self {
        Self {
            store,
            namespace,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// 列举任务目录，返回保存事件和快照版本号
    pub async fn load_snapshot(&self) -> SchedulerResult<(Vec<JobEvent>, u64)> {
        let snapshot = self.store.list(&self.namespace.job_prefix).await?;

        let mut events = Vec::with_capacity(snapshot.entries.len());
        for entry in &snapshot.entries {
            match Job::from_json(&entry.value) {
                Ok(job) => events.push(JobEvent::save(job)),
                Err(e) => warn!("跳过无法解析的任务 {}: {}", entry.key, e),
            }
        }

        info!(
            "加载任务目录快照: {} 个任务，版本号 {}",
            events.len(),
            snapshot.revision
        );
        Ok((events, snapshot.revision))
    }

    /// 持续监听任务目录和强杀目录，直到关闭或调度核心退出
    pub async fn run(
        self,
        event_tx: mpsc::Sender<JobEvent>,
        dispatcher: Arc<dyn ExecutionDispatcher>,
        shutdown: CancellationToken,
    ) {
        tokio::join!(
            self.watch_jobs(event_tx, shutdown.clone()),
            self.watch_kills(dispatcher, shutdown),
        );
        info!("任务目录监听已停止");
    }

    async fn watch_jobs(&self, event_tx: mpsc::Sender<JobEvent>, shutdown: CancellationToken) {
        let mut next_revision: Option<u64> = None;

        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let from = match next_revision {
                Some(revision) => revision,
                None => match self.load_snapshot().await {
                    Ok((events, revision)) => {
                        for event in events {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        revision + 1
                    }
                    Err(e) => {
                        warn!("加载任务目录失败: {}", e);
                        if !self.backoff(&shutdown).await {
                            return;
                        }
                        continue;
                    }
                },
            };
            next_revision = Some(from);

            let mut stream = match self.store.watch(&self.namespace.job_prefix, Some(from)).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("监听任务目录失败: {}", e);
                    if !self.backoff(&shutdown).await {
                        return;
                    }
                    continue;
                }
            };
            debug!("从版本 {} 开始监听任务目录", from);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    item = stream.next() => match item {
                        Some(Ok(change)) => {
                            next_revision = Some(change.revision() + 1);
                            if let Some(event) = decode_job_event(&self.namespace, &change) {
                                if event_tx.send(event).await.is_err() {
                                    debug!("调度器已退出，停止监听任务目录");
                                    return;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!("任务目录监听出错: {}", e);
                            break;
                        }
                        None => {
                            warn!("任务目录监听流已断开");
                            break;
                        }
                    }
                }
            }

            if !self.backoff(&shutdown).await {
                return;
            }
        }
    }

    async fn watch_kills(&self, dispatcher: Arc<dyn ExecutionDispatcher>, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                return;
            }

            let mut stream = match self.store.watch(&self.namespace.kill_prefix, None).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("监听强杀目录失败: {}", e);
                    if !self.backoff(&shutdown).await {
                        return;
                    }
                    continue;
                }
            };

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    item = stream.next() => match item {
                        Some(Ok(change)) => {
                            if let Some(event) = decode_job_event(&self.namespace, &change) {
                                let job_name = event.job_name();
                                if dispatcher.cancel(job_name).await {
                                    info!("任务 {} 已被强杀", job_name);
                                } else {
                                    debug!("任务 {} 没有正在执行的实例，忽略强杀", job_name);
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!("强杀目录监听出错: {}", e);
                            break;
                        }
                        None => {
                            warn!("强杀目录监听流已断开");
                            break;
                        }
                    }
                }
            }

            if !self.backoff(&shutdown).await {
                return;
            }
        }
    }

    /// 等待重连退避时间，期间收到关闭信号返回false
    async fn backoff(&self, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.reconnect_backoff) => true,
        }
    }
}
