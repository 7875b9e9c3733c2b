use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dcron_core::{
    models::{JobLog, LogBatch},
    traits::{JobLogRepository, LogSink},
    SchedulerError, SchedulerResult,
};
use tokio::sync::RwLock;

/// 内存日志存储
///
/// 供 `memory` 后端和测试使用；`fail_next_appends` 可以让接下来的若干次写入失败。
#[derive(Clone, Default)]
pub struct InMemoryLogStore {
    logs: Arc<RwLock<Vec<JobLog>>>,
    next_id: Arc<AtomicI64>,
    pending_failures: Arc<AtomicU32>,
    append_attempts: Arc<AtomicUsize>,
    max_field_length: Option<usize>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_field_length(max_field_length: usize) -> Self {
        Self {
            max_field_length: Some(max_field_length),
            ..Self::default()
        }
    }

    pub fn fail_next_appends(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// 按写入顺序返回全部日志
    pub async fn logs(&self) -> Vec<JobLog> {
        self.logs.read().await.clone()
    }

    pub fn append_attempts(&self) -> usize {
        self.append_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSink for InMemoryLogStore {
    async fn append_batch(&self, batch: &LogBatch) -> SchedulerResult<()> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(SchedulerError::Sink("内存日志存储模拟写入失败".to_string()));
        }

        let mut logs = self.logs.write().await;
        for log in &batch.logs {
            let mut log = log.clone();
            log.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(max_len) = self.max_field_length {
                log.truncate_fields(max_len);
            }
            logs.push(log);
        }
        Ok(())
    }
}

#[async_trait]
impl JobLogRepository for InMemoryLogStore {
    async fn list_by_job(
        &self,
        job_name: &str,
        skip: i64,
        limit: i64,
    ) -> SchedulerResult<Vec<JobLog>> {
        let logs = self.logs.read().await;
        Ok(logs
            .iter()
            .rev()
            .filter(|log| log.job_name == job_name)
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
