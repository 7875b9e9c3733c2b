use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use dcron_core::{
    config::LockConfig,
    models::{ExecutionInfo, ExecutionResult},
    traits::{ExecutionDispatcher, JobExecutor},
};
use dcron_infrastructure::{MetricsCollector, StructuredLogger};

use crate::lock_coordinator::{LockAcquisition, LockCoordinator};
use crate::log_pipeline::ResultPipelineHandle;

/// 执行引擎
///
/// 维护任务名到取消句柄的映射，同一个任务名在本进程内同时只有一个执行。
/// 每次下发在独立的任务中完成抢锁、执行、释放锁和提交结果。
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    executor: Arc<dyn JobExecutor>,
    locks: LockCoordinator,
    pipeline: ResultPipelineHandle,
    acquire_jitter: Duration,
    active: RwLock<HashMap<String, CancellationToken>>,
    tasks: TaskTracker,
    metrics: MetricsCollector,
}

impl ExecutionEngine {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        locks: LockCoordinator,
        pipeline: ResultPipelineHandle,
        config: &LockConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                executor,
                locks,
                pipeline,
                acquire_jitter: config.acquire_jitter(),
                active: RwLock::new(HashMap::new()),
                tasks: TaskTracker::new(),
                metrics: MetricsCollector::new(),
            }),
        }
    }

    pub fn worker_id(&self) -> &str {
        self.inner.locks.owner_id()
    }

    /// 正在执行的任务名，已排序
    pub async fn active_jobs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.active.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// 取消全部正在执行的任务，返回取消的数量
    pub async fn cancel_all(&self) -> usize {
        let active = self.inner.active.read().await;
        for token in active.values() {
            token.cancel();
        }
        active.len()
    }

    /// 等待所有执行任务结束（包括释放锁和提交结果），超时返回false
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let tasks = &self.inner.tasks;
        tasks.close();
        let idle = tokio::time::timeout(timeout, tasks.wait()).await.is_ok();
        tasks.reopen();
        idle
    }
}

#[async_trait]
impl ExecutionDispatcher for ExecutionEngine {
    async fn dispatch(&self, info: ExecutionInfo) -> bool {
        let job_name = info.job_name().to_string();
        {
            let mut active = self.inner.active.write().await;
            if active.contains_key(&job_name) {
                debug!("任务 {} 正在执行，跳过本次下发", job_name);
                return false;
            }
            active.insert(job_name, info.cancel_token.clone());
            self.inner.metrics.update_active_executions(active.len());
        }

        let inner = Arc::clone(&self.inner);
        self.inner
            .tasks
            .spawn(async move { inner.run_execution(info).await });
        true
    }

    async fn cancel(&self, job_name: &str) -> bool {
        match self.inner.active.read().await.get(job_name) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn is_executing(&self, job_name: &str) -> bool {
        self.inner.active.read().await.contains_key(job_name)
    }
}

impl EngineInner {
    async fn run_execution(&self, info: ExecutionInfo) {
        let job_name = info.job_name().to_string();
        let worker_id = self.locks.owner_id().to_string();

        // 随机等待一小段时间，让各Worker的抢锁机会更均匀
        if !self.sleep_jitter(&info.cancel_token).await {
            info!("任务 {} 在抢锁前被强杀，放弃本次执行", job_name);
            self.finish(&job_name).await;
            return;
        }

        let lock = match self.locks.try_acquire(&job_name, info.plan_time).await {
            Ok(LockAcquisition::Acquired(lock)) => lock,
            Ok(LockAcquisition::Busy) => {
                StructuredLogger::log_lock_busy(&job_name, &worker_id);
                self.metrics.record_lock_busy();
                self.finish(&job_name).await;
                return;
            }
            Err(e) => {
                StructuredLogger::log_system_error("lock_coordinator", "try_acquire", &e);
                self.finish(&job_name).await;
                return;
            }
        };

        let drift = info.schedule_drift();
        StructuredLogger::log_job_execution_start(
            &job_name,
            &worker_id,
            info.plan_time,
            drift.num_milliseconds(),
        );
        self.metrics
            .record_schedule_drift(drift.num_milliseconds() as f64 / 1000.0);

        let result = self.executor.execute(&info).await;

        self.finish(&job_name).await;
        if let Err(e) = lock.release().await {
            warn!("释放任务锁失败，等待锁自然过期: job={}, error={}", job_name, e);
        }

        self.record_result(&result, &worker_id);
        self.pipeline.submit(&result);
    }

    async fn sleep_jitter(&self, cancel: &CancellationToken) -> bool {
        let jitter = random_jitter(self.acquire_jitter);
        if jitter.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(jitter) => true,
        }
    }

    async fn finish(&self, job_name: &str) {
        let mut active = self.active.write().await;
        active.remove(job_name);
        self.metrics.update_active_executions(active.len());
    }

    fn record_result(&self, result: &ExecutionResult, worker_id: &str) {
        let job_name = result.execution_info.job_name();
        let duration = result.duration();
        let duration_ms = duration.num_milliseconds();
        let duration_secs = duration_ms as f64 / 1000.0;

        match &result.error {
            None => {
                StructuredLogger::log_job_execution_complete(job_name, worker_id, duration_ms, None);
                self.metrics.record_execution("success", duration_secs);
            }
            Some(failure) if failure.is_cancelled() => {
                StructuredLogger::log_job_execution_cancelled(job_name, worker_id, duration_ms);
                self.metrics.record_execution("cancelled", duration_secs);
            }
            Some(failure) => {
                let message = failure.to_string();
                StructuredLogger::log_job_execution_complete(
                    job_name,
                    worker_id,
                    duration_ms,
                    Some(&message),
                );
                self.metrics.record_execution("failed", duration_secs);
            }
        }
    }
}

fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}
