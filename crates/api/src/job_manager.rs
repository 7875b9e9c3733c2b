use std::sync::Arc;

use tracing::{info, warn};

use dcron_core::{
    config::NamespaceConfig,
    models::{strip_prefix, validate_job_name, Job, WorkerInfo},
    traits::CoordinationStore,
    SchedulerResult,
};
use dcron_dispatcher::CronScheduler;

/// 任务目录管理
///
/// 只读写协调服务中的任务目录和强杀目录，调度和执行由各Worker监听后完成。
pub struct JobManager {
    store: Arc<dyn CoordinationStore>,
    namespace: NamespaceConfig,
}

impl JobManager {
    pub fn new(store: Arc<dyn CoordinationStore>, namespace: NamespaceConfig) -> Self {
        Self { store, namespace }
    }

    /// 保存任务，返回被覆盖的旧任务
    pub async fn save_job(&self, job: Job) -> SchedulerResult<Option<Job>> {
        job.validate()?;
        CronScheduler::validate_cron_expression(&job.cron_expr)?;

        let key = self.namespace.job_key(&job.name);
        let previous = self.decode_previous(self.store.get(&key).await?.map(|kv| kv.value));
        self.store.put(&key, job.to_json()?).await?;

        info!("保存任务: name={}, cron={}", job.name, job.cron_expr);
        Ok(previous)
    }

    /// 删除任务，返回被删除的任务
    pub async fn delete_job(&self, name: &str) -> SchedulerResult<Option<Job>> {
        validate_job_name(name)?;

        let previous = self.store.delete(&self.namespace.job_key(name)).await?;
        info!("删除任务: name={}", name);
        Ok(self.decode_previous(previous))
    }

    pub async fn list_jobs(&self) -> SchedulerResult<Vec<Job>> {
        let snapshot = self.store.list(&self.namespace.job_prefix).await?;

        let mut jobs = Vec::with_capacity(snapshot.entries.len());
        for entry in snapshot.entries {
            match Job::from_json(&entry.value) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(
                    "跳过无法解析的任务 {}: {}",
                    strip_prefix(&self.namespace.job_prefix, &entry.key),
                    e
                ),
            }
        }
        Ok(jobs)
    }

    /// 通知所有Worker强杀任务
    ///
    /// 写入后立即删除强杀键：Worker只关心写入事件，目录里不留下任何状态。
    pub async fn kill_job(&self, name: &str) -> SchedulerResult<()> {
        validate_job_name(name)?;

        let key = self.namespace.kill_key(name);
        self.store.put(&key, Vec::new()).await?;
        self.store.delete(&key).await?;

        info!("下发强杀: name={}", name);
        Ok(())
    }

    pub async fn list_workers(&self) -> SchedulerResult<Vec<WorkerInfo>> {
        dcron_worker::list_workers(self.store.as_ref(), &self.namespace.worker_prefix).await
    }

    fn decode_previous(&self, value: Option<Vec<u8>>) -> Option<Job> {
        value.and_then(|bytes| Job::from_json(&bytes).ok())
    }
}
