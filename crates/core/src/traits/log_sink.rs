use async_trait::async_trait;

use crate::{
    models::{JobLog, LogBatch},
    SchedulerResult,
};

/// 执行日志的长期存储，只追加
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn append_batch(&self, batch: &LogBatch) -> SchedulerResult<()>;
}

/// 执行日志查询
#[async_trait]
pub trait JobLogRepository: Send + Sync {
    /// 按任务名分页查询，最新的在前
    async fn list_by_job(&self, job_name: &str, skip: i64, limit: i64)
        -> SchedulerResult<Vec<JobLog>>;
}
