//! Structured logging utilities
//!
//! 每条领域事件都带固定的 `event` 字段，便于日志平台按事件检索。

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log job scheduling event
    pub fn log_job_scheduled(job_name: &str, cron_expr: &str, next_fire_time: DateTime<Utc>) {
        info!(
            event = "job_scheduled",
            job.name = job_name,
            job.cron_expr = cron_expr,
            job.next_fire_time = %next_fire_time,
            "Job scheduled"
        );
    }

    /// Log job removed from the timetable
    pub fn log_job_unscheduled(job_name: &str) {
        info!(
            event = "job_unscheduled",
            job.name = job_name,
            "Job removed from timetable"
        );
    }

    /// 同名任务仍在执行，本次调度被忽略
    pub fn log_job_dispatch_skipped(job_name: &str, plan_time: DateTime<Utc>) {
        debug!(
            event = "job_dispatch_skipped",
            job.name = job_name,
            job.plan_time = %plan_time,
            "Job still running, dispatch skipped"
        );
    }

    /// 抢锁失败属于正常竞争
    pub fn log_lock_busy(job_name: &str, worker_id: &str) {
        debug!(
            event = "lock_busy",
            job.name = job_name,
            worker.id = worker_id,
            "Job lock held by another worker"
        );
    }

    pub fn log_job_execution_start(
        job_name: &str,
        worker_id: &str,
        plan_time: DateTime<Utc>,
        drift_ms: i64,
    ) {
        info!(
            event = "job_execution_start",
            job.name = job_name,
            worker.id = worker_id,
            job.plan_time = %plan_time,
            job.drift_ms = drift_ms,
            "Job execution started"
        );
    }

    pub fn log_job_execution_complete(
        job_name: &str,
        worker_id: &str,
        duration_ms: i64,
        error_message: Option<&str>,
    ) {
        match error_message {
            None => info!(
                event = "job_execution_complete",
                job.name = job_name,
                worker.id = worker_id,
                job.duration_ms = duration_ms,
                "Job execution completed successfully"
            ),
            Some(message) => warn!(
                event = "job_execution_failed",
                job.name = job_name,
                worker.id = worker_id,
                job.duration_ms = duration_ms,
                job.error = message,
                "Job execution failed"
            ),
        }
    }

    pub fn log_job_execution_cancelled(job_name: &str, worker_id: &str, duration_ms: i64) {
        warn!(
            event = "job_execution_cancelled",
            job.name = job_name,
            worker.id = worker_id,
            job.duration_ms = duration_ms,
            "Job execution killed"
        );
    }

    pub fn log_batch_flushed(batch_size: usize, attempts: u32, duration_ms: u64) {
        debug!(
            event = "log_batch_flushed",
            batch.size = batch_size,
            batch.attempts = attempts,
            batch.duration_ms = duration_ms,
            "Log batch flushed"
        );
    }

    /// 重试耗尽后丢弃批次
    pub fn log_batch_dropped(batch_size: usize, attempts: u32, error: &dyn std::error::Error) {
        error!(
            event = "log_batch_dropped",
            batch.size = batch_size,
            batch.attempts = attempts,
            error.message = %error,
            "Log batch dropped after retries"
        );
    }

    /// 单个任务配置错误，不影响其他任务
    pub fn log_config_error(job_name: &str, error: &dyn std::error::Error) {
        error!(
            event = "config_error",
            job.name = job_name,
            error.message = %error,
            "Job configuration rejected"
        );
    }

    pub fn log_worker_registered(worker_id: &str, hostname: &str, ip_address: &str) {
        info!(
            event = "worker_registered",
            worker.id = worker_id,
            worker.hostname = hostname,
            worker.ip_address = ip_address,
            "Worker registered"
        );
    }

    /// Log system error
    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            error.component = component,
            error.operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcron_core::SchedulerError;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_events_carry_event_field() {
        let err = SchedulerError::InvalidCron {
            expr: "bad".to_string(),
            message: "parse".to_string(),
        };
        StructuredLogger::log_config_error("backup", &err);
        StructuredLogger::log_job_execution_complete("ping", "w1", 12, None);

        assert!(logs_contain("config_error"));
        assert!(logs_contain("backup"));
        assert!(logs_contain("job_execution_complete"));
    }
}
