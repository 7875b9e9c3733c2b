//! Metrics collector for the distributed cron scheduler
//!
//! 通过 `metrics` 门面记录指标，exporter由部署方安装。

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

/// Metrics collector for the distributed cron scheduler
#[derive(Clone)]
pub struct MetricsCollector {
    dispatches_total: Counter,
    dispatch_skipped_total: Counter,
    lock_busy_total: Counter,
    config_errors_total: Counter,
    execution_duration: Histogram,
    schedule_drift: Histogram,
    log_records_flushed_total: Counter,
    log_flush_retries_total: Counter,
    scheduled_jobs: Gauge,
    active_executions: Gauge,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            dispatches_total: counter!("dcron_dispatches_total"),
            dispatch_skipped_total: counter!("dcron_dispatch_skipped_total"),
            lock_busy_total: counter!("dcron_lock_busy_total"),
            config_errors_total: counter!("dcron_config_errors_total"),
            execution_duration: histogram!("dcron_execution_duration_seconds"),
            schedule_drift: histogram!("dcron_schedule_drift_seconds"),
            log_records_flushed_total: counter!("dcron_log_records_flushed_total"),
            log_flush_retries_total: counter!("dcron_log_flush_retries_total"),
            scheduled_jobs: gauge!("dcron_scheduled_jobs"),
            active_executions: gauge!("dcron_active_executions"),
        }
    }

    // Scheduler metrics

    pub fn record_dispatch(&self) {
        self.dispatches_total.increment(1);
    }

    pub fn record_dispatch_skipped(&self) {
        self.dispatch_skipped_total.increment(1);
    }

    pub fn record_config_error(&self) {
        self.config_errors_total.increment(1);
    }

    pub fn update_scheduled_jobs(&self, count: usize) {
        self.scheduled_jobs.set(count as f64);
    }

    // Execution metrics

    pub fn record_lock_busy(&self) {
        self.lock_busy_total.increment(1);
    }

    /// 实际下发时间与理论调度时间之差
    pub fn record_schedule_drift(&self, drift_seconds: f64) {
        self.schedule_drift.record(drift_seconds.max(0.0));
    }

    /// `outcome` 取值: success, failed, cancelled
    pub fn record_execution(&self, outcome: &'static str, duration_seconds: f64) {
        counter!("dcron_executions_total", "outcome" => outcome).increment(1);
        self.execution_duration.record(duration_seconds);
    }

    pub fn update_active_executions(&self, count: usize) {
        self.active_executions.set(count as f64);
    }

    // Log pipeline metrics

    pub fn record_logs_flushed(&self, count: usize) {
        self.log_records_flushed_total.increment(count as u64);
    }

    pub fn record_log_flush_retry(&self) {
        self.log_flush_retries_total.increment(1);
    }

    /// `reason` 取值: queue_full, closed, sink_error
    pub fn record_logs_dropped(&self, reason: &'static str, count: usize) {
        counter!("dcron_log_records_dropped_total", "reason" => reason).increment(count as u64);
    }
}
