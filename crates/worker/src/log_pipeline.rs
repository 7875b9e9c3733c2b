//! 执行结果管道
//!
//! 执行引擎只负责把结果放进有界队列，攒批和落库都在后台完成：
//!
//! - 批次满 `max_batch_size` 条立即刷写
//! - 新批次的第一条记录启动 `max_batch_age` 计时，到期即刷写
//! - 刷写失败线性退避重试，超过 `max_retries` 后丢弃整批并上报
//! - 同一时刻最多一个批次在刷写，批次按产生顺序落库
//!
//! 队列满时直接丢弃记录，宁可丢日志也不阻塞任务执行。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dcron_core::{
    config::LogSinkConfig,
    models::{ExecutionResult, JobLog, LogBatch},
    traits::LogSink,
};
use dcron_infrastructure::{MetricsCollector, StructuredLogger};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_batch_size: usize,
    pub max_batch_age: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&LogSinkConfig::default())
    }
}

impl From<&LogSinkConfig> for PipelineConfig {
    fn from(config: &LogSinkConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size.max(1),
            max_batch_age: config.max_batch_age(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            queue_capacity: config.queue_capacity.max(1),
        }
    }
}

/// 提交执行结果的句柄，可以在多个执行任务间克隆
#[derive(Clone)]
pub struct ResultPipelineHandle {
    tx: mpsc::Sender<JobLog>,
    metrics: MetricsCollector,
}

impl ResultPipelineHandle {
    /// 提交一条执行结果，队列已满或管道已关闭时丢弃并返回false
    pub fn submit(&self, result: &ExecutionResult) -> bool {
        let log = JobLog::from_result(result);
        match self.tx.try_send(log) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(log)) => {
                warn!("日志队列已满，丢弃任务 {} 的执行日志", log.job_name);
                self.metrics.record_logs_dropped("queue_full", 1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(log)) => {
                warn!("日志管道已关闭，丢弃任务 {} 的执行日志", log.job_name);
                self.metrics.record_logs_dropped("closed", 1);
                false
            }
        }
    }
}

pub struct ResultPipeline {
    sink: Arc<dyn LogSink>,
    config: PipelineConfig,
    metrics: MetricsCollector,
}

impl ResultPipeline {
    /// 启动后台收集循环
    ///
    /// 关闭信号触发后刷写剩余记录并等待进行中的刷写结束，返回的 `JoinHandle` 随之完成。
    pub fn start(
        sink: Arc<dyn LogSink>,
        config: PipelineConfig,
        shutdown: CancellationToken,
    ) -> (ResultPipelineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let metrics = MetricsCollector::new();
        let handle = ResultPipelineHandle {
            tx,
            metrics: metrics.clone(),
        };

        let pipeline = Self {
            sink,
            config,
            metrics,
        };
        let join = tokio::spawn(pipeline.run(rx, shutdown));
        (handle, join)
    }

    async fn run(self, mut rx: mpsc::Receiver<JobLog>, shutdown: CancellationToken) {
        let mut batch = LogBatch::with_capacity(self.config.max_batch_size);
        let mut deadline: Option<Instant> = None;
        let mut in_flight: Option<JoinHandle<()>> = None;

        info!(
            "日志管道启动: max_batch_size={}, max_batch_age={:?}",
            self.config.max_batch_size, self.config.max_batch_age
        );

        loop {
            let age_timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                log = rx.recv() => match log {
                    Some(log) => {
                        if batch.is_empty() {
                            deadline = Some(Instant::now() + self.config.max_batch_age);
                        }
                        batch.push(log);
                        if batch.len() >= self.config.max_batch_size {
                            self.flush(&mut in_flight, batch.take()).await;
                            deadline = None;
                        }
                    }
                    None => break,
                },
                _ = age_timer => {
                    if !batch.is_empty() {
                        self.flush(&mut in_flight, batch.take()).await;
                    }
                    deadline = None;
                }
                joined = wait_flush(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    log_flush_exit(joined);
                }
            }
        }

        // 关闭时把队列里剩余的记录全部刷出去
        rx.close();
        while let Some(log) = rx.recv().await {
            batch.push(log);
            if batch.len() >= self.config.max_batch_size {
                self.flush(&mut in_flight, batch.take()).await;
            }
        }
        if !batch.is_empty() {
            self.flush(&mut in_flight, batch.take()).await;
        }
        if let Some(last) = in_flight.take() {
            log_flush_exit(last.await);
        }
        info!("日志管道已停止");
    }

    /// 等上一批刷写结束后在后台刷写 `batch`
    async fn flush(&self, in_flight: &mut Option<JoinHandle<()>>, batch: LogBatch) {
        if let Some(previous) = in_flight.take() {
            log_flush_exit(previous.await);
        }
        debug!("刷写日志批次: {} 条", batch.len());
        *in_flight = Some(tokio::spawn(flush_with_retry(
            Arc::clone(&self.sink),
            batch,
            self.config.clone(),
            self.metrics.clone(),
        )));
    }
}

async fn wait_flush(in_flight: &mut Option<JoinHandle<()>>) -> Result<(), JoinError> {
    match in_flight {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn log_flush_exit(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        warn!("日志刷写任务异常退出: {}", e);
    }
}

async fn flush_with_retry(
    sink: Arc<dyn LogSink>,
    batch: LogBatch,
    config: PipelineConfig,
    metrics: MetricsCollector,
) {
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match sink.append_batch(&batch).await {
            Ok(()) => {
                StructuredLogger::log_batch_flushed(
                    batch.len(),
                    attempts,
                    started.elapsed().as_millis() as u64,
                );
                metrics.record_logs_flushed(batch.len());
                return;
            }
            Err(e) if attempts > config.max_retries => {
                StructuredLogger::log_batch_dropped(batch.len(), attempts, &e);
                metrics.record_logs_dropped("sink_error", batch.len());
                return;
            }
            Err(e) => {
                warn!("日志批次写入失败，第 {} 次重试: {}", attempts, e);
                metrics.record_log_flush_retry();
                tokio::time::sleep(config.retry_backoff * attempts).await;
            }
        }
    }
}
