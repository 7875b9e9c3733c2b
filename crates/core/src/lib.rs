//! 分布式Cron调度系统的共享核心
//!
//! - [`models`] 任务、事件、执行上下文与日志等值对象
//! - [`traits`] 协调服务、日志存储、执行器等外部协作方的接口
//! - [`config`] 应用配置
//! - [`errors`] 统一错误类型

pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use errors::*;
pub use models::{
    ExecutionFailure, ExecutionInfo, ExecutionResult, Job, JobEvent, JobEventType, JobLog,
    LogBatch, WorkerInfo,
};

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
