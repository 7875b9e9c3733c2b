//! # 数据模型
//!
//! 调度系统共享的值对象：任务定义、任务事件、执行上下文与结果、落库日志以及Worker信息。
//!
//! ## 生命周期
//!
//! ```text
//! Job ──(调度)──▶ ExecutionInfo ──(执行)──▶ ExecutionResult ──(转换)──▶ JobLog ──▶ LogBatch
//! ```
//!
//! - `Job` 由任务目录中的JSON条目构造，按 `name` 标识
//! - `ExecutionInfo` 每次下发创建一个，结果产出后丢弃
//! - `ExecutionResult` 只被日志管道消费一次
//! - `LogBatch` 刷出之前只追加

pub mod event;
pub mod execution;
pub mod job;
pub mod log;
pub mod worker;

pub use event::*;
pub use execution::*;
pub use job::*;
pub use log::*;
pub use worker::*;
