//! 任务执行接口
//!
//! - [`JobExecutor`] 真正运行任务命令，监听 `ExecutionInfo::cancel_token`
//! - [`ExecutionDispatcher`] 是调度核心和强杀路径看到的执行引擎入口

use async_trait::async_trait;

use crate::models::{ExecutionInfo, ExecutionResult};

#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// 执行任务直到进程退出或被取消
    ///
    /// 失败也会产出结果，错误记录在 `ExecutionResult::error` 中。
    async fn execute(&self, info: &ExecutionInfo) -> ExecutionResult;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait ExecutionDispatcher: Send + Sync {
    /// 异步下发一次执行，同名任务已在执行时返回false
    async fn dispatch(&self, info: ExecutionInfo) -> bool;

    /// 取消同名任务的当前执行，没有正在执行的实例时返回false
    async fn cancel(&self, job_name: &str) -> bool;

    async fn is_executing(&self, job_name: &str) -> bool;
}
