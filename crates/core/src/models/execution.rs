use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::Job;

/// 一次调度下发的执行上下文
///
/// `cancel_token` 是唯一与正在运行的任务名绑定的可变共享状态：
/// 执行引擎负责监听，强杀路径负责触发。
#[derive(Debug, Clone)]
pub struct ExecutionInfo {
    pub job: Job,
    /// 理论调度时间
    pub plan_time: DateTime<Utc>,
    /// 实际下发时间
    pub real_time: DateTime<Utc>,
    pub cancel_token: CancellationToken,
}

impl ExecutionInfo {
    pub fn new(job: Job, plan_time: DateTime<Utc>) -> Self {
        Self {
            job,
            plan_time,
            real_time: Utc::now(),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job.name
    }

    /// 调度延迟（实际下发时间 - 理论调度时间）
    pub fn schedule_drift(&self) -> chrono::Duration {
        self.real_time - self.plan_time
    }
}

/// 执行失败原因
///
/// 强杀和执行失败分开建模，便于运维区分主动停止和真正的故障。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFailure {
    #[error("进程启动失败: {0}")]
    Spawn(String),

    #[error("进程退出码非零: {0}")]
    NonZeroExit(i32),

    #[error("进程被信号终止: {0:?}")]
    Signaled(Option<i32>),

    #[error("读取进程输出失败: {0}")]
    Io(String),

    #[error("任务被强制终止")]
    Cancelled,
}

impl ExecutionFailure {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionFailure::Cancelled)
    }
}

/// 执行结果
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_info: ExecutionInfo,
    /// stdout和stderr合并后的输出
    pub output: Vec<u8>,
    pub error: Option<ExecutionFailure>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(ExecutionFailure::is_cancelled)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_info_new() {
        let plan_time = Utc::now() - chrono::Duration::milliseconds(20);
        let info = ExecutionInfo::new(Job::new("ping", "echo hi", "* * * * * *"), plan_time);

        assert_eq!(info.job_name(), "ping");
        assert!(info.real_time >= info.plan_time);
        assert!(info.schedule_drift() >= chrono::Duration::zero());
        assert!(!info.cancel_token.is_cancelled());
    }

    #[test]
    fn test_failure_kinds() {
        assert!(ExecutionFailure::Cancelled.is_cancelled());
        assert!(!ExecutionFailure::NonZeroExit(1).is_cancelled());
        assert_eq!(ExecutionFailure::NonZeroExit(2).to_string(), "进程退出码非零: 2");
    }
}
