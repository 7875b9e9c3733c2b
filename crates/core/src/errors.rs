use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的任务定义: {0}")]
    InvalidJob(String),

    #[error("任务未找到: {name}")]
    JobNotFound { name: String },

    /// 锁被其他Worker持有，属于正常竞争，不是故障
    #[error("任务锁已被占用: {job_name}")]
    LockBusy { job_name: String },

    #[error("任务执行错误: {0}")]
    Execution(String),

    #[error("任务被强制终止: {job_name}")]
    Cancelled { job_name: String },

    #[error("日志写入失败: {0}")]
    Sink(String),

    #[error("协调服务错误: {0}")]
    Coordination(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 是否为预期内的锁竞争
    pub fn is_lock_busy(&self) -> bool {
        matches!(self, SchedulerError::LockBusy { .. })
    }

    /// 是否只影响单个任务的配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidCron { .. } | SchedulerError::InvalidJob(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, SchedulerError>;
