use super::Job;

/// 任务变化事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEventType {
    /// 新增或更新
    Save,
    /// 删除
    Delete,
    /// 强杀正在执行的实例
    Kill,
}

/// 任务变化事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    pub event_type: JobEventType,
    pub job: Job,
}

impl JobEvent {
    pub fn save(job: Job) -> Self {
        Self {
            event_type: JobEventType::Save,
            job,
        }
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self {
            event_type: JobEventType::Delete,
            job: Job::named(name),
        }
    }

    pub fn kill(name: impl Into<String>) -> Self {
        Self {
            event_type: JobEventType::Kill,
            job: Job::named(name),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job.name
    }
}
