use serde::{Deserialize, Serialize};

use crate::{Result, SchedulerError};

/// 定时任务定义
///
/// 任务以JSON形式保存在协调服务的任务目录下，`name` 是唯一标识。
///
/// # 使用示例
///
/// ```rust
/// use dcron_core::models::Job;
///
/// let job = Job::from_json(br#"{"name":"ping","command":"echo hi","cronExpr":"* * * * * *"}"#).unwrap();
/// assert_eq!(job.name, "ping");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// 任务名
    pub name: String,
    /// shell命令
    pub command: String,
    /// cron表达式
    #[serde(rename = "cronExpr")]
    pub cron_expr: String,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        cron_expr: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            cron_expr: cron_expr.into(),
        }
    }

    /// 只携带名字的任务，用于删除和强杀事件
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: String::new(),
            cron_expr: String::new(),
        }
    }

    /// 从目录中的JSON值反序列化任务
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// 校验任务定义
    ///
    /// 任务名会成为各个目录下的键，因此只允许字母、数字、`-` 和 `_`。
    pub fn validate(&self) -> Result<()> {
        validate_job_name(&self.name)?;
        if self.command.trim().is_empty() {
            return Err(SchedulerError::InvalidJob(format!(
                "任务 {} 的命令不能为空",
                self.name
            )));
        }
        if self.cron_expr.trim().is_empty() {
            return Err(SchedulerError::InvalidJob(format!(
                "任务 {} 的cron表达式不能为空",
                self.name
            )));
        }
        Ok(())
    }
}

/// 校验任务名
pub fn validate_job_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SchedulerError::InvalidJob("任务名不能为空".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SchedulerError::InvalidJob(format!(
            "任务名只能包含字母、数字、'-'和'_': {name}"
        )));
    }
    Ok(())
}

/// 去掉目录前缀，获得任务名
pub fn strip_prefix<'a>(prefix: &str, key: &'a str) -> &'a str {
    key.strip_prefix(prefix).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_wire_format() {
        let job = Job::new("ping", "echo hi", "* * * * * *");
        let json = String::from_utf8(job.to_json().unwrap()).unwrap();
        assert!(json.contains("\"cronExpr\":\"* * * * * *\""));

        let parsed = Job::from_json(json.as_bytes()).unwrap();
        assert_eq!(parsed, job);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(Job::from_json(b"not json").is_err());
        assert!(Job::from_json(br#"{"name":"x"}"#).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(Job::new("backup_db-1", "echo", "* * * * * *").validate().is_ok());
        assert!(Job::new("", "echo", "* * * * * *").validate().is_err());
        assert!(Job::new("a/b", "echo", "* * * * * *").validate().is_err());
        assert!(Job::new("a.b", "echo", "* * * * * *").validate().is_err());
        assert!(Job::new("ok", "  ", "* * * * * *").validate().is_err());
        assert!(Job::new("ok", "echo", "").validate().is_err());
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("/cron/jobs/", "/cron/jobs/backup"), "backup");
        assert_eq!(strip_prefix("/cron/jobs/", "backup"), "backup");
    }
}
