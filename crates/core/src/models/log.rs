use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ExecutionResult;

/// 落库用的执行日志
///
/// 所有时间均为毫秒时间戳，`id` 由日志存储分配，入库前为0。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLog {
    #[serde(default)]
    pub id: i64,
    pub job_name: String,
    pub command: String,
    pub err: String,
    pub output: String,
    /// 计划开始时间
    pub plan_time: i64,
    /// 实际调度时间
    pub schedule_time: i64,
    /// 任务执行开始时间
    pub start_time: i64,
    /// 任务执行结束时间
    pub end_time: i64,
}

impl JobLog {
    pub fn from_result(result: &ExecutionResult) -> Self {
        let info = &result.execution_info;
        Self {
            id: 0,
            job_name: info.job.name.clone(),
            command: info.job.command.clone(),
            err: result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            output: result.output_lossy(),
            plan_time: epoch_millis(info.plan_time),
            schedule_time: epoch_millis(info.real_time),
            start_time: epoch_millis(result.start_time),
            end_time: epoch_millis(result.end_time),
        }
    }

    /// 按字符边界截断 `err` 和 `output`
    pub fn truncate_fields(&mut self, max_len: usize) {
        truncate_in_place(&mut self.err, max_len);
        truncate_in_place(&mut self.output, max_len);
    }
}

fn epoch_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn truncate_in_place(s: &mut String, max_len: usize) {
    if s.len() <= max_len {
        return;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

/// 日志批次，刷出前只追加
#[derive(Debug, Clone, Default)]
pub struct LogBatch {
    pub logs: Vec<JobLog>,
}

impl LogBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            logs: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, log: JobLog) {
        self.logs.push(log);
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// 取走当前批次，留下一个空批次
    pub fn take(&mut self) -> LogBatch {
        LogBatch {
            logs: std::mem::take(&mut self.logs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionFailure, ExecutionInfo, Job};

    fn sample_result(error: Option<ExecutionFailure>) -> ExecutionResult {
        let info = ExecutionInfo::new(Job::new("ping", "echo hi", "* * * * * *"), Utc::now());
        let start_time = info.real_time;
        ExecutionResult {
            execution_info: info,
            output: b"hi\n".to_vec(),
            error,
            start_time,
            end_time: start_time + chrono::Duration::milliseconds(5),
        }
    }

    #[test]
    fn test_from_result() {
        let result = sample_result(None);
        let log = JobLog::from_result(&result);

        assert_eq!(log.id, 0);
        assert_eq!(log.job_name, "ping");
        assert_eq!(log.output, "hi\n");
        assert!(log.err.is_empty());
        assert_eq!(log.end_time - log.start_time, 5);
        assert_eq!(log.schedule_time, result.execution_info.real_time.timestamp_millis());
    }

    #[test]
    fn test_from_cancelled_result() {
        let log = JobLog::from_result(&sample_result(Some(ExecutionFailure::Cancelled)));
        assert_eq!(log.err, ExecutionFailure::Cancelled.to_string());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(JobLog::from_result(&sample_result(None))).unwrap();
        for field in ["jobName", "planTime", "scheduleTime", "startTime", "endTime"] {
            assert!(json.get(field).is_some(), "缺少字段 {field}");
        }
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let mut log = JobLog::from_result(&sample_result(None));
        log.output = "日志输出".to_string();
        log.truncate_fields(4);
        assert_eq!(log.output, "日");
    }

    #[test]
    fn test_batch_take() {
        let mut batch = LogBatch::default();
        batch.push(JobLog::from_result(&sample_result(None)));
        batch.push(JobLog::from_result(&sample_result(None)));
        assert_eq!(batch.len(), 2);

        let taken = batch.take();
        assert_eq!(taken.len(), 2);
        assert!(batch.is_empty());
    }
}
