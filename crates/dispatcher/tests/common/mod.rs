use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use dcron_core::{models::ExecutionInfo, traits::ExecutionDispatcher};

/// 记录下发和强杀调用的执行引擎替身
#[derive(Default)]
pub struct RecordingDispatcher {
    pub dispatched: Mutex<Vec<ExecutionInfo>>,
    pub cancelled: Mutex<Vec<String>>,
    pub busy: Mutex<HashSet<String>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让同名任务的下发被拒绝，模拟仍在执行
    pub fn mark_busy(&self, job_name: &str) {
        self.busy.lock().unwrap().insert(job_name.to_string());
    }

    pub fn dispatched_names(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .map(|info| info.job.name.clone())
            .collect()
    }

    pub fn cancelled_names(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionDispatcher for RecordingDispatcher {
    async fn dispatch(&self, info: ExecutionInfo) -> bool {
        if self.busy.lock().unwrap().contains(&info.job.name) {
            return false;
        }
        self.dispatched.lock().unwrap().push(info);
        true
    }

    async fn cancel(&self, job_name: &str) -> bool {
        self.cancelled.lock().unwrap().push(job_name.to_string());
        true
    }

    async fn is_executing(&self, job_name: &str) -> bool {
        self.busy.lock().unwrap().contains(job_name)
    }
}
