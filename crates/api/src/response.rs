use axum::{response::IntoResponse, Json};
use serde::Serialize;

use dcron_core::models::{Job, JobLog, WorkerInfo};

/// 统一响应格式: `{"errno": 0, "msg": "success", "data": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub errno: i32,
    pub msg: String,
    pub data: ResponseData,
}

/// 各接口的响应数据
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Job(Job),
    Jobs(Vec<Job>),
    Logs(Vec<JobLog>),
    Workers(Vec<WorkerInfo>),
    /// 序列化为 `null`
    Empty,
}

impl From<Option<Job>> for ResponseData {
    fn from(job: Option<Job>) -> Self {
        match job {
            Some(job) => ResponseData::Job(job),
            None => ResponseData::Empty,
        }
    }
}

impl From<Job> for ResponseData {
    fn from(job: Job) -> Self {
        ResponseData::Job(job)
    }
}

impl From<Vec<Job>> for ResponseData {
    fn from(jobs: Vec<Job>) -> Self {
        ResponseData::Jobs(jobs)
    }
}

impl From<Vec<JobLog>> for ResponseData {
    fn from(logs: Vec<JobLog>) -> Self {
        ResponseData::Logs(logs)
    }
}

impl From<Vec<WorkerInfo>> for ResponseData {
    fn from(workers: Vec<WorkerInfo>) -> Self {
        ResponseData::Workers(workers)
    }
}

impl From<()> for ResponseData {
    fn from(_: ()) -> Self {
        ResponseData::Empty
    }
}

impl Response {
    pub fn success(data: ResponseData) -> Self {
        Self {
            errno: 0,
            msg: "success".to_string(),
            data,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            errno: -1,
            msg: msg.into(),
            data: ResponseData::Empty,
        }
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

pub fn success(data: impl Into<ResponseData>) -> Response {
    Response::success(data.into())
}
