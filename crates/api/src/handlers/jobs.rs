use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use serde::Deserialize;

use dcron_core::models::{validate_job_name, Job};

use crate::{
    error::{ApiError, ApiResult},
    response::{success, Response},
    routes::AppState,
};

const DEFAULT_LOG_LIMIT: i64 = 20;
const MAX_LOG_LIMIT: i64 = 500;

/// 按任务名操作的请求体
#[derive(Debug, Deserialize)]
pub struct JobNameRequest {
    pub name: String,
}

/// 执行日志查询参数
#[derive(Debug, Deserialize)]
pub struct JobLogQuery {
    pub name: String,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// 保存任务，返回被覆盖的旧任务
pub async fn save_job(
    State(state): State<AppState>,
    payload: Result<Json<Job>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(job) = payload?;
    let previous = state.job_manager.save_job(job).await?;
    Ok(success(previous))
}

/// 删除任务，返回被删除的任务
pub async fn delete_job(
    State(state): State<AppState>,
    payload: Result<Json<JobNameRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let previous = state.job_manager.delete_job(&request.name).await?;
    Ok(success(previous))
}

pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Response> {
    let jobs = state.job_manager.list_jobs().await?;
    Ok(success(jobs))
}

/// 强杀任务
pub async fn kill_job(
    State(state): State<AppState>,
    payload: Result<Json<JobNameRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    state.job_manager.kill_job(&request.name).await?;
    Ok(success(()))
}

/// 分页查询任务的执行日志，最新的在前
pub async fn job_logs(
    State(state): State<AppState>,
    query: Result<Query<JobLogQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    validate_job_name(&query.name)?;

    let skip = query.skip.unwrap_or(0);
    if skip < 0 {
        return Err(ApiError::BadRequest(format!("skip不能为负数: {skip}")));
    }
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    if limit <= 0 {
        return Err(ApiError::BadRequest(format!("limit必须大于0: {limit}")));
    }

    let logs = state
        .log_repository
        .list_by_job(&query.name, skip, limit.min(MAX_LOG_LIMIT))
        .await?;
    Ok(success(logs))
}
