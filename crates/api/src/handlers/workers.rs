use axum::extract::State;

use crate::{
    error::ApiResult,
    response::{success, Response},
    routes::AppState,
};

/// 列出存活的Worker
pub async fn list_workers(State(state): State<AppState>) -> ApiResult<Response> {
    let workers = state.job_manager.list_workers().await?;
    Ok(success(workers))
}
