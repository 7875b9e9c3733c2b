use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use dcron_core::traits::JobLogRepository;

use crate::handlers::{
    health::health_check,
    jobs::{delete_job, job_logs, kill_job, list_jobs, save_job},
    workers::list_workers,
};
use crate::job_manager::JobManager;

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub job_manager: Arc<JobManager>,
    pub log_repository: Arc<dyn JobLogRepository>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // 任务管理
        .route("/job/save", post(save_job))
        .route("/job/delete", post(delete_job))
        .route("/job/list", get(list_jobs))
        .route("/job/kill", post(kill_job))
        .route("/job/log", get(job_logs))
        // Worker
        .route("/worker/list", get(list_workers))
        .with_state(state)
}
