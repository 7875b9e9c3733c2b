use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response as HttpResponse},
};
use tracing::{error, warn};

use dcron_core::SchedulerError;

use crate::response::Response;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Scheduler(e) if e.is_config_error() => StatusCode::BAD_REQUEST,
            ApiError::Scheduler(SchedulerError::JobNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("API请求失败: {}", self);
        } else {
            warn!("API请求被拒绝: {}", self);
        }

        (status, Response::error(self.to_string())).into_response()
    }
}
