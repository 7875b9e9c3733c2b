//! # dcron API
//!
//! 任务目录的管理接口。所有写操作只落到协调服务，Worker通过监听感知变化。
//!
//! ## API 端点
//!
//! - `POST /job/save` - 保存任务，请求体为任务JSON
//! - `POST /job/delete` - 删除任务，请求体 `{"name": "..."}`
//! - `GET /job/list` - 列出全部任务
//! - `POST /job/kill` - 强杀任务，请求体 `{"name": "..."}`
//! - `GET /job/log?name=&skip=&limit=` - 分页查询执行日志
//! - `GET /worker/list` - 列出存活的Worker
//! - `GET /health` - 健康检查
//!
//! ## 响应格式
//!
//! ```json
//! {"errno": 0, "msg": "success", "data": {"name": "ping", "command": "echo hi", "cronExpr": "* * * * * *"}}
//! ```
//!
//! 出错时 `errno` 为 -1，`msg` 为错误信息，`data` 为 `null`。

pub mod error;
pub mod handlers;
pub mod job_manager;
pub mod middleware;
pub mod response;
pub mod routes;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::info;

use dcron_core::{config::ApiConfig, SchedulerError, SchedulerResult};

pub use error::{ApiError, ApiResult};
pub use job_manager::JobManager;
pub use response::{Response, ResponseData};
pub use routes::{create_routes, AppState};

use middleware::{cors_layer, request_logging, trace_layer};

/// 创建带中间件的API应用
pub fn create_app(state: AppState, config: &ApiConfig) -> Router {
    let app = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if config.cors_enabled {
        app.layer(cors_layer())
    } else {
        app
    }
}

/// 监听地址并提供服务，直到 `shutdown` 完成
pub async fn serve<F>(app: Router, bind_address: &str, shutdown: F) -> SchedulerResult<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = bind_address
        .parse()
        .map_err(|e| SchedulerError::Configuration(format!("无效的监听地址 {bind_address}: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| SchedulerError::Internal(format!("绑定地址 {addr} 失败: {e}")))?;
    info!("API服务监听 {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| SchedulerError::Internal(format!("API服务异常退出: {e}")))?;

    info!("API服务已停止");
    Ok(())
}
