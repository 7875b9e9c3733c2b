pub mod in_memory;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use dcron_core::{
    config::{LogSinkBackend, LogSinkConfig},
    traits::{JobLogRepository, LogSink},
    SchedulerResult,
};
use tracing::info;

pub use in_memory::InMemoryLogStore;
pub use postgres::PostgresLogStore;
pub use sqlite::SqliteLogStore;

/// 同一个日志存储的写入端和查询端
#[derive(Clone)]
pub struct LogStoreHandle {
    pub sink: Arc<dyn LogSink>,
    pub repository: Arc<dyn JobLogRepository>,
}

impl LogStoreHandle {
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: LogSink + JobLogRepository + 'static,
    {
        Self {
            sink: store.clone(),
            repository: store,
        }
    }
}

/// 按配置创建日志存储，SQL后端会先建表
pub async fn create_log_store(config: &LogSinkConfig) -> SchedulerResult<LogStoreHandle> {
    match config.backend {
        LogSinkBackend::Memory => {
            info!("使用内存日志存储");
            Ok(LogStoreHandle::from_store(Arc::new(
                InMemoryLogStore::with_max_field_length(config.max_field_length),
            )))
        }
        LogSinkBackend::Sqlite => {
            let store =
                SqliteLogStore::connect(&config.url, config.max_connections, config.max_field_length)
                    .await?;
            store.migrate().await?;
            info!("使用SQLite日志存储: {}", config.url);
            Ok(LogStoreHandle::from_store(Arc::new(store)))
        }
        LogSinkBackend::Postgres => {
            let store = PostgresLogStore::connect(
                &config.url,
                config.max_connections,
                config.max_field_length,
            )
            .await?;
            store.migrate().await?;
            info!("使用PostgreSQL日志存储");
            Ok(LogStoreHandle::from_store(Arc::new(store)))
        }
    }
}
