//! 基础设施层：协调服务与日志存储的具体实现，以及可观测性工具

pub mod coordination;
pub mod log_store;
pub mod observability;

pub use coordination::{
    create_coordination_store, InMemoryCoordinationStore, NatsKvCoordinationStore,
};
pub use log_store::{
    create_log_store, InMemoryLogStore, LogStoreHandle, PostgresLogStore, SqliteLogStore,
};
pub use observability::{MetricsCollector, StructuredLogger};
