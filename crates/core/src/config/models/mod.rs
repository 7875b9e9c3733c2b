pub mod api_observability;
pub mod app_config;
pub mod coordination;
pub mod dispatcher_worker;
pub mod log_sink;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use coordination::{CoordinationBackend, CoordinationConfig, NamespaceConfig};
pub use dispatcher_worker::{
    ExecutorConfig, LockConfig, SchedulerConfig, WorkerConfig, REGISTRATION_LEASE_MULTIPLIER,
};
pub use log_sink::{LogSinkBackend, LogSinkConfig};
