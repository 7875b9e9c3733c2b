pub mod execution_engine;
pub mod executors;
pub mod lock_coordinator;
pub mod log_pipeline;
pub mod registration;


pub use execution_engine::ExecutionEngine;
pub use executors::ShellExecutor;
pub use lock_coordinator::{JobLock, LockAcquisition, LockCoordinator};
pub use log_pipeline::{PipelineConfig, ResultPipeline, ResultPipelineHandle};
pub use registration::{list_workers, WorkerRegistration};
