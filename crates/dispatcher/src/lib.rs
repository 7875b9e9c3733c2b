//! 调度核心：cron解析、调度计划、时间表循环和任务目录监听

pub mod catalog_watcher;
pub mod cron_utils;
pub mod plan;
pub mod scheduler;

pub use catalog_watcher::{decode_job_event, CatalogWatcher};
pub use cron_utils::CronScheduler;
pub use plan::SchedulePlan;
pub use scheduler::JobScheduler;
