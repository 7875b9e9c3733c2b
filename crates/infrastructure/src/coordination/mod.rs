pub mod in_memory;
pub mod nats_kv;

use std::sync::Arc;
use std::time::Duration;

use dcron_core::{
    config::{CoordinationBackend, CoordinationConfig},
    traits::CoordinationStore,
    SchedulerError, SchedulerResult,
};
use tokio::time::Instant;
use tracing::{info, warn};

pub use in_memory::InMemoryCoordinationStore;
pub use nats_kv::NatsKvCoordinationStore;

/// 按配置创建协调服务
///
/// 启动时连接失败会按 `reconnect_backoff` 重试，超过 `connect_timeout` 后返回错误。
/// `lease_ttls` 是进程会用到的全部租期。
pub async fn create_coordination_store(
    config: &CoordinationConfig,
    lease_ttls: &[Duration],
) -> SchedulerResult<Arc<dyn CoordinationStore>> {
    match config.backend {
        CoordinationBackend::Memory => {
            info!("使用进程内协调服务");
            Ok(Arc::new(InMemoryCoordinationStore::new()))
        }
        CoordinationBackend::Nats => {
            let deadline = Instant::now() + config.connect_timeout();
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                match NatsKvCoordinationStore::connect(config, lease_ttls).await {
                    Ok(store) => return Ok(Arc::new(store)),
                    Err(e) if Instant::now() + config.reconnect_backoff() < deadline => {
                        warn!(
                            "连接协调服务失败 (第{}次): {}，{:?}后重试",
                            attempt,
                            e,
                            config.reconnect_backoff()
                        );
                        tokio::time::sleep(config.reconnect_backoff()).await;
                    }
                    Err(e) => {
                        return Err(SchedulerError::Coordination(format!(
                            "{}次尝试后仍无法连接协调服务 {}: {}",
                            attempt, config.url, e
                        )));
                    }
                }
            }
        }
    }
}
