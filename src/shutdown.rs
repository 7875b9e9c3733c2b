use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 各子系统订阅同一个取消令牌，`shutdown` 只会生效一次。
#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    is_shutdown: Arc<AtomicBool>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅关闭信号，关闭之后订阅得到的令牌立即处于已取消状态
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            debug!("关闭管理器已经触发过关闭");
            return;
        }

        info!("触发系统关闭");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// 等待关闭信号
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_reaches_all_subscribers() {
        let manager = ShutdownManager::new();
        let a = manager.subscribe();
        let b = manager.clone().subscribe();
        assert!(!a.is_cancelled());

        manager.shutdown();
        manager.shutdown();

        tokio::time::timeout(Duration::from_secs(1), async {
            a.cancelled().await;
            b.cancelled().await;
        })
        .await
        .unwrap();
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_is_cancelled() {
        let manager = ShutdownManager::new();
        manager.shutdown();

        assert!(manager.subscribe().is_cancelled());
        manager.wait_for_shutdown().await;
    }
}
