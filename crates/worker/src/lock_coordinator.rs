//! 任务锁协调
//!
//! 同一个触发时间点只允许一个Worker执行，分两步：
//!
//! 1. 占下触发时间: 在占位目录下以 `任务名/计划时间` 为键写入一条租约，从不主动释放，
//!    租期盖过随机等待和锁TTL，晚到的Worker看到占位就放弃本次。
//! 2. 抢任务锁: 同一任务同时只有一个实例在跑。持锁期间后台续约，执行结束立即释放，
//!    锁的占用时间等于任务真实运行时间。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dcron_core::{
    config::{LockConfig, NamespaceConfig},
    traits::{CoordinationStore, LockAttempt, LockToken},
    SchedulerResult,
};

pub struct LockCoordinator {
    store: Arc<dyn CoordinationStore>,
    namespace: NamespaceConfig,
    owner_id: String,
    config: LockConfig,
}

/// 抢锁结果
pub enum LockAcquisition {
    Acquired(JobLock),
    /// 该触发时间已被占下，或其他Worker正在执行
    Busy,
}

impl LockCoordinator {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        namespace: &NamespaceConfig,
        owner_id: impl Into<String>,
        config: LockConfig,
    ) -> Self {
        Self {
            store,
            namespace: namespace.clone(),
            owner_id: owner_id.into(),
            config,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn lock_key(&self, job_name: &str) -> String {
        self.namespace.lock_key(job_name)
    }

    pub fn claim_key(&self, job_name: &str, plan_time: DateTime<Utc>) -> String {
        self.namespace.claim_key(job_name, plan_time.timestamp_millis())
    }

    /// 尝试占下 `plan_time` 这次触发并获取任务锁，不等待
    pub async fn try_acquire(
        &self,
        job_name: &str,
        plan_time: DateTime<Utc>,
    ) -> SchedulerResult<LockAcquisition> {
        let owner = self.owner_id.as_bytes().to_vec();

        let claim = self
            .store
            .try_lock(
                &self.claim_key(job_name, plan_time),
                owner.clone(),
                self.config.fire_claim_ttl(),
            )
            .await?;
        // 占位不释放也不续约，到期自然消失
        if claim == LockAttempt::Busy {
            debug!(
                "触发时间已被占下: job={}, plan_time={}",
                job_name,
                plan_time.timestamp_millis()
            );
            return Ok(LockAcquisition::Busy);
        }

        let attempt = self
            .store
            .try_lock(&self.lock_key(job_name), owner, self.config.ttl())
            .await?;

        match attempt {
            LockAttempt::Acquired(token) => {
                debug!("获取任务锁: job={}, owner={}", job_name, self.owner_id);
                Ok(LockAcquisition::Acquired(JobLock::hold(
                    job_name,
                    Arc::clone(&self.store),
                    token,
                    self.config.keep_alive_interval(),
                )))
            }
            LockAttempt::Busy => Ok(LockAcquisition::Busy),
        }
    }
}

/// 已持有的任务锁
///
/// 持有期间按固定间隔续约。`release` 可重复调用；未释放就被丢弃时只停止续约，
/// 锁在TTL后自然过期。
pub struct JobLock {
    job_name: String,
    store: Arc<dyn CoordinationStore>,
    token: Arc<Mutex<LockToken>>,
    lost: Arc<AtomicBool>,
    released: AtomicBool,
    keep_alive: CancellationToken,
}

impl JobLock {
    fn hold(
        job_name: &str,
        store: Arc<dyn CoordinationStore>,
        token: LockToken,
        interval: Duration,
    ) -> Self {
        let token = Arc::new(Mutex::new(token));
        let lost = Arc::new(AtomicBool::new(false));
        let keep_alive = CancellationToken::new();

        tokio::spawn(keep_alive_loop(
            job_name.to_string(),
            Arc::clone(&store),
            Arc::clone(&token),
            Arc::clone(&lost),
            interval,
            keep_alive.clone(),
        ));

        Self {
            job_name: job_name.to_string(),
            store,
            token,
            lost,
            released: AtomicBool::new(false),
            keep_alive,
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// 续约失败后锁可能已被他人获取
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub async fn release(&self) -> SchedulerResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.keep_alive.cancel();

        // 等待进行中的续约完成，用最新的版本号释放
        let token = self.token.lock().await.clone();
        self.store.unlock(&token).await?;
        debug!("释放任务锁: job={}", self.job_name);
        Ok(())
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        self.keep_alive.cancel();
    }
}

async fn keep_alive_loop(
    job_name: String,
    store: Arc<dyn CoordinationStore>,
    token: Arc<Mutex<LockToken>>,
    lost: Arc<AtomicBool>,
    interval: Duration,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let mut current = token.lock().await;
        if stop.is_cancelled() {
            return;
        }
        match store.keep_alive(&current).await {
            Ok(renewed) => *current = renewed,
            Err(e) => {
                warn!("任务锁续约失败: job={}, error={}", job_name, e);
                lost.store(true, Ordering::SeqCst);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcron_infrastructure::InMemoryCoordinationStore;

    fn coordinator(store: &InMemoryCoordinationStore, owner: &str) -> LockCoordinator {
        LockCoordinator::new(
            Arc::new(store.clone()),
            &NamespaceConfig::default(),
            owner,
            LockConfig::default(),
        )
    }

    fn at(second: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + second, 0).unwrap()
    }

    #[tokio::test]
    async fn test_second_holder_is_busy() {
        let store = InMemoryCoordinationStore::new();
        let a = coordinator(&store, "worker-a");
        let b = coordinator(&store, "worker-b");

        let LockAcquisition::Acquired(lock) = a.try_acquire("backup", at(0)).await.unwrap() else {
            panic!("第一个持有者应该拿到锁");
        };
        assert!(matches!(
            b.try_acquire("backup", at(0)).await.unwrap(),
            LockAcquisition::Busy
        ));
        // 下一个触发时间也要等上一次执行结束
        assert!(matches!(
            b.try_acquire("backup", at(1)).await.unwrap(),
            LockAcquisition::Busy
        ));

        // 不同任务互不影响
        assert!(matches!(
            b.try_acquire("report", at(0)).await.unwrap(),
            LockAcquisition::Acquired(_)
        ));

        lock.release().await.unwrap();
        assert!(matches!(
            b.try_acquire("backup", at(2)).await.unwrap(),
            LockAcquisition::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_fire_time_runs_once_even_after_release() {
        let store = InMemoryCoordinationStore::new();
        let a = coordinator(&store, "worker-a");
        let b = coordinator(&store, "worker-b");

        // a执行得很快，b的随机等待结束时锁早已释放
        let LockAcquisition::Acquired(lock) = a.try_acquire("ping", at(0)).await.unwrap() else {
            panic!("应该拿到锁");
        };
        lock.release().await.unwrap();

        assert!(matches!(
            b.try_acquire("ping", at(0)).await.unwrap(),
            LockAcquisition::Busy
        ));
        assert!(store.list_locks("/cron/lock/").await.unwrap().is_empty());

        let claims = store.list_locks("/cron/fired/ping/").await.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].key, format!("/cron/fired/ping/{}", at(0).timestamp_millis()));
        assert_eq!(claims[0].value, b"worker-a");

        assert!(matches!(
            b.try_acquire("ping", at(1)).await.unwrap(),
            LockAcquisition::Acquired(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_claim_expires_after_its_ttl() {
        let store = InMemoryCoordinationStore::new();
        let a = coordinator(&store, "worker-a");

        let LockAcquisition::Acquired(lock) = a.try_acquire("ping", at(0)).await.unwrap() else {
            panic!("应该拿到锁");
        };
        lock.release().await.unwrap();

        tokio::time::sleep(LockConfig::default().ttl() * 2).await;
        assert_eq!(store.list_locks("/cron/fired/").await.unwrap().len(), 1);

        tokio::time::sleep(LockConfig::default().fire_claim_ttl()).await;
        assert!(store.list_locks("/cron/fired/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = InMemoryCoordinationStore::new();
        let a = coordinator(&store, "worker-a");

        let LockAcquisition::Acquired(lock) = a.try_acquire("backup", at(0)).await.unwrap() else {
            panic!("应该拿到锁");
        };
        lock.release().await.unwrap();
        lock.release().await.unwrap();
        assert!(lock.is_released());
        assert!(store.list_locks("/cron/lock/").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_outlives_ttl() {
        let store = InMemoryCoordinationStore::new();
        let a = coordinator(&store, "worker-a");
        let b = coordinator(&store, "worker-b");

        let LockAcquisition::Acquired(lock) = a.try_acquire("slow", at(0)).await.unwrap() else {
            panic!("应该拿到锁");
        };

        tokio::time::sleep(LockConfig::default().ttl() * 3).await;
        assert!(!lock.is_lost());
        assert!(matches!(
            b.try_acquire("slow", at(15)).await.unwrap(),
            LockAcquisition::Busy
        ));

        lock.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_lock_expires() {
        let store = InMemoryCoordinationStore::new();
        let a = coordinator(&store, "worker-a");
        let b = coordinator(&store, "worker-b");

        match a.try_acquire("crashy", at(0)).await.unwrap() {
            LockAcquisition::Acquired(lock) => drop(lock),
            LockAcquisition::Busy => panic!("应该拿到锁"),
        }

        tokio::time::sleep(LockConfig::default().ttl() + Duration::from_millis(100)).await;
        assert!(matches!(
            b.try_acquire("crashy", at(6)).await.unwrap(),
            LockAcquisition::Acquired(_)
        ));
    }
}
