use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use dcron_core::{
    config::{ExecutorConfig, LockConfig, NamespaceConfig},
    models::{ExecutionInfo, Job, JobLog},
    traits::{CoordinationStore, ExecutionDispatcher},
};
use dcron_infrastructure::{InMemoryCoordinationStore, InMemoryLogStore};
use dcron_worker::{
    ExecutionEngine, LockCoordinator, PipelineConfig, ResultPipeline, ShellExecutor,
};

struct Harness {
    engine: ExecutionEngine,
    store: InMemoryCoordinationStore,
    logs: InMemoryLogStore,
    shutdown: CancellationToken,
    pipeline: tokio::task::JoinHandle<()>,
}

fn lock_config() -> LockConfig {
    LockConfig {
        acquire_jitter_ms: 0,
        ..LockConfig::default()
    }
}

fn harness(worker_id: &str) -> Harness {
    harness_on(InMemoryCoordinationStore::new(), worker_id)
}

fn harness_on(store: InMemoryCoordinationStore, worker_id: &str) -> Harness {
    harness_with(store, worker_id, lock_config())
}

fn harness_with(store: InMemoryCoordinationStore, worker_id: &str, lock: LockConfig) -> Harness {
    let logs = InMemoryLogStore::new();
    let shutdown = CancellationToken::new();
    let (handle, pipeline) = ResultPipeline::start(
        Arc::new(logs.clone()),
        PipelineConfig {
            max_batch_size: 1,
            ..PipelineConfig::default()
        },
        shutdown.clone(),
    );

    let executor = ShellExecutor::new(&ExecutorConfig {
        shell: "/bin/sh".to_string(),
        kill_grace_ms: 200,
    });
    let locks = LockCoordinator::new(
        Arc::new(store.clone()),
        &NamespaceConfig::default(),
        worker_id,
        lock.clone(),
    );
    let engine = ExecutionEngine::new(Arc::new(executor), locks, handle, &lock);

    Harness {
        engine,
        store,
        logs,
        shutdown,
        pipeline,
    }
}

impl Harness {
    async fn finish(self) -> Vec<JobLog> {
        assert!(self.engine.wait_idle(Duration::from_secs(5)).await, "执行没有结束");
        self.shutdown.cancel();
        self.pipeline.await.unwrap();
        self.logs.logs().await
    }
}

fn info(name: &str, command: &str) -> ExecutionInfo {
    ExecutionInfo::new(Job::new(name, command, "* * * * * *"), Utc::now())
}

async fn wait_until_locked(store: &InMemoryCoordinationStore, key: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while store.list_locks(key).await.unwrap().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "任务没有开始执行");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_ping_produces_successful_log() {
    let h = harness("worker-a");
    let dispatched = info("ping", "echo hi");
    let real_time = dispatched.real_time.timestamp_millis();

    assert!(h.engine.dispatch(dispatched).await);
    let logs = h.finish().await;

    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.job_name, "ping");
    assert_eq!(log.command, "echo hi");
    assert!(log.output.contains("hi"));
    assert_eq!(log.err, "");
    assert_eq!(log.schedule_time, real_time);
    assert!(log.start_time >= log.schedule_time);
    assert!(log.end_time >= log.start_time);
}

#[tokio::test]
async fn test_single_flight_per_job_name() {
    let h = harness("worker-a");

    assert!(h.engine.dispatch(info("slow", "sleep 0.3")).await);
    assert!(!h.engine.dispatch(info("slow", "sleep 0.3")).await);
    assert!(h.engine.is_executing("slow").await);
    assert_eq!(h.engine.active_jobs().await, vec!["slow".to_string()]);

    // 不同任务名互不影响
    assert!(h.engine.dispatch(info("other", "true")).await);

    let engine = h.engine.clone();
    let mut logs = h.finish().await;
    logs.sort_by(|a, b| a.job_name.cmp(&b.job_name));
    let names: Vec<_> = logs.iter().map(|l| l.job_name.as_str()).collect();
    assert_eq!(names, vec!["other", "slow"]);

    // 执行结束后可以再次下发
    assert!(!engine.is_executing("slow").await);
}

#[tokio::test]
async fn test_busy_lock_abandons_silently() {
    let store = InMemoryCoordinationStore::new();
    store
        .try_lock("/cron/lock/contended", b"worker-b".to_vec(), Duration::from_secs(30))
        .await
        .unwrap();

    let store_locks = store.clone();
    let h = harness_on(store, "worker-a");
    assert!(h.engine.dispatch(info("contended", "echo should-not-run")).await);
    let logs = h.finish().await;

    assert!(logs.is_empty());

    // 别人的锁没有被动过
    let locks = store_locks.list_locks("/cron/lock/").await.unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].value, b"worker-b".to_vec());
}

#[tokio::test]
async fn test_kill_cancels_and_frees_lock() {
    let h = harness("worker-a");

    assert!(h.engine.dispatch(info("long", "echo started; sleep 30")).await);
    wait_until_locked(&h.store, "/cron/lock/long").await;

    let started = tokio::time::Instant::now();
    assert!(h.engine.cancel("long").await);
    let store = h.store.clone();
    let engine = h.engine.clone();
    let logs = h.finish().await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].err, "任务被强制终止");
    assert!(logs[0].output.contains("started"));
    assert!(store.list_locks("/cron/lock/").await.unwrap().is_empty());

    // 没有正在执行的实例时强杀是空操作
    assert!(!engine.cancel("long").await);
}

#[tokio::test]
async fn test_failed_command_is_logged() {
    let h = harness("worker-a");

    assert!(h.engine.dispatch(info("broken", "echo oops 1>&2; exit 7")).await);
    let logs = h.finish().await;

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].err, "进程退出码非零: 7");
    assert!(logs[0].output.contains("oops"));
}

#[tokio::test]
async fn test_two_workers_share_one_fire_time() {
    let store = InMemoryCoordinationStore::new();
    let a = harness_on(store.clone(), "worker-a");
    let b = harness_on(store.clone(), "worker-b");

    let plan_time = Utc::now();
    let job = Job::new("shared", "sleep 0.2; echo done", "* * * * * *");
    let (ra, rb) = tokio::join!(
        a.engine.dispatch(ExecutionInfo::new(job.clone(), plan_time)),
        b.engine.dispatch(ExecutionInfo::new(job, plan_time)),
    );
    assert!(ra && rb);

    let mut logs = a.finish().await;
    logs.extend(b.finish().await);
    assert_eq!(logs.len(), 1);
    assert!(logs[0].output.contains("done"));
}

#[tokio::test]
async fn test_fast_job_is_not_rerun_for_same_fire_time() {
    let store = InMemoryCoordinationStore::new();
    let a = harness_on(store.clone(), "worker-a");
    let b = harness_on(store.clone(), "worker-b");

    let plan_time = Utc::now();
    let job = Job::new("ping", "echo hi", "* * * * * *");

    // a执行完并释放锁之后，b才轮到同一个触发时间
    assert!(a.engine.dispatch(ExecutionInfo::new(job.clone(), plan_time)).await);
    assert!(a.engine.wait_idle(Duration::from_secs(5)).await);
    assert!(store.list_locks("/cron/lock/").await.unwrap().is_empty());

    assert!(b.engine.dispatch(ExecutionInfo::new(job.clone(), plan_time)).await);
    assert!(b.engine.wait_idle(Duration::from_secs(5)).await);

    // 下一个触发时间照常执行
    let next = plan_time + chrono::Duration::seconds(1);
    assert!(b.engine.dispatch(ExecutionInfo::new(job, next)).await);

    let from_a = a.finish().await;
    let from_b = b.finish().await;
    assert_eq!(from_a.len(), 1);
    assert_eq!(from_b.len(), 1);
    assert_eq!(from_b[0].plan_time, next.timestamp_millis());
}

#[tokio::test]
async fn test_fast_job_once_per_fire_time_with_default_jitter() {
    let store = InMemoryCoordinationStore::new();
    let a = harness_with(store.clone(), "worker-a", LockConfig::default());
    let b = harness_with(store.clone(), "worker-b", LockConfig::default());
    assert!(LockConfig::default().acquire_jitter_ms > 0);

    let job = Job::new("ping", "echo hi", "* * * * * *");
    let start = Utc::now();
    for second in 0..3 {
        let plan_time = start + chrono::Duration::seconds(second);
        let (ra, rb) = tokio::join!(
            a.engine.dispatch(ExecutionInfo::new(job.clone(), plan_time)),
            b.engine.dispatch(ExecutionInfo::new(job.clone(), plan_time)),
        );
        assert!(ra && rb);
        assert!(a.engine.wait_idle(Duration::from_secs(5)).await);
        assert!(b.engine.wait_idle(Duration::from_secs(5)).await);
    }

    let mut logs = a.finish().await;
    logs.extend(b.finish().await);
    let mut plan_times: Vec<_> = logs.iter().map(|log| log.plan_time).collect();
    plan_times.sort();
    let expected: Vec<_> = (0..3)
        .map(|second| (start + chrono::Duration::seconds(second)).timestamp_millis())
        .collect();
    assert_eq!(plan_times, expected);
}
