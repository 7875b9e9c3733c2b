mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

use common::RecordingDispatcher;
use dcron_core::{
    config::SchedulerConfig,
    models::{Job, JobEvent},
    SchedulerError,
};
use dcron_dispatcher::JobScheduler;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn scheduler() -> (JobScheduler, Arc<RecordingDispatcher>) {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let scheduler = JobScheduler::new(dispatcher.clone(), SchedulerConfig::default());
    (scheduler, dispatcher)
}

fn save(name: &str, cron_expr: &str) -> JobEvent {
    JobEvent::save(Job::new(name, "echo hi", cron_expr))
}

#[test]
fn test_save_schedules_strictly_after_now() {
    let (mut scheduler, _) = scheduler();
    let now = base_time() + Duration::milliseconds(400);

    scheduler.apply_event(save("ping", "* * * * * *"), now).unwrap();

    let plan = scheduler.plan("ping").unwrap();
    assert!(plan.next_fire_time > now);
    assert_eq!(plan.next_fire_time, base_time() + Duration::seconds(1));
    assert_eq!(scheduler.next_fire_time(), Some(plan.next_fire_time));
}

#[test]
fn test_save_replaces_existing_plan() {
    let (mut scheduler, _) = scheduler();
    let now = base_time();

    scheduler.apply_event(save("ping", "* * * * * *"), now).unwrap();
    scheduler.apply_event(save("ping", "0 0 * * * *"), now).unwrap();

    assert_eq!(scheduler.len(), 1);
    let plan = scheduler.plan("ping").unwrap();
    assert_eq!(plan.job.cron_expr, "0 0 * * * *");
    assert_eq!(plan.next_fire_time, now + Duration::hours(1));
}

#[traced_test]
#[test]
fn test_bad_cron_isolated_to_one_job() {
    let (mut scheduler, _) = scheduler();
    let now = base_time();

    scheduler.apply_event(save("good", "* * * * * *"), now).unwrap();
    scheduler.apply_event(save("later_bad", "* * * * * *"), now).unwrap();

    let err = scheduler
        .apply_event(save("bad", "definitely not cron"), now)
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCron { .. }));

    // 原本有效的任务被改成无效表达式后移出时间表
    assert!(scheduler
        .apply_event(save("later_bad", "99 99 99 * * *"), now)
        .is_err());

    assert_eq!(scheduler.job_names(), vec!["good".to_string()]);
    assert!(logs_contain("config_error"));
}

#[test]
fn test_delete_and_kill_events() {
    let (mut scheduler, dispatcher) = scheduler();
    let now = base_time();

    scheduler.apply_event(save("ping", "* * * * * *"), now).unwrap();
    scheduler.apply_event(JobEvent::kill("ping"), now).unwrap();
    assert_eq!(scheduler.len(), 1);
    assert!(dispatcher.cancelled_names().is_empty());

    scheduler.apply_event(JobEvent::delete("ping"), now).unwrap();
    assert!(scheduler.is_empty());

    // 删除不存在的任务是空操作
    scheduler.apply_event(JobEvent::delete("ping"), now).unwrap();
    assert!(scheduler.is_empty());
}

#[test]
fn test_event_fold_matches_model() {
    let (mut scheduler, _) = scheduler();
    let now = base_time();
    let names = ["a", "b", "c", "d", "e"];
    let mut expected: HashSet<String> = HashSet::new();

    // 固定种子的线性同余序列，覆盖交替的保存和删除
    let mut seed: u64 = 42;
    for _ in 0..500 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let name = names[((seed >> 33) % names.len() as u64) as usize];
        if (seed >> 20) % 3 == 0 {
            scheduler.apply_event(JobEvent::delete(name), now).unwrap();
            expected.remove(name);
        } else {
            scheduler.apply_event(save(name, "*/10 * * * * *"), now).unwrap();
            expected.insert(name.to_string());
        }

        let actual: HashSet<String> = scheduler.job_names().into_iter().collect();
        assert_eq!(actual, expected);
    }
}

#[tokio::test]
async fn test_tick_dispatches_due_plan_once() {
    let (mut scheduler, dispatcher) = scheduler();
    let now = base_time();
    scheduler.apply_event(save("ping", "* * * * * *"), now).unwrap();

    assert!(scheduler.tick(now).await.is_empty());

    let fire_time = now + Duration::seconds(1);
    assert_eq!(scheduler.tick(fire_time).await, vec!["ping".to_string()]);
    assert!(scheduler.tick(fire_time).await.is_empty());

    let dispatched = dispatcher.dispatched.lock().unwrap();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].plan_time, fire_time);
    assert!(dispatched[0].real_time >= dispatched[0].plan_time);
    drop(dispatched);

    assert_eq!(
        scheduler.plan("ping").unwrap().next_fire_time,
        fire_time + Duration::seconds(1)
    );
}

#[tokio::test]
async fn test_missed_ticks_are_not_backfilled() {
    let (mut scheduler, dispatcher) = scheduler();
    let now = base_time();
    scheduler.apply_event(save("minutely", "0 * * * * *"), now).unwrap();

    let after_outage = now + Duration::minutes(10) + Duration::seconds(30);
    assert_eq!(scheduler.tick(after_outage).await.len(), 1);
    assert!(scheduler.tick(after_outage).await.is_empty());

    assert_eq!(dispatcher.dispatched_names(), vec!["minutely".to_string()]);
    assert_eq!(
        scheduler.plan("minutely").unwrap().next_fire_time,
        now + Duration::minutes(11)
    );
}

#[tokio::test]
async fn test_jobs_sharing_instant_dispatched_independently() {
    let (mut scheduler, dispatcher) = scheduler();
    let now = base_time();
    for name in ["a", "b", "c"] {
        scheduler.apply_event(save(name, "* * * * * *"), now).unwrap();
    }
    dispatcher.mark_busy("b");

    let fire_time = now + Duration::seconds(1);
    let due = scheduler.tick(fire_time).await;
    assert_eq!(due, vec!["a".to_string(), "b".to_string(), "c".to_string()]);

    let mut dispatched = dispatcher.dispatched_names();
    dispatched.sort();
    assert_eq!(dispatched, vec!["a".to_string(), "c".to_string()]);

    // 被拒绝的任务也推进到下一次触发时间
    assert_eq!(
        scheduler.plan("b").unwrap().next_fire_time,
        fire_time + Duration::seconds(1)
    );
}

#[test]
fn test_wait_duration() {
    let (mut scheduler, _) = scheduler();
    let now = base_time();
    assert_eq!(
        scheduler.wait_duration(now),
        SchedulerConfig::default().idle_interval()
    );

    scheduler.apply_event(save("hourly", "0 0 * * * *"), now).unwrap();
    scheduler.apply_event(save("minutely", "0 * * * * *"), now).unwrap();
    assert_eq!(scheduler.wait_duration(now), StdDuration::from_secs(60));

    let overdue = now + Duration::minutes(5);
    assert_eq!(scheduler.wait_duration(overdue), StdDuration::ZERO);
}

#[tokio::test]
async fn test_run_loop_dispatches_and_stops() {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let scheduler = JobScheduler::new(dispatcher.clone(), SchedulerConfig::default());
    let (tx, rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();

    let handle = tokio::spawn(scheduler.run(rx, shutdown.clone()));
    tx.send(save("ping", "* * * * * *")).await.unwrap();

    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(5);
    while dispatcher.dispatched_names().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "任务没有被下发");
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }

    shutdown.cancel();
    tokio::time::timeout(StdDuration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    let dispatched = dispatcher.dispatched.lock().unwrap();
    assert!(dispatched.iter().all(|info| info.job.name == "ping"));
    assert!(dispatched.iter().all(|info| info.real_time >= info.plan_time));
}

#[tokio::test]
async fn test_run_loop_exits_when_events_closed() {
    let (scheduler, _) = scheduler();
    let (tx, rx) = mpsc::channel(1);
    drop(tx);

    tokio::time::timeout(
        StdDuration::from_secs(1),
        scheduler.run(rx, CancellationToken::new()),
    )
    .await
    .unwrap();
}
