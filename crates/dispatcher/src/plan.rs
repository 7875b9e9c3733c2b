use chrono::{DateTime, Utc};

use dcron_core::{models::Job, SchedulerError, SchedulerResult};

use crate::cron_utils::CronScheduler;

/// 任务调度计划
///
/// `next_fire_time` 始终是尚未下发的最早触发时间。
#[derive(Debug, Clone)]
pub struct SchedulePlan {
    pub job: Job,
    pub schedule: CronScheduler,
    pub next_fire_time: DateTime<Utc>,
}

impl SchedulePlan {
    /// 解析任务的cron表达式，计算严格晚于 `now` 的首次触发时间
    pub fn build(job: Job, now: DateTime<Utc>) -> SchedulerResult<Self> {
        let schedule = CronScheduler::new(&job.cron_expr)?;
        let next_fire_time = schedule
            .next_after(now)
            .ok_or_else(|| SchedulerError::InvalidCron {
                expr: job.cron_expr.clone(),
                message: "表达式没有未来的触发时间".to_string(),
            })?;

        Ok(Self {
            job,
            schedule,
            next_fire_time,
        })
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire_time <= now
    }

    /// 推进到严格晚于 `now` 的下一次触发时间，错过的触发点不补跑
    ///
    /// 表达式不再有未来的触发时间时返回false。
    pub fn advance(&mut self, now: DateTime<Utc>) -> bool {
        match self.schedule.next_after(now) {
            Some(next) => {
                self.next_fire_time = next;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn job(cron_expr: &str) -> Job {
        Job::new("ping", "echo hi", cron_expr)
    }

    #[test]
    fn test_build_computes_future_fire_time() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let plan = SchedulePlan::build(job("* * * * * *"), now).unwrap();

        assert_eq!(plan.next_fire_time, now + Duration::seconds(1));
        assert!(!plan.is_due(now));
        assert!(plan.is_due(now + Duration::seconds(1)));
    }

    #[test]
    fn test_build_rejects_bad_cron() {
        let err = SchedulePlan::build(job("not a cron"), Utc::now()).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_build_rejects_expression_without_future() {
        let err = SchedulePlan::build(job("0 0 0 1 1 * 2000"), Utc::now()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }

    #[test]
    fn test_advance_skips_missed_ticks() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut plan = SchedulePlan::build(job("0 * * * * *"), start).unwrap();
        assert_eq!(plan.next_fire_time, start + Duration::minutes(1));

        // 停机10分钟后只保留下一个未来的触发点
        let late = start + Duration::minutes(10) + Duration::seconds(30);
        assert!(plan.is_due(late));
        assert!(plan.advance(late));
        assert_eq!(plan.next_fire_time, start + Duration::minutes(11));
        assert!(!plan.is_due(late));
    }
}
