use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dcron_core::{
    config::SchedulerConfig,
    models::{ExecutionInfo, JobEvent, JobEventType},
    traits::ExecutionDispatcher,
    SchedulerResult,
};
use dcron_infrastructure::{MetricsCollector, StructuredLogger};

use crate::plan::SchedulePlan;

/// 调度核心
///
/// 独占任务时间表：按任务事件增删计划，按时钟下发到期任务。
/// 下发只把执行交给 [`ExecutionDispatcher`]，抢锁和执行都不在调度循环里等待。
pub struct JobScheduler {
    plans: HashMap<String, SchedulePlan>,
    dispatcher: Arc<dyn ExecutionDispatcher>,
    config: SchedulerConfig,
    metrics: MetricsCollector,
}

impl JobScheduler {
    pub fn new(dispatcher: Arc<dyn ExecutionDispatcher>, config: SchedulerConfig) -> Self {
        Self {
            plans: HashMap::new(),
            dispatcher,
            config,
            metrics: MetricsCollector::new(),
        }
    }

    /// 应用一个任务事件
    ///
    /// cron表达式无效时移除该任务的计划并返回 `InvalidCron`，其他任务不受影响。
    /// `Kill` 事件由强杀路径直接交给执行引擎，这里忽略。
    pub fn apply_event(&mut self, event: JobEvent, now: DateTime<Utc>) -> SchedulerResult<()> {
        let result = match event.event_type {
            JobEventType::Save => {
                let name = event.job.name.clone();
                match SchedulePlan::build(event.job, now) {
                    Ok(plan) => {
                        StructuredLogger::log_job_scheduled(
                            &name,
                            &plan.job.cron_expr,
                            plan.next_fire_time,
                        );
                        self.plans.insert(name, plan);
                        Ok(())
                    }
                    Err(e) => {
                        self.plans.remove(&name);
                        StructuredLogger::log_config_error(&name, &e);
                        self.metrics.record_config_error();
                        Err(e)
                    }
                }
            }
            JobEventType::Delete => {
                if self.plans.remove(event.job_name()).is_some() {
                    StructuredLogger::log_job_unscheduled(event.job_name());
                }
                Ok(())
            }
            JobEventType::Kill => {
                debug!("调度器忽略强杀事件: {}", event.job_name());
                Ok(())
            }
        };

        self.metrics.update_scheduled_jobs(self.plans.len());
        result
    }

    /// 下发所有到期的计划，返回本次下发的任务名
    ///
    /// 每个到期计划只下发一次，随后推进到严格晚于 `now` 的下一次触发时间。
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut due: Vec<String> = self
            .plans
            .iter()
            .filter(|(_, plan)| plan.is_due(now))
            .map(|(name, _)| name.clone())
            .collect();
        due.sort();

        for name in &due {
            let Some(plan) = self.plans.get_mut(name) else {
                continue;
            };

            let info = ExecutionInfo::new(plan.job.clone(), plan.next_fire_time);
            let plan_time = info.plan_time;
            if self.dispatcher.dispatch(info).await {
                self.metrics.record_dispatch();
            } else {
                StructuredLogger::log_job_dispatch_skipped(name, plan_time);
                self.metrics.record_dispatch_skipped();
            }

            if !plan.advance(now) {
                info!("任务 {} 的cron表达式已没有未来的触发时间，移出时间表", name);
                self.plans.remove(name);
            }
        }

        if !due.is_empty() {
            self.metrics.update_scheduled_jobs(self.plans.len());
        }
        due
    }

    /// 时间表中最早的触发时间
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.plans.values().map(|plan| plan.next_fire_time).min()
    }

    /// 距离下一次触发的等待时长，时间表为空时为空闲等待时长
    pub fn wait_duration(&self, now: DateTime<Utc>) -> Duration {
        match self.next_fire_time() {
            Some(next) => (next - now).to_std().unwrap_or(Duration::ZERO),
            None => self.config.idle_interval(),
        }
    }

    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plans.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn plan(&self, job_name: &str) -> Option<&SchedulePlan> {
        self.plans.get(job_name)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// 调度循环
    ///
    /// 只在定时器和任务事件上挂起；事件按接收顺序应用，每次循环重新计算等待时长。
    pub async fn run(mut self, mut events: mpsc::Receiver<JobEvent>, shutdown: CancellationToken) {
        info!("调度器启动");

        loop {
            let wait = self.wait_duration(Utc::now());

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("调度器收到关闭信号");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        // 配置错误已在apply_event中记录
                        let _ = self.apply_event(event, Utc::now());
                    }
                    None => {
                        info!("任务事件通道已关闭，调度器退出");
                        break;
                    }
                },
                _ = tokio::time::sleep(wait) => {
                    let dispatched = self.tick(Utc::now()).await;
                    if !dispatched.is_empty() {
                        debug!("本轮下发任务: {:?}", dispatched);
                    }
                }
            }
        }

        info!("调度器已停止，时间表中剩余 {} 个任务", self.plans.len());
    }
}
