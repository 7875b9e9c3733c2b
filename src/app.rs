use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dcron_api::{create_app, AppState, JobManager};
use dcron_core::{config::AppConfig, traits::CoordinationStore, traits::ExecutionDispatcher};
use dcron_dispatcher::{CatalogWatcher, JobScheduler};
use dcron_infrastructure::{create_coordination_store, create_log_store, LogStoreHandle};
use dcron_worker::{
    ExecutionEngine, LockCoordinator, PipelineConfig, ResultPipeline, ShellExecutor,
    WorkerRegistration,
};

/// 关闭时等待正在执行的任务结束的时长
const EXECUTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 监听任务目录、调度并执行任务
    Worker,
    /// 仅运行管理API
    Api,
    /// 运行所有组件
    All,
}

impl FromStr for AppMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "worker" => Ok(AppMode::Worker),
            "api" => Ok(AppMode::Api),
            "all" => Ok(AppMode::All),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {s}")),
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    store: Arc<dyn CoordinationStore>,
    log_store: LogStoreHandle,
}

impl Application {
    /// 按配置连接协调服务和日志存储
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let store = create_coordination_store(&config.coordination, &config.lease_ttls())
            .await
            .context("连接协调服务失败")?;
        let log_store = create_log_store(&config.log_sink)
            .await
            .context("创建日志存储失败")?;

        Ok(Self::with_components(config, mode, store, log_store))
    }

    pub fn with_components(
        config: AppConfig,
        mode: AppMode,
        store: Arc<dyn CoordinationStore>,
        log_store: LogStoreHandle,
    ) -> Self {
        Self {
            config,
            mode,
            store,
            log_store,
        }
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    /// 运行直到 `shutdown` 被取消，并等待各组件退出
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        match self.mode {
            AppMode::Worker => self.run_worker(shutdown).await,
            AppMode::Api => self.run_api(shutdown).await,
            AppMode::All => {
                if self.config.api.enabled {
                    tokio::try_join!(self.run_worker(shutdown.clone()), self.run_api(shutdown))?;
                    Ok(())
                } else {
                    warn!("API服务被禁用，只运行Worker");
                    self.run_worker(shutdown).await
                }
            }
        }
    }

    async fn run_worker(&self, shutdown: CancellationToken) -> Result<()> {
        let config = &self.config;
        info!("启动Worker: {}", config.worker.worker_id);

        // 日志管道最后关闭，保证被强杀任务的结果也能落库
        let pipeline_shutdown = CancellationToken::new();
        let (pipeline, pipeline_handle) = ResultPipeline::start(
            Arc::clone(&self.log_store.sink),
            PipelineConfig::from(&config.log_sink),
            pipeline_shutdown.clone(),
        );

        let locks = LockCoordinator::new(
            Arc::clone(&self.store),
            &config.namespace,
            config.worker.worker_id.clone(),
            config.lock.clone(),
        );
        let engine = ExecutionEngine::new(
            Arc::new(ShellExecutor::new(&config.executor)),
            locks,
            pipeline,
            &config.lock,
        );
        let dispatcher: Arc<dyn ExecutionDispatcher> = Arc::new(engine.clone());

        let (event_tx, event_rx) = mpsc::channel(config.scheduler.event_buffer);
        let scheduler = JobScheduler::new(Arc::clone(&dispatcher), config.scheduler.clone());
        let watcher = CatalogWatcher::new(Arc::clone(&self.store), config.namespace.clone())
            .with_reconnect_backoff(config.coordination.reconnect_backoff());
        let registration =
            WorkerRegistration::new(Arc::clone(&self.store), &config.namespace, &config.worker);

        let scheduler_handle = tokio::spawn(scheduler.run(event_rx, shutdown.clone()));
        let watcher_handle = tokio::spawn(watcher.run(event_tx, dispatcher, shutdown.clone()));
        let registration_handle = tokio::spawn(registration.run(shutdown.clone()));

        shutdown.cancelled().await;
        info!("Worker收到关闭信号");

        let (scheduler_result, watcher_result, registration_result) =
            tokio::join!(scheduler_handle, watcher_handle, registration_handle);
        for (name, result) in [
            ("scheduler", scheduler_result),
            ("catalog_watcher", watcher_result),
            ("registration", registration_result),
        ] {
            if let Err(e) = result {
                warn!("组件 {} 异常退出: {}", name, e);
            }
        }

        let cancelled = engine.cancel_all().await;
        if cancelled > 0 {
            info!("强杀 {} 个正在执行的任务", cancelled);
        }
        if !engine.wait_idle(EXECUTION_DRAIN_TIMEOUT).await {
            warn!("等待任务结束超时，剩余任务: {:?}", engine.active_jobs().await);
        }

        pipeline_shutdown.cancel();
        pipeline_handle.await.context("日志管道异常退出")?;

        info!("Worker已停止");
        Ok(())
    }

    async fn run_api(&self, shutdown: CancellationToken) -> Result<()> {
        let state = AppState {
            job_manager: Arc::new(JobManager::new(
                Arc::clone(&self.store),
                self.config.namespace.clone(),
            )),
            log_repository: Arc::clone(&self.log_store.repository),
        };
        let app = create_app(state, &self.config.api);

        dcron_api::serve(app, &self.config.api.bind_address, async move {
            shutdown.cancelled().await
        })
        .await
        .context("API服务运行失败")?;
        Ok(())
    }
}
