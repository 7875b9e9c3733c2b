use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    coordination::{CoordinationConfig, NamespaceConfig},
    dispatcher_worker::{ExecutorConfig, LockConfig, SchedulerConfig, WorkerConfig},
    log_sink::LogSinkConfig,
};

/// 默认配置文件查找路径
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/dcron.toml",
    "dcron.toml",
    "/etc/dcron/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub coordination: CoordinationConfig,
    pub namespace: NamespaceConfig,
    pub scheduler: SchedulerConfig,
    pub lock: LockConfig,
    pub executor: ExecutorConfig,
    pub log_sink: LogSinkConfig,
    pub worker: WorkerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: DCRON, separator: __)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("DCRON")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 各类带租约条目用到的租期：任务锁、触发时间占位、Worker注册
    pub fn lease_ttls(&self) -> Vec<Duration> {
        let mut ttls = vec![
            self.lock.ttl(),
            self.lock.fire_claim_ttl(),
            self.worker.registration_lease(),
        ];
        ttls.sort();
        ttls.dedup();
        ttls
    }

    pub fn validate(&self) -> Result<()> {
        self.coordination
            .validate()
            .context("协调服务配置验证失败")?;
        self.namespace.validate().context("目录前缀配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.lock.validate().context("锁配置验证失败")?;
        self.executor.validate().context("执行器配置验证失败")?;
        self.log_sink.validate().context("日志存储配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
