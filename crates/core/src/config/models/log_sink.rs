use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSinkBackend {
    Memory,
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSinkConfig {
    pub backend: LogSinkBackend,
    pub url: String,
    pub max_connections: u32,
    pub max_batch_size: usize,
    pub max_batch_age_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub queue_capacity: usize,
    /// `err` 和 `output` 落库时的最大长度
    pub max_field_length: usize,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            backend: LogSinkBackend::Memory,
            url: "sqlite://dcron.db?mode=rwc".to_string(),
            max_connections: 5,
            max_batch_size: 100,
            max_batch_age_ms: 1000,
            max_retries: 3,
            retry_backoff_ms: 200,
            queue_capacity: 1000,
            max_field_length: 3000,
        }
    }
}

impl LogSinkConfig {
    pub fn max_batch_age(&self) -> Duration {
        Duration::from_millis(self.max_batch_age_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend {
            LogSinkBackend::Memory => {}
            LogSinkBackend::Sqlite => {
                if !self.url.starts_with("sqlite:") {
                    return Err(anyhow::anyhow!("SQLite日志存储URL格式无效: {}", self.url));
                }
            }
            LogSinkBackend::Postgres => {
                if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://")
                {
                    return Err(anyhow::anyhow!(
                        "PostgreSQL日志存储URL格式无效: {}",
                        self.url
                    ));
                }
            }
        }

        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("最大连接数必须大于0"));
        }
        if self.max_batch_size == 0 {
            return Err(anyhow::anyhow!("批次大小必须大于0"));
        }
        if self.max_batch_age_ms == 0 {
            return Err(anyhow::anyhow!("批次最长等待时间必须大于0"));
        }
        if self.queue_capacity == 0 {
            return Err(anyhow::anyhow!("日志队列容量必须大于0"));
        }
        if self.max_field_length == 0 {
            return Err(anyhow::anyhow!("字段最大长度必须大于0"));
        }
        Ok(())
    }
}
