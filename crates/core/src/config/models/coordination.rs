use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 协调服务后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationBackend {
    /// 进程内实现，单机部署和测试用
    Memory,
    /// NATS JetStream KV
    Nats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub backend: CoordinationBackend,
    pub url: String,
    /// 存放任务目录和强杀目录的bucket
    pub data_bucket: String,
    /// 存放锁和Worker注册信息的bucket，条目的max_age即锁TTL
    pub lock_bucket: String,
    pub connect_timeout_seconds: u64,
    pub reconnect_backoff_seconds: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend: CoordinationBackend::Memory,
            url: "nats://127.0.0.1:4222".to_string(),
            data_bucket: "dcron".to_string(),
            lock_bucket: "dcron_locks".to_string(),
            connect_timeout_seconds: 30,
            reconnect_backoff_seconds: 1,
        }
    }
}

impl CoordinationConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend == CoordinationBackend::Nats {
            if self.url.is_empty() {
                return Err(anyhow::anyhow!("协调服务URL不能为空"));
            }
            if !self.url.starts_with("nats://") && !self.url.starts_with("tls://") {
                return Err(anyhow::anyhow!("协调服务URL格式无效: {}", self.url));
            }
        }

        for bucket in [&self.data_bucket, &self.lock_bucket] {
            if bucket.is_empty()
                || !bucket
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(anyhow::anyhow!("bucket名称无效: {}", bucket));
            }
        }
        if self.data_bucket == self.lock_bucket {
            return Err(anyhow::anyhow!("数据bucket和锁bucket不能相同"));
        }

        if self.connect_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 协调服务中的目录前缀
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    pub job_prefix: String,
    pub kill_prefix: String,
    pub lock_prefix: String,
    /// 触发时间占位目录，每个触发时间点只能被一个Worker占下
    pub claim_prefix: String,
    pub worker_prefix: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            job_prefix: "/cron/jobs/".to_string(),
            kill_prefix: "/cron/killer/".to_string(),
            lock_prefix: "/cron/lock/".to_string(),
            claim_prefix: "/cron/fired/".to_string(),
            worker_prefix: "/cron/workers/".to_string(),
        }
    }
}

impl NamespaceConfig {
    pub fn job_key(&self, name: &str) -> String {
        format!("{}{}", self.job_prefix, name)
    }

    pub fn kill_key(&self, name: &str) -> String {
        format!("{}{}", self.kill_prefix, name)
    }

    pub fn lock_key(&self, name: &str) -> String {
        format!("{}{}", self.lock_prefix, name)
    }

    /// `/cron/fired/{name}/{plan_time_ms}`
    pub fn claim_key(&self, name: &str, plan_time_ms: i64) -> String {
        format!("{}{}/{}", self.claim_prefix, name, plan_time_ms)
    }

    pub fn worker_key(&self, worker_id: &str) -> String {
        format!("{}{}", self.worker_prefix, worker_id)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let prefixes = [
            ("job_prefix", &self.job_prefix),
            ("kill_prefix", &self.kill_prefix),
            ("lock_prefix", &self.lock_prefix),
            ("claim_prefix", &self.claim_prefix),
            ("worker_prefix", &self.worker_prefix),
        ];

        for (field, prefix) in prefixes {
            if !prefix.starts_with('/') || !prefix.ends_with('/') || prefix.len() < 2 {
                return Err(anyhow::anyhow!(
                    "{} 必须以'/'开头并以'/'结尾: {}",
                    field,
                    prefix
                ));
            }
        }

        // 前缀互相包含会让一个目录的监听收到另一个目录的事件
        for (i, (a_name, a)) in prefixes.iter().enumerate() {
            for (b_name, b) in prefixes.iter().skip(i + 1) {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    return Err(anyhow::anyhow!("{} 与 {} 重叠", a_name, b_name));
                }
            }
        }

        Ok(())
    }
}
