use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 时间表为空时的等待时长
    pub idle_interval_ms: u64,
    /// 任务事件通道容量
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: 30_000,
            event_buffer: 1000,
        }
    }
}

impl SchedulerConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.idle_interval_ms == 0 {
            return Err(anyhow::anyhow!("空闲等待时间必须大于0"));
        }
        if self.event_buffer == 0 {
            return Err(anyhow::anyhow!("事件通道容量必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub ttl_seconds: u64,
    pub keep_alive_interval_seconds: u64,
    /// 抢锁前随机等待 0..N 毫秒，打散多个Worker的竞争
    pub acquire_jitter_ms: u64,
    /// 触发时间占位的租期，占位不主动释放，到期自然消失
    pub fire_claim_ttl_seconds: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 5,
            keep_alive_interval_seconds: 2,
            acquire_jitter_ms: 1000,
            fire_claim_ttl_seconds: 60,
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_seconds)
    }

    pub fn acquire_jitter(&self) -> Duration {
        Duration::from_millis(self.acquire_jitter_ms)
    }

    pub fn fire_claim_ttl(&self) -> Duration {
        Duration::from_secs(self.fire_claim_ttl_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ttl_seconds == 0 {
            return Err(anyhow::anyhow!("锁TTL必须大于0"));
        }
        if self.keep_alive_interval_seconds == 0 {
            return Err(anyhow::anyhow!("锁续约间隔必须大于0"));
        }
        if self.keep_alive_interval_seconds >= self.ttl_seconds {
            return Err(anyhow::anyhow!(
                "锁续约间隔({}秒)必须小于锁TTL({}秒)",
                self.keep_alive_interval_seconds,
                self.ttl_seconds
            ));
        }
        // 占位必须比最晚的抢锁时刻活得久，否则晚到的Worker会再占一次
        if self.fire_claim_ttl_seconds.saturating_mul(1000)
            <= self.acquire_jitter_ms.saturating_add(self.ttl_seconds.saturating_mul(1000))
        {
            return Err(anyhow::anyhow!(
                "触发时间占位租期({}秒)必须大于抢锁随机等待({}毫秒)与锁TTL({}秒)之和",
                self.fire_claim_ttl_seconds,
                self.acquire_jitter_ms,
                self.ttl_seconds
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub shell: String,
    /// 强杀后等待输出管道关闭的时间
    pub kill_grace_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            kill_grace_ms: 500,
        }
    }
}

impl ExecutorConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shell.trim().is_empty() {
            return Err(anyhow::anyhow!("shell不能为空"));
        }
        Ok(())
    }
}

/// 注册租期 = 心跳间隔 × 该倍数
pub const REGISTRATION_LEASE_MULTIPLIER: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub ip_address: String,
    pub heartbeat_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: local_hostname(),
            ip_address: "127.0.0.1".to_string(),
            heartbeat_interval_seconds: 5,
        }
    }
}

impl WorkerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// 注册租期，错过两次心跳仍然有效
    pub fn registration_lease(&self) -> Duration {
        self.heartbeat_interval() * REGISTRATION_LEASE_MULTIPLIER
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            return Err(anyhow::anyhow!("Worker ID不能为空"));
        }
        if !self
            .worker_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(anyhow::anyhow!("Worker ID格式无效: {}", self.worker_id));
        }

        if self.ip_address.is_empty() {
            return Err(anyhow::anyhow!("IP地址不能为空"));
        }
        if self.ip_address.parse::<std::net::IpAddr>().is_err() {
            return Err(anyhow::anyhow!("IP地址格式无效: {}", self.ip_address));
        }

        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }
        Ok(())
    }
}

/// 本机主机名，只保留可以作为键的字符
pub fn local_hostname() -> String {
    let name = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default();
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "worker-001".to_string()
    } else {
        sanitized
    }
}
