//! 协调服务接口
//!
//! 调度系统对外部协调服务（etcd、Consul、NATS KV等）的全部依赖都收敛到
//! [`CoordinationStore`]：前缀列举、前缀监听、带租约的互斥锁。
//!
//! 锁的正确性来自底层存储的"不存在才创建"（CAS）语义，TTL只是故障时的兜底。

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::SchedulerResult;

/// 一个键值条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: u64,
}

/// 前缀列举的快照
///
/// `revision` 是快照时刻存储的全局版本号，从 `revision + 1` 开始监听即可不丢事件。
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub entries: Vec<KeyValue>,
    pub revision: u64,
}

/// 监听到的变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Put {
        key: String,
        value: Vec<u8>,
        revision: u64,
    },
    Delete {
        key: String,
        revision: u64,
    },
}

impl WatchEvent {
    pub fn key(&self) -> &str {
        match self {
            WatchEvent::Put { key, .. } | WatchEvent::Delete { key, .. } => key,
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            WatchEvent::Put { revision, .. } | WatchEvent::Delete { revision, .. } => *revision,
        }
    }
}

pub type WatchStream = BoxStream<'static, SchedulerResult<WatchEvent>>;

/// 持有锁的凭证
///
/// `revision` 是锁条目当前的版本号，续约和释放都以它为前提条件，
/// 所以过期后被别人重新抢到的锁不会被误删。`ttl` 是抢锁时申请的租期，
/// 续约沿用同一租期。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: u64,
    pub ttl: Duration,
}

/// 抢锁结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired(LockToken),
    /// 锁已被其他持有者占用
    Busy,
}

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// 写入键值，返回新的版本号
    async fn put(&self, key: &str, value: Vec<u8>) -> SchedulerResult<u64>;

    async fn get(&self, key: &str) -> SchedulerResult<Option<KeyValue>>;

    /// 删除键，返回删除前的值
    async fn delete(&self, key: &str) -> SchedulerResult<Option<Vec<u8>>>;

    async fn list(&self, prefix: &str) -> SchedulerResult<Snapshot>;

    /// 监听前缀下的变化
    ///
    /// 指定 `from_revision` 时先重放该版本及之后的全部变化，再跟随实时变化；
    /// 不指定时只推送调用之后发生的变化。
    async fn watch(&self, prefix: &str, from_revision: Option<u64>) -> SchedulerResult<WatchStream>;

    /// 不存在才创建，`ttl` 内未续约则自动过期
    async fn try_lock(&self, key: &str, value: Vec<u8>, ttl: Duration)
        -> SchedulerResult<LockAttempt>;

    /// 续约，锁已丢失时返回 `Coordination` 错误
    async fn keep_alive(&self, token: &LockToken) -> SchedulerResult<LockToken>;

    /// 释放锁，幂等；不会删除已被他人重新获取的锁
    async fn unlock(&self, token: &LockToken) -> SchedulerResult<()>;

    /// 列出前缀下仍然存活的锁
    async fn list_locks(&self, prefix: &str) -> SchedulerResult<Vec<KeyValue>>;
}
