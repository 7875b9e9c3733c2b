use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Worker节点信息，作为注册目录下的值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub hostname: String,
    pub ip_address: String,
    pub registered_at: DateTime<Utc>,
}

impl WorkerInfo {
    pub fn new(
        worker_id: impl Into<String>,
        hostname: impl Into<String>,
        ip_address: impl Into<String>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            hostname: hostname.into(),
            ip_address: ip_address.into(),
            registered_at: Utc::now(),
        }
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
