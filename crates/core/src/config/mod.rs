//! 配置管理
//!
//! 加载顺序（后者覆盖前者）：
//!
//! 1. 内置默认值
//! 2. TOML配置文件（`--config` 指定，或依次查找 `config/dcron.toml`、`dcron.toml`、`/etc/dcron/config.toml`）
//! 3. 环境变量，前缀 `DCRON`，层级分隔符 `__`，例如 `DCRON__LOCK__TTL_SECONDS=10`
//!
//! ```rust,no_run
//! use dcron_core::config::AppConfig;
//!
//! let config = AppConfig::load(None).unwrap();
//! println!("锁TTL: {:?}", config.lock.ttl());
//! ```

pub mod models;

pub use models::*;
