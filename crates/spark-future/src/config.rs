//! 调度器配置。
//!
//! # 背景说明（Why）
//! - 批处理调用方（lint、bot 等）通常从配置文件读取并发上限，而不是硬编码；
//! - 配置以普通 `serde` 结构表达，缺省字段回落到 [`Default`]，可直接嵌入调用方更大的 TOML 文档。
//!
//! # 集成方式（How）
//! - 使用 [`SchedulerConfig::from_toml_str`] 解析，再交给
//!   [`FutureIterator::with_config`](crate::FutureIterator::with_config)。

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::future::DEFAULT_WAIT;

/// 配置解析错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// [`FutureIterator`](crate::FutureIterator) 的可配置参数。
///
/// - `limit`：最大并发；缺省表示不设上限（全部立即启动）；
/// - `wait_interval_ms`：单次就绪等待上限，保证超时能以较低延迟被发现；
/// - `update_interval_ms`：若设置，长时间无完成时产出 `Tick` 事件。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub limit: Option<usize>,
    pub wait_interval_ms: u64,
    pub update_interval_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            limit: None,
            wait_interval_ms: DEFAULT_WAIT.as_millis() as u64,
            update_interval_ms: None,
        }
    }
}

impl SchedulerConfig {
    /// 从 TOML 文本解析并校验。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// `limit = 0` 会让调度器永远无法启动任何 Future，因此视为非法。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == Some(0) {
            return Err(ConfigError::Invalid {
                field: "limit",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.update_interval_ms.map(Duration::from_millis)
    }
}
