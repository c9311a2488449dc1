//! 通道配置。

use serde::Deserialize;
use spark_future::ConfigError;

/// 单次 `read(2)` 的缺省块大小。
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// [`Channel`](crate::Channel) 的可配置参数。
///
/// `read_chunk_size` 决定每次系统调用读取的最大字节数；一次 `update` 在读到不足一块
/// 时即停止，因此它同时约束了单次推进的工作量。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelConfig {
    pub read_chunk_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

impl ChannelConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "read_chunk_size",
                reason: "must be at least 1 byte".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        assert_eq!(
            ChannelConfig::from_toml_str("").unwrap().read_chunk_size,
            DEFAULT_READ_CHUNK
        );
        assert_eq!(
            ChannelConfig::from_toml_str("read_chunk_size = 512")
                .unwrap()
                .read_chunk_size,
            512
        );
    }

    #[test]
    fn zero_chunk_is_rejected() {
        let err = ChannelConfig::from_toml_str("read_chunk_size = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "read_chunk_size",
                ..
            }
        ));
    }
}
