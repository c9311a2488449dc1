//! HTTP 客户端缺省参数。
//!
//! 批处理调用方通常为整批请求共享同一组超时与标识，因此这些参数以配置结构集中表达，
//! 再通过 [`HttpFuture::with_config`](crate::HttpFuture::with_config) 逐个应用。

use std::time::Duration;

use serde::Deserialize;
use spark_future::ConfigError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// 缺省的 `User-Agent` 头值。
pub fn default_user_agent() -> String {
    format!("spark-http-future/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpClientConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub read_chunk_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            user_agent: default_user_agent(),
            read_chunk_size: DEFAULT_READ_CHUNK,
        }
    }
}

impl HttpClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeout_secs",
                reason: "must be at least 1 second".into(),
            });
        }
        if self.read_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "read_chunk_size",
                reason: "must be at least 1 byte".into(),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
