//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为所有 [`PollFuture`](crate::PollFuture) 实现提供统一的终态错误分类，调度器与批处理调用方
//!   只需面对一套枚举即可完成“部分失败”处理；
//! - 错误是 Future 的**终态值**而非异步抛出的异常：调度器照常产出失败的 Future，由调用方逐个检查。
//!
//! ## 设计要求（What）
//! - 所有变体实现 `Clone`，使缓存的结果可被重复读取（`resolve()` 幂等）；
//! - 每个变体映射到稳定错误码（[`FutureError::code`]）与粗粒度分类（[`FutureError::class`]），
//!   供调用方自行决定是否重提交；本 crate 不做任何自动重试。

use std::{io, time::Duration};

use thiserror::Error;

/// Future 终态结果的统一别名。
pub type FutureResult<T> = Result<T, FutureError>;

/// 错误的粗粒度分类，语义与重试建议对齐。
///
/// - `Retryable`：瞬时的传输层问题，调用方可按自身退避策略重提交；
/// - `NonRetryable`：请求本身有问题，重提交不会改变结果；
/// - `Timeout`：超出截止时间；
/// - `ProtocolViolation`：对端返回了无法解析的数据。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
    Timeout,
    ProtocolViolation,
}

/// Future 的终态错误。
///
/// # 教案式说明
/// - **意图 (Why)**：将“传输不可用 / 拒绝连接 / 传输中断 / 超时”等互斥的失败形态显式建模，
///   使 HTTP 等具体 Future 能给出**完备且互斥**的分类；
/// - **契约 (What)**：变体只携带可打印的上下文（对端地址、细节描述、已耗时），不持有
///   `io::Error` 本体，以保证 `Clone + Eq`；
/// - **权衡 (Trade-offs)**：丢弃原始 `io::Error` 的 `source()` 链，换取结果缓存的简单性；
///   细节以字符串形式保留在 `detail` 中。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FutureError {
    /// 套接字或通道无法创建（含地址解析失败）。
    #[error("transport unavailable: {detail}")]
    TransportUnavailable { detail: String },

    /// 传输已创建，但在超时或 EOF 之前始终未进入已连接状态。
    #[error("connection refused by {peer}")]
    ConnectionRefused { peer: String },

    /// 已连接，但请求未能完整写出。
    #[error("connection to {peer} failed before the request was fully written ({written} of {total} bytes)")]
    IncompleteWrite {
        peer: String,
        written: usize,
        total: usize,
    },

    /// 已连接且请求已写出，但链路在传输中途断开。
    #[error("connection to {peer} lost: {detail}")]
    ConnectionLost { peer: String, detail: String },

    /// 超过墙钟截止时间。
    #[error("timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// 在任何 I/O 开始前即可判定的非法请求。
    #[error("invalid request: {detail}")]
    InvalidRequest { detail: String },

    /// 对端返回的数据无法解析。
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },

    /// 其他 Future 实现自定义的失败。
    #[error("{detail}")]
    Failed { code: &'static str, detail: String },
}

impl FutureError {
    /// 构造自定义失败，`code` 应遵循 `<领域>.<语义>` 的点分约定。
    pub fn failed(code: &'static str, detail: impl Into<String>) -> Self {
        FutureError::Failed {
            code,
            detail: detail.into(),
        }
    }

    /// 以操作名包装底层 IO 错误，归入 `TransportUnavailable`。
    pub fn transport(operation: &str, error: &io::Error) -> Self {
        FutureError::TransportUnavailable {
            detail: format!("{operation}: {error}"),
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            FutureError::TransportUnavailable { .. } => "spark.future.transport_unavailable",
            FutureError::ConnectionRefused { .. } => "spark.future.connection_refused",
            FutureError::IncompleteWrite { .. } => "spark.future.incomplete_write",
            FutureError::ConnectionLost { .. } => "spark.future.connection_lost",
            FutureError::Timeout { .. } => "spark.future.timeout",
            FutureError::InvalidRequest { .. } => "spark.future.invalid_request",
            FutureError::MalformedResponse { .. } => "spark.future.malformed_response",
            FutureError::Failed { code, .. } => code,
        }
    }

    /// 返回粗粒度分类。
    pub fn class(&self) -> ErrorClass {
        match self {
            FutureError::TransportUnavailable { .. }
            | FutureError::ConnectionRefused { .. }
            | FutureError::IncompleteWrite { .. }
            | FutureError::ConnectionLost { .. } => ErrorClass::Retryable,
            FutureError::Timeout { .. } => ErrorClass::Timeout,
            FutureError::MalformedResponse { .. } => ErrorClass::ProtocolViolation,
            FutureError::InvalidRequest { .. } | FutureError::Failed { .. } => {
                ErrorClass::NonRetryable
            }
        }
    }

    /// 是否属于“已连接后传输中断”这一类。
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            FutureError::IncompleteWrite { .. } | FutureError::ConnectionLost { .. }
        )
    }
}
