use spark_future::ErrorClass;
use std::io;
use thiserror::Error;

/// 通道操作结果别名。
pub type ChannelResult<T> = Result<T, ChannelError>;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub const READ: OperationKind = OperationKind {
    code: "spark.channel.read_failed",
    message: "channel read",
};
pub const WRITE: OperationKind = OperationKind {
    code: "spark.channel.write_failed",
    message: "channel write",
};
pub const CONFIGURE: OperationKind = OperationKind {
    code: "spark.channel.configure_failed",
    message: "channel configure",
};
pub const SHUTDOWN: OperationKind = OperationKind {
    code: "spark.channel.shutdown_failed",
    message: "channel shutdown",
};
pub const WAIT: OperationKind = OperationKind {
    code: "spark.channel.wait_failed",
    message: "channel readiness wait",
};

/// 分帧解码失败的具体原因。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("length prefix {prefix:?} is not a zero-padded decimal")]
    MalformedLength { prefix: String },
    #[error("body is not valid JSON: {detail}")]
    InvalidJson { detail: String },
    #[error("body is a JSON {kind}, expected an object")]
    NotAnObject { kind: &'static str },
    #[error("stream is poisoned by an earlier decode failure")]
    Poisoned,
}

/// 通道与协议层错误。
///
/// # 教案式说明
/// - **意图 (Why)**：传输层故障（断管、连接重置）在**下一次** `read`/`write` 时以类型化错误
///   返回，而不是异步抛出；解码错误对当前流是致命的，因为损坏的帧会污染后续所有解析。
/// - **契约 (What)**：`Io` 携带操作种类与原始 `io::Error`；`Decode` 之后同一通道的后续读取
///   返回 [`DecodeFailure::Poisoned`]，不存在重新同步策略。
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("{}: {source}", .operation.message)]
    Io {
        operation: OperationKind,
        #[source]
        source: io::Error,
    },

    #[error("channel `{name}` is closed")]
    Closed { name: String },

    #[error("channel `{name}` closed while waiting for a message")]
    ClosedWhileWaiting { name: String },

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("failed to decode frame: {reason}")]
    Decode { reason: DecodeFailure },

    #[error("failed to encode message: {detail}")]
    Encode { detail: String },
}

impl ChannelError {
    pub(crate) fn io(operation: OperationKind, source: io::Error) -> Self {
        ChannelError::Io { operation, source }
    }

    pub(crate) fn decode(reason: DecodeFailure) -> Self {
        ChannelError::Decode { reason }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::Io { operation, .. } => operation.code,
            ChannelError::Closed { .. } => "spark.channel.closed",
            ChannelError::ClosedWhileWaiting { .. } => "spark.channel.closed_while_waiting",
            ChannelError::FrameTooLarge { .. } => "spark.channel.frame_too_large",
            ChannelError::Decode { .. } => "spark.channel.decode_failed",
            ChannelError::Encode { .. } => "spark.channel.encode_failed",
        }
    }

    /// 返回粗粒度分类，语义与 `spark-future` 对齐。
    pub fn class(&self) -> ErrorClass {
        match self {
            ChannelError::Io { source, .. } => match source.kind() {
                io::ErrorKind::TimedOut => ErrorClass::Timeout,
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::Interrupted => ErrorClass::Retryable,
                _ => ErrorClass::NonRetryable,
            },
            ChannelError::Closed { .. } | ChannelError::ClosedWhileWaiting { .. } => {
                ErrorClass::Retryable
            }
            ChannelError::Decode { .. } => ErrorClass::ProtocolViolation,
            ChannelError::FrameTooLarge { .. } | ChannelError::Encode { .. } => {
                ErrorClass::NonRetryable
            }
        }
    }
}
