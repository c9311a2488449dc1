//! 长度前缀 JSON 帧。
//!
//! # 线格式
//! ```text
//! 00000015{"key":"value"}
//! └──8──┘└──── 15 字节 ────┘
//! ```
//! - 前缀是恰好 [`LENGTH_PREFIX_WIDTH`] 个 ASCII 十进制数字，左侧补零，表示正文字节数；
//! - 正文是单个 JSON 对象，UTF-8 编码；
//! - 没有分隔符、没有校验和，帧与帧直接拼接。
//!
//! # 状态机
//! 解码器在 [`FrameMode::AwaitingLength`] 与 [`FrameMode::AwaitingBody`] 之间交替，
//! 同一时刻只关心“还差多少字节”。输入无论怎样切分，产出的消息序列都相同。

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    channel::Channel,
    error::{ChannelError, ChannelResult, DecodeFailure},
    protocol::{ProtocolChannel, ProtocolCodec},
    transport::Transport,
};

pub const LENGTH_PREFIX_WIDTH: usize = 8;

/// 八位十进制前缀能表达的最大正文长度。
pub const MAX_FRAME_LEN: usize = 99_999_999;

/// 帧正文：字符串键到任意 JSON 值的映射。
pub type JsonObject = Map<String, Value>;

/// 以 JSON 帧收发消息的协议通道。
pub type JsonProtocolChannel<T> = ProtocolChannel<T, JsonFrameCodec>;

/// 解码器当前期待的帧片段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameMode {
    AwaitingLength,
    AwaitingBody,
}

/// 长度前缀 JSON 帧编解码器。
#[derive(Debug)]
pub struct JsonFrameCodec {
    mode: FrameMode,
    needed: usize,
    buffer: BytesMut,
}

impl Default for JsonFrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFrameCodec {
    pub fn new() -> Self {
        Self {
            mode: FrameMode::AwaitingLength,
            needed: LENGTH_PREFIX_WIDTH,
            buffer: BytesMut::new(),
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    /// 当前片段已经缓冲的字节数。
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// 完成当前片段还需要的字节数。
    pub fn bytes_needed(&self) -> usize {
        self.needed.saturating_sub(self.buffer.len())
    }
}

impl ProtocolCodec for JsonFrameCodec {
    type Message = JsonObject;

    fn encode(&mut self, message: &JsonObject, dst: &mut BytesMut) -> ChannelResult<()> {
        let body = serde_json::to_vec(message).map_err(|err| ChannelError::Encode {
            detail: err.to_string(),
        })?;
        if body.len() > MAX_FRAME_LEN {
            return Err(ChannelError::FrameTooLarge {
                len: body.len(),
                max: MAX_FRAME_LEN,
            });
        }
        dst.reserve(LENGTH_PREFIX_WIDTH + body.len());
        dst.put_slice(format!("{:0width$}", body.len(), width = LENGTH_PREFIX_WIDTH).as_bytes());
        dst.put_slice(&body);
        Ok(())
    }

    fn decode(&mut self, src: &[u8]) -> ChannelResult<Vec<JsonObject>> {
        self.buffer.extend_from_slice(src);
        let mut messages = Vec::new();
        while self.buffer.len() >= self.needed {
            let piece = self.buffer.split_to(self.needed);
            match self.mode {
                FrameMode::AwaitingLength => {
                    self.needed = parse_length(&piece)?;
                    self.mode = FrameMode::AwaitingBody;
                }
                FrameMode::AwaitingBody => {
                    messages.push(parse_body(&piece)?);
                    self.needed = LENGTH_PREFIX_WIDTH;
                    self.mode = FrameMode::AwaitingLength;
                }
            }
        }
        Ok(messages)
    }
}

/// 把一条消息编码为完整帧。
pub fn encode_frame(message: &JsonObject) -> ChannelResult<Bytes> {
    let mut frame = BytesMut::new();
    JsonFrameCodec::new().encode(message, &mut frame)?;
    Ok(frame.freeze())
}

fn parse_length(prefix: &[u8]) -> ChannelResult<usize> {
    let malformed = || {
        ChannelError::decode(DecodeFailure::MalformedLength {
            prefix: String::from_utf8_lossy(prefix).into_owned(),
        })
    };
    if !prefix.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    std::str::from_utf8(prefix)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(malformed)
}

fn parse_body(body: &[u8]) -> ChannelResult<JsonObject> {
    let value: Value = serde_json::from_slice(body).map_err(|err| {
        ChannelError::decode(DecodeFailure::InvalidJson {
            detail: err.to_string(),
        })
    })?;
    match value {
        Value::Object(object) => Ok(object),
        other => Err(ChannelError::decode(DecodeFailure::NotAnObject {
            kind: json_kind(&other),
        })),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl<T: Transport> ProtocolChannel<T, JsonFrameCodec> {
    pub fn json(channel: Channel<T>) -> Self {
        ProtocolChannel::new(channel, JsonFrameCodec::new())
    }

    /// 序列化任意 `Serialize` 值并作为一帧发送；值必须序列化为 JSON 对象。
    pub fn write_serialized<S: Serialize>(&mut self, value: &S) -> ChannelResult<()> {
        let encoded = serde_json::to_value(value).map_err(|err| ChannelError::Encode {
            detail: err.to_string(),
        })?;
        match encoded {
            Value::Object(object) => self.write(&object),
            other => Err(ChannelError::Encode {
                detail: format!(
                    "value serialized to a JSON {}, expected an object",
                    json_kind(&other)
                ),
            }),
        }
    }

    /// 阻塞读取下一帧并反序列化为 `D`。
    pub fn wait_for_deserialized<D: DeserializeOwned>(&mut self) -> ChannelResult<D> {
        let object = self.wait_for_message()?;
        serde_json::from_value(Value::Object(object)).map_err(|err| {
            ChannelError::decode(DecodeFailure::InvalidJson {
                detail: err.to_string(),
            })
        })
    }
}
