use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use bytes::BytesMut;
use spark_future::DEFAULT_WAIT;
use tracing::debug;

use crate::{
    channel::Channel,
    error::{ChannelError, ChannelResult, DecodeFailure},
    transport::Transport,
};

/// 字节流与消息之间的双向转换。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 通道只搬运字节，分帧规则由编解码器独占，二者各自可替换；
/// - 解码器自带跨调用的缓冲状态，因此按任意粒度切分的输入都能得到同样的消息序列。
///
/// ## 契约 (What)
/// - `encode`：把一条消息追加到 `dst`，不得写入半帧；
/// - `decode`：消费 `src` 全部字节，返回其中完整的消息（可能为空），剩余半帧留在内部；
/// - 任一方向返回错误后，调用方不再对同一实例重试。
pub trait ProtocolCodec {
    type Message;

    fn encode(&mut self, message: &Self::Message, dst: &mut BytesMut) -> ChannelResult<()>;

    fn decode(&mut self, src: &[u8]) -> ChannelResult<Vec<Self::Message>>;
}

/// 在 [`Channel`] 之上按消息收发的协议通道。
///
/// # 教案级注释
///
/// ## 核心逻辑（How）
/// - 已解码未取走的消息存放在 FIFO 队列中，`add_message` 可向队尾注入合成消息；
/// - `read` 优先弹出队首，队列为空时才推进底层通道并解码新字节；
/// - 解码失败后通道被标记为中毒，后续读取一律返回 [`DecodeFailure::Poisoned`]。
///
/// ## 契约说明（What）
/// - `wait_for_message`：阻塞直到一条消息可用；底层通道关闭且队列为空时返回
///   [`ChannelError::ClosedWhileWaiting`]；
/// - `wait_for_message_timeout`：同上，但在超时后返回 `Ok(None)`。
#[derive(Debug)]
pub struct ProtocolChannel<T, C: ProtocolCodec> {
    channel: Channel<T>,
    codec: C,
    messages: VecDeque<C::Message>,
    poisoned: bool,
}

impl<T: Transport, C: ProtocolCodec> ProtocolChannel<T, C> {
    pub fn new(channel: Channel<T>, codec: C) -> Self {
        Self {
            channel,
            codec,
            messages: VecDeque::new(),
            poisoned: false,
        }
    }

    /// 编码并入队一条消息，随即尝试非阻塞冲刷。
    pub fn write(&mut self, message: &C::Message) -> ChannelResult<()> {
        let mut frame = BytesMut::new();
        self.codec.encode(message, &mut frame)?;
        self.channel.write(&frame)
    }

    /// 非阻塞地取出下一条消息。
    pub fn read(&mut self) -> ChannelResult<Option<C::Message>> {
        if let Some(message) = self.messages.pop_front() {
            return Ok(Some(message));
        }
        if self.poisoned {
            return Err(ChannelError::decode(DecodeFailure::Poisoned));
        }
        let bytes = self.channel.read()?;
        if !bytes.is_empty() {
            match self.codec.decode(&bytes) {
                Ok(decoded) => self.messages.extend(decoded),
                Err(err) => {
                    debug!(channel = %self.channel.name(), error = %err, "decoder poisoned");
                    self.poisoned = true;
                    return Err(err);
                }
            }
        }
        Ok(self.messages.pop_front())
    }

    /// 阻塞直到下一条消息可用。
    pub fn wait_for_message(&mut self) -> ChannelResult<C::Message> {
        loop {
            if let Some(message) = self.read()? {
                return Ok(message);
            }
            self.ensure_readable()?;
            self.channel.wait_for_activity(DEFAULT_WAIT)?;
        }
    }

    pub fn wait_for_message_timeout(
        &mut self,
        timeout: Duration,
    ) -> ChannelResult<Option<C::Message>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.read()? {
                return Ok(Some(message));
            }
            self.ensure_readable()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.channel.wait_for_activity(remaining.min(DEFAULT_WAIT))?;
        }
    }

    /// 把一条消息追加到待读队列尾部，后续 `read` 按 FIFO 顺序返回。
    pub fn add_message(&mut self, message: C::Message) {
        self.messages.push_back(message);
    }

    pub fn pending_messages(&self) -> usize {
        self.messages.len()
    }

    pub fn flush(&mut self) -> ChannelResult<()> {
        self.channel.flush()
    }

    pub fn close(&mut self) {
        self.channel.close();
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel<T> {
        &mut self.channel
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn into_parts(self) -> (Channel<T>, C) {
        (self.channel, self.codec)
    }

    fn ensure_readable(&self) -> ChannelResult<()> {
        if self.channel.is_open_for_reading() {
            Ok(())
        } else {
            Err(ChannelError::ClosedWhileWaiting {
                name: self.channel.name().to_owned(),
            })
        }
    }
}
