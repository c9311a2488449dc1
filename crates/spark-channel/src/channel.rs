use std::{
    io::{self, Read, Write},
    os::fd::BorrowedFd,
    time::{Duration, Instant},
};

use bytes::{Buf, Bytes, BytesMut};
use spark_future::{DEFAULT_WAIT, readiness};
use tracing::{debug, trace};

use crate::{
    config::ChannelConfig,
    error::{self, ChannelError, ChannelResult},
    transport::Transport,
};

/// 单次 `update` 最多执行的成功读取次数，防止快速写端让推进永不返回。
const MAX_READS_PER_UPDATE: usize = 16;

/// 带读写缓冲的非阻塞字节通道。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把“非阻塞 fd + 缓冲区 + 关闭状态”三者收拢为一个对象，调用方只面对
///   `write` 入队、`read` 取出、`update` 推进三个动作；
/// - 描述符报告与 [`spark_future::readiness`] 对齐，多个通道可以在同一次 `poll(2)`
///   上等待。
///
/// ## 核心逻辑（How）
/// - `update` 先尽量冲刷写缓冲，再读到 `WouldBlock`、EOF 或读取次数上限为止；
/// - 读到 EOF 只关闭读方向，已缓冲的字节仍可被 `read` 取出，写方向照常可用；
/// - 两个方向都关闭后才释放传输；
/// - 任何传输错误都会立即关闭通道，并以 [`ChannelError::Io`] 从当次调用返回。
///
/// ## 契约说明（What）
/// - `write`：通道已关闭时返回 [`ChannelError::Closed`]，否则入队并尝试一次非阻塞冲刷；
/// - `read`：推进一次后返回当前全部可用字节，可能为空；
/// - `flush`：阻塞直到写缓冲为空，期间仍然处理读方向；
/// - `read_fds`：读方向打开时始终报告；`write_fds`：仅在写缓冲非空时报告。
///
/// ## 风险提示（Trade-offs）
/// - 写缓冲没有上限，生产者需要自行调用 `flush` 施加背压。
#[derive(Debug)]
pub struct Channel<T> {
    transport: Option<T>,
    name: String,
    read_open: bool,
    write_open: bool,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    scratch: Vec<u8>,
    last_activity: Instant,
}

impl<T: Transport> Channel<T> {
    /// 接管传输并切换到非阻塞模式。
    pub fn new(transport: T) -> ChannelResult<Self> {
        Self::with_config(transport, &ChannelConfig::default())
    }

    pub fn with_config(transport: T, config: &ChannelConfig) -> ChannelResult<Self> {
        transport
            .set_nonblocking()
            .map_err(|err| ChannelError::io(error::CONFIGURE, err))?;
        Ok(Self {
            transport: Some(transport),
            name: String::from("channel"),
            read_open: true,
            write_open: true,
            read_buffer: BytesMut::new(),
            write_buffer: BytesMut::new(),
            scratch: vec![0; config.read_chunk_size.max(1)],
            last_activity: Instant::now(),
        })
    }

    /// 为日志与错误消息指定可读名称。
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// 任一方向仍然打开。
    pub fn is_open(&self) -> bool {
        self.is_open_for_reading() || self.is_open_for_writing()
    }

    pub fn is_open_for_reading(&self) -> bool {
        self.transport.is_some() && self.read_open
    }

    pub fn is_open_for_writing(&self) -> bool {
        self.write_open
            && self
                .transport
                .as_ref()
                .is_some_and(|transport| transport.write_fd().is_some())
    }

    pub fn is_write_buffer_empty(&self) -> bool {
        self.write_buffer.is_empty()
    }

    pub fn write_buffer_len(&self) -> usize {
        self.write_buffer.len()
    }

    /// 已读入但尚未被 `read` 取走的字节数。
    pub fn read_buffer_len(&self) -> usize {
        self.read_buffer.len()
    }

    /// 最近一次成功读或写的时刻。
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// 入队字节并尝试一次非阻塞冲刷。
    pub fn write(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        if !self.is_open_for_writing() {
            return Err(ChannelError::Closed {
                name: self.name.clone(),
            });
        }
        self.write_buffer.extend_from_slice(bytes);
        let progressed = self.pump_writes()?;
        if progressed {
            self.last_activity = Instant::now();
        }
        Ok(())
    }

    /// 推进一次并取出全部已缓冲的字节。
    pub fn read(&mut self) -> ChannelResult<Bytes> {
        self.update()?;
        Ok(self.read_buffer.split().freeze())
    }

    /// 非阻塞地推进读写两个方向，返回本次是否有字节移动。
    pub fn update(&mut self) -> ChannelResult<bool> {
        if self.transport.is_none() {
            return Ok(false);
        }
        let wrote = self.pump_writes()?;
        let read = self.pump_reads()?;
        if wrote || read {
            self.last_activity = Instant::now();
        }
        if !self.read_open && !self.write_open {
            self.close();
        }
        Ok(wrote || read)
    }

    /// 阻塞直到写缓冲为空。
    ///
    /// 若通道在冲刷完成前关闭，剩余字节无法送达，返回 [`ChannelError::Closed`]。
    pub fn flush(&mut self) -> ChannelResult<()> {
        loop {
            self.update()?;
            if self.write_buffer.is_empty() {
                return Ok(());
            }
            if self.transport.is_none() {
                return Err(ChannelError::Closed {
                    name: self.name.clone(),
                });
            }
            self.wait_for_activity(DEFAULT_WAIT)?;
        }
    }

    /// 冲刷后半关闭写方向，对端随后读到 EOF；读方向保持打开。
    pub fn close_write(&mut self) -> ChannelResult<()> {
        self.flush()?;
        if let Some(transport) = self.transport.as_mut() {
            transport
                .shutdown_write()
                .map_err(|err| ChannelError::io(error::SHUTDOWN, err))?;
            debug!(channel = %self.name, "write side shut down");
        }
        self.write_open = false;
        if !self.read_open {
            self.close();
        }
        Ok(())
    }

    /// 立即释放传输；未送达的写缓冲被丢弃。重复调用无副作用。
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            self.read_open = false;
            self.write_open = false;
            if !self.write_buffer.is_empty() {
                debug!(
                    channel = %self.name,
                    dropped = self.write_buffer.len(),
                    "closing with unsent bytes"
                );
                self.write_buffer.clear();
            }
            debug!(channel = %self.name, "channel closed");
        }
    }

    pub fn read_fds(&self) -> Vec<BorrowedFd<'_>> {
        match &self.transport {
            Some(transport) if self.read_open => transport.read_fd().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn write_fds(&self) -> Vec<BorrowedFd<'_>> {
        match &self.transport {
            Some(transport) if !self.write_buffer.is_empty() => {
                transport.write_fd().into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// 在本通道的描述符上等待，返回就绪数量（超时为 0）。
    pub fn wait_for_activity(&self, timeout: Duration) -> ChannelResult<usize> {
        readiness::wait_for(&self.read_fds(), &self.write_fds(), timeout)
            .map_err(|err| ChannelError::io(error::WAIT, err))
    }

    fn pump_writes(&mut self) -> ChannelResult<bool> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(false);
        };
        let mut progressed = false;
        let mut failure = None;
        while !self.write_buffer.is_empty() {
            match transport.write(&self.write_buffer) {
                Ok(0) => {
                    failure = Some(io::Error::from(io::ErrorKind::WriteZero));
                    break;
                }
                Ok(written) => {
                    trace!(channel = %self.name, written, "wrote bytes");
                    self.write_buffer.advance(written);
                    progressed = true;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        match failure {
            Some(err) => Err(self.fail(error::WRITE, err)),
            None => Ok(progressed),
        }
    }

    fn pump_reads(&mut self) -> ChannelResult<bool> {
        if !self.read_open {
            return Ok(false);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Ok(false);
        };
        let mut progressed = false;
        let mut failure = None;
        let mut reads = 0;
        loop {
            match transport.read(&mut self.scratch) {
                Ok(0) => {
                    debug!(channel = %self.name, "peer closed its write side");
                    self.read_open = false;
                    break;
                }
                Ok(read) => {
                    trace!(channel = %self.name, read, "read bytes");
                    self.read_buffer.extend_from_slice(&self.scratch[..read]);
                    progressed = true;
                    reads += 1;
                    if reads == MAX_READS_PER_UPDATE {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        match failure {
            Some(err) => Err(self.fail(error::READ, err)),
            None => Ok(progressed),
        }
    }

    fn fail(&mut self, operation: error::OperationKind, err: io::Error) -> ChannelError {
        debug!(channel = %self.name, code = operation.code, error = %err, "transport failure");
        self.close();
        ChannelError::io(operation, err)
    }
}

/// 在多个通道的描述符并集上等待一次。
pub fn wait_for_any<T: Transport>(
    channels: &[&Channel<T>],
    timeout: Duration,
) -> ChannelResult<usize> {
    let mut read = Vec::new();
    let mut write = Vec::new();
    for channel in channels {
        read.extend(channel.read_fds());
        write.extend(channel.write_fds());
    }
    readiness::wait_for(&read, &write, timeout).map_err(|err| ChannelError::io(error::WAIT, err))
}
