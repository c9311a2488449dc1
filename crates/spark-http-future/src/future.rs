use std::{
    io::{self, Read, Write},
    net::{SocketAddr, ToSocketAddrs},
    os::fd::{AsFd, BorrowedFd},
    time::{Duration, Instant},
};

use bytes::{Buf, BytesMut};
use nix::errno::Errno;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use spark_future::{DEFAULT_WAIT, FutureError, FutureResult, FutureSlot, PollFuture, readiness};
use tracing::{debug, trace};

use crate::{
    config::{DEFAULT_READ_CHUNK, DEFAULT_TIMEOUT, HttpClientConfig, default_user_agent},
    request::{Body, RequestParts, Target},
    response::HttpResponse,
};

/// 单次 `is_ready` 最多执行的成功读取次数，快速写端不能让一次轮询无限延长。
const MAX_READS_PER_POLL: usize = 16;

/// 超过该耗时的主机名解析会单独记录一条日志。
const SLOW_RESOLVE: Duration = Duration::from_millis(10);

/// 请求所处的生命周期阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unstarted,
    Connecting,
    Writing,
    Reading,
    Resolved,
}

/// 以非阻塞原始套接字实现的 HTTP/1.0 请求。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 批处理调用方需要同时发起成百上千个请求，交给
///   [`FutureIterator`](spark_future::FutureIterator) 在一个线程上交织推进，
///   因此请求本身必须是“一步一调用”的状态机，而非阻塞客户端；
/// - 只支持明文 `http`，面向内网服务与测试桩；需要 TLS 的场景应换用完整客户端。
///
/// ## 核心逻辑（How）
/// - 阶段严格单调：`Unstarted → Connecting → Writing → Reading → Resolved`；
/// - `is_ready` 每次调用：必要时创建套接字并发起非阻塞 `connect`；未连接时做一次零超时
///   可写检查并读取 `SO_ERROR`；已连接后先冲刷请求缓冲，再读取可用的响应字节，
///   至多读取固定次数；最后检查墙钟超时与 EOF；
/// - 终态分类按优先级互斥：超时 → 拒绝连接（从未连上）→ 请求未写完 → 成功并解析响应。
///
/// ## 契约说明（What）
/// - 非法 URI、非 `http` 协议、缺失主机在构造时即预先终结为
///   [`FutureError::InvalidRequest`]，不触发任何 I/O；
/// - 地址解析或套接字创建失败终结为 [`FutureError::TransportUnavailable`]；
/// - 构建器方法只在请求启动前生效。
///
/// ## 风险提示（Trade-offs）
/// - 主机名解析走系统解析器，会短暂阻塞调用线程；对延迟敏感的批次应预先解析为 IP。
/// - 超时是协作式的，只有被轮询时才会被发现。
#[derive(Debug)]
pub struct HttpFuture {
    uri: String,
    target: Option<Target>,
    request: RequestParts,
    expected: Vec<u16>,
    timeout: Duration,
    user_agent: String,
    read_chunk_size: usize,
    socket: Option<Socket>,
    started: Option<Instant>,
    connected: bool,
    write_complete: bool,
    eof: bool,
    write_buffer: BytesMut,
    request_len: usize,
    response: BytesMut,
    scratch: Vec<u8>,
    slot: FutureSlot<HttpResponse>,
}

impl HttpFuture {
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let mut slot = FutureSlot::new();
        let target = match Target::parse(&uri) {
            Ok(target) => Some(target),
            Err(err) => {
                debug!(%uri, error = %err, "rejected request before any I/O");
                slot.fill(Err(err));
                None
            }
        };
        Self {
            uri,
            target,
            request: RequestParts::default(),
            expected: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: default_user_agent(),
            read_chunk_size: DEFAULT_READ_CHUNK,
            socket: None,
            started: None,
            connected: false,
            write_complete: false,
            eof: false,
            write_buffer: BytesMut::new(),
            request_len: 0,
            response: BytesMut::new(),
            scratch: Vec::new(),
            slot,
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(uri).method("POST")
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.request.method = method.into().to_ascii_uppercase();
        self
    }

    /// 追加一个表单字段；`GET` 时进入查询串，其余方法时编码为正文。
    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let field = (name.into(), value.into());
        match &mut self.request.body {
            Body::Form(fields) => fields.push(field),
            body => *body = Body::Form(vec![field]),
        }
        self
    }

    pub fn form<I, K, V>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        fields
            .into_iter()
            .fold(self, |future, (name, value)| future.form_field(name, value))
    }

    /// 以原始字节作为正文，替换已设置的表单字段。
    pub fn raw_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request.body = Body::Raw(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 设置被视为成功的状态码集合，影响 [`HttpResponse::is_error`]。
    pub fn expect_status(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.expected = codes.into_iter().collect();
        self
    }

    pub fn with_config(mut self, config: &HttpClientConfig) -> Self {
        self.timeout = config.timeout();
        self.user_agent = config.user_agent.clone();
        self.read_chunk_size = config.read_chunk_size.max(1);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn phase(&self) -> Phase {
        if self.slot.is_filled() {
            Phase::Resolved
        } else if self.socket.is_none() {
            Phase::Unstarted
        } else if !self.connected {
            Phase::Connecting
        } else if !self.write_complete {
            Phase::Writing
        } else {
            Phase::Reading
        }
    }

    fn peer(&self) -> String {
        self.target
            .as_ref()
            .map_or_else(|| self.uri.clone(), Target::peer)
    }

    fn resolve_with(&mut self, outcome: FutureResult<HttpResponse>) {
        match &outcome {
            Ok(response) => debug!(
                uri = %self.uri,
                status = response.status,
                bytes = response.body.len(),
                "http future resolved"
            ),
            Err(err) => debug!(
                uri = %self.uri,
                code = err.code(),
                error = %err,
                "http future failed"
            ),
        }
        self.slot.fill(outcome);
        self.socket = None;
        self.write_buffer.clear();
        self.scratch = Vec::new();
    }

    /// 创建套接字并发起非阻塞连接。
    fn open(&mut self) {
        self.started = Some(Instant::now());
        let Some(target) = self.target.clone() else {
            return;
        };
        let resolving = Instant::now();
        let addr = match resolve_addr(&target) {
            Ok(addr) => addr,
            Err(err) => return self.resolve_with(Err(FutureError::transport("resolve", &err))),
        };
        let resolved_in = resolving.elapsed();
        let resolve_ms = resolved_in.as_millis() as u64;
        if resolved_in >= SLOW_RESOLVE {
            debug!(host = %target.host, resolve_ms, "host resolution blocked the caller");
        }
        let socket = match open_socket(addr) {
            Ok(socket) => socket,
            Err(err) => return self.resolve_with(Err(FutureError::transport("socket", &err))),
        };

        self.write_buffer = BytesMut::from(&self.request.serialize(&target, &self.user_agent)[..]);
        self.request_len = self.write_buffer.len();
        self.scratch = vec![0; self.read_chunk_size];

        match socket.connect(&SockAddr::from(addr)) {
            Ok(()) => self.connected = true,
            Err(err) if connect_in_progress(&err) => {}
            Err(err) => {
                debug!(peer = %target.peer(), error = %err, "connect failed immediately");
                return self.resolve_with(Err(FutureError::ConnectionRefused {
                    peer: target.peer(),
                }));
            }
        }
        debug!(
            peer = %target.peer(),
            bytes = self.request_len,
            resolve_ms,
            "http future started"
        );
        self.socket = Some(socket);
    }

    /// 未连接时检查非阻塞 `connect` 的结论；返回 `Some` 表示已得到终态。
    fn poll_connect(&mut self) -> Option<FutureError> {
        let socket = self.socket.as_ref()?;
        match readiness::poll_writable(socket.as_fd()) {
            Ok(false) => None,
            Ok(true) => match socket.take_error() {
                Ok(None) => {
                    debug!(peer = %self.peer(), "connected");
                    self.connected = true;
                    None
                }
                Ok(Some(err)) | Err(err) => {
                    debug!(peer = %self.peer(), error = %err, "connect failed");
                    Some(FutureError::ConnectionRefused { peer: self.peer() })
                }
            },
            Err(err) => Some(FutureError::transport("poll", &err)),
        }
    }

    /// 冲刷请求并读取至多 [`MAX_READS_PER_POLL`] 次响应字节；返回 `Some` 表示链路中断。
    fn pump(&mut self) -> Option<io::Error> {
        let socket = self.socket.as_mut()?;
        while !self.write_buffer.is_empty() {
            match socket.write(&self.write_buffer) {
                Ok(0) => return Some(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(written) => {
                    trace!(uri = %self.uri, written, "wrote request bytes");
                    self.write_buffer.advance(written);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Some(err),
            }
        }
        if self.write_buffer.is_empty() {
            self.write_complete = true;
        }

        let mut reads = 0;
        loop {
            match socket.read(&mut self.scratch) {
                Ok(0) => {
                    self.eof = true;
                    return None;
                }
                Ok(read) => {
                    trace!(uri = %self.uri, read, "read response bytes");
                    self.response.extend_from_slice(&self.scratch[..read]);
                    reads += 1;
                    if reads == MAX_READS_PER_POLL {
                        return None;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return None,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Some(err),
            }
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.map_or(Duration::ZERO, |started| started.elapsed())
    }

    fn timed_out(&self) -> bool {
        self.elapsed() >= self.timeout
    }

    /// 在超时或 EOF 时按优先级给出终态。
    fn classify(&self) -> FutureResult<HttpResponse> {
        if self.timed_out() {
            return Err(FutureError::Timeout {
                elapsed: self.elapsed(),
            });
        }
        if !self.connected {
            return Err(FutureError::ConnectionRefused { peer: self.peer() });
        }
        if !self.write_complete {
            return Err(FutureError::IncompleteWrite {
                peer: self.peer(),
                written: self.request_len - self.write_buffer.len(),
                total: self.request_len,
            });
        }
        HttpResponse::parse(&self.response, &self.expected)
    }
}

impl PollFuture for HttpFuture {
    type Output = HttpResponse;

    fn start(&mut self) {
        if !self.slot.is_filled() && self.socket.is_none() {
            self.open();
        }
    }

    fn is_ready(&mut self) -> bool {
        if self.slot.is_filled() {
            return true;
        }
        if self.socket.is_none() {
            self.open();
            if self.slot.is_filled() {
                return true;
            }
        }

        if !self.connected
            && let Some(err) = self.poll_connect()
        {
            let outcome = if self.timed_out() {
                self.classify()
            } else {
                Err(err)
            };
            self.resolve_with(outcome);
            return true;
        }

        if self.connected
            && let Some(err) = self.pump()
        {
            let outcome = if self.timed_out() {
                self.classify()
            } else if !self.write_complete {
                Err(FutureError::IncompleteWrite {
                    peer: self.peer(),
                    written: self.request_len - self.write_buffer.len(),
                    total: self.request_len,
                })
            } else {
                Err(FutureError::ConnectionLost {
                    peer: self.peer(),
                    detail: err.to_string(),
                })
            };
            self.resolve_with(outcome);
            return true;
        }

        if self.eof || self.timed_out() {
            let outcome = self.classify();
            self.resolve_with(outcome);
            return true;
        }
        false
    }

    fn outcome(&self) -> Option<&FutureResult<HttpResponse>> {
        self.slot.get()
    }

    fn read_fds(&self) -> Vec<BorrowedFd<'_>> {
        match &self.socket {
            Some(socket) if self.connected => vec![socket.as_fd()],
            _ => Vec::new(),
        }
    }

    fn write_fds(&self) -> Vec<BorrowedFd<'_>> {
        match &self.socket {
            Some(socket) if !self.connected || !self.write_complete => vec![socket.as_fd()],
            _ => Vec::new(),
        }
    }

    /// 等待不超过剩余超时，保证截止时间到达后能尽快被轮询。
    fn default_wait(&self) -> Duration {
        self.timeout
            .saturating_sub(self.elapsed())
            .min(DEFAULT_WAIT)
    }
}

fn resolve_addr(target: &Target) -> io::Result<SocketAddr> {
    (target.host.as_str(), target.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for {}", target.host),
            )
        })
}

fn open_socket(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn connect_in_progress(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(Errno::EINPROGRESS as i32)
}
