#![doc = r#"
# spark-channel

## 设计动机（Why）
- **定位**：在非阻塞描述符之上提供带缓冲的字节通道 [`Channel`]，以及按消息收发的
  [`ProtocolChannel`]，用于与长期运行的工作进程或对端服务交换结构化消息。
- **架构角色**：与 `spark-future` 共用同一就绪等待原语，通道描述符可以和在途 Future
  的描述符一起参与等待。

## 核心契约（What）
- 通道：`write` 入队、`read` 取出、`update` 推进；EOF 只关闭读方向，已缓冲字节仍可读；
- 协议：解码器可按任意切分接收输入；解码错误对当前流致命，没有重新同步；
- JSON 帧：八位补零十进制长度前缀 + 单个 JSON 对象，见 [`json`] 模块。

## 实现策略（How）
- 缓冲使用 `bytes::BytesMut`，写缓冲按已写字节数 `advance`，读缓冲整体 `split` 交出；
- 传输抽象 [`Transport`] 分别报告读、写描述符，套接字与管道对都能适配。

## 风险与考量（Trade-offs）
- 写缓冲无上限；调用方通过 `flush` 自行施加背压。
"#]

mod channel;
pub mod config;
pub mod error;
pub mod json;
mod protocol;
mod transport;

pub use channel::{Channel, wait_for_any};
pub use config::ChannelConfig;
pub use error::{ChannelError, ChannelResult, DecodeFailure, OperationKind};
pub use json::{FrameMode, JsonFrameCodec, JsonObject, JsonProtocolChannel, encode_frame};
pub use protocol::{ProtocolChannel, ProtocolCodec};
pub use transport::{Duplex, Transport, set_fd_nonblocking};
