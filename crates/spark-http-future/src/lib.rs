#![doc = r#"
# spark-http-future

## 设计动机（Why）
- **定位**：把一次明文 HTTP/1.0 请求表达为 [`spark_future::PollFuture`]，使批处理调用方
  可以把大量请求交给 [`spark_future::FutureIterator`]，在单线程上以有界并发交织推进。
- **架构角色**：直接消费原始套接字的叶子节点，不依赖 `spark-channel` 的通道与分帧栈。

## 核心契约（What）
- 构造：[`HttpFuture::new`]/[`HttpFuture::get`]/[`HttpFuture::post`] 加构建器方法；
- 终态：成功时产出 [`HttpResponse`]，失败时产出互斥分类的 [`spark_future::FutureError`]：
  超时、拒绝连接、请求未写完或链路中断、响应无法解析、请求非法、传输不可用；
- 线格式：`<METHOD> <path>[?query] HTTP/1.0\r\n`，随后是头部、空行与正文，
  `Content-Length` 总是等于正文的精确字节数。

## 实现策略（How）
- 套接字经 `socket2` 创建并切换为非阻塞，`connect` 的结论通过零超时可写检查加
  `SO_ERROR` 判定；
- URI 解析与表单编码使用 `url` crate。

## 风险与考量（Trade-offs）
- 不支持 TLS、重定向、分块传输编码与连接复用；响应正文读到连接关闭为止。
"#]

pub mod config;
mod future;
mod request;
mod response;

pub use config::HttpClientConfig;
pub use future::{HttpFuture, Phase};
pub use response::HttpResponse;
