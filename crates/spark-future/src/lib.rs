#![doc = r#"
# spark-future

## 设计动机（Why）
- **定位**：提供单线程、协作式的延迟计算契约 [`PollFuture`] 与有界并发调度器
  [`FutureIterator`]，把大量在途的非阻塞 I/O 操作交织在一个线程上推进。
- **架构角色**：作为执行核心的最底层，`spark-channel` 复用其就绪等待原语，
  `spark-http-future` 在其契约之上实现具体的 HTTP Future。
- **设计理念**：显式的“一步一调用”轮询，而非协程或 `async/await` 变换；
  每一步都是纯粹的状态迁移，唯一的阻塞点是 [`readiness::wait_for`]。

## 核心契约（What）
- **Future**：`is_ready()` 有界推进、`outcome()` 缓存终态、`read_fds()`/`write_fds()`
  报告关心的描述符；终态只迁移一次，之后的读取幂等；
- **调度器**：活跃数永不超过 `limit`，每个提交项恰好启动一次、产出一次，
  按完成顺序产出，失败者照常产出；
- **错误**：[`FutureError`] 是 Future 的终态值，从不从调度器中异步抛出。

## 实现策略（How）
- 就绪等待基于 `nix::poll`，在所有活跃 Future 的描述符并集上执行一次 `poll(2)`；
- 等待始终带超时，保证自身超时的 Future 能以较低延迟被重新轮询。

## 风险与考量（Trade-offs）
- 超时是协作式的：从不被轮询的 Future 永远不会超时；
- 不报告描述符的活跃 Future 会让调度器立即重轮询，纯 CPU 型 Future 因此会忙等。
"#]

pub mod config;
pub mod error;
mod future;
mod immediate;
mod iterator;
pub mod readiness;

pub use config::{ConfigError, SchedulerConfig};
pub use error::{ErrorClass, FutureError, FutureResult};
pub use future::{DEFAULT_WAIT, FutureSlot, FutureState, PollFuture};
pub use immediate::ImmediateFuture;
pub use iterator::{FutureIterator, IteratorEvent};
