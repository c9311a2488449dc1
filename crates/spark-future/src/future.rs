use std::{
    os::fd::BorrowedFd,
    time::{Duration, Instant},
};

use tracing::warn;

use crate::{
    error::{FutureError, FutureResult},
    readiness,
};

/// 单次就绪等待的默认上限。
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

/// Future 的生命周期状态。
///
/// `Resolved` 与 `Failed` 均为终态，一旦进入不会再离开。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FutureState {
    Pending,
    Resolved,
    Failed,
}

/// 以显式就绪轮询驱动的延迟计算契约。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 不依赖 OS 线程或内建事件循环：所有进度只在调用方显式调用 [`is_ready`](Self::is_ready)
///   时发生，便于调度器以确定性的方式推理并发上限；
/// - 与标准库 `Future` 不同，这里没有 `Waker`：唤醒来源是调度器对描述符并集的一次
///   就绪等待，Future 只需报告自己关心的读/写描述符。
///
/// ## 契约 (What)
/// - `is_ready`：执行**有界且不阻塞**的一步进度，返回是否已抵达终态；
/// - `outcome`：终态后返回缓存的结果，之前返回 `None`；
/// - `read_fds`/`write_fds`：供调度器合并等待；不报告任何描述符的 Future 被视为可立即重轮询；
/// - `start`：调度器将其提升为活跃时调用一次；直接同步使用的 Future 不要求先调用它；
/// - **后置条件**：终态之后重复调用 `is_ready`/`outcome`/`resolve` 返回同一结果，不重复执行工作。
///
/// ## 注意事项 (Trade-offs)
/// - 每一步都必须是纯粹的状态迁移，不得隐藏阻塞；唯一允许阻塞的位置是
///   [`readiness::wait_for`]。
pub trait PollFuture {
    /// 成功时的结果类型。
    type Output;

    /// 推进一步，返回是否已进入终态。
    fn is_ready(&mut self) -> bool;

    /// 终态后的缓存结果。
    fn outcome(&self) -> Option<&FutureResult<Self::Output>>;

    /// 等待可读的描述符。
    fn read_fds(&self) -> Vec<BorrowedFd<'_>> {
        Vec::new()
    }

    /// 等待可写的描述符。
    fn write_fds(&self) -> Vec<BorrowedFd<'_>> {
        Vec::new()
    }

    /// 被调度器提升为活跃时的钩子。
    fn start(&mut self) {}

    /// 单次就绪等待的上限。
    fn default_wait(&self) -> Duration {
        DEFAULT_WAIT
    }

    /// 当前状态，由缓存结果推导。
    fn state(&self) -> FutureState {
        match self.outcome() {
            None => FutureState::Pending,
            Some(Ok(_)) => FutureState::Resolved,
            Some(Err(_)) => FutureState::Failed,
        }
    }

    /// 同步驱动到终态并返回结果副本。
    ///
    /// 未使用调度器的调用方可以直接以此方式消费 Future。
    fn resolve(&mut self) -> FutureResult<Self::Output>
    where
        Self: Sized,
        Self::Output: Clone,
    {
        loop {
            let wait = self.default_wait();
            if let Some(result) = step_within(self, wait) {
                return result;
            }
        }
    }

    /// 与 [`resolve`](Self::resolve) 相同，但最多阻塞 `timeout`；仍未完成时返回 `None`。
    fn resolve_timeout(&mut self, timeout: Duration) -> Option<FutureResult<Self::Output>>
    where
        Self: Sized,
        Self::Output: Clone,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Some(result) = step_within(self, remaining) {
                return Some(result);
            }
            if remaining.is_zero() {
                return None;
            }
        }
    }
}

/// 推进一步；未完成时在 Future 自身的描述符上最多等待 `budget`。
fn step_within<F>(future: &mut F, budget: Duration) -> Option<FutureResult<F::Output>>
where
    F: PollFuture,
    F::Output: Clone,
{
    if future.is_ready() {
        return Some(cached(future));
    }
    let wait = budget.min(future.default_wait());
    let read = future.read_fds();
    let write = future.write_fds();
    if let Err(error) = readiness::wait_for(&read, &write, wait) {
        warn!(%error, "readiness wait failed while resolving a future");
    }
    None
}

fn cached<F>(future: &F) -> FutureResult<F::Output>
where
    F: PollFuture,
    F::Output: Clone,
{
    match future.outcome() {
        Some(result) => result.clone(),
        None => Err(FutureError::failed(
            "spark.future.unresolved",
            "future reported ready without an outcome",
        )),
    }
}

/// 只写一次的结果槽，具体 Future 用它保存终态。
///
/// 第二次 [`fill`](Self::fill) 会被忽略并返回 `false`，从而在类型层面之外也保证
/// “终态只迁移一次”。
#[derive(Debug)]
pub struct FutureSlot<T> {
    outcome: Option<FutureResult<T>>,
}

impl<T> FutureSlot<T> {
    pub const fn new() -> Self {
        Self { outcome: None }
    }

    /// 写入终态；已写入时保持原值并返回 `false`。
    pub fn fill(&mut self, outcome: FutureResult<T>) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        true
    }

    pub fn is_filled(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn get(&self) -> Option<&FutureResult<T>> {
        self.outcome.as_ref()
    }

    /// 取出终态，消费槽本身。
    pub fn into_inner(self) -> Option<FutureResult<T>> {
        self.outcome
    }
}

impl<T> Default for FutureSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 第 `n` 次轮询后完成的计数 Future。
    struct Countdown {
        remaining: u32,
        polls: u32,
        slot: FutureSlot<u32>,
    }

    impl Countdown {
        fn new(remaining: u32) -> Self {
            Self {
                remaining,
                polls: 0,
                slot: FutureSlot::new(),
            }
        }
    }

    impl PollFuture for Countdown {
        type Output = u32;

        fn is_ready(&mut self) -> bool {
            if self.slot.is_filled() {
                return true;
            }
            self.polls += 1;
            if self.remaining == 0 {
                self.slot.fill(Ok(self.polls));
                return true;
            }
            self.remaining -= 1;
            false
        }

        fn outcome(&self) -> Option<&FutureResult<u32>> {
            self.slot.get()
        }

        fn default_wait(&self) -> Duration {
            Duration::ZERO
        }
    }

    #[test]
    fn resolve_drives_to_completion_once() {
        let mut future = Countdown::new(3);
        assert_eq!(future.state(), FutureState::Pending);
        assert_eq!(future.resolve(), Ok(4));
        assert_eq!(future.state(), FutureState::Resolved);

        for _ in 0..5 {
            assert!(future.is_ready());
            assert_eq!(future.resolve(), Ok(4));
        }
        assert_eq!(future.polls, 4);
    }

    #[test]
    fn slot_is_write_once() {
        let mut slot = FutureSlot::new();
        assert!(slot.fill(Ok(1)));
        assert!(!slot.fill(Err(FutureError::failed("x.y", "late"))));
        assert_eq!(slot.get(), Some(&Ok(1)));
        assert_eq!(slot.into_inner(), Some(Ok(1)));
    }

    #[test]
    fn resolve_timeout_gives_up_on_stuck_futures() {
        struct Stuck;
        impl PollFuture for Stuck {
            type Output = ();
            fn is_ready(&mut self) -> bool {
                false
            }
            fn outcome(&self) -> Option<&FutureResult<()>> {
                None
            }
            fn default_wait(&self) -> Duration {
                Duration::from_millis(5)
            }
        }

        let started = Instant::now();
        assert_eq!(Stuck.resolve_timeout(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn failed_outcomes_are_cached_too() {
        struct Broken(FutureSlot<()>);
        impl PollFuture for Broken {
            type Output = ();
            fn is_ready(&mut self) -> bool {
                self.0.fill(Err(FutureError::failed("test.broken", "boom")));
                true
            }
            fn outcome(&self) -> Option<&FutureResult<()>> {
                self.0.get()
            }
        }

        let mut future = Broken(FutureSlot::new());
        let first = future.resolve();
        assert_eq!(future.state(), FutureState::Failed);
        assert_eq!(future.resolve(), first);
    }
}
