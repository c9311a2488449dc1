use crate::{
    error::{FutureError, FutureResult},
    future::PollFuture,
};

/// 构造时即处于终态的 Future。
///
/// 适用于“结果已知但调用方只接受 Future”的场景，例如缓存命中或参数校验失败；
/// 不报告任何描述符，调度器会在提升后立即将其产出。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImmediateFuture<T> {
    outcome: FutureResult<T>,
}

impl<T> ImmediateFuture<T> {
    pub fn new(outcome: FutureResult<T>) -> Self {
        Self { outcome }
    }

    pub fn value(value: T) -> Self {
        Self { outcome: Ok(value) }
    }

    pub fn error(error: FutureError) -> Self {
        Self {
            outcome: Err(error),
        }
    }

    pub fn into_outcome(self) -> FutureResult<T> {
        self.outcome
    }
}

impl<T> PollFuture for ImmediateFuture<T> {
    type Output = T;

    fn is_ready(&mut self) -> bool {
        true
    }

    fn outcome(&self) -> Option<&FutureResult<T>> {
        Some(&self.outcome)
    }
}
