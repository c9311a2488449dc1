use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use crate::{
    config::SchedulerConfig,
    error::FutureResult,
    future::{DEFAULT_WAIT, PollFuture},
    readiness,
};

/// 调度器单步产出的事件。
#[derive(Debug)]
pub enum IteratorEvent<K, F> {
    /// 某个 Future 已进入终态（成功或失败），连同提交时的键一并交还调用方。
    Ready(K, F),
    /// 距离上一次事件已超过 `update_interval` 且仍无 Future 完成。
    Tick,
}

#[derive(Debug)]
struct Entry<K, F> {
    seq: u64,
    key: K,
    future: F,
}

/// 有界并发的 Future 调度器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 让调用方以“构造 N 个 Future → 设定并发上限 → 迭代结果”的方式批量扇出请求，
///   同时把同时打开的描述符数量限制在 `limit` 以内；
/// - 所有 Future 共用**一次**就绪等待，而不是各自阻塞。
///
/// ## 逻辑 (How)
/// 1. 活跃数不足 `limit` 且仍有排队项时，按提交顺序提升并调用 `start()`；
/// 2. 轮询全部活跃 Future，已就绪者按提交顺序移入待产出队列并立即产出；
/// 3. 否则合并所有活跃 Future 的读/写描述符执行一次带超时的就绪等待，醒来后回到第 1 步；
/// 4. 排队与活跃集合都为空时迭代结束。
///
/// ## 契约 (What)
/// - **并发上限**：任意时刻活跃（已启动且未终态）的 Future 不超过 `limit`；
/// - **完备性**：每个提交的 Future 恰好被启动一次、产出一次（除非调用方通过
///   [`remove`](Self::remove) 提前取消）；
/// - **顺序**：按完成顺序产出，而非提交顺序；同一轮中同时就绪者以提交顺序优先；
/// - **失败语义**：失败的 Future 与成功者一样被产出，调度器从不短路。
///
/// ## 注意事项 (Trade-offs)
/// - 不报告任何描述符的活跃 Future 会使等待超时降为零，即立即重轮询；
///   纯 CPU 型 Future 因此会忙轮询，这是“可立即重轮询”语义的直接代价；
/// - 就绪等待失败（非 `EINTR`）只记录告警，不会中止整批任务。
#[derive(Debug)]
pub struct FutureIterator<K, F> {
    queued: VecDeque<Entry<K, F>>,
    active: Vec<Entry<K, F>>,
    resolved: VecDeque<Entry<K, F>>,
    limit: Option<usize>,
    wait_interval: Duration,
    update_interval: Option<Duration>,
    last_event: Instant,
    next_seq: u64,
}

impl<K, F> FutureIterator<K, F>
where
    F: PollFuture,
{
    /// 以 `(键, Future)` 序列构造调度器；缺省不限并发。
    pub fn new<I>(futures: I) -> Self
    where
        I: IntoIterator<Item = (K, F)>,
    {
        let mut iterator = Self {
            queued: VecDeque::new(),
            active: Vec::new(),
            resolved: VecDeque::new(),
            limit: None,
            wait_interval: DEFAULT_WAIT,
            update_interval: None,
            last_event: Instant::now(),
            next_seq: 0,
        };
        for (key, future) in futures {
            iterator.add(key, future);
        }
        iterator
    }

    /// 设置最大并发；`0` 按 `1` 处理。
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }

    /// 设置单次就绪等待的上限。
    pub fn wait_interval(mut self, interval: Duration) -> Self {
        self.wait_interval = interval;
        self
    }

    /// 长时间无完成时产出 [`IteratorEvent::Tick`] 的间隔。
    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval);
        self
    }

    /// 一次性应用 [`SchedulerConfig`]。
    pub fn with_config(mut self, config: &SchedulerConfig) -> Self {
        if let Some(limit) = config.limit {
            self = self.limit(limit);
        }
        self.wait_interval = config.wait_interval();
        self.update_interval = config.update_interval();
        self
    }

    /// 追加一个 Future；迭代进行中也可调用。
    pub fn add(&mut self, key: K, future: F) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queued.push_back(Entry { seq, key, future });
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// 所有 Future 是否都已被产出。
    pub fn is_finished(&self) -> bool {
        self.queued.is_empty() && self.active.is_empty() && self.resolved.is_empty()
    }

    /// 驱动调度器直到下一个事件；全部产出后返回 `None`。
    pub fn next_event(&mut self) -> Option<IteratorEvent<K, F>> {
        loop {
            if let Some(entry) = self.resolved.pop_front() {
                self.last_event = Instant::now();
                trace!(seq = entry.seq, "yielding resolved future");
                return Some(IteratorEvent::Ready(entry.key, entry.future));
            }

            self.promote();
            if self.active.is_empty() {
                return None;
            }
            if self.collect_ready() {
                continue;
            }

            if let Some(interval) = self.update_interval
                && self.last_event.elapsed() >= interval
            {
                self.last_event = Instant::now();
                return Some(IteratorEvent::Tick);
            }

            self.wait();
        }
    }

    /// 逐个产出并收集结果副本，顺序为完成顺序。
    pub fn resolve_all(self) -> Vec<(K, FutureResult<F::Output>)>
    where
        F::Output: Clone,
    {
        self.map(|(key, mut future)| {
            let outcome = future.resolve();
            (key, outcome)
        })
        .collect()
    }

    fn promote(&mut self) {
        let limit = self.limit.unwrap_or(usize::MAX);
        while self.active.len() < limit {
            let Some(mut entry) = self.queued.pop_front() else {
                break;
            };
            entry.future.start();
            debug!(
                seq = entry.seq,
                active = self.active.len() + 1,
                queued = self.queued.len(),
                "promoted future"
            );
            self.active.push(entry);
        }
    }

    /// 轮询每个活跃 Future 一次，把就绪者按提交顺序移入待产出队列。
    fn collect_ready(&mut self) -> bool {
        let mut index = 0;
        while index < self.active.len() {
            if self.active[index].future.is_ready() {
                let entry = self.active.remove(index);
                debug!(seq = entry.seq, state = ?entry.future.state(), "future resolved");
                self.resolved.push_back(entry);
            } else {
                index += 1;
            }
        }
        !self.resolved.is_empty()
    }

    fn wait(&mut self) {
        let mut timeout = self.wait_interval;
        if let Some(interval) = self.update_interval {
            timeout = timeout.min(interval.saturating_sub(self.last_event.elapsed()));
        }

        let mut read = Vec::new();
        let mut write = Vec::new();
        for entry in &self.active {
            let entry_read = entry.future.read_fds();
            let entry_write = entry.future.write_fds();
            if entry_read.is_empty() && entry_write.is_empty() {
                timeout = Duration::ZERO;
            }
            timeout = timeout.min(entry.future.default_wait());
            read.extend(entry_read);
            write.extend(entry_write);
        }

        trace!(
            read = read.len(),
            write = write.len(),
            timeout_ms = timeout.as_millis() as u64,
            "waiting for readiness"
        );
        if let Err(error) = readiness::wait_for(&read, &write, timeout) {
            warn!(%error, "readiness wait failed; re-polling active futures");
        }
    }
}

impl<K, F> FutureIterator<K, F>
where
    K: PartialEq,
    F: PollFuture,
{
    /// 取消一个尚未产出的 Future，不对其求值；返回的 Future 被丢弃时释放其描述符。
    pub fn remove(&mut self, key: &K) -> Option<F> {
        let removed = take_where(&mut self.queued, key)
            .or_else(|| {
                let index = self.active.iter().position(|entry| entry.key == *key)?;
                Some(self.active.remove(index))
            })
            .or_else(|| take_where(&mut self.resolved, key));
        removed.map(|entry| {
            debug!(seq = entry.seq, "future removed before being yielded");
            entry.future
        })
    }
}

fn take_where<K: PartialEq, F>(
    entries: &mut VecDeque<Entry<K, F>>,
    key: &K,
) -> Option<Entry<K, F>> {
    let index = entries.iter().position(|entry| entry.key == *key)?;
    entries.remove(index)
}

impl<F> FutureIterator<usize, F>
where
    F: PollFuture,
{
    /// 以提交下标作为键构造调度器。
    pub fn indexed<I>(futures: I) -> Self
    where
        I: IntoIterator<Item = F>,
    {
        Self::new(futures.into_iter().enumerate())
    }
}

impl<K, F> Iterator for FutureIterator<K, F>
where
    F: PollFuture,
{
    type Item = (K, F);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_event()? {
                IteratorEvent::Ready(key, future) => return Some((key, future)),
                IteratorEvent::Tick => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FutureError,
        future::{FutureSlot, FutureState},
        immediate::ImmediateFuture,
    };
    use std::{cell::Cell, rc::Rc};
    use tracing_test::traced_test;

    /// 在第 `polls` 次轮询时完成，并记录同时活跃的数量。
    struct Probe {
        polls: u32,
        fail: bool,
        live: Rc<Cell<usize>>,
        peak: Rc<Cell<usize>>,
        slot: FutureSlot<u32>,
    }

    impl Probe {
        fn new(polls: u32, live: &Rc<Cell<usize>>, peak: &Rc<Cell<usize>>) -> Self {
            Self {
                polls,
                fail: false,
                live: Rc::clone(live),
                peak: Rc::clone(peak),
                slot: FutureSlot::new(),
            }
        }
    }

    impl PollFuture for Probe {
        type Output = u32;

        fn start(&mut self) {
            self.live.set(self.live.get() + 1);
            self.peak.set(self.peak.get().max(self.live.get()));
        }

        fn is_ready(&mut self) -> bool {
            if self.slot.is_filled() {
                return true;
            }
            if self.polls > 0 {
                self.polls -= 1;
                return false;
            }
            self.live.set(self.live.get() - 1);
            if self.fail {
                self.slot.fill(Err(FutureError::failed("test.failure", "failed")));
            } else {
                self.slot.fill(Ok(0));
            }
            true
        }

        fn outcome(&self) -> Option<&FutureResult<u32>> {
            self.slot.get()
        }
    }

    fn counters() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)))
    }

    #[test]
    fn yields_in_completion_order() {
        let (live, peak) = counters();
        let futures = vec![
            ("slow", Probe::new(5, &live, &peak)),
            ("fast", Probe::new(0, &live, &peak)),
            ("medium", Probe::new(2, &live, &peak)),
        ];
        let keys: Vec<_> = FutureIterator::new(futures).map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["fast", "medium", "slow"]);
        assert_eq!(peak.get(), 3);
    }

    #[test]
    fn simultaneous_completions_prefer_earlier_submissions() {
        let (live, peak) = counters();
        let futures = (0..4).map(|_| Probe::new(1, &live, &peak));
        let keys: Vec<_> = FutureIterator::indexed(futures).map(|(key, _)| key).collect();
        assert_eq!(keys, vec![0, 1, 2, 3]);
    }

    #[test]
    fn limit_bounds_active_futures() {
        let (live, peak) = counters();
        let futures = (0..10u32).map(|i| Probe::new(i % 3, &live, &peak));
        let mut iterator = FutureIterator::indexed(futures).limit(3);
        let mut seen = 0;
        while let Some((_, future)) = iterator.next() {
            assert!(iterator.active_len() <= 3);
            assert_eq!(future.state(), FutureState::Resolved);
            seen += 1;
        }
        assert_eq!(seen, 10);
        assert_eq!(peak.get(), 3);
        assert!(iterator.is_finished());
    }

    #[test]
    fn failures_are_yielded_not_short_circuited() {
        let (live, peak) = counters();
        let mut broken = Probe::new(0, &live, &peak);
        broken.fail = true;
        let futures = vec![broken, Probe::new(1, &live, &peak)];
        let results = FutureIterator::indexed(futures).resolve_all();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
        assert_eq!(results[0].1.as_ref().unwrap_err().code(), "test.failure");
        assert_eq!(results[1], (1, Ok(0)));
    }

    #[test]
    fn futures_can_be_added_while_iterating() {
        let mut iterator = FutureIterator::new(vec![("a", ImmediateFuture::value(1))]);
        let mut keys = Vec::new();
        while let Some((key, _)) = iterator.next() {
            if key == "a" {
                iterator.add("b", ImmediateFuture::value(2));
            }
            keys.push(key);
        }
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn removed_futures_are_never_yielded() {
        let (live, peak) = counters();
        let futures = vec![
            ("keep", Probe::new(1, &live, &peak)),
            ("drop", Probe::new(1, &live, &peak)),
            ("queued", Probe::new(1, &live, &peak)),
        ];
        let mut iterator = FutureIterator::new(futures).limit(2);
        assert!(iterator.remove(&"queued").is_some());
        assert!(iterator.remove(&"missing").is_none());

        let mut keys = Vec::new();
        while let Some(event) = iterator.next_event() {
            if let IteratorEvent::Ready(key, _) = event {
                if key == "keep" {
                    assert!(iterator.remove(&"drop").is_some());
                }
                keys.push(key);
            }
        }
        assert_eq!(keys, vec!["keep"]);
    }

    #[test]
    fn update_interval_emits_ticks_while_idle() {
        struct Never;
        impl PollFuture for Never {
            type Output = ();
            fn is_ready(&mut self) -> bool {
                false
            }
            fn outcome(&self) -> Option<&FutureResult<()>> {
                None
            }
        }

        let mut iterator = FutureIterator::new(vec![((), Never)])
            .update_interval(Duration::from_millis(10));
        assert!(matches!(iterator.next_event(), Some(IteratorEvent::Tick)));
        assert!(matches!(iterator.next_event(), Some(IteratorEvent::Tick)));
        assert!(iterator.remove(&()).is_some());
        assert!(iterator.next_event().is_none());
    }

    #[test]
    fn config_applies_limit_and_intervals() {
        let config = SchedulerConfig::from_toml_str(
            "limit = 2\nwait_interval_ms = 50\nupdate_interval_ms = 500",
        )
        .unwrap();
        let iterator: FutureIterator<usize, ImmediateFuture<()>> =
            FutureIterator::indexed(Vec::new()).with_config(&config);
        assert_eq!(iterator.limit, Some(2));
        assert_eq!(iterator.wait_interval, Duration::from_millis(50));
        assert_eq!(iterator.update_interval, Some(Duration::from_millis(500)));
    }

    #[test]
    #[traced_test]
    fn promotions_are_logged() {
        let results = FutureIterator::indexed(vec![ImmediateFuture::value(7)]).resolve_all();
        assert_eq!(results, vec![(0, Ok(7))]);
        assert!(logs_contain("promoted future"));
        assert!(logs_contain("future resolved"));
    }
}
