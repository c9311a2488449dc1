//! FutureIterator 的调度性质验证。
//!
//! # 教案式说明
//! - **Why**：并发上限与完备性是批处理调用方唯一依赖的两条保证，任何回归都会导致
//!   描述符泄露或结果丢失；
//! - **How**：属性测试随机生成“每个 Future 需要多少次轮询”与并发上限，探针 Future 在
//!   `start()`/终态时维护共享计数；真实套接字用例验证就绪等待确实被描述符唤醒；
//! - **What**：断言峰值活跃数不超过上限、每个键恰好产出一次、按完成顺序产出。

use std::{
    cell::Cell,
    collections::BTreeSet,
    io::{Read, Write},
    os::{
        fd::{AsFd, BorrowedFd},
        unix::net::UnixStream,
    },
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use proptest::prelude::*;
use spark_future::{FutureError, FutureIterator, FutureResult, FutureSlot, PollFuture};

struct Probe {
    polls: u32,
    live: Rc<Cell<usize>>,
    peak: Rc<Cell<usize>>,
    slot: FutureSlot<()>,
}

impl PollFuture for Probe {
    type Output = ();

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
        self.slot.fill(Ok(()));
        true
    }

    fn outcome(&self) -> Option<&FutureResult<()>> {
        self.slot.get()
    }
}

proptest! {
    #[test]
    fn never_exceeds_limit_and_yields_everything_once(
        polls in prop::collection::vec(0u32..6, 1..24),
        limit in 1usize..6,
    ) {
        let live = Rc::new(Cell::new(0));
        let peak = Rc::new(Cell::new(0));
        let futures = polls.iter().map(|&polls| Probe {
            polls,
            live: Rc::clone(&live),
            peak: Rc::clone(&peak),
            slot: FutureSlot::new(),
        });

        let mut iterator = FutureIterator::indexed(futures).limit(limit);
        let mut seen = BTreeSet::new();
        while let Some((key, future)) = iterator.next() {
            prop_assert!(iterator.active_len() <= limit);
            prop_assert!(future.outcome().is_some());
            prop_assert!(seen.insert(key), "key {} yielded twice", key);
        }

        prop_assert_eq!(seen.len(), polls.len());
        prop_assert!(peak.get() <= limit);
        prop_assert_eq!(peak.get(), limit.min(polls.len()));
        prop_assert_eq!(live.get(), 0);
    }
}

/// 等待对端写入一个字节的 Future，只报告读描述符。
struct ByteFuture {
    stream: UnixStream,
    slot: FutureSlot<u8>,
}

impl ByteFuture {
    fn new(stream: UnixStream) -> Self {
        stream.set_nonblocking(true).unwrap();
        Self {
            stream,
            slot: FutureSlot::new(),
        }
    }
}

impl PollFuture for ByteFuture {
    type Output = u8;

    fn is_ready(&mut self) -> bool {
        if self.slot.is_filled() {
            return true;
        }
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Ok(1) => {
                self.slot.fill(Ok(byte[0]));
                true
            }
            Ok(_) => {
                self.slot
                    .fill(Err(FutureError::failed("test.eof", "peer closed")));
                true
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => false,
            Err(err) => {
                self.slot.fill(Err(FutureError::transport("read", &err)));
                true
            }
        }
    }

    fn outcome(&self) -> Option<&FutureResult<u8>> {
        self.slot.get()
    }

    fn read_fds(&self) -> Vec<BorrowedFd<'_>> {
        if self.slot.is_filled() {
            Vec::new()
        } else {
            vec![self.stream.as_fd()]
        }
    }

    fn default_wait(&self) -> Duration {
        Duration::from_secs(5)
    }
}

#[test]
fn readiness_wait_wakes_on_socket_activity_in_completion_order() {
    let delays = [60u64, 10, 35];
    let mut futures = Vec::new();
    let mut writers = Vec::new();
    for (index, delay) in delays.iter().enumerate() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        futures.push(ByteFuture::new(local));
        let delay = *delay;
        writers.push(thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay));
            remote.write_all(&[index as u8]).unwrap();
            // 保持连接直到测试读取完毕。
            thread::sleep(Duration::from_millis(200));
        }));
    }

    let started = Instant::now();
    let results = FutureIterator::indexed(futures).resolve_all();
    assert!(started.elapsed() < Duration::from_secs(2));

    let order: Vec<_> = results.iter().map(|(key, _)| *key).collect();
    assert_eq!(order, vec![1, 2, 0]);
    for (key, outcome) in results {
        assert_eq!(outcome, Ok(key as u8));
    }
    for writer in writers {
        writer.join().unwrap();
    }
}

#[test]
fn dropping_the_iterator_releases_descriptors_without_resolving() {
    let (local, mut remote) = UnixStream::pair().unwrap();
    let iterator = FutureIterator::indexed(vec![ByteFuture::new(local)]);
    drop(iterator);

    // 本端套接字已随 Future 一起释放，对端读到 EOF。
    remote.set_nonblocking(true).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(remote.read(&mut buf).unwrap(), 0);
}
