//! 就绪等待原语：整个执行核心中**唯一**允许阻塞调用线程的位置。
//!
//! # 设计动机（Why）
//! - 调度器需要在多个 Future 的描述符并集上只等待一次，而不是逐个轮询；
//! - 将 `poll(2)` 封装为可移植的小函数，上层（调度器、通道）只需提供 `BorrowedFd` 列表。
//!
//! # 契约说明（What）
//! - 读描述符关注 `POLLIN`，写描述符关注 `POLLOUT`；错误/挂断由内核一并报告；
//! - 超时以毫秒精度传给内核，超出 `u16` 毫秒范围时截断，调用方会在返回后重新轮询；
//! - `EINTR` 视为“零个就绪”，调用方直接进入下一轮轮询即可。

use std::{io, os::fd::BorrowedFd, thread, time::Duration};

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
};

/// 在读/写描述符并集上执行一次就绪等待，返回就绪描述符数量（超时为 0）。
///
/// 没有任何描述符时退化为休眠 `timeout`，零超时立即返回。
pub fn wait_for(
    read: &[BorrowedFd<'_>],
    write: &[BorrowedFd<'_>],
    timeout: Duration,
) -> io::Result<usize> {
    if read.is_empty() && write.is_empty() {
        if !timeout.is_zero() {
            thread::sleep(timeout);
        }
        return Ok(0);
    }

    let mut fds: Vec<PollFd<'_>> = Vec::with_capacity(read.len() + write.len());
    fds.extend(read.iter().map(|fd| PollFd::new(*fd, PollFlags::POLLIN)));
    fds.extend(write.iter().map(|fd| PollFd::new(*fd, PollFlags::POLLOUT)));

    match poll(&mut fds, PollTimeout::from(poll_millis(timeout))) {
        Ok(ready) => Ok(usize::try_from(ready).unwrap_or(0)),
        Err(Errno::EINTR) => Ok(0),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// 零超时的可写检查，用于判断非阻塞 `connect` 是否已经有了结论。
///
/// 返回 `true` 表示内核报告了可写、错误或挂断之一；调用方需再通过
/// `SO_ERROR` 区分“已连接”与“连接失败”。
pub fn poll_writable(fd: BorrowedFd<'_>) -> io::Result<bool> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLOUT)];
    match poll(&mut fds, PollTimeout::from(0u16)) {
        Ok(0) | Err(Errno::EINTR) => Ok(false),
        Ok(_) => {
            let concluded = PollFlags::POLLOUT | PollFlags::POLLERR | PollFlags::POLLHUP;
            Ok(fds[0]
                .revents()
                .is_some_and(|events| events.intersects(concluded)))
        }
        Err(errno) => Err(io::Error::from(errno)),
    }
}

fn poll_millis(timeout: Duration) -> u16 {
    // 亚毫秒的非零超时向上取整，避免退化为忙等。
    let millis = match timeout.as_millis() {
        0 if !timeout.is_zero() => 1,
        millis => millis,
    };
    u16::try_from(millis).unwrap_or(u16::MAX)
}
