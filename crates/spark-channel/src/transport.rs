use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    os::{
        fd::{AsFd, AsRawFd, BorrowedFd},
        unix::net::UnixStream,
    },
};

use nix::fcntl::{FcntlArg, OFlag, fcntl};

/// 通道底层的双工字节传输。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 通道只关心“能读、能写、能报告描述符”，不关心底层是套接字还是一对管道；
/// - 读写描述符分开报告，使工作进程的 stdout/stdin 这类“半部各自独立”的链路也能被
///   同一次就绪等待覆盖。
///
/// ## 契约 (What)
/// - `set_nonblocking`：通道构造时调用一次，之后所有读写都不得阻塞；
/// - `read_fd`/`write_fd`：返回 `None` 表示该方向已经关闭；
/// - `shutdown_write`：半关闭写方向，对端随后读到 EOF。
pub trait Transport: Read + Write {
    fn read_fd(&self) -> Option<BorrowedFd<'_>>;
    fn write_fd(&self) -> Option<BorrowedFd<'_>>;
    fn set_nonblocking(&self) -> io::Result<()>;
    fn shutdown_write(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn read_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }

    fn write_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        TcpStream::set_nonblocking(self, true)
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

impl Transport for UnixStream {
    fn read_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }

    fn write_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.as_fd())
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        UnixStream::set_nonblocking(self, true)
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// 由独立读半部与写半部拼成的传输，例如工作进程的 stdout 与 stdin。
#[derive(Debug)]
pub struct Duplex<R, W> {
    reader: R,
    writer: Option<W>,
}

impl<R, W> Duplex<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer: Some(writer),
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn writer(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

impl<R: Read, W> Read for Duplex<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<R, W: Write> Write for Duplex<R, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::from(io::ErrorKind::BrokenPipe)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<R, W> Transport for Duplex<R, W>
where
    R: Read + AsFd,
    W: Write + AsFd,
{
    fn read_fd(&self) -> Option<BorrowedFd<'_>> {
        Some(self.reader.as_fd())
    }

    fn write_fd(&self) -> Option<BorrowedFd<'_>> {
        self.writer.as_ref().map(AsFd::as_fd)
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        set_fd_nonblocking(self.reader.as_fd())?;
        if let Some(writer) = &self.writer {
            set_fd_nonblocking(writer.as_fd())?;
        }
        Ok(())
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        // 管道没有半关闭，丢弃写端即可让对端读到 EOF。
        self.writer = None;
        Ok(())
    }
}

/// 为任意描述符打开 `O_NONBLOCK`。
pub fn set_fd_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = fcntl(raw, FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(raw, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    #[test]
    fn pipes_switch_to_nonblocking_reads() {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let stdin = child.stdin.take().unwrap();
        let mut duplex = Duplex::new(stdout, stdin);
        duplex.set_nonblocking().unwrap();

        let mut buf = [0u8; 8];
        let err = duplex.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        assert!(duplex.write_fd().is_some());
        duplex.shutdown_write().unwrap();
        assert!(duplex.write_fd().is_none());
        assert_eq!(
            duplex.write(b"late").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
        child.wait().unwrap();
    }
}
