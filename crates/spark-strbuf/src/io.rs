//! 描述符读写的系统调用边界。
//!
//! # 设计动机（Why）
//! - `StrBuf` 的读写语义是“每次调用恰好一次系统调用”，等待就绪的职责交给调用方的事件循环；
//! - 将 `read`/`write`/`close` 收敛到 [`FdDriver`] trait，缓冲本身不直接触碰 OS，
//!   测试可注入脚本化驱动模拟短写、EAGAIN 等场景。
//!
//! # 契约说明（What）
//! - 驱动方法不得内部重试或阻塞等待；返回的字节数不超过传入切片长度；
//! - 失败时返回携带 `errno` 的 `io::Error`，由 [`StrBufError::from_io`](crate::StrBufError::from_io) 映射。

use std::{fmt, io, os::fd::RawFd};

/// 触发系统调用的操作种类，用于错误上下文与日志。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoOp {
    Read,
    Write,
    Flush,
    Close,
}

impl IoOp {
    /// 返回稳定的小写名称。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Flush => "flush",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 描述符读写驱动。
///
/// # 教案式说明
/// - **意图 (Why)**：把操作系统这一外部协作者显式化为 trait 对象注入，缓冲只依赖契约。
/// - **契约 (What)**：
///   - `read` 至多写入 `dst.len()` 字节，返回 0 表示流结束；
///   - `write` 至多写出 `src.len()` 字节，短写合法；
///   - `close` 仅在缓冲拥有描述符所有权时被调用，且每个描述符至多一次。
/// - **风险 (Trade-offs)**：trait 要求 `Send`，缓冲可随连接在线程间移动，但不支持共享可变访问。
pub trait FdDriver: fmt::Debug + Send {
    /// 单次读取。
    fn read(&mut self, fd: RawFd, dst: &mut [u8]) -> io::Result<usize>;

    /// 单次写出。
    fn write(&mut self, fd: RawFd, src: &[u8]) -> io::Result<usize>;

    /// 关闭描述符。
    fn close(&mut self, fd: RawFd) -> io::Result<()>;
}

/// 基于 `libc` 的默认驱动，直接发起 `read(2)`/`write(2)`/`close(2)`。
#[derive(Clone, Copy, Debug, Default)]
pub struct SysDriver;

impl FdDriver for SysDriver {
    fn read(&mut self, fd: RawFd, dst: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `dst` 是独占的可写切片，内核最多写入 `dst.len()` 字节。
        let n = unsafe { libc::read(fd, dst.as_mut_ptr().cast::<libc::c_void>(), dst.len()) };
        usize::try_from(n).map_err(|_| io::Error::last_os_error())
    }

    fn write(&mut self, fd: RawFd, src: &[u8]) -> io::Result<usize> {
        // SAFETY: `src` 在调用期间保持有效，内核只读取 `src.len()` 字节。
        let n = unsafe { libc::write(fd, src.as_ptr().cast::<libc::c_void>(), src.len()) };
        usize::try_from(n).map_err(|_| io::Error::last_os_error())
    }

    fn close(&mut self, fd: RawFd) -> io::Result<()> {
        // SAFETY: 只有持有所有权（close_on_release）的缓冲才会调用，且调用后立即遗忘该描述符。
        if unsafe { libc::close(fd) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// 一次 `flush` 之后的写游标进度。
///
/// `cursor` 是本次调用后已写出的字节偏移，`used` 是调用时的逻辑长度。
/// `cursor < used` 表示仍有待写数据，调用方应在描述符可写后再次 `flush`。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushProgress {
    pub cursor: usize,
    pub used: usize,
}

impl FlushProgress {
    /// 内容是否已经全部写出（此时缓冲已被清空）。
    pub fn is_complete(&self) -> bool {
        self.cursor == self.used
    }

    /// 尚未写出的字节数。
    pub fn pending(&self) -> usize {
        self.used - self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        // SAFETY: `fds` 可容纳两个描述符。
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        (fds[0], fds[1])
    }

    #[test]
    fn sys_driver_round_trips_through_a_pipe() {
        let (rx, tx) = pipe();
        let mut driver = SysDriver;
        assert_eq!(driver.write(tx, b"spark").unwrap(), 5);
        let mut dst = [0u8; 8];
        assert_eq!(driver.read(rx, &mut dst).unwrap(), 5);
        assert_eq!(&dst[..5], b"spark");
        driver.close(tx).unwrap();
        assert_eq!(driver.read(rx, &mut dst).unwrap(), 0, "写端关闭后应读到 EOF");
        driver.close(rx).unwrap();
    }

    #[test]
    fn sys_driver_reports_bad_descriptor() {
        let mut driver = SysDriver;
        let err = driver.write(-1, b"x").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[test]
    fn flush_progress_helpers() {
        let partial = FlushProgress { cursor: 2, used: 4 };
        assert!(!partial.is_complete());
        assert_eq!(partial.pending(), 2);
        assert!(FlushProgress { cursor: 4, used: 4 }.is_complete());
        assert_eq!(IoOp::Flush.to_string(), "flush");
    }
}
