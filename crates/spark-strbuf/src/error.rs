//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为 `StrBuf` 的全部操作提供统一错误域，区分“调用方编程错误”与“可重试的资源/IO 失败”；
//! - 错误码采用 `domain.reason` 命名，便于在日志与指标中聚合。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，可直接交给 `anyhow` 等上层框架；
//! - `InvalidArgument` 与 `UseAfterFree` 属于不可通过重试恢复的错误，应立即上报；
//! - `OutOfMemory` 与 `Io` 可恢复：失败后缓冲内容保持调用前的状态。

use std::{borrow::Cow, io, os::fd::RawFd};

use thiserror::Error;

use crate::io::IoOp;

/// 稳定错误码集合。
///
/// 采用 `domain.reason` 结构，供日志、告警规则与跨语言实现引用。
pub mod codes {
    /// 参数非法：单元尺寸、描述符或偏移量不满足前置条件。
    pub const INVALID_ARGUMENT: &str = "strbuf.invalid_argument";
    /// 扩容请求超过上限或分配器拒绝。
    pub const OUT_OF_MEMORY: &str = "strbuf.out_of_memory";
    /// 底层读写系统调用失败。
    pub const IO: &str = "strbuf.io";
    /// 在已释放的缓冲上执行操作。
    pub const USE_AFTER_FREE: &str = "strbuf.use_after_free";
}

/// `StrBuf` 错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把 C 风格的 `errno` 返回值收敛为可匹配的枚举，让调用方用 `?` 传播，
///   同时保留 `errno` 与 would-block 标志，满足非阻塞事件循环的重试判断。
/// - **契约 (What)**：
///   - 任一变体返回时，缓冲可见内容与调用前一致（全有或全无）；
///   - [`StrBufError::is_recoverable`] 区分可重试与编程错误；
///   - [`StrBufError::code`] 返回稳定错误码。
/// - **设计权衡 (Trade-offs)**：`InvalidArgument` 使用 `Cow<'static, str>` 保存原因，
///   常量场景零分配，需要插值时才分配字符串。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StrBufError {
    /// 参数不满足接口前置条件。
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: Cow<'static, str>,
    },

    /// 容量请求被拒绝，既包括超出单缓冲上限，也包括分配器返回失败。
    ///
    /// - `requested`：本次请求的总字节数（溢出时饱和为 `usize::MAX`）；
    /// - `limit`：该缓冲允许的最大字节数。
    #[error("resource exhausted: requested {requested} bytes, limit {limit} bytes")]
    OutOfMemory { requested: usize, limit: usize },

    /// 一次读写系统调用失败。
    ///
    /// `would_block` 仅在错误为 EAGAIN/EWOULDBLOCK 时为真，调用方应等待描述符就绪后重试。
    #[error("{op} on fd {fd} failed: os error {errno}")]
    Io {
        op: IoOp,
        fd: RawFd,
        errno: i32,
        would_block: bool,
    },

    /// 缓冲已经释放。
    #[error("attempted to access already freed memory")]
    UseAfterFree,
}

impl StrBufError {
    pub(crate) fn invalid_argument(
        argument: &'static str,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }

    pub(crate) fn out_of_memory(requested: usize, limit: usize) -> Self {
        Self::OutOfMemory { requested, limit }
    }

    /// 将 `std::io::Error` 映射为 `Io` 变体。
    ///
    /// 若错误不携带原始 `errno`（例如由 `ErrorKind` 构造），则按语义回填：
    /// would-block 映射为 `EAGAIN`，其余映射为 `EIO`。
    pub fn from_io(op: IoOp, fd: RawFd, err: &io::Error) -> Self {
        let would_block = err.kind() == io::ErrorKind::WouldBlock;
        let errno = err.raw_os_error().unwrap_or(if would_block {
            libc::EAGAIN
        } else {
            libc::EIO
        });
        Self::Io {
            op,
            fd,
            errno,
            would_block,
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            Self::OutOfMemory { .. } => codes::OUT_OF_MEMORY,
            Self::Io { .. } => codes::IO,
            Self::UseAfterFree => codes::USE_AFTER_FREE,
        }
    }

    /// 是否可以通过调整参数或等待就绪后重试。
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::Io { .. })
    }

    /// IO 失败是否属于“稍后重试”。非 IO 错误恒为 `false`。
    pub fn is_would_block(&self) -> bool {
        matches!(
            self,
            Self::Io {
                would_block: true,
                ..
            }
        )
    }

    /// IO 失败携带的 `errno`；非 IO 错误返回 `None`。
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Io { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

/// 本 crate 的结果别名。
pub type Result<T, E = StrBufError> = core::result::Result<T, E>;
