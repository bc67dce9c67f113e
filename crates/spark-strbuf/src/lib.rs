//! `spark-strbuf` 提供可按字符串下标寻址、可直接对接文件描述符的可扩容字节缓冲。
//!
//! # 模块定位（Why）
//! - 网络服务在拼装报文、读写套接字时反复需要“一块可增长、以 `\0` 结尾、可随时交给
//!   `write(2)` 的内存”，本 crate 把这类缓冲的容量管理、下标换算与非阻塞续写收敛到一个类型中；
//! - 非阻塞描述符上的短写与 EAGAIN 通过持久写游标处理，调用方只需在可写时再次 `flush`。
//!
//! # 设计概要（How）
//! - `capacity`：按 `unit` 线性扩容的连续存储，维护终止符与容量上限；
//! - [`index`]：1 起始、支持负数的下标到字节区间的纯函数换算；
//! - `buffer`：对外的 [`StrBuf`]，组合存储、描述符与写游标；
//! - [`io`] 与 `config`：系统调用驱动边界与可从 TOML 加载的构造参数；
//! - `error`：稳定错误码与可恢复性判定。
//!
//! # 使用约束（What）
//! - 单个 [`StrBuf`] 只允许单一所有者顺序访问；可以随连接在线程间移动；
//! - 所有读写方法每次至多发起一次系统调用，不会阻塞等待描述符就绪。

mod buffer;
mod capacity;
mod config;
mod error;
pub mod index;
pub mod io;

pub use buffer::StrBuf;
pub use capacity::DEFAULT_MAX_BYTES;
pub use config::StrBufConfig;
pub use error::{Result, StrBufError, codes};
pub use io::{FdDriver, FlushProgress, IoOp, SysDriver};
