use std::{
    fmt,
    os::fd::{IntoRawFd, OwnedFd, RawFd},
};

use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::{
    capacity::{DEFAULT_MAX_BYTES, Storage},
    config::StrBufConfig,
    error::{Result, StrBufError},
    index,
    io::{FdDriver, FlushProgress, IoOp, SysDriver},
};

/// 缓冲生命周期的显式标签。
///
/// 释放后存储被整体丢弃，任何访问都必须先匹配出 `Live` 分支，
/// 从类型上杜绝“释放后继续读写”。
#[derive(Debug)]
enum BufState {
    Live(Storage),
    Released,
}

/// 以 `\0` 结尾、可按字符串下标寻址、可直接对接文件描述符的字节缓冲。
///
/// # 设计动机（Why）
/// - 面向“按连接复用一块缓冲拼装网络报文”的场景：追加密集、体积适中，
///   因此采用单块连续分配，并让调用方通过 `unit` 控制扩容粒度；
/// - 读写描述符时每次只发起一次系统调用，把等待就绪的职责留给调用方的事件循环；
/// - `flush` 维护持久写游标，短写或 EAGAIN 后可从原位置续写。
///
/// # 架构关系（How）
/// - 容量与终止符由内部 `Storage` 维护；
/// - 下标换算委托给 [`index`] 模块中的纯函数；
/// - 系统调用经由注入的 [`FdDriver`]，默认是基于 `libc` 的 [`SysDriver`]。
///
/// # 契约说明（What）
/// - 每次成功的修改后，`as_bytes().len() == len()`，且 `as_bytes_with_nul()` 的末字节为 0；
/// - 失败的修改不改变可见内容；
/// - 释放（显式 [`StrBuf::release`] 或 `Drop`）后，除 `release`/`is_released` 外的操作均返回
///   [`StrBufError::UseAfterFree`]；
/// - 非线程安全：同一实例只允许单一所有者顺序访问。
///
/// # 风险与取舍（Trade-offs）
/// - 扩容是线性的：`unit = 1` 且频繁小追加时会退化为逐次重分配，调用方需按负载选择 `unit`；
/// - `insert` 越过末尾时静默忽略，`flush` 仅在完全写出后清空内容，二者均为既定语义。
pub struct StrBuf {
    state: BufState,
    descriptor: Option<RawFd>,
    close_on_release: bool,
    cursor: usize,
    read_chunk: Option<usize>,
    driver: Box<dyn FdDriver>,
}

impl StrBuf {
    /// 以给定粒度分配缓冲，其余参数取默认值。`unit < 1` 返回 `InvalidArgument`。
    pub fn allocate(unit: usize) -> Result<Self> {
        Self::with_config(&StrBufConfig::with_unit(unit))
    }

    /// 按配置分配缓冲。
    pub fn with_config(config: &StrBufConfig) -> Result<Self> {
        config.validate()?;
        let storage = Storage::new(config.unit, config.effective_max_bytes())?;
        debug!(
            unit = config.unit,
            max_units = storage.max_units(),
            fd = ?config.descriptor,
            "strbuf allocated"
        );
        Ok(Self {
            state: BufState::Live(storage),
            descriptor: config.descriptor,
            close_on_release: config.close_on_release,
            cursor: 0,
            read_chunk: config.read_chunk,
            driver: Box::new(SysDriver),
        })
    }

    /// 替换系统调用驱动。
    pub fn with_driver(mut self, driver: impl FdDriver + 'static) -> Self {
        self.driver = Box::new(driver);
        self
    }

    fn storage(&self) -> Result<&Storage> {
        match &self.state {
            BufState::Live(storage) => Ok(storage),
            BufState::Released => Err(StrBufError::UseAfterFree),
        }
    }

    fn storage_mut(&mut self) -> Result<&mut Storage> {
        match &mut self.state {
            BufState::Live(storage) => Ok(storage),
            BufState::Released => Err(StrBufError::UseAfterFree),
        }
    }

    fn require_descriptor(&self) -> Result<RawFd> {
        self.descriptor.ok_or_else(|| {
            StrBufError::invalid_argument("descriptor", "no descriptor attached")
        })
    }

    // ---- 只读访问 ----

    /// 存储首地址与逻辑长度，仅用于零拷贝互操作。
    ///
    /// 指针在下一次修改或释放前有效；地址处的内容以 `\0` 结尾。
    pub fn raw_parts(&self) -> Result<(*const u8, usize)> {
        let storage = self.storage()?;
        Ok((storage.mem().as_ptr(), storage.used()))
    }

    /// 逐字节访问：返回 `[head, tail]` 覆盖的字节，越界时为 `None`。
    pub fn byte(&self, head: Option<i64>, tail: Option<i64>) -> Result<Option<&[u8]>> {
        let storage = self.storage()?;
        Ok(index::bytes(storage.used(), head, tail).map(|range| &storage.content()[range]))
    }

    /// 已分配的总字节数（含终止符预留）。
    pub fn total(&self) -> Result<usize> {
        Ok(self.storage()?.total())
    }

    pub fn unit(&self) -> Result<usize> {
        Ok(self.storage()?.unit())
    }

    /// 逻辑长度。
    pub fn len(&self) -> Result<usize> {
        Ok(self.storage()?.used())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        Ok(self.storage()?.content())
    }

    /// 逻辑内容加上末尾的 `\0`。
    pub fn as_bytes_with_nul(&self) -> Result<&[u8]> {
        Ok(self.storage()?.content_with_nul())
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(self.as_bytes()?.to_vec())
    }

    /// 复制当前内容为 [`Bytes`]，便于交给传输层持有。
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.as_bytes()?))
    }

    /// 与给定字节逐一比较。
    pub fn equals(&self, other: &[u8]) -> Result<bool> {
        Ok(self.as_bytes()? == other)
    }

    /// 闭区间子串，见 [`index::sub`]。
    pub fn sub(&self, head: i64, tail: Option<i64>) -> Result<&[u8]> {
        let storage = self.storage()?;
        Ok(index::sub(storage.used(), head, tail).map_or(&[][..], |range| &storage.content()[range]))
    }

    /// 定长子串，见 [`index::substr`]。
    pub fn substr(&self, head: i64, len: Option<i64>) -> Result<&[u8]> {
        let storage = self.storage()?;
        Ok(index::substr(storage.used(), head, len)
            .map_or(&[][..], |range| &storage.content()[range]))
    }

    // ---- 派生视图：不修改缓冲 ----

    /// ASCII 小写字母转大写，其余字节原样保留。
    pub fn to_upper(&self) -> Result<Vec<u8>> {
        self.map_ascii(u8::to_ascii_uppercase)
    }

    /// ASCII 大写字母转小写，其余字节原样保留。
    pub fn to_lower(&self) -> Result<Vec<u8>> {
        self.map_ascii(u8::to_ascii_lowercase)
    }

    fn map_ascii(&self, map: fn(&u8) -> u8) -> Result<Vec<u8>> {
        let content = self.as_bytes()?;
        let mut out = Vec::new();
        out.try_reserve_exact(content.len())
            .map_err(|_| StrBufError::out_of_memory(content.len(), DEFAULT_MAX_BYTES))?;
        out.extend(content.iter().map(map));
        Ok(out)
    }

    /// 小写十六进制编码。
    pub fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(self.as_bytes()?))
    }

    /// 标准字母表、带填充的 Base64。
    pub fn to_base64(&self) -> Result<String> {
        Ok(STANDARD.encode(self.as_bytes()?))
    }

    /// URL 安全字母表、无填充的 Base64。
    pub fn to_base64_url(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.as_bytes()?))
    }

    // ---- 修改 ----

    /// 整体替换内容，并把写游标复位到 0。空输入等价于清空。
    pub fn set(&mut self, src: &[u8]) -> Result<()> {
        let storage = self.storage_mut()?;
        if !src.is_empty() {
            storage.ensure(0, src.len() + 1)?;
            storage.mem_mut()[..src.len()].copy_from_slice(src);
        }
        storage.term(src.len());
        self.cursor = 0;
        Ok(())
    }

    /// 在末尾追加。不影响写游标，可在两次 `flush` 之间调用。
    pub fn append(&mut self, src: &[u8]) -> Result<()> {
        self.append_all(&[src])
    }

    /// 依次追加多段字节；一次性确保容量，要么全部追加要么都不追加。
    pub fn append_all(&mut self, parts: &[&[u8]]) -> Result<()> {
        let storage = self.storage_mut()?;
        let len = parts
            .iter()
            .try_fold(0usize, |acc, part| acc.checked_add(part.len()))
            .ok_or_else(|| StrBufError::out_of_memory(usize::MAX, DEFAULT_MAX_BYTES))?;
        if len == 0 {
            return Ok(());
        }

        let used = storage.used();
        storage.ensure(used, len.saturating_add(1))?;
        let mut at = used;
        let mem = storage.mem_mut();
        for part in parts {
            mem[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        }
        storage.term(at);
        Ok(())
    }

    /// 在 `index` 指定的位置插入，原有字节整体后移。
    ///
    /// `index` 超过当前长度或 `src` 为空时静默忽略。
    pub fn insert(&mut self, index: i64, src: &[u8]) -> Result<()> {
        let storage = self.storage_mut()?;
        let used = storage.used();
        let Some(at) = index::insert_point(used, index).filter(|_| !src.is_empty()) else {
            return Ok(());
        };

        storage.ensure(used, src.len() + 1)?;
        let mem = storage.mem_mut();
        // 连同终止符一起右移，区间重叠由 copy_within 处理。
        mem.copy_within(at..=used, at + src.len());
        mem[at..at + src.len()].copy_from_slice(src);
        storage.term(used + src.len());
        Ok(())
    }

    // ---- 描述符 ----

    /// 绑定描述符；`close_on_release` 为 `None` 时保留原设置。
    pub fn attach_descriptor(&mut self, fd: RawFd, close_on_release: Option<bool>) -> Result<()> {
        self.storage()?;
        if fd < 0 {
            return Err(StrBufError::invalid_argument(
                "descriptor",
                "fd must be larger than 0",
            ));
        }
        if let Some(close) = close_on_release {
            self.close_on_release = close;
        }
        self.descriptor = Some(fd);
        debug!(fd, close_on_release = self.close_on_release, "strbuf descriptor attached");
        Ok(())
    }

    /// 接管描述符所有权：释放缓冲时一并关闭。
    pub fn attach_owned(&mut self, fd: OwnedFd) -> Result<()> {
        self.storage()?;
        self.attach_descriptor(fd.into_raw_fd(), Some(true))
    }

    pub fn set_close_on_release(&mut self, close: bool) -> Result<()> {
        self.storage()?;
        self.close_on_release = close;
        Ok(())
    }

    pub fn descriptor(&self) -> Result<Option<RawFd>> {
        self.storage()?;
        Ok(self.descriptor)
    }

    pub fn close_on_release(&self) -> Result<bool> {
        self.storage()?;
        Ok(self.close_on_release)
    }

    /// 已写出的字节偏移。
    pub fn write_cursor(&self) -> Result<usize> {
        self.storage()?;
        Ok(self.cursor)
    }

    // ---- 描述符读写：每次调用恰好一次系统调用 ----

    /// 从描述符读取并替换全部内容；同时复位写游标。
    ///
    /// `max` 为 `None` 或 0 时读取 `read_chunk`（缺省为 `unit`）字节。返回 0 表示流结束，
    /// 此时原内容保持不变。
    pub fn read(&mut self, max: Option<usize>) -> Result<usize> {
        self.read_into(false, max)
    }

    /// 从描述符读取并追加到末尾；写游标不变。
    pub fn read_append(&mut self, max: Option<usize>) -> Result<usize> {
        self.read_into(true, max)
    }

    fn read_into(&mut self, append: bool, max: Option<usize>) -> Result<usize> {
        let BufState::Live(storage) = &mut self.state else {
            return Err(StrBufError::UseAfterFree);
        };
        let fd = self.descriptor.ok_or_else(|| {
            StrBufError::invalid_argument("descriptor", "no descriptor attached")
        })?;
        let bytes = max
            .filter(|n| *n > 0)
            .or(self.read_chunk)
            .unwrap_or(storage.unit());
        let offset = if append { storage.used() } else { 0 };

        storage.ensure(offset, bytes.saturating_add(1))?;
        let dst = &mut storage.mem_mut()[offset..offset + bytes];
        match self.driver.read(fd, dst) {
            Ok(n) => {
                let n = n.min(bytes);
                if n > 0 {
                    storage.term(offset + n);
                }
                if offset == 0 {
                    self.cursor = 0;
                }
                trace!(fd, offset, n, used = storage.used(), "strbuf read");
                Ok(n)
            }
            Err(err) => {
                let err = StrBufError::from_io(IoOp::Read, fd, &err);
                trace!(fd, offset, error = %err, "strbuf read failed");
                Err(err)
            }
        }
    }

    /// 把调用方给出的字节直接写向描述符，不经过缓冲。
    pub fn write_once(&mut self, src: &[u8]) -> Result<usize> {
        self.storage()?;
        let fd = self.require_descriptor()?;
        let n = self
            .driver
            .write(fd, src)
            .map_err(|err| StrBufError::from_io(IoOp::Write, fd, &err))?;
        trace!(fd, requested = src.len(), n, "strbuf write_once");
        Ok(n)
    }

    /// 写出 `[offset, len)` 区间；不修改缓冲与写游标。
    pub fn write_at(&mut self, offset: usize) -> Result<usize> {
        let BufState::Live(storage) = &self.state else {
            return Err(StrBufError::UseAfterFree);
        };
        let fd = self.require_descriptor()?;
        let used = storage.used();
        if offset > used {
            return Err(StrBufError::invalid_argument(
                "offset",
                format!("offset {offset} is past the used size {used}"),
            ));
        }
        let n = self
            .driver
            .write(fd, &storage.content()[offset..])
            .map_err(|err| StrBufError::from_io(IoOp::Write, fd, &err))?;
        trace!(fd, offset, n, used, "strbuf write_at");
        Ok(n)
    }

    /// 从写游标处续写剩余内容。
    ///
    /// # 逻辑解析（How）
    /// 1. 写游标越过逻辑长度（外部误用）时按 0 处理；
    /// 2. 发起一次写调用，成功后游标前进实际写出的字节数；
    /// 3. 游标追平逻辑长度时，游标与内容一并清零；
    /// 4. 失败（含 EAGAIN）时游标不动，下一次调用从同一位置重试。
    ///
    /// # 失败时的进度（What）
    /// 错误本身只携带 `errno` 与 would-block 标志；此时 `len()` 是待写内容的权威总长，
    /// `write_cursor()` 是已写出的偏移，二者之差即剩余字节数，与失败前完全一致。
    ///
    /// 两次 `flush` 之间 `append` 是安全的；`set` 会把游标复位到 0。
    pub fn flush(&mut self) -> Result<FlushProgress> {
        let BufState::Live(storage) = &mut self.state else {
            return Err(StrBufError::UseAfterFree);
        };
        let fd = self.descriptor.ok_or_else(|| {
            StrBufError::invalid_argument("descriptor", "no descriptor attached")
        })?;
        let used = storage.used();
        if self.cursor > used {
            self.cursor = 0;
        }

        let pending = used - self.cursor;
        match self.driver.write(fd, &storage.content()[self.cursor..]) {
            Ok(n) => {
                self.cursor += n.min(pending);
                let progress = FlushProgress {
                    cursor: self.cursor,
                    used,
                };
                if progress.is_complete() {
                    self.cursor = 0;
                    storage.term(0);
                }
                trace!(fd, n, cursor = progress.cursor, used, "strbuf flush");
                Ok(progress)
            }
            Err(err) => {
                let err = StrBufError::from_io(IoOp::Flush, fd, &err);
                trace!(fd, cursor = self.cursor, used, error = %err, "strbuf flush failed");
                Err(err)
            }
        }
    }

    // ---- 生命周期 ----

    /// 释放存储；若持有描述符所有权则关闭之。重复调用无副作用。
    ///
    /// 关闭失败只记录告警，不向上传播：释放路径必须总能完成。
    pub fn release(&mut self) {
        if matches!(self.state, BufState::Released) {
            return;
        }
        self.state = BufState::Released;
        self.cursor = 0;

        let fd = self.descriptor.take();
        if self.close_on_release
            && let Some(fd) = fd
        {
            match self.driver.close(fd) {
                Ok(()) => debug!(fd, "strbuf descriptor closed"),
                Err(err) => {
                    let err = StrBufError::from_io(IoOp::Close, fd, &err);
                    warn!(fd, error = %err, "strbuf failed to close descriptor");
                }
            }
        }
        debug!("strbuf released");
    }

    pub fn is_released(&self) -> bool {
        matches!(self.state, BufState::Released)
    }
}

impl Drop for StrBuf {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for StrBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            BufState::Live(storage) => f
                .debug_struct("StrBuf")
                .field("unit", &storage.unit())
                .field("units", &storage.units())
                .field("used", &storage.used())
                .field("total", &storage.total())
                .field("cursor", &self.cursor)
                .field("descriptor", &self.descriptor)
                .field("close_on_release", &self.close_on_release)
                .finish(),
            BufState::Released => f.write_str("StrBuf(<released>)"),
        }
    }
}

/// 以 UTF-8（有损）渲染内容；已释放的缓冲渲染为空串。
impl fmt::Display for StrBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            BufState::Live(storage) => f.write_str(&String::from_utf8_lossy(storage.content())),
            BufState::Released => Ok(()),
        }
    }
}

/// 两个存活缓冲按内容比较；任一方已释放时不相等。
impl PartialEq for StrBuf {
    fn eq(&self, other: &Self) -> bool {
        match (self.as_bytes(), other.as_bytes()) {
            (Ok(lhs), Ok(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}
