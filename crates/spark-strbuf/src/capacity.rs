use tracing::{debug, warn};

use crate::error::{Result, StrBufError};

/// 单个缓冲允许的默认最大字节数。
///
/// Rust 的单次分配不得超过 `isize::MAX` 字节，以此作为 `floor(MAX / unit)` 的分子，
/// 保证 `nalloc * unit` 永不溢出。
pub const DEFAULT_MAX_BYTES: usize = isize::MAX as usize;

/// `Storage` 持有缓冲的唯一一块连续分配，并负责按 `unit` 粒度扩容。
///
/// # 设计动机（Why）
/// - 调用方按访问模式选择 `unit`：大 `unit` 让逐字节追加摊还为 O(1)，
///   小 `unit` 则节省内存；因此扩容按“缺口向上取整到 `unit`”线性增长，而非倍增。
/// - 上限 `nmax = floor(max_bytes / unit)` 在构造时一次性计算，之后所有乘法都不会溢出。
///
/// # 契约说明（What）
/// - `mem.len() == nalloc * unit`，即 `total()`；
/// - `used < total()`，且 `mem[used] == 0`（终止符不计入长度）；
/// - 扩容失败时 `mem`、`nalloc`、`used` 均保持不变。
#[derive(Debug)]
pub(crate) struct Storage {
    unit: usize,
    nalloc: usize,
    nmax: usize,
    used: usize,
    mem: Vec<u8>,
}

impl Storage {
    /// 分配一个单元的初始存储，并写入终止符。
    pub(crate) fn new(unit: usize, max_bytes: usize) -> Result<Self> {
        if unit == 0 {
            return Err(StrBufError::invalid_argument(
                "unit",
                "size must be larger than 0",
            ));
        }
        let max_bytes = max_bytes.min(DEFAULT_MAX_BYTES);
        let nmax = max_bytes / unit;
        if nmax == 0 {
            return Err(StrBufError::invalid_argument(
                "max_bytes",
                format!("ceiling of {max_bytes} bytes cannot hold one unit of {unit} bytes"),
            ));
        }

        let mut mem = Vec::new();
        mem.try_reserve_exact(unit)
            .map_err(|_| StrBufError::out_of_memory(unit, nmax * unit))?;
        mem.resize(unit, 0);
        Ok(Self {
            unit,
            nalloc: 1,
            nmax,
            used: 0,
            mem,
        })
    }

    pub(crate) fn unit(&self) -> usize {
        self.unit
    }

    pub(crate) fn units(&self) -> usize {
        self.nalloc
    }

    pub(crate) fn max_units(&self) -> usize {
        self.nmax
    }

    pub(crate) fn total(&self) -> usize {
        self.mem.len()
    }

    pub(crate) fn used(&self) -> usize {
        self.used
    }

    /// 逻辑内容，不含终止符。
    pub(crate) fn content(&self) -> &[u8] {
        &self.mem[..self.used]
    }

    /// 逻辑内容加终止符。
    pub(crate) fn content_with_nul(&self) -> &[u8] {
        &self.mem[..=self.used]
    }

    pub(crate) fn mem(&self) -> &[u8] {
        &self.mem
    }

    pub(crate) fn mem_mut(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    /// 确保从 `from` 起至少还有 `bytes` 字节可写。
    ///
    /// # 逻辑解析（How）
    /// 1. `from` 必须落在已用区间内（含末尾），否则视为调用方错误；
    /// 2. 剩余空间足够时直接返回；
    /// 3. 否则计算缺口 `deficit`，按 `ceil(deficit / unit)` 个单元追加，至少增长一个单元；
    /// 4. 单元数超过 `nmax` 或加法溢出时返回 `OutOfMemory`。
    pub(crate) fn ensure(&mut self, from: usize, bytes: usize) -> Result<()> {
        if from > self.used {
            return Err(StrBufError::invalid_argument(
                "from",
                format!("offset {from} is past the used size {}", self.used),
            ));
        }

        let remain = self.total() - from;
        if remain >= bytes {
            return Ok(());
        }

        let deficit = bytes - remain;
        let nalloc = self
            .nalloc
            .checked_add(deficit.div_ceil(self.unit))
            .ok_or_else(|| self.exhausted(usize::MAX))?;
        self.grow_to(nalloc)
    }

    /// 将分配扩大到 `nalloc` 个单元；不会缩容。
    fn grow_to(&mut self, nalloc: usize) -> Result<()> {
        if nalloc > self.nmax {
            return Err(self.exhausted(nalloc));
        }
        if nalloc <= self.nalloc {
            return Ok(());
        }

        // nalloc <= nmax = floor(max / unit)，乘法不会溢出。
        let total = nalloc * self.unit;
        if self
            .mem
            .try_reserve_exact(total - self.mem.len())
            .is_err()
        {
            return Err(self.exhausted(nalloc));
        }
        self.mem.resize(total, 0);
        debug!(
            unit = self.unit,
            from_units = self.nalloc,
            to_units = nalloc,
            total,
            "strbuf capacity grown"
        );
        self.nalloc = nalloc;
        Ok(())
    }

    fn exhausted(&self, requested_units: usize) -> StrBufError {
        let requested = requested_units.saturating_mul(self.unit);
        let limit = self.nmax * self.unit;
        warn!(
            unit = self.unit,
            units = self.nalloc,
            requested,
            limit,
            "strbuf growth refused"
        );
        StrBufError::out_of_memory(requested, limit)
    }

    /// 设置逻辑长度并写入终止符。调用方保证 `pos < total()`。
    pub(crate) fn term(&mut self, pos: usize) {
        self.used = pos;
        self.mem[pos] = 0;
    }
}
