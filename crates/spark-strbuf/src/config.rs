use std::os::fd::RawFd;

use serde::Deserialize;

use crate::{
    capacity::DEFAULT_MAX_BYTES,
    error::{Result, StrBufError},
};

/// 缓冲的构造参数。
///
/// ## 设计目的（Why）
/// - 把 `allocate(unit, [fd], [cloexec])` 的可选参数收拢为一个结构，便于从配置文件加载，
///   也便于按连接类型预置多套参数；
/// - 额外暴露 `max_bytes`，允许为单个缓冲设置比 `isize::MAX` 更低的硬上限。
///
/// ## 契约定义（What）
/// - `unit`：分配粒度，必须 ≥ 1，默认 4096；
/// - `max_bytes`：容量上限，缺省为 `isize::MAX`，必须能容纳至少一个 `unit`；
/// - `descriptor`：可选的初始描述符，必须非负；
/// - `close_on_release`：释放缓冲时是否关闭描述符；
/// - `read_chunk`：`read`/`read_append` 未指定长度时的默认读取量，缺省为 `unit`。
///
/// ## 注意事项（Trade-offs）
/// - 反序列化使用 `deny_unknown_fields`，拼写错误会在加载时直接失败，而不是被静默忽略。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StrBufConfig {
    pub unit: usize,
    pub max_bytes: Option<usize>,
    pub descriptor: Option<RawFd>,
    pub close_on_release: bool,
    pub read_chunk: Option<usize>,
}

impl Default for StrBufConfig {
    fn default() -> Self {
        Self {
            unit: Self::DEFAULT_UNIT,
            max_bytes: None,
            descriptor: None,
            close_on_release: false,
            read_chunk: None,
        }
    }
}

impl StrBufConfig {
    /// 默认分配粒度。
    pub const DEFAULT_UNIT: usize = 4096;

    /// 以指定粒度创建配置，其余字段取默认值。
    pub fn with_unit(unit: usize) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn descriptor(mut self, fd: RawFd) -> Self {
        self.descriptor = Some(fd);
        self
    }

    pub fn close_on_release(mut self, close: bool) -> Self {
        self.close_on_release = close;
        self
    }

    pub fn read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = Some(bytes);
        self
    }

    /// 生效的容量上限。
    pub fn effective_max_bytes(&self) -> usize {
        self.max_bytes.unwrap_or(DEFAULT_MAX_BYTES)
    }

    /// 校验字段间约束。
    pub fn validate(&self) -> Result<()> {
        if self.unit < 1 {
            return Err(StrBufError::invalid_argument(
                "unit",
                "size must be larger than 0",
            ));
        }
        if self.effective_max_bytes() < self.unit {
            return Err(StrBufError::invalid_argument(
                "max_bytes",
                format!(
                    "ceiling of {} bytes cannot hold one unit of {} bytes",
                    self.effective_max_bytes(),
                    self.unit
                ),
            ));
        }
        if let Some(fd) = self.descriptor
            && fd < 0
        {
            return Err(StrBufError::invalid_argument(
                "descriptor",
                "fd must be larger than 0",
            ));
        }
        if self.read_chunk == Some(0) {
            return Err(StrBufError::invalid_argument(
                "read_chunk",
                "bytes must be larger than 0",
            ));
        }
        Ok(())
    }

    /// 从 TOML 文本加载并校验。
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|err| {
            StrBufError::invalid_argument("config", format!("malformed strbuf config: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}
