//! `strbuf-pipe`：用两块 `StrBuf` 把标准输入原样搬运到标准输出。
//!
//! # 说明
//! - 输入缓冲绑定 fd 0，每轮 `read` 一次；输出缓冲绑定 fd 1，通过 `flush` 续写直到排空；
//! - 描述符为非阻塞时遇到 EAGAIN 会短暂休眠后重试，演示写游标在多次 `flush` 间的保持；
//! - 日志写向标准错误，级别由 `RUST_LOG` 控制，缺省为 `info`。
//!
//! 用法：`strbuf-pipe [--config <path>] [--unit <bytes>]`

use std::{env, fs, thread, time::Duration};

use spark_strbuf::{StrBuf, StrBufConfig, StrBufError};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const STDIN: i32 = 0;
const STDOUT: i32 = 1;
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
enum PipeError {
    #[error("参数错误: {0}")]
    InvalidArgument(String),
    #[error("读取配置 `{path}` 失败: {source}")]
    Config {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Buffer(#[from] StrBufError),
}

fn parse_config() -> Result<StrBufConfig, PipeError> {
    let mut args = env::args().skip(1);
    let mut config = StrBufConfig::default();
    let mut unit: Option<usize> = None;

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| PipeError::InvalidArgument("--config 之后需要提供路径".into()))?;
                let text = fs::read_to_string(&path).map_err(|source| PipeError::Config {
                    path: path.clone(),
                    source,
                })?;
                config = StrBufConfig::from_toml_str(&text)?;
            }
            "--unit" => {
                let value = args
                    .next()
                    .ok_or_else(|| PipeError::InvalidArgument("--unit 之后需要提供字节数".into()))?;
                unit = Some(value.parse::<usize>().map_err(|error| {
                    PipeError::InvalidArgument(format!("无法解析单元大小 `{value}`：{error}"))
                })?);
            }
            other => {
                return Err(PipeError::InvalidArgument(format!("未知参数 `{other}`")));
            }
        }
    }

    if let Some(unit) = unit {
        config.unit = unit;
    }
    // 标准输入输出由进程持有，缓冲不得关闭它们。
    config.descriptor = None;
    config.close_on_release = false;
    config.validate()?;
    Ok(config)
}

/// 反复 `flush` 直到输出缓冲排空。
fn drain(output: &mut StrBuf) -> Result<(), PipeError> {
    loop {
        match output.flush() {
            Ok(progress) if progress.is_complete() => return Ok(()),
            Ok(progress) => debug!(pending = progress.pending(), "partial flush"),
            Err(err) if err.is_would_block() => thread::sleep(RETRY_BACKOFF),
            Err(err) => return Err(err.into()),
        }
    }
}

fn run() -> Result<(), PipeError> {
    let config = parse_config()?;
    let mut input = StrBuf::with_config(&config)?;
    input.attach_descriptor(STDIN, Some(false))?;
    let mut output = StrBuf::with_config(&config)?;
    output.attach_descriptor(STDOUT, Some(false))?;

    let mut copied = 0usize;
    loop {
        match input.read(None) {
            Ok(0) => break,
            Ok(n) => {
                output.append(input.as_bytes()?)?;
                copied += n;
                drain(&mut output)?;
            }
            Err(err) if err.is_would_block() => thread::sleep(RETRY_BACKOFF),
            Err(err) => return Err(err.into()),
        }
    }
    drain(&mut output)?;
    info!(copied, unit = config.unit, "strbuf-pipe finished");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("strbuf-pipe 失败: {error}");
        std::process::exit(1);
    }
}
