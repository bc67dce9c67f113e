#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spark_strbuf::{FdDriver, StrBuf, StrBufConfig, StrBufError};
use std::{
    io,
    os::fd::RawFd,
    sync::{Arc, Mutex},
};

/// Fuzz 指令：一次缓冲操作序列。
///
/// - **Why**：下标换算、线性扩容与写游标三者交织，任意组合下都必须维持终止符并与 `Vec<u8>` 模型一致；
/// - **How**：缓冲设置 4 KiB 上限以触达 `OutOfMemory` 路径，失败时模型保持不变；
/// - **What**：每步之后比较内容与终止符，访问类操作只要求不 panic 且结果落在内容之内。
#[derive(Debug, Arbitrary)]
struct StrBufCase {
    unit: u8,
    ops: Vec<BufOp>,
}

#[derive(Debug, Arbitrary)]
enum BufOp {
    Set(Vec<u8>),
    Append(Vec<u8>),
    Insert { index: i64, bytes: Vec<u8> },
    Sub { head: i64, tail: Option<i64> },
    Substr { head: i64, len: Option<i64> },
    Byte { head: Option<i64>, tail: Option<i64> },
    /// 以给定的单次写出上限执行一次 `flush`。
    Flush { limit: u8 },
    /// 驱动在下一次读时返回 `data`。
    ReadAppend { data: Vec<u8>, max: u16 },
}

#[derive(Debug, Default)]
struct Knobs {
    write_limit: usize,
    next_read: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct FuzzDriver(Arc<Mutex<Knobs>>);

impl FdDriver for FuzzDriver {
    fn read(&mut self, _fd: RawFd, dst: &mut [u8]) -> io::Result<usize> {
        let knobs = self.0.lock().map_err(|_| io::Error::other("poisoned"))?;
        let n = knobs.next_read.len().min(dst.len());
        dst[..n].copy_from_slice(&knobs.next_read[..n]);
        Ok(n)
    }

    fn write(&mut self, _fd: RawFd, src: &[u8]) -> io::Result<usize> {
        let knobs = self.0.lock().map_err(|_| io::Error::other("poisoned"))?;
        if knobs.write_limit == 0 {
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        Ok(knobs.write_limit.min(src.len()))
    }

    fn close(&mut self, _fd: RawFd) -> io::Result<()> {
        Ok(())
    }
}

fn check(buf: &StrBuf, model: &[u8]) {
    assert_eq!(buf.as_bytes().unwrap(), model);
    let with_nul = buf.as_bytes_with_nul().unwrap();
    assert_eq!(with_nul[model.len()], 0);
    assert!(buf.write_cursor().unwrap() <= model.len());
}

fn within(content: &[u8], view: &[u8]) -> bool {
    view.is_empty() || content.windows(view.len()).any(|w| w == view)
}

fuzz_target!(|case: StrBufCase| {
    let unit = usize::from(case.unit.max(1));
    let config = StrBufConfig::with_unit(unit).max_bytes(4096).descriptor(3);
    let Ok(buf) = StrBuf::with_config(&config) else {
        return;
    };
    let driver = FuzzDriver::default();
    let mut buf = buf.with_driver(driver.clone());
    let mut model: Vec<u8> = Vec::new();

    for op in case.ops {
        match op {
            BufOp::Set(bytes) => match buf.set(&bytes) {
                Ok(()) => model = bytes,
                Err(err) => assert!(matches!(err, StrBufError::OutOfMemory { .. })),
            },
            BufOp::Append(bytes) => match buf.append(&bytes) {
                Ok(()) => model.extend_from_slice(&bytes),
                Err(err) => assert!(matches!(err, StrBufError::OutOfMemory { .. })),
            },
            BufOp::Insert { index, bytes } => {
                let before = model.len();
                match buf.insert(index, &bytes) {
                    Ok(()) => {
                        let grown = buf.len().unwrap();
                        assert!(grown == before || grown == before + bytes.len());
                        model = buf.to_vec().unwrap();
                    }
                    Err(err) => assert!(matches!(err, StrBufError::OutOfMemory { .. })),
                }
            }
            BufOp::Sub { head, tail } => {
                assert!(within(&model, buf.sub(head, tail).unwrap()));
            }
            BufOp::Substr { head, len } => {
                assert!(within(&model, buf.substr(head, len).unwrap()));
            }
            BufOp::Byte { head, tail } => {
                if let Some(view) = buf.byte(head, tail).unwrap() {
                    assert!(!view.is_empty() && within(&model, view));
                }
            }
            BufOp::Flush { limit } => {
                driver.0.lock().unwrap().write_limit = usize::from(limit);
                match buf.flush() {
                    Ok(progress) if progress.is_complete() => model.clear(),
                    Ok(progress) => assert!(progress.cursor < progress.used),
                    Err(err) => assert!(err.is_would_block()),
                }
            }
            BufOp::ReadAppend { data, max } => {
                driver.0.lock().unwrap().next_read = data.clone();
                let requested = if max == 0 { unit } else { usize::from(max) };
                match buf.read_append(Some(usize::from(max))) {
                    Ok(n) => {
                        assert!(n <= requested);
                        model.extend_from_slice(&data[..n]);
                    }
                    Err(err) => assert!(matches!(err, StrBufError::OutOfMemory { .. })),
                }
            }
        }
        check(&buf, &model);
    }
});
