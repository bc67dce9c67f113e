//! 字符串式下标解析。
//!
//! 所有函数只依赖逻辑长度 `used`，返回非空的半开字节区间；`None` 统一表示“空结果”。
//! 下标约定与 Lua `string.sub` 相近：
//! - 正数 `i` 对应偏移 `i - 1`；
//! - 负数 `i` 对应偏移 `used + i`，仍为负时钳制到 `0`；
//! - `0` 视为偏移 `0`。

use core::ops::Range;

fn used_as_index(used: usize) -> i64 {
    i64::try_from(used).unwrap_or(i64::MAX)
}

/// 将 1 起始的有符号下标映射为字节偏移（可能等于或超过 `used`，由调用方判定）。
fn offset_of(index: i64, used: i64) -> i64 {
    if index > 0 {
        index - 1
    } else if index < 0 {
        (used + index).max(0)
    } else {
        0
    }
}

fn non_empty(start: i64, end: i64) -> Option<Range<usize>> {
    if start < end {
        // 两端均已落在 [0, used] 内。
        Some(usize::try_from(start).ok()?..usize::try_from(end).ok()?)
    } else {
        None
    }
}

/// 闭区间 `[head, tail]` 形式的子串。
///
/// - `head >= used` 直接返回空；
/// - `tail` 为包含端点，负数按同样规则映射（仍为负时钳制到 0），正数钳制到 `used`；省略时取到末尾；
/// - 解析后的结束位置不晚于起点时返回空。
pub fn sub(used: usize, head: i64, tail: Option<i64>) -> Option<Range<usize>> {
    let used = used_as_index(used);
    if head >= used {
        return None;
    }
    let start = offset_of(head, used);
    let end = match tail {
        None => used,
        // 包含端点：偏移先钳制到 0，排他终点再加 1。
        Some(t) if t < 0 => (used + t).max(0) + 1,
        Some(t) => t.min(used),
    };
    non_empty(start, end)
}

/// `head` 起始、长度为 `len` 的子串。
///
/// - `head > used` 返回空；
/// - `len < 1` 返回空；省略时取到末尾；
/// - 结束位置为 `min(used, start + len)`。
pub fn substr(used: usize, head: i64, len: Option<i64>) -> Option<Range<usize>> {
    let used = used_as_index(used);
    if head > used {
        return None;
    }
    let start = offset_of(head, used);
    let end = match len {
        None => used,
        Some(n) if n < 1 => return None,
        Some(n) => start.saturating_add(n).min(used),
    };
    non_empty(start, end)
}

/// 逐字节访问的区间。
///
/// `head` 默认为 1，负数按 `used + head + 1` 换算为 1 起始下标；换算后必须落在 `[1, used]`。
/// `tail` 省略或为负时等于 `head`（单字节）；小于 `head` 返回空；超过 `used` 时钳制。
pub fn bytes(used: usize, head: Option<i64>, tail: Option<i64>) -> Option<Range<usize>> {
    let used = used_as_index(used);
    let head = match head.unwrap_or(1) {
        h if h < 0 => used + h + 1,
        h => h,
    };
    if head < 1 || head > used {
        return None;
    }
    let tail = match tail {
        None => head,
        Some(t) if t < 0 => head,
        Some(t) if t < head => return None,
        Some(t) => t.min(used),
    };
    non_empty(head - 1, tail)
}

/// 插入点：新字节将出现在返回的偏移处。
///
/// 下标超过 `used` 时返回 `None`，由调用方静默忽略；不做上限钳制。
pub fn insert_point(used: usize, index: i64) -> Option<usize> {
    let used = used_as_index(used);
    if index > used {
        return None;
    }
    usize::try_from(offset_of(index, used)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: usize = 5;

    #[test]
    fn sub_maps_negative_indices_from_the_end() {
        assert_eq!(sub(HELLO, -3, Some(-1)), Some(2..5));
        assert_eq!(sub(HELLO, 1, Some(1)), Some(0..1));
        assert_eq!(sub(HELLO, 2, None), Some(1..5));
        assert_eq!(sub(HELLO, -100, Some(2)), Some(0..2));
        assert_eq!(sub(HELLO, 0, None), Some(0..5));
    }

    #[test]
    fn sub_empty_cases() {
        // head 达到 used（含）即为空。
        assert_eq!(sub(HELLO, 5, None), None);
        assert_eq!(sub(HELLO, 9, None), None);
        assert_eq!(sub(HELLO, 3, Some(2)), None);
        assert_eq!(sub(HELLO, 1, Some(0)), None);
        assert_eq!(sub(0, 0, None), None);
    }

    #[test]
    fn sub_clamps_tail_to_used() {
        assert_eq!(sub(HELLO, 2, Some(99)), Some(1..5));
        assert_eq!(sub(HELLO, 1, Some(-5)), Some(0..1));
        // 负数尾部越过开头时钳制到首字节。
        assert_eq!(sub(HELLO, 1, Some(-6)), Some(0..1));
        assert_eq!(sub(HELLO, -99, Some(-99)), Some(0..1));
        assert_eq!(sub(HELLO, 2, Some(-99)), None);
    }

    #[test]
    fn substr_interprets_tail_as_length() {
        assert_eq!(substr(HELLO, 2, Some(3)), Some(1..4));
        assert_eq!(substr(HELLO, 5, None), Some(4..5));
        assert_eq!(substr(HELLO, -2, Some(10)), Some(3..5));
        assert_eq!(substr(HELLO, 1, Some(i64::MAX)), Some(0..5));
    }

    #[test]
    fn substr_empty_cases() {
        assert_eq!(substr(HELLO, 6, None), None);
        assert_eq!(substr(HELLO, 1, Some(0)), None);
        assert_eq!(substr(HELLO, 1, Some(-1)), None);
        assert_eq!(substr(0, -1, None), None);
    }

    #[test]
    fn bytes_single_and_ranges() {
        assert_eq!(bytes(HELLO, None, None), Some(0..1));
        assert_eq!(bytes(HELLO, Some(-1), None), Some(4..5));
        assert_eq!(bytes(HELLO, Some(2), Some(4)), Some(1..4));
        assert_eq!(bytes(HELLO, Some(2), Some(-1)), Some(1..2));
        assert_eq!(bytes(HELLO, Some(4), Some(50)), Some(3..5));
    }

    #[test]
    fn bytes_out_of_range_is_none() {
        assert_eq!(bytes(HELLO, Some(0), None), None);
        assert_eq!(bytes(HELLO, Some(6), None), None);
        assert_eq!(bytes(HELLO, Some(-6), None), None);
        assert_eq!(bytes(HELLO, Some(3), Some(2)), None);
        assert_eq!(bytes(0, None, None), None);
    }

    #[test]
    fn insert_point_rules() {
        assert_eq!(insert_point(2, 2), Some(1));
        assert_eq!(insert_point(3, -1), Some(2));
        assert_eq!(insert_point(3, -10), Some(0));
        assert_eq!(insert_point(3, 0), Some(0));
        assert_eq!(insert_point(3, 4), None);
        assert_eq!(insert_point(0, 0), Some(0));
    }
}
