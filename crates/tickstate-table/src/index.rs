//! 行索引与列 ID
//!
//! # Tick 编码
//!
//! 每张表只有一个全局代数计数器：第 n 次发布（n ≥ 1）把 tick `n` 盖在
//! 第 `(n - 1) mod HistoryLength` 行上；最后一行的 tick `0` 表示初始快照。
//! 因此 tick 唯一决定行号，[`StateIndex`] 的算术只需要 tick。

use std::fmt;

/// 列 ID（注册顺序分配，表内稳定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ColumnId(usize);

impl ColumnId {
    /// 从原始整数构造（不保证已注册，写入时会校验）
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// 原始整数
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// tick 对应的行号
#[inline]
pub(crate) fn row_of(ticks: u64, history_length: usize) -> usize {
    let len = history_length as u64;
    ((ticks + len - 1) % len) as usize
}

/// 读/写索引：行号 + 捕获时的 tick
///
/// 读者先按索引乐观拷贝，再用 [`validate_read_index`](crate::StateTable::validate_read_index)
/// 比较当前 tick，判断这一行是否已被写线程覆盖。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StateIndex {
    #[cfg_attr(feature = "serde", serde(skip))]
    table: u64,
    row: usize,
    ticks: u64,
    history_length: usize,
}

impl StateIndex {
    pub(crate) fn for_ticks(table: u64, ticks: u64, history_length: usize) -> Self {
        Self {
            table,
            row: row_of(ticks, history_length),
            ticks,
            history_length,
        }
    }

    /// 行号 `[0, history_length)`
    pub fn row(&self) -> usize {
        self.row
    }

    /// 捕获的 tick
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// 所属表的容量
    pub fn history_length(&self) -> usize {
        self.history_length
    }

    pub(crate) fn table(&self) -> u64 {
        self.table
    }

    /// 向前回退 `n` 次发布；越过初始快照（tick 0）时返回 `None`
    pub fn step_back(&self, n: u64) -> Option<Self> {
        let ticks = self.ticks.checked_sub(n)?;
        Some(Self::for_ticks(self.table, ticks, self.history_length))
    }

    /// 向后前进 `n` 次发布（不检查是否已发布）
    pub fn step_forward(&self, n: u64) -> Self {
        Self::for_ticks(self.table, self.ticks + n, self.history_length)
    }
}

impl fmt::Display for StateIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]@{}", self.row, self.ticks)
    }
}

/// 连续发布区间（闭区间），数据采集批次使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IndexRange {
    pub first: StateIndex,
    pub last: StateIndex,
}

impl IndexRange {
    /// 区间内的行数（`last` 早于 `first` 时为 0）
    pub fn len(&self) -> u64 {
        if self.last.ticks < self.first.ticks {
            0
        } else {
            self.last.ticks - self.first.ticks + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按时间顺序遍历区间内的索引
    pub fn iter(self) -> impl Iterator<Item = StateIndex> {
        let first = self.first;
        (0..self.len()).map(move |k| first.step_forward(k))
    }
}
