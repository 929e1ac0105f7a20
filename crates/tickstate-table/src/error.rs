//! 状态表错误类型定义

use crate::index::ColumnId;
use thiserror::Error;

/// 状态表错误类型
///
/// 所有稳态错误都通过 `Result` 返回，不会 panic：写线程通常是硬实时循环，
/// 读线程拿到错误后应沿用上一次的有效值或跳过本次更新。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// 列 ID 未注册（或句柄属于另一张表）
    #[error("Invalid column id: {0}")]
    InvalidColumn(ColumnId),

    /// 按名称查找列失败
    #[error("Unknown column name: {0}")]
    UnknownName(String),

    /// 注册时列名重复
    #[error("Duplicate column name: {0}")]
    DuplicateName(String),

    /// 请求的类型与注册时的类型不一致
    #[error("Type mismatch for column '{column}': stored {stored}, requested {requested}")]
    TypeMismatch {
        column: String,
        stored: &'static str,
        requested: &'static str,
    },

    /// 乐观拷贝后校验失败：该行在读取期间被写线程覆盖
    #[error("Stale read: row {row} no longer holds tick {ticks}")]
    StaleRead { row: usize, ticks: u64 },

    /// 索引指向的行尚未发布（例如写索引）
    #[error("Row with tick {ticks} is not published yet (latest: {published})")]
    NotPublished { ticks: u64, published: u64 },

    /// 历史区间不可用（长度超过容量、起点早于最旧有效行、或起点已被覆盖）
    #[error("History unavailable: {requested} rows ending at tick {end} (max {max})")]
    RangeUnavailable { end: u64, requested: usize, max: usize },

    /// 索引来自另一张状态表
    #[error("State index belongs to another table")]
    ForeignIndex,

    /// 文本导出时格式化失败
    #[error("Formatting failed")]
    Format,
}

impl From<std::fmt::Error> for StateError {
    fn from(_: std::fmt::Error) -> Self {
        Self::Format
    }
}

impl StateError {
    /// 是否为可重试的竞争失败（读得太慢被写线程追上）
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleRead { .. })
    }
}
