//! 列访问器
//!
//! - [`Accessor<T>`]: 类型化访问（`get`/`get_latest`/`get_history`），零额外检查
//! - [`ColumnAccessor`]: 类型擦除访问，用于日志、导出、按名称的通用工具
//! - [`AccessorBase`]: 两者共享的对象安全接口，注册时按类型选定格式化实现
//!
//! 所有读取都遵循“先拷贝、后校验”：拷贝可能是撕裂的，但校验失败时结果被丢弃，
//! 调用方只会得到错误，不会拿到混合数据。

use crate::error::StateError;
use crate::index::{ColumnId, IndexRange, StateIndex};
use crate::slot::StateHandle;
use crate::table::Shared;
use crate::value::StateValue;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// 单元格拷贝缓冲（小列不分配堆内存）
type CellBuffer = SmallVec<[u64; 16]>;

/// 对象安全的列访问接口
pub trait AccessorBase: Send + Sync + fmt::Debug {
    /// 列 ID
    fn column_id(&self) -> ColumnId;

    /// 列名
    fn name(&self) -> &str;

    /// 值类型名
    fn type_name(&self) -> &'static str;

    /// 最近发布的索引
    fn index_reader(&self) -> StateIndex;

    /// 写出列头
    fn write_header(&self, delimiter: char, out: &mut dyn fmt::Write) -> Result<(), StateError>;

    /// 把 `when` 行的值写成文本；校验失败时不输出任何内容
    fn to_stream(
        &self,
        when: StateIndex,
        delimiter: char,
        out: &mut dyn fmt::Write,
    ) -> Result<(), StateError>;

    /// 写出最新值，返回其索引
    fn latest_to_stream(
        &self,
        delimiter: char,
        out: &mut dyn fmt::Write,
    ) -> Result<StateIndex, StateError> {
        let when = self.index_reader();
        self.to_stream(when, delimiter, out)?;
        Ok(when)
    }

    /// 写出以 `end` 结尾的 `n` 行，每行一条（`ticks<delimiter>value`）
    fn history_to_stream(
        &self,
        end: StateIndex,
        n: usize,
        delimiter: char,
        out: &mut dyn fmt::Write,
    ) -> Result<(), StateError>;
}

/// 类型擦除的公共实现
fn erased_to_stream(
    shared: &Shared,
    id: ColumnId,
    when: StateIndex,
    delimiter: char,
    out: &mut dyn fmt::Write,
) -> Result<(), StateError> {
    let column = shared.column(id)?;
    let mut buf: CellBuffer = SmallVec::from_elem(0, column.layout.stride);
    shared.read_row(when, |arena, row| arena.copy_cell(row, column.layout, &mut buf))?;
    column.format.write_words(&buf, delimiter, out)?;
    Ok(())
}

fn erased_history_to_stream(
    shared: &Shared,
    id: ColumnId,
    end: StateIndex,
    n: usize,
    delimiter: char,
    out: &mut dyn fmt::Write,
) -> Result<(), StateError> {
    let column = shared.column(id)?;
    let stride = column.layout.stride;
    let mut buf = vec![0u64; stride * n.min(shared.history_length())];
    let mut chunks = buf.chunks_mut(stride.max(1));
    let start = shared.read_history(end, n, |arena, row| {
        if let Some(chunk) = chunks.next() {
            arena.copy_cell(row, column.layout, chunk);
        }
    })?;
    for k in 0..n {
        write!(out, "{}{}", start.ticks() + k as u64, delimiter)?;
        column
            .format
            .write_words(&buf[k * stride..(k + 1) * stride], delimiter, out)?;
        out.write_char('\n')?;
    }
    Ok(())
}

/// 类型化列访问器
///
/// 绑定时已确认类型，读取路径上没有任何类型检查。
///
/// # 线程安全
///
/// `Accessor<T>` 是 `Send + Sync + Clone`，可以在任意线程使用。
pub struct Accessor<T> {
    shared: Arc<Shared>,
    handle: StateHandle<T>,
}

impl<T: StateValue> Accessor<T> {
    pub(crate) fn new(shared: Arc<Shared>, handle: StateHandle<T>) -> Self {
        Self { shared, handle }
    }

    /// 对应的句柄
    pub fn handle(&self) -> StateHandle<T> {
        self.handle
    }

    /// 读取 `when` 行：拷贝后校验，被覆盖时返回 [`StateError::StaleRead`]
    #[inline]
    pub fn get(&self, when: StateIndex) -> Result<T, StateError> {
        let mut value = None;
        self.shared
            .read_row(when, |arena, row| value = Some(self.handle.slot.element(arena, row)))?;
        value.ok_or(StateError::StaleRead {
            row: when.row(),
            ticks: when.ticks(),
        })
    }

    /// 读取最近发布的值
    #[inline]
    pub fn get_latest(&self) -> Result<T, StateError> {
        self.get(self.shared.index(self.shared.published()))
    }

    /// 读取最近发布的值及其索引
    pub fn get_latest_with_index(&self) -> Result<(StateIndex, T), StateError> {
        let when = self.shared.index(self.shared.published());
        self.get(when).map(|value| (when, value))
    }

    /// 按表的延迟设置读取
    pub fn get_delayed(&self) -> Result<T, StateError> {
        let published = self.shared.published();
        let delay = self
            .shared
            .delay
            .load(std::sync::atomic::Ordering::Relaxed) as u64;
        let ticks = published
            .saturating_sub(delay)
            .max(self.shared.oldest_ticks(published));
        self.get(self.shared.index(ticks))
    }

    /// 读取以 `end` 结尾的连续 `n` 行（时间顺序）
    pub fn get_history(&self, end: StateIndex, n: usize) -> Result<History<T>, StateError> {
        // n 由调用方给出，可能远超容量；合法长度最多 HistoryLength - 1
        let mut history = History::with_capacity(n.min(self.shared.history_length()));
        self.get_history_into(end, n, &mut history)?;
        Ok(history)
    }

    /// 读取最近的 `n` 行
    pub fn get_latest_history(&self, n: usize) -> Result<History<T>, StateError> {
        self.get_history(self.shared.index(self.shared.published()), n)
    }

    /// 复用调用方缓冲读取历史；失败时缓冲被清空并标记为无效
    pub fn get_history_into(
        &self,
        end: StateIndex,
        n: usize,
        history: &mut History<T>,
    ) -> Result<(), StateError> {
        history.values.clear();
        history.range = None;
        let slot = self.handle.slot;
        let values = &mut history.values;
        match self
            .shared
            .read_history(end, n, |arena, row| values.push(slot.element(arena, row)))
        {
            Ok(first) => {
                history.range = Some(IndexRange { first, last: end });
                Ok(())
            },
            Err(e) => {
                history.values.clear();
                Err(e)
            },
        }
    }
}

impl<T: StateValue> AccessorBase for Accessor<T> {
    fn column_id(&self) -> ColumnId {
        self.handle.id
    }

    fn name(&self) -> &str {
        &self.shared.columns[self.handle.id.get()].name
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn index_reader(&self) -> StateIndex {
        self.shared.index(self.shared.published())
    }

    fn write_header(&self, delimiter: char, out: &mut dyn fmt::Write) -> Result<(), StateError> {
        T::write_header(AccessorBase::name(self), delimiter, out)?;
        Ok(())
    }

    fn to_stream(
        &self,
        when: StateIndex,
        delimiter: char,
        out: &mut dyn fmt::Write,
    ) -> Result<(), StateError> {
        self.get(when)?.write_raw(delimiter, out)?;
        Ok(())
    }

    fn history_to_stream(
        &self,
        end: StateIndex,
        n: usize,
        delimiter: char,
        out: &mut dyn fmt::Write,
    ) -> Result<(), StateError> {
        erased_history_to_stream(&self.shared, self.handle.id, end, n, delimiter, out)
    }
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            handle: self.handle,
        }
    }
}

impl<T> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("table", &self.shared.name)
            .field("column", &self.shared.columns[self.handle.id.get()].name)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

/// 类型擦除的列访问器
#[derive(Clone)]
pub struct ColumnAccessor {
    shared: Arc<Shared>,
    id: ColumnId,
}

impl ColumnAccessor {
    pub(crate) fn new(shared: Arc<Shared>, id: ColumnId) -> Self {
        Self { shared, id }
    }

    /// 最新值的文本形式
    pub fn latest_string(&self, delimiter: char) -> Result<String, StateError> {
        let mut out = String::new();
        self.latest_to_stream(delimiter, &mut out)?;
        Ok(out)
    }
}

impl AccessorBase for ColumnAccessor {
    fn column_id(&self) -> ColumnId {
        self.id
    }

    fn name(&self) -> &str {
        &self.shared.columns[self.id.get()].name
    }

    fn type_name(&self) -> &'static str {
        self.shared.columns[self.id.get()].format.type_name()
    }

    fn index_reader(&self) -> StateIndex {
        self.shared.index(self.shared.published())
    }

    fn write_header(&self, delimiter: char, out: &mut dyn fmt::Write) -> Result<(), StateError> {
        let column = self.shared.column(self.id)?;
        column.format.write_header(&column.name, delimiter, out)?;
        Ok(())
    }

    fn to_stream(
        &self,
        when: StateIndex,
        delimiter: char,
        out: &mut dyn fmt::Write,
    ) -> Result<(), StateError> {
        erased_to_stream(&self.shared, self.id, when, delimiter, out)
    }

    fn history_to_stream(
        &self,
        end: StateIndex,
        n: usize,
        delimiter: char,
        out: &mut dyn fmt::Write,
    ) -> Result<(), StateError> {
        erased_history_to_stream(&self.shared, self.id, end, n, delimiter, out)
    }
}

impl fmt::Debug for ColumnAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnAccessor")
            .field("table", &self.shared.name)
            .field("column", &self.id)
            .finish()
    }
}

/// 历史查询结果
///
/// 成功时 `values` 按时间顺序排列（最旧在前），`range` 给出首尾索引；
/// 失败时 `values` 为空且 `range` 为 `None`。
#[derive(Debug, Clone, PartialEq)]
pub struct History<T> {
    values: Vec<T>,
    range: Option<IndexRange>,
}

impl<T> History<T> {
    /// 预分配容量，便于在实时循环中复用
    pub fn with_capacity(n: usize) -> Self {
        Self {
            values: Vec::with_capacity(n),
            range: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.range.is_some()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn range(&self) -> Option<IndexRange> {
        self.range
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// (索引, 值) 对，时间顺序
    pub fn iter(&self) -> impl Iterator<Item = (StateIndex, &T)> {
        self.range
            .into_iter()
            .flat_map(|range| range.iter())
            .zip(self.values.iter())
    }

    pub fn into_vec(self) -> Vec<T> {
        self.values
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            range: None,
        }
    }
}
