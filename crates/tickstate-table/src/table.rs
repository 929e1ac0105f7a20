//! 状态表共享部分与读端句柄
//!
//! # 发布协议
//!
//! 写线程独占 [`StateTableWriter`](crate::StateTableWriter)，读者持有可克隆的
//! [`StateTable`]。两者共享：
//!
//! - `arena`: 全部行数据（原子字，`Relaxed` 访问）
//! - `ticks[row]`: 每行当前的 tick
//! - `published`: 最近一次发布的 tick（唯一的发布点）
//!
//! 写线程：
//!
//! 1. 进入新行时先写入该行的待发布 tick，再 `fence(Release)`，之后才改写数据
//! 2. 整行拷入数据
//! 3. `published.store(n, Release)` 发布
//!
//! 读者（seqlock 式校验）：
//!
//! 1. `published.load(Acquire)`，确认目标 tick 已发布
//! 2. `Relaxed` 拷贝数据
//! 3. `fence(Acquire)` 后重新读取 `ticks[row]`，不一致则丢弃结果
//!
//! 只要读者看到了写线程对该行的任何新数据，就一定能看到先于它写入的新 tick。

use crate::accessor::{Accessor, ColumnAccessor};
use crate::collection::CollectionRequest;
use crate::error::StateError;
use crate::index::{ColumnId, StateIndex, row_of};
use crate::slot::{SlotArena, SlotLayout, StateHandle, TimestampedSlot};
use crate::statistics::IntervalStatistics;
use crate::value::StateValue;
use crossbeam_channel::Sender;
use crossbeam_utils::CachePadded;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering, fence};

/// 列的类型擦除操作表，在注册时按类型选定
pub(crate) trait ColumnFormat: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn type_id(&self) -> TypeId;
    fn write_header(&self, name: &str, delimiter: char, out: &mut dyn fmt::Write) -> fmt::Result;
    fn write_words(&self, words: &[u64], delimiter: char, out: &mut dyn fmt::Write)
    -> fmt::Result;
}

pub(crate) struct TypedFormat<T>(PhantomData<fn() -> T>);

impl<T> TypedFormat<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: StateValue> ColumnFormat for TypedFormat<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn write_header(&self, name: &str, delimiter: char, out: &mut dyn fmt::Write) -> fmt::Result {
        T::write_header(name, delimiter, out)
    }

    fn write_words(
        &self,
        words: &[u64],
        delimiter: char,
        out: &mut dyn fmt::Write,
    ) -> fmt::Result {
        crate::slot::decode::<T>(words).write_raw(delimiter, out)
    }
}

/// 已注册的列
pub(crate) struct Column {
    pub(crate) name: String,
    pub(crate) layout: SlotLayout,
    pub(crate) format: Box<dyn ColumnFormat>,
}

/// 内建列句柄（注册顺序固定：Toc, Tic, Period, PeriodStatistics）
#[derive(Debug, Clone, Copy)]
pub(crate) struct BuiltinColumns {
    pub(crate) toc: StateHandle<f64>,
    pub(crate) tic: StateHandle<f64>,
    pub(crate) period: StateHandle<f64>,
    pub(crate) period_statistics: StateHandle<IntervalStatistics>,
}

/// 读写双方共享的状态
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) name: String,
    pub(crate) columns: Vec<Column>,
    pub(crate) builtin: BuiltinColumns,
    pub(crate) arena: SlotArena,
    pub(crate) ticks: Box<[AtomicU64]>,
    pub(crate) published: CachePadded<AtomicU64>,
    /// f64 位模式
    pub(crate) average_period: AtomicU64,
    pub(crate) delay: AtomicUsize,
    pub(crate) requests: Sender<CollectionRequest>,
}

impl Shared {
    #[inline]
    pub(crate) fn history_length(&self) -> usize {
        self.arena.history_length()
    }

    #[inline]
    pub(crate) fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn index(&self, ticks: u64) -> StateIndex {
        StateIndex::for_ticks(self.id, ticks, self.history_length())
    }

    /// 当前仍可读取的最旧 tick
    #[inline]
    pub(crate) fn oldest_ticks(&self, published: u64) -> u64 {
        (published + 2).saturating_sub(self.history_length() as u64)
    }

    pub(crate) fn column(&self, id: ColumnId) -> Result<&Column, StateError> {
        self.columns.get(id.get()).ok_or(StateError::InvalidColumn(id))
    }

    /// 拷贝前检查：索引属于本表且已发布
    #[inline]
    pub(crate) fn check_published(&self, when: StateIndex) -> Result<(), StateError> {
        if when.table() != self.id || when.history_length() != self.history_length() {
            return Err(StateError::ForeignIndex);
        }
        let published = self.published();
        if when.ticks() > published {
            return Err(StateError::NotPublished {
                ticks: when.ticks(),
                published,
            });
        }
        Ok(())
    }

    /// 拷贝后检查：该行仍持有捕获的 tick
    #[inline]
    pub(crate) fn recheck(&self, when: StateIndex) -> bool {
        fence(Ordering::Acquire);
        self.ticks[when.row()].load(Ordering::Relaxed) == when.ticks()
    }

    pub(crate) fn validate(&self, when: StateIndex) -> bool {
        self.check_published(when).is_ok() && self.recheck(when)
    }

    /// 单行乐观读取：`copy` 负责拷出数据
    #[inline]
    pub(crate) fn read_row(
        &self,
        when: StateIndex,
        copy: impl FnOnce(&SlotArena, usize),
    ) -> Result<(), StateError> {
        self.check_published(when)?;
        copy(&self.arena, when.row());
        if self.recheck(when) {
            Ok(())
        } else {
            Err(StateError::StaleRead {
                row: when.row(),
                ticks: when.ticks(),
            })
        }
    }

    /// 多行乐观读取：按时间顺序对 `n` 行调用 `copy`，返回起始索引
    ///
    /// 写线程按 tick 顺序覆盖，最旧的一行最先被覆盖，所以拷贝结束后只需
    /// 重新校验起始行。
    pub(crate) fn read_history(
        &self,
        end: StateIndex,
        n: usize,
        mut copy: impl FnMut(&SlotArena, usize),
    ) -> Result<StateIndex, StateError> {
        if end.table() != self.id || end.history_length() != self.history_length() {
            return Err(StateError::ForeignIndex);
        }
        let max = self.history_length() - 1;
        let unavailable = StateError::RangeUnavailable {
            end: end.ticks(),
            requested: n,
            max,
        };
        if n == 0 || n > max || end.ticks() > self.published() {
            return Err(unavailable);
        }
        let start = end.step_back(n as u64 - 1).ok_or(unavailable.clone())?;
        if self.ticks[start.row()].load(Ordering::Acquire) != start.ticks() {
            return Err(unavailable);
        }

        for k in 0..n as u64 {
            copy(&self.arena, row_of(start.ticks() + k, self.history_length()));
        }

        if self.recheck(start) {
            Ok(start)
        } else {
            Err(StateError::StaleRead {
                row: start.row(),
                ticks: start.ticks(),
            })
        }
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("name", &self.name)
            .field("columns", &self.columns.len())
            .field("arena", &self.arena)
            .field("published", &self.published.load(Ordering::Relaxed))
            .finish()
    }
}

/// 状态表读端句柄
///
/// 可以克隆并发送到任意线程；所有操作都不阻塞写线程。
///
/// # 示例
///
/// ```rust
/// use tickstate_table::StateTableBuilder;
///
/// let mut builder = StateTableBuilder::new("Main", 4);
/// let x = builder.new_element("x", 0i32).unwrap();
/// let mut writer = builder.build();
/// let table = writer.reader();
///
/// writer.start();
/// writer.write(x, 1).unwrap();
/// writer.advance();
///
/// let x = table.accessor(x).unwrap();
/// assert_eq!(x.get_latest().unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct StateTable {
    pub(crate) shared: Arc<Shared>,
}

impl StateTable {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// 表名
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// 历史容量（行数）
    pub fn history_length(&self) -> usize {
        self.shared.history_length()
    }

    /// 列数（包含内建列）
    pub fn number_of_columns(&self) -> usize {
        self.shared.columns.len()
    }

    /// 全部列名（按列 ID 顺序）
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.shared.columns.iter().map(|c| c.name.as_str())
    }

    /// 按名称查找列 ID
    pub fn column_id(&self, name: &str) -> Option<ColumnId> {
        self.shared
            .columns
            .iter()
            .position(|c| !c.name.is_empty() && c.name == name)
            .map(ColumnId::new)
    }

    /// 列的类型名
    pub fn column_type_name(&self, id: ColumnId) -> Result<&'static str, StateError> {
        Ok(self.shared.column(id)?.format.type_name())
    }

    /// 最近发布的行（任意线程调用，一次原子读取）
    #[inline]
    pub fn get_index_reader(&self) -> StateIndex {
        self.shared.index(self.shared.published())
    }

    /// 落后最新行 `delay` 次发布的行（不超过可用历史）
    pub fn get_index_delayed(&self) -> StateIndex {
        let published = self.shared.published();
        let delay = self.shared.delay.load(Ordering::Relaxed) as u64;
        let ticks = published.saturating_sub(delay).max(self.shared.oldest_ticks(published));
        self.shared.index(ticks)
    }

    /// 设置延迟读取的行数（超过 `history_length - 2` 时截断）
    pub fn set_delay(&self, delay: usize) {
        let max = self.history_length() - 2;
        if delay > max {
            tracing::warn!(
                "State table '{}': delay {} exceeds available history, clamped to {}",
                self.name(),
                delay,
                max
            );
        }
        self.shared.delay.store(delay.min(max), Ordering::Relaxed);
    }

    /// 当前延迟行数
    pub fn delay(&self) -> usize {
        self.shared.delay.load(Ordering::Relaxed)
    }

    /// 指定 tick 对应的索引；已被覆盖或尚未发布时返回 `None`
    pub fn index_for_ticks(&self, ticks: u64) -> Option<StateIndex> {
        let published = self.shared.published();
        (ticks <= published && ticks >= self.shared.oldest_ticks(published))
            .then(|| self.shared.index(ticks))
    }

    /// 索引是否仍然有效（已发布且该行未被覆盖）
    #[inline]
    pub fn validate_read_index(&self, when: StateIndex) -> bool {
        self.shared.validate(when)
    }

    /// 绑定类型化访问器
    pub fn accessor<T: StateValue>(&self, handle: StateHandle<T>) -> Result<Accessor<T>, StateError> {
        if handle.table != self.shared.id {
            return Err(StateError::InvalidColumn(handle.id));
        }
        Ok(Accessor::new(self.shared.clone(), handle))
    }

    /// 按名称绑定类型化访问器（只在绑定时检查一次类型）
    pub fn typed_accessor<T: StateValue>(&self, name: &str) -> Result<Accessor<T>, StateError> {
        let id = self
            .column_id(name)
            .ok_or_else(|| StateError::UnknownName(name.to_string()))?;
        self.typed_accessor_by_id(id)
    }

    /// 按列 ID 绑定类型化访问器
    pub fn typed_accessor_by_id<T: StateValue>(
        &self,
        id: ColumnId,
    ) -> Result<Accessor<T>, StateError> {
        let column = self.shared.column(id)?;
        if column.format.type_id() != TypeId::of::<T>() {
            return Err(StateError::TypeMismatch {
                column: column.name.clone(),
                stored: column.format.type_name(),
                requested: std::any::type_name::<T>(),
            });
        }
        let handle = StateHandle {
            table: self.shared.id,
            id,
            slot: TimestampedSlot::new(column.layout),
        };
        Ok(Accessor::new(self.shared.clone(), handle))
    }

    /// 类型擦除的访问器（按列 ID）
    pub fn accessor_by_id(&self, id: ColumnId) -> Result<ColumnAccessor, StateError> {
        self.shared.column(id)?;
        Ok(ColumnAccessor::new(self.shared.clone(), id))
    }

    /// 类型擦除的访问器（按名称，O(n)）
    pub fn accessor_by_name(&self, name: &str) -> Result<ColumnAccessor, StateError> {
        let id = self
            .column_id(name)
            .ok_or_else(|| StateError::UnknownName(name.to_string()))?;
        self.accessor_by_id(id)
    }

    /// 周期开始时间列
    pub fn tic(&self) -> Accessor<f64> {
        Accessor::new(self.shared.clone(), self.shared.builtin.tic)
    }

    /// 周期结束时间列
    pub fn toc(&self) -> Accessor<f64> {
        Accessor::new(self.shared.clone(), self.shared.builtin.toc)
    }

    /// 实际周期列
    pub fn period(&self) -> Accessor<f64> {
        Accessor::new(self.shared.clone(), self.shared.builtin.period)
    }

    /// 周期统计列
    pub fn period_statistics(&self) -> Accessor<IntervalStatistics> {
        Accessor::new(self.shared.clone(), self.shared.builtin.period_statistics)
    }

    /// 历史窗口内的平均周期（秒）
    pub fn average_period(&self) -> f64 {
        f64::from_bits(self.shared.average_period.load(Ordering::Relaxed))
    }

    /// 请求写线程开始/停止数据采集（下一次 `Advance` 生效）
    pub fn request_collection(&self, request: CollectionRequest) {
        if self.shared.requests.try_send(request).is_err() {
            tracing::warn!(
                "State table '{}': collection request channel closed, {:?} dropped",
                self.name(),
                request
            );
        }
    }

    /// `delay` 秒后开始采集
    pub fn data_collection_start(&self, delay: f64) {
        self.request_collection(CollectionRequest::Start { delay });
    }

    /// `delay` 秒后停止采集
    pub fn data_collection_stop(&self, delay: f64) {
        self.request_collection(CollectionRequest::Stop { delay });
    }
}

impl fmt::Debug for StateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTable")
            .field("name", &self.shared.name)
            .field("history_length", &self.history_length())
            .field("columns", &self.number_of_columns())
            .field("published", &self.get_index_reader())
            .finish()
    }
}
