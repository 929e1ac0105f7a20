//! 状态表构建器（注册阶段）
//!
//! 列只能在构建器上注册；`build()` 之后拿到的写端和读端都不再提供注册入口，
//! 所以“发布开始后再注册”在类型层面就无法表达。

use crate::clock::{SystemTimeServer, TimeServer};
use crate::collection::{CollectionEvent, DataCollection};
use crate::error::StateError;
use crate::index::ColumnId;
use crate::slot::{SlotArena, SlotLayout, StateHandle, TimestampedSlot, encode, words_for};
use crate::statistics::{IntervalAccumulator, IntervalStatistics};
use crate::table::{BuiltinColumns, Column, Shared, TypedFormat};
use crate::value::StateValue;
use crate::writer::StateTableWriter;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use crossbeam_utils::CachePadded;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// 最小历史容量：一行正在写、一行刚发布、至少一行可供历史查询
pub const MIN_HISTORY_LENGTH: usize = 3;

/// 默认周期统计窗口
pub const DEFAULT_STATISTICS_INTERVAL: Duration = Duration::from_secs(1);

/// 内建列名（按注册顺序，列 ID 依次为 0..4）
pub const BUILTIN_COLUMN_NAMES: [&str; 4] = ["Toc", "Tic", "Period", "PeriodStatistics"];

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// 状态表构建器
///
/// # 示例
///
/// ```rust
/// use tickstate_table::StateTableBuilder;
///
/// let mut builder = StateTableBuilder::new("Main", 64);
/// let position = builder.new_element("position", [0.0f64; 3]).unwrap();
/// let counter = builder.add_data("counter", 0u64).unwrap();
/// assert_ne!(position.id(), counter.id());
///
/// let writer = builder.build();
/// assert_eq!(writer.reader().number_of_columns(), 6);
/// ```
pub struct StateTableBuilder {
    id: u64,
    name: String,
    history_length: usize,
    time_server: Arc<dyn TimeServer>,
    statistics_interval: Duration,
    automatic_advance: bool,
    columns: Vec<Column>,
    initial: Vec<u64>,
    builtin: BuiltinColumns,
    events: Option<Sender<CollectionEvent>>,
}

impl StateTableBuilder {
    /// 创建构建器，并注册内建列 `Toc`, `Tic`, `Period`, `PeriodStatistics`
    ///
    /// `history_length` 小于 3 时提升为 3。
    pub fn new(name: impl Into<String>, history_length: usize) -> Self {
        let name = name.into();
        let history_length = if history_length < MIN_HISTORY_LENGTH {
            warn!(
                "State table '{}': history length {} too small, using {}",
                name, history_length, MIN_HISTORY_LENGTH
            );
            MIN_HISTORY_LENGTH
        } else {
            history_length
        };

        let id = NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed);
        let mut columns = Vec::new();
        let mut initial = Vec::new();
        let [toc_name, tic_name, period_name, statistics_name] = BUILTIN_COLUMN_NAMES;
        let toc = push_column(id, &mut columns, &mut initial, toc_name, 0.0f64);
        let tic = push_column(id, &mut columns, &mut initial, tic_name, 0.0f64);
        let period = push_column(id, &mut columns, &mut initial, period_name, 0.0f64);
        let period_statistics = push_column(
            id,
            &mut columns,
            &mut initial,
            statistics_name,
            IntervalStatistics::default(),
        );

        Self {
            id,
            name,
            history_length,
            time_server: Arc::new(SystemTimeServer::new()),
            statistics_interval: DEFAULT_STATISTICS_INTERVAL,
            automatic_advance: true,
            columns,
            initial,
            builtin: BuiltinColumns {
                toc,
                tic,
                period,
                period_statistics,
            },
            events: None,
        }
    }

    /// 使用共享时间源（同一管理器下的表应共享）
    pub fn with_time_server(mut self, time_server: Arc<dyn TimeServer>) -> Self {
        self.time_server = time_server;
        self
    }

    /// 周期统计窗口
    pub fn statistics_interval(mut self, interval: Duration) -> Self {
        self.statistics_interval = interval;
        self
    }

    /// 是否由周期任务自动调用 `Start`/`Advance`（默认是）
    pub fn automatic_advance(mut self, automatic: bool) -> Self {
        self.automatic_advance = automatic;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }

    pub fn number_of_columns(&self) -> usize {
        self.columns.len()
    }

    /// 注册新列，全部历史行填充为 `initial`
    ///
    /// 空名称允许重复；非空名称重复时返回 [`StateError::DuplicateName`]。
    pub fn new_element<T: StateValue>(
        &mut self,
        name: impl Into<String>,
        initial: T,
    ) -> Result<StateHandle<T>, StateError> {
        let name = name.into();
        if !name.is_empty() && self.columns.iter().any(|c| c.name == name) {
            return Err(StateError::DuplicateName(name));
        }
        let handle = push_column(self.id, &mut self.columns, &mut self.initial, name, initial);
        debug!(
            "State table '{}': registered column {} '{}' ({})",
            self.name,
            handle.id(),
            self.columns[handle.id().get()].name,
            std::any::type_name::<T>()
        );
        Ok(handle)
    }

    /// [`new_element`](Self::new_element) 的别名
    pub fn add_data<T: StateValue>(
        &mut self,
        name: impl Into<String>,
        initial: T,
    ) -> Result<StateHandle<T>, StateError> {
        self.new_element(name, initial)
    }

    /// 订阅数据采集事件（一张表只有一个订阅者，重复调用会替换之前的订阅）
    pub fn collection_events(&mut self, capacity: usize) -> Receiver<CollectionEvent> {
        let (tx, rx) = bounded(capacity.max(1));
        self.events = Some(tx);
        rx
    }

    /// 完成注册，分配行存储
    ///
    /// 初始时每行都是初始值；第 0 行已带上待发布 tick 1，读索引指向最后一行
    /// （tick 0，即初始快照）。
    pub fn build(self) -> StateTableWriter {
        let history_length = self.history_length;
        let arena = SlotArena::new(history_length, &self.initial);
        let ticks = (0..history_length)
            .map(|row| AtomicU64::new(if row == 0 { 1 } else { 0 }))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let (requests_tx, requests_rx) = unbounded();

        debug!(
            "State table '{}' built: {} columns, {} rows x {} words",
            self.name,
            self.columns.len(),
            history_length,
            arena.row_stride()
        );

        let shared = Arc::new(Shared {
            id: self.id,
            name: self.name,
            columns: self.columns,
            builtin: self.builtin,
            arena,
            ticks,
            published: CachePadded::new(AtomicU64::new(0)),
            average_period: AtomicU64::new(0f64.to_bits()),
            delay: AtomicUsize::new(0),
            requests: requests_tx,
        });

        let collection = DataCollection::new(history_length, self.events, requests_rx);
        StateTableWriter::new(
            shared,
            self.initial,
            self.time_server,
            IntervalAccumulator::new(self.statistics_interval.as_secs_f64()),
            collection,
            self.automatic_advance,
        )
    }
}

fn push_column<T: StateValue>(
    table: u64,
    columns: &mut Vec<Column>,
    initial: &mut Vec<u64>,
    name: impl Into<String>,
    value: T,
) -> StateHandle<T> {
    let layout = SlotLayout {
        offset: initial.len(),
        stride: words_for::<T>(),
    };
    initial.resize(layout.offset + layout.stride, 0);
    encode(&value, &mut initial[layout.offset..]);

    let id = ColumnId::new(columns.len());
    columns.push(Column {
        name: name.into(),
        layout,
        format: Box::new(TypedFormat::<T>::new()),
    });
    StateHandle {
        table,
        id,
        slot: TimestampedSlot::new(layout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_columns_first() {
        let builder = StateTableBuilder::new("t", 8);
        let table = builder.build().reader();
        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!["Toc", "Tic", "Period", "PeriodStatistics"]);
    }

    #[test]
    fn test_history_length_minimum() {
        let builder = StateTableBuilder::new("t", 1);
        assert_eq!(builder.history_length(), MIN_HISTORY_LENGTH);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut builder = StateTableBuilder::new("t", 8);
        builder.new_element("x", 0u32).unwrap();
        assert_eq!(
            builder.new_element("x", 1u32).unwrap_err(),
            StateError::DuplicateName("x".to_string())
        );
        // 空名称可以重复
        builder.new_element("", 0u8).unwrap();
        builder.new_element("", 0u8).unwrap();
        assert_eq!(builder.number_of_columns(), 7);
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut builder = StateTableBuilder::new("t", 8);
        let a = builder.new_element("a", 0u32).unwrap();
        let b = builder.new_element("b", [0f64; 4]).unwrap();
        assert_eq!(a.id(), ColumnId::new(4));
        assert_eq!(b.id(), ColumnId::new(5));
    }
}
