//! 状态表写端
//!
//! 写端只有一个所有者（周期任务线程），所有方法都取 `&mut self`，
//! “单写线程”约束由所有权保证。
//!
//! 每个周期：
//!
//! ```text
//! start()  ->  write()*  ->  advance()
//!  记录 Tic     暂存到工作副本   整行拷入写行、发布、进入下一行
//! ```
//!
//! 未在本周期写入的列沿用工作副本中的上一次值。

use crate::collection::DataCollection;
use crate::error::StateError;
use crate::index::{ColumnId, StateIndex, row_of};
use crate::slot::{StateHandle, encode};
use crate::statistics::IntervalAccumulator;
use crate::table::{Shared, StateTable};
use crate::clock::TimeServer;
use crate::value::StateValue;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};
use tracing::{trace, warn};

/// 状态表写端（单一所有者）
pub struct StateTableWriter {
    shared: Arc<Shared>,
    /// 当前行的工作副本
    current: Vec<u64>,
    time_server: Arc<dyn TimeServer>,
    tic: f64,
    toc: f64,
    period: f64,
    last_tic: Option<f64>,
    started: bool,
    automatic_advance: bool,
    /// 历史窗口内各行周期之和（不含第一次发布）
    period_sum: f64,
    statistics: IntervalAccumulator,
    collection: DataCollection,
}

impl StateTableWriter {
    pub(crate) fn new(
        shared: Arc<Shared>,
        current: Vec<u64>,
        time_server: Arc<dyn TimeServer>,
        statistics: IntervalAccumulator,
        collection: DataCollection,
        automatic_advance: bool,
    ) -> Self {
        Self {
            shared,
            current,
            time_server,
            tic: 0.0,
            toc: 0.0,
            period: 0.0,
            last_tic: None,
            started: false,
            automatic_advance,
            period_sum: 0.0,
            statistics,
            collection,
        }
    }

    /// 读端句柄
    pub fn reader(&self) -> StateTable {
        StateTable::from_shared(self.shared.clone())
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn history_length(&self) -> usize {
        self.shared.history_length()
    }

    /// 正在填充的行及其待发布 tick
    pub fn get_index_writer(&self) -> StateIndex {
        self.shared.index(self.published() + 1)
    }

    /// 最近发布的行
    pub fn get_index_reader(&self) -> StateIndex {
        self.shared.index(self.published())
    }

    #[inline]
    fn published(&self) -> u64 {
        // 只有本线程修改 published
        self.shared.published.load(Ordering::Relaxed)
    }

    /// 把值暂存到当前行
    ///
    /// 句柄必须来自本表的构建器，否则返回 [`StateError::InvalidColumn`]，表不变。
    pub fn write<T: StateValue>(
        &mut self,
        handle: StateHandle<T>,
        value: T,
    ) -> Result<(), StateError> {
        if handle.table != self.shared.id {
            warn!(
                "State table '{}': write with handle of another table (column {})",
                self.shared.name, handle.id
            );
            return Err(StateError::InvalidColumn(handle.id));
        }
        let layout = handle.slot.layout();
        encode(&value, &mut self.current[layout.offset..layout.offset + layout.stride]);
        Ok(())
    }

    /// 按列 ID 写入（ID 和类型在调用时检查）
    pub fn write_id<T: StateValue>(&mut self, id: ColumnId, value: T) -> Result<(), StateError> {
        let column = match self.shared.column(id) {
            Ok(column) => column,
            Err(e) => {
                warn!("State table '{}': write to invalid column {}", self.shared.name, id);
                return Err(e);
            },
        };
        if column.format.type_id() != TypeId::of::<T>() {
            return Err(StateError::TypeMismatch {
                column: column.name.clone(),
                stored: column.format.type_name(),
                requested: std::any::type_name::<T>(),
            });
        }
        let layout = column.layout;
        encode(&value, &mut self.current[layout.offset..layout.offset + layout.stride]);
        Ok(())
    }

    /// 把列当作普通变量使用时的暂存入口（与 [`write`](Self::write) 等价）
    pub fn set_current<T: StateValue>(
        &mut self,
        handle: StateHandle<T>,
        value: T,
    ) -> Result<(), StateError> {
        self.write(handle, value)
    }

    /// 工作副本中的当前值
    pub fn current<T: StateValue>(&self, handle: StateHandle<T>) -> Result<T, StateError> {
        if handle.table != self.shared.id {
            return Err(StateError::InvalidColumn(handle.id));
        }
        let layout = handle.slot.layout();
        Ok(crate::slot::decode(
            &self.current[layout.offset..layout.offset + layout.stride],
        ))
    }

    /// 周期开始：记录 Tic，计算实际周期（第一个周期为 0）
    pub fn start(&mut self) {
        self.tic = self.time_server.relative_time();
        self.period = self.last_tic.map_or(0.0, |last| self.tic - last);
        self.started = true;

        let (tic, period) = (self.tic, self.period);
        let builtin = self.shared.builtin;
        encode(&tic, self.cell_mut(builtin.tic));
        encode(&period, self.cell_mut(builtin.period));
    }

    /// 周期结束：发布当前行
    ///
    /// 未调用 `start()` 时先隐式调用。返回刚发布的索引。
    ///
    /// # 性能
    ///
    /// 一次整行拷贝 + 一次 `Release` 存储 + 一次 `Release` fence，不分配内存
    /// （周期统计窗口结束、或采集事件发送时除外）。
    pub fn advance(&mut self) -> StateIndex {
        if !self.started {
            self.start();
        }
        let shared = self.shared.clone();
        let history_length = shared.history_length();
        let builtin = shared.builtin;

        self.collection
            .drain_requests(&shared.name, self.time_server.relative_time());

        let toc = self.time_server.relative_time();
        self.toc = toc;
        encode(&toc, self.cell_mut(builtin.toc));
        if let Some(stats) = self.statistics.update(self.period, self.toc - self.tic, self.toc) {
            encode(&stats, self.cell_mut(builtin.period_statistics));
        }

        // 1. 整行拷入（该行的待发布 tick 已在进入时写好）
        let published = self.published() + 1;
        shared.arena.store_row(row_of(published, history_length), &self.current);

        // 2. 发布
        shared.published.store(published, Ordering::Release);
        if published > 1 {
            self.period_sum += self.period;
        }

        // 3. 进入下一行：先盖上待发布 tick，之后的数据写入都排在它后面
        let next = published + 1;
        let next_row = row_of(next, history_length);
        if let Some(leaving) = next.checked_sub(history_length as u64)
            && leaving >= 2
        {
            self.period_sum -= builtin.period.slot.element(&shared.arena, next_row);
        }
        shared.ticks[next_row].store(next, Ordering::Relaxed);
        fence(Ordering::Release);

        // 历史窗口内（不含 tick 0/1）的有效周期个数
        let low = (published + 2).saturating_sub(history_length as u64).max(2);
        let samples = if published >= low {
            published - low + 1
        } else {
            0
        };
        let average = if samples > 0 {
            self.period_sum / samples as f64
        } else {
            0.0
        };
        shared.average_period.store(average.to_bits(), Ordering::Relaxed);

        let index = shared.index(published);
        self.collection.on_publish(&shared.name, index, self.tic);

        trace!("State table '{}': published {}", shared.name, index);
        self.last_tic = Some(self.tic);
        self.started = false;
        index
    }

    /// 是否处于 `start()` 之后、`advance()` 之前
    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn automatic_advance(&self) -> bool {
        self.automatic_advance
    }

    pub fn set_automatic_advance(&mut self, automatic: bool) {
        self.automatic_advance = automatic;
    }

    /// 自动模式下开始周期
    pub fn start_if_automatic(&mut self) {
        if self.automatic_advance {
            self.start();
        }
    }

    /// 自动模式下发布
    pub fn advance_if_automatic(&mut self) -> Option<StateIndex> {
        self.automatic_advance.then(|| self.advance())
    }

    pub fn tic(&self) -> f64 {
        self.tic
    }

    pub fn toc(&self) -> f64 {
        self.toc
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn average_period(&self) -> f64 {
        f64::from_bits(self.shared.average_period.load(Ordering::Relaxed))
    }

    /// 写线程内直接计划开始采集
    pub fn data_collection_start(&mut self, delay: f64) {
        let at = self.time_server.relative_time() + delay;
        self.collection.schedule_start(&self.shared.name, at);
    }

    /// 写线程内直接计划停止采集
    pub fn data_collection_stop(&mut self, delay: f64) {
        let at = self.time_server.relative_time() + delay;
        self.collection.schedule_stop(&self.shared.name, at);
    }

    pub fn is_collecting(&self) -> bool {
        self.collection.is_collecting()
    }

    /// 因通道满而丢弃的采集事件数
    pub fn dropped_collection_events(&self) -> u64 {
        self.collection.dropped_events()
    }

    /// 组件结束时调用：若仍在采集则告警并立即停止
    pub fn cleanup(&mut self) {
        if self.collection.is_collecting() {
            warn!(
                "State table '{}': data collection still running at cleanup, stopping it",
                self.shared.name
            );
            let index = self.get_index_reader();
            self.collection.stop_now(index);
        }
    }

    fn cell_mut<T>(&mut self, handle: StateHandle<T>) -> &mut [u64] {
        let layout = handle.slot.layout();
        &mut self.current[layout.offset..layout.offset + layout.stride]
    }
}

impl fmt::Debug for StateTableWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTableWriter")
            .field("name", &self.shared.name)
            .field("writer", &self.get_index_writer())
            .field("started", &self.started)
            .field("automatic_advance", &self.automatic_advance)
            .finish()
    }
}
