//! 数据采集通知
//!
//! 写线程在每次发布后检查采集计划，向采集器发送批次就绪等事件。
//! 事件通过有界通道 `try_send` 发出，写线程永不阻塞；通道满时只记录告警。
//!
//! 采集器按批次拉取行数据，批次大小为 `HistoryLength / 3`，保证采集器在
//! 这些行被覆盖之前还有两个批次的时间。

use crate::index::{IndexRange, StateIndex};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, warn};

/// 写线程发给采集器的事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectionEvent {
    /// 开始采集，参数为第一行
    Started(StateIndex),
    /// 一批连续行可以读取了
    BatchReady(IndexRange),
    /// 进度：自上次进度事件以来新增的行数
    Progress(u64),
    /// 停止采集：自上次进度事件以来新增的行数
    Stopped(u64),
}

/// 采集控制请求（任意线程发出，写线程在下一次 `Advance` 时处理）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollectionRequest {
    /// `delay` 秒后开始采集
    Start { delay: f64 },
    /// `delay` 秒后停止采集
    Stop { delay: f64 },
}

/// 进度事件间隔（秒）
const PROGRESS_INTERVAL: f64 = 1.0;

/// 写线程本地的采集状态
#[derive(Debug)]
pub(crate) struct DataCollection {
    events: Option<Sender<CollectionEvent>>,
    requests: Receiver<CollectionRequest>,
    collecting: bool,
    start_time: Option<f64>,
    stop_time: Option<f64>,
    batch_size: u64,
    batch_counter: u64,
    batch_first: Option<StateIndex>,
    rows_since_event: u64,
    last_progress: f64,
    dropped_events: u64,
}

impl DataCollection {
    pub(crate) fn new(
        history_length: usize,
        events: Option<Sender<CollectionEvent>>,
        requests: Receiver<CollectionRequest>,
    ) -> Self {
        Self {
            events,
            requests,
            collecting: false,
            start_time: None,
            stop_time: None,
            batch_size: (history_length as u64 / 3).max(1),
            batch_counter: 0,
            batch_first: None,
            rows_since_event: 0,
            last_progress: 0.0,
            dropped_events: 0,
        }
    }

    pub(crate) fn is_collecting(&self) -> bool {
        self.collecting
    }

    #[cfg(test)]
    pub(crate) fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub(crate) fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// 处理所有挂起的控制请求
    pub(crate) fn drain_requests(&mut self, table: &str, now: f64) {
        while let Ok(request) = self.requests.try_recv() {
            match request {
                CollectionRequest::Start { delay } => self.schedule_start(table, now + delay),
                CollectionRequest::Stop { delay } => self.schedule_stop(table, now + delay),
            }
        }
    }

    /// 计划开始采集；多个开始请求取最早者
    pub(crate) fn schedule_start(&mut self, table: &str, start_time: f64) {
        if !self.collecting {
            match self.start_time {
                None => {
                    debug!("State table '{}': collection scheduled to start at {:.6}", table, start_time);
                    self.start_time = Some(start_time);
                },
                Some(current) if start_time < current => {
                    debug!("State table '{}': collection start moved forward to {:.6}", table, start_time);
                    self.start_time = Some(start_time);
                },
                Some(_) => {
                    warn!("State table '{}': later start request ignored", table);
                },
            }
            return;
        }

        match self.stop_time {
            None => warn!(
                "State table '{}': start request while collecting and no stop scheduled, ignored",
                table
            ),
            Some(stop) if start_time <= stop => warn!(
                "State table '{}': start request before the scheduled stop, ignored",
                table
            ),
            Some(_) => {
                debug!(
                    "State table '{}': collection restart scheduled at {:.6} after stop",
                    table, start_time
                );
                self.start_time = Some(start_time);
            },
        }
    }

    /// 计划停止采集；多个停止请求取最晚者
    pub(crate) fn schedule_stop(&mut self, table: &str, stop_time: f64) {
        if !self.collecting && self.start_time.is_none() {
            warn!("State table '{}': stop request while not collecting, ignored", table);
            return;
        }
        match self.stop_time {
            Some(current) if stop_time <= current => {
                warn!("State table '{}': earlier stop request ignored", table);
            },
            _ => {
                debug!("State table '{}': collection scheduled to stop at {:.6}", table, stop_time);
                self.stop_time = Some(stop_time);
            },
        }
    }

    /// 一行刚刚发布后调用
    ///
    /// - `published`: 刚发布的行
    /// - `tic`: 本周期开始时间
    pub(crate) fn on_publish(&mut self, table: &str, published: StateIndex, tic: f64) {
        if !self.collecting
            && let Some(start) = self.start_time
            && tic >= start
        {
            debug!("State table '{}': collection started at {:.6}", table, tic);
            self.start_time = None;
            self.collecting = true;
            self.batch_first = Some(published);
            self.batch_counter = 0;
            self.rows_since_event = 0;
            self.last_progress = tic;
            self.emit(CollectionEvent::Started(published));
        }

        if !self.collecting {
            return;
        }

        self.batch_counter += 1;
        self.rows_since_event += 1;

        if let Some(stop) = self.stop_time
            && tic >= stop
        {
            debug!("State table '{}': collection stopped at {:.6}", table, tic);
            self.stop_time = None;
            self.flush_batch(published);
            let rows = std::mem::take(&mut self.rows_since_event);
            self.emit(CollectionEvent::Stopped(rows));
            self.collecting = false;
            return;
        }

        if self.batch_counter >= self.batch_size {
            self.flush_batch(published);
            self.batch_first = Some(published.step_forward(1));
        }

        if tic - self.last_progress >= PROGRESS_INTERVAL {
            let rows = std::mem::take(&mut self.rows_since_event);
            self.emit(CollectionEvent::Progress(rows));
            self.last_progress = tic;
        }
    }

    /// 强制停止（表清理时调用）
    pub(crate) fn stop_now(&mut self, published: StateIndex) {
        if !self.collecting {
            return;
        }
        self.flush_batch(published);
        let rows = std::mem::take(&mut self.rows_since_event);
        self.emit(CollectionEvent::Stopped(rows));
        self.collecting = false;
        self.start_time = None;
        self.stop_time = None;
    }

    fn flush_batch(&mut self, last: StateIndex) {
        if let Some(first) = self.batch_first.take()
            && first.ticks() <= last.ticks()
        {
            self.emit(CollectionEvent::BatchReady(IndexRange { first, last }));
        }
        self.batch_counter = 0;
    }

    fn emit(&mut self, event: CollectionEvent) {
        let Some(tx) = &self.events else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(event)) => {
                self.dropped_events += 1;
                warn!("Collection event channel full, dropping {:?}", event);
            },
            Err(TrySendError::Disconnected(_)) => {
                // 采集器已退出：停止发送
                debug!("Collection event receiver disconnected");
                self.events = None;
            },
        }
    }
}
