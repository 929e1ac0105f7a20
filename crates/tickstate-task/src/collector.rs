//! 状态采集器
//!
//! 订阅一张状态表的采集事件，按批次把行数据写成带分隔符的文本。
//! 每行读完后重新校验 tick；采集器跟不上、行在读取前被覆盖时，该行计为丢失。

use crate::config::CollectorConfig;
use crate::error::TaskError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tickstate_table::{
    AccessorBase, BUILTIN_COLUMN_NAMES, CollectionEvent, ColumnAccessor, IndexRange, StateIndex,
    StateTable,
};
use tracing::{debug, info, warn};

/// 事件等待超时，用于检查停止标志
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 采集统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    /// 写出的行数
    pub rows_written: u64,
    /// 读取前已被覆盖的行数
    pub rows_lost: u64,
    /// 处理的批次数
    pub batches: u64,
}

/// 状态采集器
pub struct StateCollector {
    table: StateTable,
    events: Receiver<CollectionEvent>,
    output: Box<dyn Write + Send>,
    signals: Vec<ColumnAccessor>,
    delimiter: char,
    sampling_interval: u64,
    header_written: bool,
    sample_counter: u64,
    line: String,
    stats: CollectorStats,
}

impl StateCollector {
    /// 创建采集器
    ///
    /// `events` 来自该表构建时的 `collection_events()`。`config.signals` 为空时
    /// 采集全部用户列。
    pub fn new(
        table: StateTable,
        events: Receiver<CollectionEvent>,
        output: Box<dyn Write + Send>,
        config: &CollectorConfig,
    ) -> Result<Self, TaskError> {
        let mut collector = Self {
            table,
            events,
            output,
            signals: Vec::new(),
            delimiter: config.delimiter,
            sampling_interval: config.sampling_interval.max(1) as u64,
            header_written: false,
            sample_counter: 0,
            line: String::new(),
            stats: CollectorStats::default(),
        };

        if config.signals.is_empty() {
            let names: Vec<String> = collector
                .table
                .column_names()
                .filter(|name| !name.is_empty() && !BUILTIN_COLUMN_NAMES.contains(name))
                .map(str::to_string)
                .collect();
            for name in names {
                collector.add_signal(&name)?;
            }
        } else {
            for name in &config.signals {
                collector.add_signal(name)?;
            }
        }
        Ok(collector)
    }

    /// 追加一列
    pub fn add_signal(&mut self, name: &str) -> Result<(), TaskError> {
        let accessor = self.table.accessor_by_name(name)?;
        self.signals.push(accessor);
        Ok(())
    }

    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.signals.iter().map(|s| s.name())
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// `delay` 秒后开始采集
    pub fn start_collection(&self, delay: f64) {
        self.table.data_collection_start(delay);
    }

    /// `delay` 秒后停止采集
    pub fn stop_collection(&self, delay: f64) {
        self.table.data_collection_stop(delay);
    }

    fn write_header(&mut self) -> io::Result<()> {
        self.line.clear();
        self.line.push_str("ticks");
        for signal in &self.signals {
            self.line.push(self.delimiter);
            signal
                .write_header(self.delimiter, &mut self.line)
                .map_err(io::Error::other)?;
        }
        self.line.push('\n');
        self.output.write_all(self.line.as_bytes())?;
        self.header_written = true;
        Ok(())
    }

    /// 读一行并写出；行已被覆盖时返回 `Ok(false)`
    fn write_row(&mut self, when: StateIndex) -> io::Result<bool> {
        self.line.clear();
        write!(self.line, "{}", when.ticks()).map_err(io::Error::other)?;
        for signal in &self.signals {
            self.line.push(self.delimiter);
            if signal.to_stream(when, self.delimiter, &mut self.line).is_err() {
                return Ok(false);
            }
        }
        // 所有列读完后该行仍未被覆盖，这一行才是一致的
        if !self.table.validate_read_index(when) {
            return Ok(false);
        }
        self.line.push('\n');
        self.output.write_all(self.line.as_bytes())?;
        Ok(true)
    }

    fn collect_batch(&mut self, range: IndexRange) -> io::Result<()> {
        self.stats.batches += 1;
        for when in range.iter() {
            let sample = self.sample_counter;
            self.sample_counter += 1;
            if sample % self.sampling_interval != 0 {
                continue;
            }
            if self.write_row(when)? {
                self.stats.rows_written += 1;
            } else {
                self.stats.rows_lost += 1;
            }
        }
        Ok(())
    }

    /// 处理一个事件；收到 `Stopped` 时返回 `Ok(false)`
    pub fn process(&mut self, event: CollectionEvent) -> io::Result<bool> {
        match event {
            CollectionEvent::Started(first) => {
                info!(
                    "Collector for '{}': collection started at {}",
                    self.table.name(),
                    first
                );
                if !self.header_written {
                    self.write_header()?;
                }
                self.sample_counter = 0;
                Ok(true)
            },
            CollectionEvent::BatchReady(range) => {
                self.collect_batch(range)?;
                Ok(true)
            },
            CollectionEvent::Progress(rows) => {
                debug!("Collector for '{}': {} new rows", self.table.name(), rows);
                Ok(true)
            },
            CollectionEvent::Stopped(rows) => {
                self.output.flush()?;
                info!(
                    "Collector for '{}': collection stopped ({} rows since last report, {} written, {} lost)",
                    self.table.name(),
                    rows,
                    self.stats.rows_written,
                    self.stats.rows_lost
                );
                Ok(false)
            },
        }
    }

    /// 处理当前已到达的所有事件（不阻塞）
    pub fn drain(&mut self) -> io::Result<bool> {
        while let Ok(event) = self.events.try_recv() {
            if !self.process(event)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 阻塞运行，直到收到 `Stopped`、通道断开或 `stop` 被置位
    pub fn run(&mut self, stop: &AtomicBool) -> io::Result<CollectorStats> {
        loop {
            if stop.load(Ordering::Acquire) {
                // 把已经就绪的批次写完再退出
                self.drain()?;
                break;
            }
            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => {
                    if !self.process(event)? {
                        break;
                    }
                },
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Collector for '{}': event channel closed", self.table.name());
                    break;
                },
            }
        }
        self.output.flush()?;
        if self.stats.rows_lost > 0 {
            warn!(
                "Collector for '{}': {} rows lost to overwrite",
                self.table.name(),
                self.stats.rows_lost
            );
        }
        Ok(self.stats)
    }

    /// 在独立线程中运行
    pub fn spawn(mut self) -> Result<CollectorHandle, TaskError> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let table = self.table.clone();
        let handle = std::thread::Builder::new()
            .name(format!("tickstate-collector-{}", self.table.name()))
            .spawn(move || self.run(&thread_stop))
            .map_err(TaskError::Spawn)?;
        Ok(CollectorHandle {
            table,
            stop,
            handle: Some(handle),
        })
    }
}

impl std::fmt::Debug for StateCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCollector")
            .field("table", &self.table.name())
            .field("signals", &self.signals.len())
            .field("stats", &self.stats)
            .finish()
    }
}

/// 后台采集线程句柄
#[derive(Debug)]
pub struct CollectorHandle {
    table: StateTable,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<io::Result<CollectorStats>>>,
}

impl CollectorHandle {
    /// 请求写线程开始采集
    pub fn start_collection(&self, delay: f64) {
        self.table.data_collection_start(delay);
    }

    /// 请求写线程停止采集
    pub fn stop_collection(&self, delay: f64) {
        self.table.data_collection_stop(delay);
    }

    /// 让采集线程退出（不等待 `Stopped`）
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// 等待采集线程退出
    pub fn join(mut self) -> Result<CollectorStats, TaskError> {
        let Some(handle) = self.handle.take() else {
            return Ok(CollectorStats::default());
        };
        match handle.join() {
            Ok(result) => result.map_err(|e| TaskError::Disconnected(format!("collector: {e}"))),
            Err(_) => Err(TaskError::Disconnected("collector thread panicked".to_string())),
        }
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
