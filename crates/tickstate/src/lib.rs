//! tickstate - 实时状态表与周期组件
//!
//! 一个写线程按固定频率发布状态快照，任意多个读线程无锁读取最新值或一段历史。
//!
//! # 架构
//!
//! - **状态表** (`table`): 环形历史缓冲区、列访问器、CSV 导出
//! - **任务层** (`task`): 周期任务、提供接口、采集器、组件管理器
//!
//! # 快速开始
//!
//! ```rust
//! use tickstate::prelude::*;
//!
//! let mut builder = StateTableBuilder::new("Main", 16);
//! let position = builder.new_element("position", 0.0f64).unwrap();
//! let mut writer = builder.build();
//! let reader = writer.reader().accessor(position).unwrap();
//!
//! writer.write(position, 1.5).unwrap();
//! writer.advance();
//! assert_eq!(reader.get_latest().unwrap(), 1.5);
//! ```

use std::error::Error;
use tracing_subscriber::EnvFilter;

pub use tickstate_table as table;
pub use tickstate_task as task;

pub mod prelude;

// 状态表常用类型
pub use tickstate_table::{
    Accessor, AccessorBase, CollectionEvent, ColumnAccessor, ColumnId, CsvOptions, History,
    IndexRange, IntervalStatistics, ManualTimeServer, StateError, StateHandle, StateIndex,
    StateTable, StateTableBuilder, StateTableWriter, StateValue, SystemTimeServer, TimeServer,
};

// 任务层常用类型
pub use tickstate_task::{
    CollectorConfig, CollectorHandle, CollectorStats, ComponentManager, ConfigError, CycleContext,
    DEFAULT_STATE_TABLE, InterfaceProvided, ManagerConfig, PeriodicTask, PeriodicTaskBuilder,
    StateCollector, TaskConfig, TaskError, TaskLogic, TaskMetricsSnapshot, TaskState,
};

/// 默认日志过滤
const DEFAULT_FILTER: &str = "info";

/// 初始化日志：`RUST_LOG` 优先，未设置时使用 `info`
///
/// 同时把 `log` crate 的记录桥接到 `tracing`。重复调用返回错误。
pub fn init_logger() -> Result<(), Box<dyn Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

/// 使用指定过滤规则初始化日志（忽略 `RUST_LOG`）
///
/// ```rust,no_run
/// tickstate::init_logger_with_filter("tickstate_task=debug,info").unwrap();
/// ```
pub fn init_logger_with_filter(directives: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    install(EnvFilter::try_new(directives)?)
}

fn install(filter: EnvFilter) -> Result<(), Box<dyn Error + Send + Sync>> {
    let max_level = filter
        .max_level_hint()
        .and_then(|level| level.into_level())
        .map_or(log::LevelFilter::Trace, level_filter);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init_with_filter(max_level)?;
    Ok(())
}

fn level_filter(level: tracing::Level) -> log::LevelFilter {
    match level {
        tracing::Level::ERROR => log::LevelFilter::Error,
        tracing::Level::WARN => log::LevelFilter::Warn,
        tracing::Level::INFO => log::LevelFilter::Info,
        tracing::Level::DEBUG => log::LevelFilter::Debug,
        tracing::Level::TRACE => log::LevelFilter::Trace,
    }
}
