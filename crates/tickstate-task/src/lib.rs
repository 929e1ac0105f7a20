//! # tickstate-task
//!
//! 在状态表之上运行的周期任务层：
//!
//! - [`PeriodicTaskBuilder`] / [`PeriodicTask`]：每个组件一个固定频率线程
//! - [`InterfaceProvidedBuilder`] / [`InterfaceProvided`]：读状态、读历史、写命令、事件
//! - [`StateCollector`]：把状态表批次写成 CSV
//! - [`ComponentManager`]：持有所有组件，按名称查找接口和状态表
//! - [`ManagerConfig`]：TOML 配置

mod collector;
pub mod config;
mod error;
pub mod interface;
mod manager;
pub mod metrics;
pub mod state;
mod task;

pub use collector::{CollectorHandle, CollectorStats, StateCollector};
pub use config::{CollectorConfig, ManagerConfig, TaskConfig};
pub use error::{ConfigError, TaskError};
pub use interface::{
    CommandKind, EventPublisher, HistoryFunction, InterfaceProvided, InterfaceProvidedBuilder,
    Mailbox, ReadFunction, VoidFunction, WriteFunction,
};
pub use manager::ComponentManager;
pub use metrics::{TaskMetrics, TaskMetricsSnapshot};
pub use state::{AtomicTaskState, TaskState};
pub use task::{CycleContext, DEFAULT_STATE_TABLE, PeriodicTask, PeriodicTaskBuilder, TaskLogic};
