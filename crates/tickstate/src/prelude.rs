//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use tickstate::prelude::*;
//! ```

// 状态表
pub use crate::table::{
    Accessor, AccessorBase, History, StateError, StateHandle, StateIndex, StateTable,
    StateTableBuilder, StateTableWriter, StateValue, SystemTimeServer, TimeServer,
};

// 任务层
pub use crate::task::{
    ComponentManager, CycleContext, InterfaceProvided, PeriodicTask, PeriodicTaskBuilder,
    TaskConfig, TaskError, TaskLogic, TaskState,
};
