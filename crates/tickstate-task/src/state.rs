//! 任务状态定义
//!
//! ```text
//! Constructed -> Initializing -> Ready <-> Active
//!                                  |         |
//!                                  +--> Finishing -> Finished
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// 周期任务的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[repr(u8)]
pub enum TaskState {
    /// 已创建，线程未启动
    #[default]
    Constructed = 0,
    /// 线程已启动，正在执行 `startup`
    Initializing = 1,
    /// 初始化完成，等待 `start()`
    Ready = 2,
    /// 周期运行中
    Active = 3,
    /// 收到 `kill()`，正在执行 `cleanup`
    Finishing = 4,
    /// 线程已退出
    Finished = 5,
}

impl TaskState {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Finished。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Constructed,
            1 => Self::Initializing,
            2 => Self::Ready,
            3 => Self::Active,
            4 => Self::Finishing,
            _ => Self::Finished,
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 是否已进入结束流程
    pub fn is_terminating(self) -> bool {
        self >= Self::Finishing
    }
}

/// 任务状态（原子版本，用于线程间共享）
#[derive(Debug)]
pub struct AtomicTaskState {
    inner: AtomicU8,
}

impl AtomicTaskState {
    /// 创建新的原子状态
    pub fn new(state: TaskState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    /// 获取当前状态
    pub fn get(&self) -> TaskState {
        TaskState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// 无条件设置状态
    pub fn set(&self, state: TaskState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }

    /// 比较并交换（Compare-and-Swap）
    ///
    /// 只有当前状态为 `current` 时才切换到 `new`，返回切换前的状态。
    pub fn transition(&self, current: TaskState, new: TaskState) -> Result<TaskState, TaskState> {
        self.inner
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(TaskState::from_u8)
            .map_err(TaskState::from_u8)
    }
}

impl Default for AtomicTaskState {
    fn default() -> Self {
        Self::new(TaskState::default())
    }
}
