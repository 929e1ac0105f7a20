//! 周期任务运行指标
//!
//! 所有计数器都使用原子操作，可以在任何线程安全地读取，不会引入锁竞争。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 周期任务实时指标
#[derive(Debug, Default)]
pub struct TaskMetrics {
    /// 已执行的周期数
    pub cycles_total: AtomicU64,

    /// 超时（Overrun）次数：一个周期的执行时间超过了标称周期
    pub overruns: AtomicU64,

    /// 用户逻辑 `run()` 返回错误的次数
    pub run_errors: AtomicU64,

    /// 最近一个周期的执行时间（微秒）
    pub last_cycle_us: AtomicU64,

    /// 最长周期执行时间（微秒）
    pub max_cycle_us: AtomicU64,
}

impl TaskMetrics {
    /// 创建新的指标实例（所有计数器初始化为 0）
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个周期的执行时间
    pub(crate) fn record_cycle(&self, elapsed: Duration) {
        let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_us.store(us, Ordering::Relaxed);
        self.max_cycle_us.fetch_max(us, Ordering::Relaxed);
    }

    /// 获取指标快照
    ///
    /// # 性能
    ///
    /// 使用 `Ordering::Relaxed`，适合监控场景。
    pub fn snapshot(&self) -> TaskMetricsSnapshot {
        TaskMetricsSnapshot {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            run_errors: self.run_errors.load(Ordering::Relaxed),
            last_cycle_us: self.last_cycle_us.load(Ordering::Relaxed),
            max_cycle_us: self.max_cycle_us.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.cycles_total.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.run_errors.store(0, Ordering::Relaxed);
        self.last_cycle_us.store(0, Ordering::Relaxed);
        self.max_cycle_us.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变，用于读取）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TaskMetricsSnapshot {
    pub cycles_total: u64,
    pub overruns: u64,
    pub run_errors: u64,
    pub last_cycle_us: u64,
    pub max_cycle_us: u64,
}

impl TaskMetricsSnapshot {
    /// 超时率（%）
    pub fn overrun_rate(&self) -> f64 {
        if self.cycles_total == 0 {
            return 0.0;
        }
        self.overruns as f64 / self.cycles_total as f64 * 100.0
    }
}
