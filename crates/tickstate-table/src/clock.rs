//! 时间源
//!
//! 状态表只需要“当前相对时间（秒）”，由 [`TimeServer`] 提供。
//! 同一个组件管理器下的所有表共享一个时间源，保证 Tic/Toc 可比较。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// 时间源接口
pub trait TimeServer: Send + Sync + fmt::Debug {
    /// 相对于时间源起点的秒数（单调不减）
    fn relative_time(&self) -> f64;
}

/// 基于单调时钟的时间源
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeServer {
    origin: Instant,
}

impl SystemTimeServer {
    /// 以当前时刻为起点
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeServer for SystemTimeServer {
    fn relative_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// 手动推进的时间源（测试、离线仿真）
///
/// 时间以 f64 位模式存放在原子变量中，可以跨线程共享。
#[derive(Debug, Default)]
pub struct ManualTimeServer {
    now: AtomicU64,
}

impl ManualTimeServer {
    pub fn new(start: f64) -> Self {
        Self {
            now: AtomicU64::new(start.to_bits()),
        }
    }

    /// 设置当前时间
    pub fn set(&self, seconds: f64) {
        self.now.store(seconds.to_bits(), Ordering::Release);
    }

    /// 前进 `seconds` 秒（仅由一个线程调用）
    pub fn advance(&self, seconds: f64) {
        self.set(self.relative_time() + seconds);
    }
}

impl TimeServer for ManualTimeServer {
    fn relative_time(&self) -> f64 {
        f64::from_bits(self.now.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_time_server() {
        let clock = ManualTimeServer::new(1.0);
        assert_eq!(clock.relative_time(), 1.0);
        clock.advance(0.25);
        assert_eq!(clock.relative_time(), 1.25);
        clock.set(10.0);
        assert_eq!(clock.relative_time(), 10.0);
    }

    #[test]
    fn test_system_time_server_monotonic() {
        let clock = SystemTimeServer::new();
        let a = clock.relative_time();
        let b = clock.relative_time();
        assert!(a >= 0.0);
        assert!(b >= a);
    }
}
