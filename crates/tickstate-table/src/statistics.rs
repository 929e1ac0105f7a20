//! 周期统计
//!
//! 写线程每个周期累计一次（周期、计算耗时），每隔一个统计窗口把结果
//! 写入内建列 `PeriodStatistics`，读者像读普通列一样读取。

use crate::value::StateValue;
use bytemuck::{Pod, Zeroable};
use std::fmt::{self, Write};

/// 一个统计窗口内的周期统计（单位：秒）
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(C)]
pub struct IntervalStatistics {
    pub period_avg: f64,
    pub period_std_dev: f64,
    pub period_min: f64,
    pub period_max: f64,
    /// 计算耗时 = Toc - Tic
    pub compute_time_avg: f64,
    pub compute_time_min: f64,
    pub compute_time_max: f64,
    /// 窗口内样本数
    pub number_of_samples: u64,
    /// 窗口结束时刻
    pub end_time: f64,
}

impl IntervalStatistics {
    /// 平均频率（Hz），无样本时为 0
    pub fn frequency(&self) -> f64 {
        if self.period_avg > 0.0 {
            1.0 / self.period_avg
        } else {
            0.0
        }
    }
}

impl StateValue for IntervalStatistics {
    fn write_header(name: &str, delimiter: char, out: &mut dyn Write) -> fmt::Result {
        let fields = [
            "period_avg",
            "period_std_dev",
            "period_min",
            "period_max",
            "compute_time_avg",
            "compute_time_min",
            "compute_time_max",
            "number_of_samples",
            "end_time",
        ];
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                out.write_char(delimiter)?;
            }
            write!(out, "{name}.{field}")?;
        }
        Ok(())
    }

    fn write_raw(&self, delimiter: char, out: &mut dyn Write) -> fmt::Result {
        let d = delimiter;
        write!(
            out,
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            self.period_avg,
            self.period_std_dev,
            self.period_min,
            self.period_max,
            self.compute_time_avg,
            self.compute_time_min,
            self.compute_time_max,
            self.number_of_samples,
            self.end_time,
        )
    }
}

/// 写线程本地的累加器
#[derive(Debug, Clone)]
pub(crate) struct IntervalAccumulator {
    interval: f64,
    window_start: Option<f64>,
    samples: u64,
    period_sum: f64,
    period_sq_sum: f64,
    period_min: f64,
    period_max: f64,
    compute_sum: f64,
    compute_min: f64,
    compute_max: f64,
}

impl IntervalAccumulator {
    pub(crate) fn new(interval: f64) -> Self {
        Self {
            interval,
            window_start: None,
            samples: 0,
            period_sum: 0.0,
            period_sq_sum: 0.0,
            period_min: f64::MAX,
            period_max: 0.0,
            compute_sum: 0.0,
            compute_min: f64::MAX,
            compute_max: 0.0,
        }
    }

    /// 累计一个周期；窗口结束时返回统计结果并开始新窗口
    pub(crate) fn update(
        &mut self,
        period: f64,
        compute_time: f64,
        now: f64,
    ) -> Option<IntervalStatistics> {
        let start = *self.window_start.get_or_insert(now);

        self.samples += 1;
        self.period_sum += period;
        self.period_sq_sum += period * period;
        self.period_min = self.period_min.min(period);
        self.period_max = self.period_max.max(period);
        self.compute_sum += compute_time;
        self.compute_min = self.compute_min.min(compute_time);
        self.compute_max = self.compute_max.max(compute_time);

        if now - start < self.interval {
            return None;
        }

        let n = self.samples as f64;
        let period_avg = self.period_sum / n;
        let variance = (self.period_sq_sum / n - period_avg * period_avg).max(0.0);
        let stats = IntervalStatistics {
            period_avg,
            period_std_dev: variance.sqrt(),
            period_min: self.period_min,
            period_max: self.period_max,
            compute_time_avg: self.compute_sum / n,
            compute_time_min: self.compute_min,
            compute_time_max: self.compute_max,
            number_of_samples: self.samples,
            end_time: now,
        };
        *self = Self::new(self.interval);
        self.window_start = Some(now);
        Some(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_publishes_after_interval() {
        let mut acc = IntervalAccumulator::new(1.0);
        let mut t = 0.0;
        let mut published = None;
        for _ in 0..20 {
            t += 0.1;
            if let Some(stats) = acc.update(0.1, 0.02, t) {
                published = Some(stats);
                break;
            }
        }
        let stats = published.expect("window should close after 1s");
        assert!((stats.period_avg - 0.1).abs() < 1e-9);
        assert!(stats.period_std_dev < 1e-6);
        assert!((stats.compute_time_max - 0.02).abs() < 1e-12);
        assert!(stats.number_of_samples >= 10);
        assert!((stats.frequency() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_accumulator_min_max() {
        let mut acc = IntervalAccumulator::new(0.5);
        assert!(acc.update(0.1, 0.01, 0.0).is_none());
        assert!(acc.update(0.3, 0.05, 0.2).is_none());
        let stats = acc.update(0.2, 0.03, 0.6).unwrap();
        assert_eq!(stats.number_of_samples, 3);
        assert_eq!(stats.period_min, 0.1);
        assert_eq!(stats.period_max, 0.3);
        assert_eq!(stats.compute_time_min, 0.01);
    }

    proptest::proptest! {
        /// 窗口统计与直接计算一致
        #[test]
        fn prop_window_matches_direct_computation(
            periods in proptest::collection::vec(0.001f64..0.1, 1..64),
        ) {
            let mut acc = IntervalAccumulator::new(f64::MAX);
            for (k, period) in periods.iter().enumerate() {
                proptest::prop_assert!(acc.update(*period, period / 2.0, k as f64).is_none());
            }
            // 窗口为 0 时下一次更新立即结束窗口
            acc.interval = 0.0;
            let last = 0.05;
            let stats = acc.update(last, last / 2.0, periods.len() as f64).unwrap();

            let mut all = periods.clone();
            all.push(last);
            let n = all.len() as f64;
            let mean = all.iter().sum::<f64>() / n;
            let variance = all.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / n;
            let min = all.iter().cloned().fold(f64::MAX, f64::min);
            let max = all.iter().cloned().fold(0.0, f64::max);

            proptest::prop_assert_eq!(stats.number_of_samples, all.len() as u64);
            proptest::prop_assert!((stats.period_avg - mean).abs() < 1e-9);
            proptest::prop_assert!((stats.period_std_dev - variance.sqrt()).abs() < 1e-6);
            proptest::prop_assert_eq!(stats.period_min, min);
            proptest::prop_assert_eq!(stats.period_max, max);
            proptest::prop_assert!((stats.compute_time_avg - mean / 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_header_matches_field_count() {
        let mut header = String::new();
        IntervalStatistics::write_header("stats", ',', &mut header).unwrap();
        let mut raw = String::new();
        IntervalStatistics::default().write_raw(',', &mut raw).unwrap();
        assert_eq!(header.split(',').count(), raw.split(',').count());
    }
}
