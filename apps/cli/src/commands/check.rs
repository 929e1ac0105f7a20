//! check 命令
//!
//! 解析并校验配置文件

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tickstate::ManagerConfig;

/// 配置校验命令参数
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// 配置文件路径（TOML）
    pub path: PathBuf,
}

impl CheckCommand {
    pub fn execute(&self) -> Result<()> {
        let config = ManagerConfig::load(&self.path)
            .with_context(|| format!("配置无效: {}", self.path.display()))?;

        println!("✅ {}", self.path.display());
        print!("{}", describe(&config));
        Ok(())
    }
}

/// 配置摘要
fn describe(config: &ManagerConfig) -> String {
    let mut text = format!("📋 {} 个任务:\n", config.tasks.len());
    for task in &config.tasks {
        text.push_str(&format!(
            "  {}: {} Hz (周期 {:?}), 历史 {} 行, 统计间隔 {} ms{}\n",
            task.name,
            task.frequency_hz,
            task.period(),
            task.history_length,
            task.statistics_interval_ms,
            if task.realtime { ", 实时优先级" } else { "" },
        ));
    }

    text.push_str(&format!("📋 {} 个采集器:\n", config.collectors.len()));
    for collector in &config.collectors {
        let signals = if collector.signals.is_empty() {
            "全部".to_string()
        } else {
            collector.signals.join(", ")
        };
        let output = collector
            .output
            .as_ref()
            .map_or_else(|| "stdout".to_string(), |p| p.display().to_string());
        text.push_str(&format!(
            "  {}/{} -> {} (列: {}, 每 {} 行取 1 行)\n",
            collector.task, collector.table, output, signals, collector.sampling_interval
        ));
    }
    text
}
