//! run 命令
//!
//! 按配置启动示例生成器与监视器，可选地把状态表采集到 CSV，
//! 运行到指定时长或 Ctrl-C，然后输出各组件的运行指标。

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tickstate::{
    CollectorConfig, CollectorHandle, CollectorStats, ComponentManager, DEFAULT_STATE_TABLE,
    ManagerConfig, StateCollector, TaskMetricsSnapshot, TaskState,
};
use tracing::{info, warn};

use crate::demo::{
    GENERATOR, MONITOR, default_generator_config, default_monitor_config, spawn_generator,
    spawn_monitor,
};

/// 等待组件就绪的超时
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// 主线程检查停止条件的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 请求停止采集后，留给写线程发出 `Stopped` 的时间
const COLLECTION_FLUSH: Duration = Duration::from_millis(100);

/// 运行命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 配置文件路径（TOML）
    #[arg(short, long)]
    pub config: PathBuf,

    /// 运行时长（秒），缺省时运行到 Ctrl-C
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// 生成器状态表的 CSV 输出文件（覆盖配置）
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 以 JSON 输出运行指标
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    pub fn execute(&self) -> Result<()> {
        let config = ManagerConfig::load(&self.config)
            .with_context(|| format!("加载配置失败: {}", self.config.display()))?;

        let duration = self.duration.map(run_duration).transpose()?;

        let stop = Arc::new(AtomicBool::new(false));
        let handler_stop = stop.clone();
        ctrlc::set_handler(move || {
            handler_stop.store(true, Ordering::Release);
        })
        .context("注册 Ctrl-C 处理失败")?;

        if duration.is_none() {
            println!("⏳ 按 Ctrl-C 停止");
        }

        let report = run_demo(&config, self.output.as_deref(), duration, &stop)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report.to_text());
        }
        Ok(())
    }
}

/// 校验 `--duration`：正数且能表示为 `Duration`
fn run_duration(secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => bail!("运行时长必须为可表示的正数: {secs}"),
    }
}

/// 一次运行的汇总
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub elapsed_secs: f64,
    pub components: Vec<ComponentReport>,
    pub collectors: Vec<CollectorReport>,
}

#[derive(Debug, Serialize)]
pub struct ComponentReport {
    pub name: String,
    pub frequency_hz: f64,
    /// 实测平均周期（毫秒）
    pub average_period_ms: f64,
    pub metrics: TaskMetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct CollectorReport {
    pub task: String,
    pub output: Option<PathBuf>,
    pub stats: CollectorStats,
}

impl RunReport {
    fn to_text(&self) -> String {
        let mut text = format!("📊 运行 {:.2} 秒\n", self.elapsed_secs);
        for c in &self.components {
            text.push_str(&format!(
                "  {}: {} 周期, 目标 {} Hz, 平均周期 {:.3} ms, 超时 {} ({:.2}%), 错误 {}, 最长 {} µs\n",
                c.name,
                c.metrics.cycles_total,
                c.frequency_hz,
                c.average_period_ms,
                c.metrics.overruns,
                c.metrics.overrun_rate(),
                c.metrics.run_errors,
                c.metrics.max_cycle_us,
            ));
        }
        for c in &self.collectors {
            let output = c
                .output
                .as_ref()
                .map_or_else(|| "stdout".to_string(), |p| p.display().to_string());
            text.push_str(&format!(
                "  采集 {} -> {}: {} 行, 丢失 {} 行, {} 批\n",
                c.task, output, c.stats.rows_written, c.stats.rows_lost, c.stats.batches
            ));
        }
        text
    }
}

/// 运行示例组件，直到 `duration` 到期或 `stop` 被置位
pub fn run_demo(
    config: &ManagerConfig,
    output: Option<&Path>,
    duration: Option<Duration>,
    stop: &AtomicBool,
) -> Result<RunReport> {
    for task in &config.tasks {
        if task.name != GENERATOR && task.name != MONITOR {
            warn!("Ignoring task '{}': only '{GENERATOR}' and '{MONITOR}' are runnable", task.name);
        }
    }
    let generator_config = config
        .task(GENERATOR)
        .cloned()
        .unwrap_or_else(default_generator_config);
    let monitor_config = config
        .task(MONITOR)
        .cloned()
        .unwrap_or_else(default_monitor_config);
    let collectors = plan_collectors(config, output);

    let manager = ComponentManager::new();
    let generator_period = generator_config.period();
    let mut generator_events = spawn_generator(
        &manager,
        generator_config,
        collectors.iter().any(|c| c.task == GENERATOR),
    )?;
    let mut monitor_events = spawn_monitor(
        &manager,
        monitor_config,
        generator_period,
        collectors.iter().any(|c| c.task == MONITOR),
    )?;

    let mut handles: Vec<(&CollectorConfig, CollectorHandle)> = Vec::new();
    for collector in &collectors {
        let events = if collector.task == GENERATOR {
            generator_events.take()
        } else {
            monitor_events.take()
        };
        let Some(events) = events else {
            continue;
        };
        let writer: Box<dyn Write + Send> = match &collector.output {
            Some(path) => Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("创建输出文件失败: {}", path.display()))?,
            )),
            None => Box::new(io::stdout()),
        };
        let table = manager.state_table(&collector.task, &collector.table)?;
        let handle = StateCollector::new(table, events, writer, collector)?.spawn()?;
        handles.push((collector, handle));
    }

    manager.wait_for_state_all(TaskState::Ready, STARTUP_TIMEOUT)?;
    for (_, handle) in &handles {
        handle.start_collection(0.0);
    }
    manager.start_all()?;
    manager.wait_for_state_all(TaskState::Active, STARTUP_TIMEOUT)?;
    info!("Components running: {}", manager.component_names().join(", "));

    let started = Instant::now();
    while !stop.load(Ordering::Acquire) {
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    let elapsed_secs = started.elapsed().as_secs_f64();

    for (_, handle) in &handles {
        handle.stop_collection(0.0);
    }
    if !handles.is_empty() {
        thread::sleep(COLLECTION_FLUSH);
    }
    manager.suspend_all()?;

    let mut components = Vec::new();
    for name in manager.component_names() {
        let table = manager.state_table(&name, DEFAULT_STATE_TABLE)?;
        let frequency_hz = config
            .task(&name)
            .map(|t| t.frequency_hz)
            .unwrap_or_else(|| match name.as_str() {
                GENERATOR => default_generator_config().frequency_hz,
                _ => default_monitor_config().frequency_hz,
            });
        components.push(ComponentReport {
            metrics: manager.component_metrics(&name)?,
            average_period_ms: table.average_period() * 1000.0,
            frequency_hz,
            name,
        });
    }
    manager.cleanup();

    let mut collector_reports = Vec::new();
    for (collector, handle) in handles {
        handle.stop();
        collector_reports.push(CollectorReport {
            task: collector.task.clone(),
            output: collector.output.clone(),
            stats: handle.join()?,
        });
    }

    Ok(RunReport {
        elapsed_secs,
        components,
        collectors: collector_reports,
    })
}

/// 确定实际运行的采集器
///
/// 每张表只能有一个采集订阅者；示例组件只有默认状态表。
/// `--output` 覆盖生成器采集器的输出，没有时新增一个。
fn plan_collectors(config: &ManagerConfig, output: Option<&Path>) -> Vec<CollectorConfig> {
    let mut planned: Vec<CollectorConfig> = Vec::new();
    for collector in &config.collectors {
        if collector.task != GENERATOR && collector.task != MONITOR {
            warn!("Ignoring collector for non-demo task '{}'", collector.task);
            continue;
        }
        if collector.table != DEFAULT_STATE_TABLE {
            warn!(
                "Ignoring collector for '{}': no state table '{}'",
                collector.task, collector.table
            );
            continue;
        }
        if planned.iter().any(|c| c.task == collector.task) {
            warn!("Ignoring extra collector for '{}'", collector.task);
            continue;
        }
        planned.push(collector.clone());
    }

    if let Some(path) = output {
        match planned.iter_mut().find(|c| c.task == GENERATOR) {
            Some(collector) => collector.output = Some(path.to_path_buf()),
            None => {
                let mut collector = CollectorConfig::new(GENERATOR);
                collector.output = Some(path.to_path_buf());
                planned.push(collector);
            },
        }
    }
    planned
}
