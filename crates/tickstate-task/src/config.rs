//! 任务与采集配置（TOML）
//!
//! ```toml
//! [[tasks]]
//! name = "generator"
//! frequency_hz = 500.0
//! history_length = 256
//!
//! [[tasks]]
//! name = "monitor"
//! frequency_hz = 10.0
//!
//! [[collectors]]
//! task = "generator"
//! signals = ["position", "counter"]
//! output = "generator.csv"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tickstate_table::MIN_HISTORY_LENGTH;

fn default_frequency_hz() -> f64 {
    100.0
}

fn default_history_length() -> usize {
    256
}

fn default_statistics_interval_ms() -> u64 {
    1000
}

fn default_mailbox_capacity() -> usize {
    64
}

fn default_delimiter() -> char {
    ','
}

fn default_sampling_interval() -> usize {
    1
}

fn default_table() -> String {
    crate::task::DEFAULT_STATE_TABLE.to_string()
}

/// 周期任务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// 组件名（管理器内唯一）
    pub name: String,

    /// 运行频率（Hz）
    ///
    /// 例如：500.0 表示 500Hz（2ms 周期）
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,

    /// 默认状态表的历史容量（行）
    #[serde(default = "default_history_length")]
    pub history_length: usize,

    /// 是否提升线程优先级（需要 `realtime` feature）
    #[serde(default)]
    pub realtime: bool,

    /// 周期统计窗口（毫秒）
    #[serde(default = "default_statistics_interval_ms")]
    pub statistics_interval_ms: u64,

    /// 写命令邮箱默认容量
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl TaskConfig {
    /// 以默认参数创建
    pub fn new(name: impl Into<String>, frequency_hz: f64) -> Self {
        Self {
            name: name.into(),
            frequency_hz,
            history_length: default_history_length(),
            realtime: false,
            statistics_interval_ms: default_statistics_interval_ms(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }

    /// 设置历史容量
    pub fn with_history_length(mut self, history_length: usize) -> Self {
        self.history_length = history_length;
        self
    }

    /// 标称周期（校验通过的配置总是可表示的非零时长）
    pub fn period(&self) -> Duration {
        self.nominal_period().unwrap_or(Duration::MAX)
    }

    fn nominal_period(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(1.0 / self.frequency_hz)
            .ok()
            .filter(|period| !period.is_zero())
    }

    pub fn statistics_interval(&self) -> Duration {
        Duration::from_millis(self.statistics_interval_ms)
    }

    /// 校验参数
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidName("task name is empty".to_string()));
        }
        if !self.frequency_hz.is_finite()
            || self.frequency_hz <= 0.0
            || self.nominal_period().is_none()
        {
            return Err(ConfigError::InvalidFrequency {
                task: self.name.clone(),
                frequency_hz: self.frequency_hz,
            });
        }
        if self.history_length < MIN_HISTORY_LENGTH {
            return Err(ConfigError::HistoryTooShort {
                task: self.name.clone(),
                min: MIN_HISTORY_LENGTH,
                actual: self.history_length,
            });
        }
        Ok(())
    }
}

/// 状态采集配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// 被采集的组件
    pub task: String,

    /// 被采集的状态表
    #[serde(default = "default_table")]
    pub table: String,

    /// 采集的列名（空表示全部用户列）
    #[serde(default)]
    pub signals: Vec<String>,

    /// 输出文件（`None` 表示标准输出）
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// 字段分隔符
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// 每 k 行取一行
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval: usize,
}

impl CollectorConfig {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            table: default_table(),
            signals: Vec::new(),
            output: None,
            delimiter: default_delimiter(),
            sampling_interval: default_sampling_interval(),
        }
    }
}

/// 管理器配置（一个 TOML 文件）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,

    #[serde(default)]
    pub collectors: Vec<CollectorConfig>,
}

impl ManagerConfig {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 校验全部任务，以及名称唯一性和采集目标
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, task) in self.tasks.iter().enumerate() {
            task.validate()?;
            if self.tasks[..i].iter().any(|t| t.name == task.name) {
                return Err(ConfigError::InvalidName(format!(
                    "duplicate task name '{}'",
                    task.name
                )));
            }
        }
        for collector in &self.collectors {
            if self.task(&collector.task).is_none() {
                return Err(ConfigError::InvalidName(format!(
                    "collector refers to unknown task '{}'",
                    collector.task
                )));
            }
            if collector.sampling_interval == 0 {
                return Err(ConfigError::InvalidName(format!(
                    "collector for '{}' has sampling interval 0",
                    collector.task
                )));
            }
        }
        Ok(())
    }

    /// 按名称查找任务配置
    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
