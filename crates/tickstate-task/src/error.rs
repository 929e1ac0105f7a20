//! 任务层错误类型定义

use crate::state::TaskState;
use thiserror::Error;
use tickstate_table::StateError;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// TOML 解析失败
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// 读取配置文件失败
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// 频率非法（必须为正的有限值）
    #[error("Invalid frequency for task '{task}': {frequency_hz} Hz")]
    InvalidFrequency { task: String, frequency_hz: f64 },

    /// 历史容量过小
    #[error("History length for task '{task}' must be at least {min}, got {actual}")]
    HistoryTooShort { task: String, min: usize, actual: usize },

    /// 名称为空或重复
    #[error("Invalid name: {0}")]
    InvalidName(String),
}

/// 任务层错误类型
#[derive(Error, Debug)]
pub enum TaskError {
    /// 状态表错误
    #[error("State table error: {0}")]
    State(#[from] StateError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 组件不存在
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    /// 组件名重复
    #[error("Duplicate component: {0}")]
    DuplicateComponent(String),

    /// 接口不存在
    #[error("Unknown interface '{interface}' on component '{component}'")]
    UnknownInterface { component: String, interface: String },

    /// 状态表不存在
    #[error("Unknown state table '{table}' on component '{component}'")]
    UnknownStateTable { component: String, table: String },

    /// 命令或事件不存在
    #[error("Unknown command or event '{0}'")]
    UnknownCommand(String),

    /// 命令已存在
    #[error("Duplicate command or event '{0}'")]
    DuplicateCommand(String),

    /// 命令种类不匹配（例如把写命令绑定为读函数）
    #[error("Command '{command}' is a {actual} command, not {expected}")]
    CommandKindMismatch {
        command: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// 参数类型不匹配
    #[error("Command '{command}' carries {stored}, requested {requested}")]
    TypeMismatch {
        command: String,
        stored: &'static str,
        requested: &'static str,
    },

    /// 命令邮箱已满
    #[error("Mailbox full for command '{0}'")]
    MailboxFull(String),

    /// 接收端已退出
    #[error("Command '{0}' disconnected (task finished)")]
    Disconnected(String),

    /// 状态转换非法
    #[error("Invalid task state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TaskState, to: TaskState },

    /// 线程创建失败
    #[error("Failed to spawn thread: {0}")]
    Spawn(std::io::Error),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}
