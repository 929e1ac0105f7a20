//! # tickstate CLI
//!
//! 运行示例组件、校验配置文件。
//!
//! ```bash
//! # 校验配置
//! tickstate-cli check demo.toml
//!
//! # 运行 10 秒，把生成器的状态表采集到 CSV
//! tickstate-cli run --config demo.toml --duration 10 --output generator.csv
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod demo;

use commands::{CheckCommand, RunCommand};

/// tickstate CLI - 周期组件运行工具
#[derive(Parser, Debug)]
#[command(name = "tickstate-cli")]
#[command(about = "Run and inspect tickstate periodic components", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行示例生成器与监视器
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 校验配置文件
    Check {
        #[command(flatten)]
        args: CheckCommand,
    },
}

fn main() -> Result<()> {
    tickstate::init_logger().map_err(|e| anyhow::anyhow!(e))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Check { args } => args.execute(),
    }
}
