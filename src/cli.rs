/// cli.rs - 命令行接口定义
/// 使用 clap 的派生宏定义参数和子命令
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::utils::version;

#[derive(Parser)]
#[command(author, version = version(), about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
#[command(subcommand_value_name = "SUBCOMMAND")]
#[command(subcommand_help_heading = "Subcommands")]
pub struct Cli {
    /// 配置文件路径（默认：`$XDG_CONFIG_HOME/shell-lifecycle/config.json`）
    ///
    /// 也可通过 `SHELL_LIFECYCLE_CONFIG` 环境变量设置，命令行参数优先。
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 作为会话的主实例运行：使用 powerd 唤醒锁并通知 systemd
    #[arg(long)]
    pub session: bool,

    /// 启动后立即启动的应用 ID
    #[arg(last = true)]
    pub command: Vec<String>,

    #[command(subcommand)]
    pub subcommand: Option<Sub>,
}

#[derive(Subcommand)]
pub enum Sub {
    /// 验证配置文件
    Validate {
        /// 配置文件路径（规则同主命令）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 生成 shell 自动补全脚本
    Completions { shell: Shell },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn trailing_apps() {
        let cli = Cli::parse_from(["shell-lifecycle", "--session", "--", "foo", "bar"]);
        assert!(cli.session);
        assert_eq!(cli.command, ["foo", "bar"]);
        assert!(cli.subcommand.is_none());
    }

    #[test]
    fn validate_subcommand() {
        let cli = Cli::parse_from(["shell-lifecycle", "validate", "-c", "/tmp/config.json"]);
        match cli.subcommand {
            Some(Sub::Validate { config }) => {
                assert_eq!(config, Some(PathBuf::from("/tmp/config.json")))
            }
            _ => panic!("expected validate"),
        }
    }
}
