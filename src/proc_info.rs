//! 读取 `/proc` 中的进程信息
//!
//! 授权未知进程时需要它的命令行和环境变量来推断应用 ID。

use std::fs;
use std::path::PathBuf;

use anyhow::Context;

use crate::mir::Pid;

/// 进程命令行，各参数以单个空格连接。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine(String);

impl CommandLine {
    /// 解析 `/proc/<pid>/cmdline` 的内容（参数以 NUL 分隔）。
    pub fn from_raw(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let joined = text
            .split('\0')
            .filter(|arg| !arg.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.contains(needle)
    }

    /// 第一次出现 `name` 之后、直到下一个空白为止的非空文本。
    ///
    /// 例如对 `--desktop_file_hint=` 返回其后的 .desktop 路径。
    pub fn parameter(&self, name: &str) -> Option<&str> {
        let start = self.0.find(name)? + name.len();
        let rest = &self.0[start..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let value = &rest[..end];
        (!value.is_empty()).then_some(value)
    }

    pub fn args(&self) -> Vec<String> {
        self.0.split_whitespace().map(str::to_owned).collect()
    }
}

/// 进程环境变量。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment(Vec<(String, String)>);

impl Environment {
    /// 解析 `/proc/<pid>/environ` 的内容。
    pub fn from_raw(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let vars = text
            .split('\0')
            .filter_map(|entry| {
                let (key, value) = entry.split_once('=')?;
                Some((key.to_owned(), value.to_owned()))
            })
            .collect();
        Self(vars)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// 变量的值；不存在或为空时返回 `None`。
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

pub trait ProcInfo {
    fn command_line(&self, pid: Pid) -> Option<CommandLine>;
    fn environment(&self, pid: Pid) -> Option<Environment>;
    fn parent_pid(&self, pid: Pid) -> Option<Pid>;
}

/// 直接读取 `/proc` 文件系统。
#[derive(Debug, Clone)]
pub struct LinuxProcInfo {
    root: PathBuf,
}

impl Default for LinuxProcInfo {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/proc"),
        }
    }
}

impl LinuxProcInfo {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, pid: Pid, file: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.root.join(pid.to_string()).join(file);
        fs::read(&path).with_context(|| format!("error reading {path:?}"))
    }
}

impl ProcInfo for LinuxProcInfo {
    fn command_line(&self, pid: Pid) -> Option<CommandLine> {
        match self.read(pid, "cmdline") {
            Ok(raw) => Some(CommandLine::from_raw(&raw)),
            Err(err) => {
                debug!("{err:?}");
                None
            }
        }
    }

    fn environment(&self, pid: Pid) -> Option<Environment> {
        match self.read(pid, "environ") {
            Ok(raw) => Some(Environment::from_raw(&raw)),
            Err(err) => {
                debug!("{err:?}");
                None
            }
        }
    }

    fn parent_pid(&self, pid: Pid) -> Option<Pid> {
        let raw = self.read(pid, "stat").ok()?;
        parse_parent_pid(&String::from_utf8_lossy(&raw))
    }
}

// stat: "pid (comm) state ppid ..."，comm 里可能有空格和括号
fn parse_parent_pid(stat: &str) -> Option<Pid> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let mut fields = after_comm.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}
