/// lib.rs - 外壳生命周期核心的根模块
/// 应用、会话和顶层窗口的状态机，以及把它们连起来的 `Shell`

/// tracing 的日志宏在整个 crate 中可用
#[macro_use]
extern crate tracing;

/// 应用、会话及其管理器
pub mod application;

/// 显示服务器一侧的实现（无头）
pub mod backend;

/// 命令行参数
pub mod cli;

/// 配置文件
pub mod config;

/// 仅当启用 "dbus" 功能时包含：powerd 唤醒锁
#[cfg(feature = "dbus")]
pub mod dbus;

/// 显示服务器的场景与窗口管理接口
pub mod mir;

/// 列表模型的变化通知
pub mod model;

/// 从显示服务器线程到 GUI 线程的通知
pub mod notifier;

/// 读取 /proc
pub mod proc_info;

/// 组件之间的事件分发
pub mod shell;

/// 应用进程的启动、停止、挂起和恢复
pub mod task_controller;

pub mod utils;

/// 共享唤醒锁
pub mod wakelock;

/// 表面、窗口和顶层窗口列表
pub mod window;

#[cfg(test)]
mod tests;
