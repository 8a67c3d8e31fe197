//! 应用进程的控制接口
//!
//! 应用管理器通过 [`TaskController`] 启动、停止、挂起和恢复进程，进程的状态变化以
//! [`TaskEvent`] 的形式经 calloop 通道回到 GUI 线程。

use std::rc::Rc;

use crate::application::info::ApplicationInfo;
use crate::mir::Pid;

pub mod process;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// 进程异常退出（崩溃或被系统杀死，例如内存不足）。
    Crashed,
    FailedToStart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    ProcessStarting(String),
    ProcessStopped(String),
    ProcessSuspended(String),
    ProcessFailed(String, TaskError),
    FocusRequested(String),
    ResumeRequested(String),
}

pub trait TaskController {
    /// 开始启动进程。返回 `false` 表示无法启动。
    fn start(&self, app_id: &str, arguments: &[String]) -> bool;
    fn stop(&self, app_id: &str) -> bool;
    fn suspend(&self, app_id: &str) -> bool;
    fn resume(&self, app_id: &str) -> bool;
    fn app_id_has_process_id(&self, app_id: &str, pid: Pid) -> bool;
    fn info_for_app(&self, app_id: &str) -> Option<Rc<ApplicationInfo>>;
}
