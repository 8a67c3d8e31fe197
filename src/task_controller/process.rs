//! 直接管理子进程的任务控制器
//!
//! 启动命令来自配置。挂起和恢复用 SIGSTOP/SIGCONT，停止用 SIGTERM。进程退出由
//! 等待线程发现，并通过 calloop 通道报告给 GUI 线程。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use calloop::channel::{channel, Channel, Sender};

use super::{TaskController, TaskError, TaskEvent};
use crate::application::info::ApplicationInfo;
use crate::mir::Pid;
use crate::proc_info::ProcInfo;
use crate::utils::spawning::{spawn_application, wait_in_background, ExitKind};

// 客户端可能是启动脚本的子孙进程
const MAX_ANCESTOR_DEPTH: usize = 8;

pub struct ProcessTaskController {
    infos: RefCell<HashMap<String, Rc<ApplicationInfo>>>,
    running: Arc<Mutex<HashMap<String, Pid>>>,
    events: Sender<TaskEvent>,
    proc_info: Rc<dyn ProcInfo>,
}

impl ProcessTaskController {
    pub fn new(
        infos: impl IntoIterator<Item = ApplicationInfo>,
        proc_info: Rc<dyn ProcInfo>,
    ) -> (Self, Channel<TaskEvent>) {
        let (events, channel) = channel();
        let controller = Self {
            infos: RefCell::new(HashMap::new()),
            running: Arc::new(Mutex::new(HashMap::new())),
            events,
            proc_info,
        };
        controller.set_infos(infos);
        (controller, channel)
    }

    /// 替换应用元数据（配置重新加载后）。
    pub fn set_infos(&self, infos: impl IntoIterator<Item = ApplicationInfo>) {
        let infos = infos
            .into_iter()
            .map(|info| (info.app_id.clone(), Rc::new(info)))
            .collect();
        *self.infos.borrow_mut() = infos;
    }

    fn pid_of(&self, app_id: &str) -> Option<Pid> {
        self.running.lock().unwrap().get(app_id).copied()
    }

    fn send(&self, event: TaskEvent) {
        if let Err(err) = self.events.send(event) {
            warn!("error sending task event: {err:?}");
        }
    }

    fn signal(&self, app_id: &str, signal: libc::c_int) -> bool {
        let Some(pid) = self.pid_of(app_id) else {
            debug!("{app_id} has no running process");
            return false;
        };

        if unsafe { libc::kill(pid, signal) } != 0 {
            let err = std::io::Error::last_os_error();
            warn!("error sending signal {signal} to {app_id} ({pid}): {err:?}");
            return false;
        }

        true
    }
}

impl TaskController for ProcessTaskController {
    fn start(&self, app_id: &str, arguments: &[String]) -> bool {
        let Some(info) = self.info_for_app(app_id) else {
            warn!("no application info for {app_id}");
            return false;
        };

        if info.exec.is_empty() {
            warn!("{app_id} has no command to start it with");
            return false;
        }

        if self.pid_of(app_id).is_some() {
            debug!("{app_id} is already running");
            return false;
        }

        let command: Vec<&str> = info
            .exec
            .iter()
            .chain(arguments)
            .map(String::as_str)
            .collect();

        let child = match spawn_application(&command, app_id) {
            Ok(child) => child,
            Err(err) => {
                warn!("error spawning {command:?}: {err:?}");
                self.send(TaskEvent::ProcessFailed(app_id.to_owned(), TaskError::FailedToStart));
                return false;
            }
        };

        let pid = child.id() as Pid;
        debug!("started {app_id} with pid {pid}");
        self.running
            .lock()
            .unwrap()
            .insert(app_id.to_owned(), pid);
        self.send(TaskEvent::ProcessStarting(app_id.to_owned()));

        let running = self.running.clone();
        let events = self.events.clone();
        let name = app_id.to_owned();
        let res = wait_in_background(child, app_id.to_owned(), move |status| {
            running.lock().unwrap().remove(&name);

            let kind = match status {
                Ok(status) => {
                    debug!("{name} exited: {status:?}");
                    ExitKind::from_status(status)
                }
                Err(err) => {
                    warn!("error waiting for {name}: {err:?}");
                    ExitKind::Failed
                }
            };

            if kind == ExitKind::Failed {
                let _ = events.send(TaskEvent::ProcessFailed(name.clone(), TaskError::Crashed));
            }
            let _ = events.send(TaskEvent::ProcessStopped(name));
        });

        if let Err(err) = res {
            warn!("error spawning waiter thread for {app_id}: {err:?}");
        }

        true
    }

    fn stop(&self, app_id: &str) -> bool {
        self.signal(app_id, libc::SIGTERM)
    }

    fn suspend(&self, app_id: &str) -> bool {
        if !self.signal(app_id, libc::SIGSTOP) {
            return false;
        }
        self.send(TaskEvent::ProcessSuspended(app_id.to_owned()));
        true
    }

    fn resume(&self, app_id: &str) -> bool {
        self.signal(app_id, libc::SIGCONT)
    }

    fn app_id_has_process_id(&self, app_id: &str, pid: Pid) -> bool {
        let Some(app_pid) = self.pid_of(app_id) else {
            return false;
        };

        let mut current = pid;
        for _ in 0..MAX_ANCESTOR_DEPTH {
            if current == app_pid {
                return true;
            }
            match self.proc_info.parent_pid(current) {
                Some(parent) if parent > 1 => current = parent,
                _ => return false,
            }
        }

        false
    }

    fn info_for_app(&self, app_id: &str) -> Option<Rc<ApplicationInfo>> {
        self.infos.borrow().get(app_id).cloned()
    }
}
