//! 应用列表
//!
//! 管理所有 [`Application`]，把任务控制器的进程事件和会话事件交给对应的应用，
//! 并把应用发出的请求转给任务控制器。应用按加入顺序组成一个列表模型；进入
//! Closing 的应用离开列表，但在停止之前仍由这里持有。
//!
//! 另一个职责是连接授权：显示服务器线程上的新连接需要在 GUI 线程判断属于哪个
//! 应用，见 [`AuthorizationClient`]。

use std::collections::{HashMap, VecDeque};
use std::mem;
use std::path::Path;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;

use calloop::channel::{channel, Channel, Sender};

use super::info::ApplicationInfo;
use super::session::{SessionEvent, SessionId};
use super::session_manager::SessionManager;
use super::{
    Application, ApplicationEvent, ApplicationKey, InitialSurfaceSizes, InternalState,
    ProcessState, RequestedState, State,
};
use crate::config::{Config, TrustedProcesses};
use crate::mir::Pid;
use crate::model::{ListChange, Role, RoleData};
use crate::proc_info::ProcInfo;
use crate::task_controller::{TaskController, TaskError};
use crate::utils::short_app_id;
use crate::utils::timer::{TimerBackend, TimerToken};
use crate::wakelock::SharedWakelock;
use crate::window::surface::SurfaceId;

const DESKTOP_FILE_HINT_PARAM: &str = "--desktop_file_hint=";
const DESKTOP_FILE_HINT_ENV: &str = "DESKTOP_FILE_HINT";

/// 从配置中取出的、影响新建应用的设置。
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationSettings {
    pub close_grace: Duration,
    pub lifecycle_exempt: Vec<String>,
    pub wakelock_off: bool,
    pub wakelock_exempt: Vec<String>,
    pub trusted_processes: TrustedProcesses,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ApplicationSettings {
    fn from(config: &Config) -> Self {
        Self {
            close_grace: config.lifecycle.close_grace(),
            lifecycle_exempt: config.lifecycle.exempt_app_ids.clone(),
            wakelock_off: config.wakelock.off,
            wakelock_exempt: config.wakelock.exempt_app_ids.clone(),
            trusted_processes: config.trusted_processes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    List(ListChange),
    CountChanged,
    /// 行已经插入。
    ApplicationAdded(ApplicationKey),
    /// 行即将被删除，应用此时仍然可以查询。
    ApplicationAboutToBeRemoved(ApplicationKey),
    /// 应用没有可聚焦的表面，需要界面处理。
    FocusRequested(String),
    FocusedApplicationIdChanged,
    SurfaceFocusRequested(SurfaceId),
    Application {
        key: ApplicationKey,
        event: ApplicationEvent,
    },
}

#[derive(Debug)]
enum Deferred {
    StartProcess { app_id: String, arguments: Vec<String> },
    RetryStart { app_id: String, arguments: Vec<String> },
    FocusedChanged(ApplicationKey),
}

/// 等待旧实例关闭后再启动。
#[derive(Debug)]
struct QueuedStart {
    app_id: String,
    arguments: Vec<String>,
    waiting_for: ApplicationKey,
}

pub struct ApplicationManager {
    // 列表模型的行
    rows: Vec<ApplicationKey>,
    applications: HashMap<ApplicationKey, Application>,
    closing: Vec<ApplicationKey>,
    queued_starts: Vec<QueuedStart>,
    // 同一个 pid 可能被授权多次
    authorized_pids: Vec<(Pid, String)>,

    task_controller: Rc<dyn TaskController>,
    proc_info: Rc<dyn ProcInfo>,
    wakelock: Rc<SharedWakelock>,
    timers: Rc<dyn TimerBackend>,
    initial_sizes: InitialSurfaceSizes,
    settings: ApplicationSettings,

    model_under_change: bool,
    events: Vec<ManagerEvent>,
    deferred: VecDeque<Deferred>,
}

impl ApplicationManager {
    pub fn new(
        task_controller: Rc<dyn TaskController>,
        proc_info: Rc<dyn ProcInfo>,
        wakelock: Rc<SharedWakelock>,
        timers: Rc<dyn TimerBackend>,
        initial_sizes: InitialSurfaceSizes,
        settings: ApplicationSettings,
    ) -> Self {
        Self {
            rows: Vec::new(),
            applications: HashMap::new(),
            closing: Vec::new(),
            queued_starts: Vec::new(),
            authorized_pids: Vec::new(),
            task_controller,
            proc_info,
            wakelock,
            timers,
            initial_sizes,
            settings,
            model_under_change: false,
            events: Vec::new(),
            deferred: VecDeque::new(),
        }
    }

    /// 新设置只影响之后创建的应用，生命周期豁免除外。
    pub fn set_settings(&mut self, settings: ApplicationSettings) {
        for app in self.applications.values_mut() {
            let exempt = settings
                .lifecycle_exempt
                .iter()
                .any(|id| id == app.app_id());
            app.set_exempt_from_lifecycle(exempt);
        }
        self.settings = settings;

        let keys: Vec<_> = self.applications.keys().copied().collect();
        for key in keys {
            self.queue_row_events(key);
        }
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn key_at(&self, row: usize) -> Option<ApplicationKey> {
        self.rows.get(row).copied()
    }

    pub fn get(&self, row: usize) -> Option<&Application> {
        self.key_at(row).and_then(|key| self.applications.get(&key))
    }

    /// 列表中和正在关闭的应用都能找到。
    pub fn application(&self, key: ApplicationKey) -> Option<&Application> {
        self.applications.get(&key)
    }

    pub fn row_of(&self, key: ApplicationKey) -> Option<usize> {
        self.rows.iter().position(|k| *k == key)
    }

    /// 按行顺序。
    pub fn applications(&self) -> impl Iterator<Item = &Application> + '_ {
        self.rows.iter().filter_map(|key| self.applications.get(key))
    }

    pub fn closing_applications(&self) -> impl Iterator<Item = &Application> + '_ {
        self.closing.iter().filter_map(|key| self.applications.get(key))
    }

    pub fn find_application(&self, app_id: &str) -> Option<ApplicationKey> {
        let app_id = short_app_id(app_id);
        self.applications()
            .find(|app| app.app_id() == app_id)
            .map(Application::key)
    }

    fn find_closing(&self, app_id: &str) -> Option<ApplicationKey> {
        let app_id = short_app_id(app_id);
        self.closing_applications()
            .find(|app| app.app_id() == app_id)
            .map(Application::key)
    }

    pub fn find_with_session(&self, session: SessionId) -> Option<ApplicationKey> {
        self.applications
            .values()
            .find(|app| app.has_session(session))
            .map(Application::key)
    }

    pub fn focused_application_id(&self) -> Option<&str> {
        self.applications()
            .find(|app| app.focused())
            .map(Application::app_id)
    }

    pub fn take_events(&mut self) -> Vec<ManagerEvent> {
        mem::take(&mut self.events)
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    pub fn data(&self, row: usize, role: Role) -> Option<RoleData> {
        let app = self.get(row)?;
        let data = match role {
            Role::AppId => RoleData::String(app.app_id().to_owned()),
            Role::Name => RoleData::String(app.name().to_owned()),
            Role::Comment => RoleData::String(app.comment().to_owned()),
            Role::Icon => RoleData::String(app.icon().to_owned()),
            Role::State => RoleData::State(app.state()),
            Role::Focused => RoleData::Bool(app.focused()),
            Role::IsTouchApp => RoleData::Bool(app.is_touch_app()),
            Role::ExemptFromLifecycle => RoleData::Bool(app.exempt_from_lifecycle()),
            Role::Application => RoleData::Application(app.key()),
            Role::Window => return None,
        };
        Some(data)
    }

    pub fn start_application(
        &mut self,
        app_id: &str,
        arguments: Vec<String>,
        sessions: &mut SessionManager,
    ) -> Option<ApplicationKey> {
        let app_id = short_app_id(app_id).to_owned();
        debug!("start_application {app_id} {arguments:?}");

        if self.find_application(&app_id).is_some() {
            debug!("{app_id} is already running");
            return None;
        }

        if self.queued_starts.iter().any(|q| q.app_id == app_id) {
            debug!("{app_id} is already queued to start");
            return None;
        }

        if let Some(closing) = self.find_closing(&app_id) {
            debug!("{app_id} is closing, starting it once the old instance is gone");
            self.queued_starts.push(QueuedStart {
                app_id,
                arguments,
                waiting_for: closing,
            });
            return None;
        }

        if !self.task_controller.start(&app_id, &arguments) {
            warn!("task controller refused to start {app_id}");
            return None;
        }

        // 任务控制器可能已经同步报告了进程启动
        if let Some(key) = self.find_application(&app_id) {
            if let Some(app) = self.applications.get_mut(&key) {
                app.set_arguments(arguments);
            }
            return Some(key);
        }

        let Some(info) = self.task_controller.info_for_app(&app_id) else {
            warn!("no application info for {app_id}");
            return None;
        };

        let key = self.add(self.create_application(info, arguments));
        self.process_application_events(key, sessions);
        Some(key)
    }

    pub fn stop_application(&mut self, app_id: &str, sessions: &mut SessionManager) -> bool {
        let Some(key) = self.find_application(app_id) else {
            debug!("stop_application: {app_id} is not running");
            return false;
        };
        self.close(key, sessions);
        true
    }

    pub fn close(&mut self, key: ApplicationKey, sessions: &mut SessionManager) {
        let Some(app) = self.applications.get_mut(&key) else {
            return;
        };
        app.close(sessions);
        self.process_application_events(key, sessions);
    }

    pub fn set_requested_state(
        &mut self,
        key: ApplicationKey,
        state: RequestedState,
        sessions: &mut SessionManager,
    ) {
        let Some(app) = self.applications.get_mut(&key) else {
            return;
        };
        app.set_requested_state(state, sessions);
        self.process_application_events(key, sessions);
    }

    pub fn request_focus_application(
        &mut self,
        app_id: &str,
        sessions: &mut SessionManager,
        is_top_level: impl Fn(SurfaceId) -> bool,
    ) -> bool {
        let Some(key) = self.find_application(app_id) else {
            debug!("request_focus_application: {app_id} is not running");
            return false;
        };
        self.request_focus(key, sessions, is_top_level);
        true
    }

    fn request_focus(
        &mut self,
        key: ApplicationKey,
        sessions: &mut SessionManager,
        is_top_level: impl Fn(SurfaceId) -> bool,
    ) {
        if let Some(app) = self.applications.get_mut(&key) {
            app.request_focus(sessions, is_top_level);
        }
        self.process_application_events(key, sessions);
    }

    pub fn on_stop_timer(&mut self, key: ApplicationKey, token: TimerToken, sessions: &mut SessionManager) {
        let Some(app) = self.applications.get_mut(&key) else {
            return;
        };
        app.on_stop_timer(token);
        self.process_application_events(key, sessions);
    }

    fn set_process_state(
        &mut self,
        key: ApplicationKey,
        process_state: ProcessState,
        sessions: &mut SessionManager,
    ) {
        if let Some(app) = self.applications.get_mut(&key) {
            app.set_process_state(process_state, sessions);
        }
        self.process_application_events(key, sessions);
    }

    pub fn on_process_starting(
        &mut self,
        app_id: &str,
        sessions: &mut SessionManager,
        is_top_level: impl Fn(SurfaceId) -> bool,
    ) {
        let app_id = short_app_id(app_id);
        debug!("process starting: {app_id}");

        let key = match self.find_application(app_id) {
            Some(key) => {
                let resumable = self
                    .applications
                    .get(&key)
                    .is_some_and(|app| app.internal_state() == InternalState::StoppedResumable);
                if resumable {
                    // 被系统杀掉后又重新启动
                    self.request_focus(key, sessions, &is_top_level);
                }
                key
            }
            None => {
                // 不是通过本管理器启动的（例如从命令行）
                let Some(info) = self.task_controller.info_for_app(app_id) else {
                    warn!("no application info for {app_id}, ignoring its process");
                    return;
                };
                let key = self.add(self.create_application(info, Vec::new()));
                self.request_focus(key, sessions, &is_top_level);
                key
            }
        };

        self.set_process_state(key, ProcessState::Running, sessions);
    }

    pub fn on_process_stopped(&mut self, app_id: &str, sessions: &mut SessionManager) {
        let key = self
            .find_application(app_id)
            .or_else(|| self.find_closing(app_id));
        let Some(key) = key else {
            debug!("process stopped for unknown application {app_id}");
            return;
        };

        // 已经记录为失败时保留失败状态
        let failed = self
            .applications
            .get(&key)
            .is_some_and(|app| app.process_state() == ProcessState::Failed);
        if !failed {
            self.set_process_state(key, ProcessState::Stopped, sessions);
        }
    }

    pub fn on_process_failed(&mut self, app_id: &str, error: TaskError, sessions: &mut SessionManager) {
        let Some(key) = self.find_application(app_id) else {
            debug!("process failed for unknown application {app_id}");
            return;
        };
        info!("{app_id} failed: {error:?}");
        self.set_process_state(key, ProcessState::Failed, sessions);
    }

    pub fn on_process_suspended(&mut self, app_id: &str, sessions: &mut SessionManager) {
        let Some(key) = self.find_application(app_id) else {
            debug!("process suspended for unknown application {app_id}");
            return;
        };
        self.set_process_state(key, ProcessState::Suspended, sessions);
    }

    pub fn on_focus_requested(
        &mut self,
        app_id: &str,
        sessions: &mut SessionManager,
        is_top_level: impl Fn(SurfaceId) -> bool,
    ) {
        let Some(key) = self.find_application(app_id) else {
            debug!("focus requested for unknown application {app_id}");
            return;
        };
        self.request_focus(key, sessions, is_top_level);
    }

    pub fn on_resume_requested(
        &mut self,
        app_id: &str,
        sessions: &mut SessionManager,
        is_top_level: impl Fn(SurfaceId) -> bool,
    ) {
        let Some(key) = self.find_application(app_id) else {
            error!("resume requested for unknown application {app_id}");
            return;
        };

        let suspended = self
            .applications
            .get(&key)
            .is_some_and(|app| app.state() == State::Suspended);
        if suspended {
            self.request_focus(key, sessions, is_top_level);
        }
    }

    /// 决定是否接受来自 `pid` 的连接。无法确定时拒绝。
    pub fn authorize_session(&mut self, pid: Pid, sessions: &mut SessionManager) -> bool {
        let starting = self.applications().find(|app| {
            app.state() == State::Starting
                && self.task_controller.app_id_has_process_id(app.app_id(), pid)
        });
        if let Some(app) = starting {
            let app_id = app.app_id().to_owned();
            debug!("authorized {pid} as {app_id}");
            self.authorized_pids.push((pid, app_id));
            return true;
        }

        let Some(command_line) = self.proc_info.command_line(pid) else {
            warn!("unable to read the command line of {pid}, rejecting it");
            return false;
        };

        if self.settings.trusted_processes.matches(command_line.as_str()) {
            debug!("{pid} is a trusted process: {}", command_line.as_str());
            return true;
        }

        let hint = match command_line.parameter(DESKTOP_FILE_HINT_PARAM) {
            Some(hint) => Some(hint.to_owned()),
            None => self
                .proc_info
                .environment(pid)
                .and_then(|env| env.get(DESKTOP_FILE_HINT_ENV).map(str::to_owned)),
        };
        let Some(hint) = hint else {
            debug!("rejecting {pid}: no desktop file hint");
            return false;
        };

        let Some(app_id) = app_id_from_desktop_file(&hint) else {
            debug!("rejecting {pid}: invalid desktop file hint {hint:?}");
            return false;
        };

        let Some(info) = self.task_controller.info_for_app(&app_id) else {
            debug!("rejecting {pid}: no application info for {app_id}");
            return false;
        };

        if self.find_application(&app_id).is_none() {
            debug!("adding unmanaged application {app_id} for {pid}");
            let key = self.add(self.create_application(info, command_line.args()));
            self.process_application_events(key, sessions);
        }

        self.authorized_pids.push((pid, app_id));
        true
    }

    pub fn on_session_starting(&mut self, session: SessionId, sessions: &mut SessionManager) {
        let Some(pid) = sessions.get(session).map(|s| s.pid()) else {
            return;
        };

        let Some(idx) = self.authorized_pids.iter().position(|(p, _)| *p == pid) else {
            debug!("session from {pid} belongs to no application");
            return;
        };
        let (_, app_id) = self.authorized_pids.remove(idx);

        let Some(key) = self.find_application(&app_id) else {
            debug!("{app_id} went away before its session from {pid} started");
            return;
        };

        if let Some(app) = self.applications.get_mut(&key) {
            app.add_session(session, sessions);
        }
        self.process_application_events(key, sessions);
    }

    pub fn on_session_event(
        &mut self,
        session: SessionId,
        event: &SessionEvent,
        sessions: &mut SessionManager,
    ) {
        let Some(key) = self.find_with_session(session) else {
            return;
        };
        if let Some(app) = self.applications.get_mut(&key) {
            app.on_session_event(session, event, sessions);
        }
        self.process_application_events(key, sessions);
    }

    pub fn process_deferred(&mut self, sessions: &mut SessionManager) {
        while let Some(deferred) = self.deferred.pop_front() {
            match deferred {
                Deferred::StartProcess { app_id, arguments } => {
                    if !self.task_controller.start(&app_id, &arguments) {
                        warn!("task controller refused to start {app_id}");
                    }
                }
                Deferred::RetryStart { app_id, arguments } => {
                    self.start_application(&app_id, arguments, sessions);
                }
                Deferred::FocusedChanged(key) => {
                    self.data_changed(key, Role::Focused);
                    self.events.push(ManagerEvent::FocusedApplicationIdChanged);
                }
            }
        }
    }

    fn create_application(&self, info: Rc<ApplicationInfo>, arguments: Vec<String>) -> Application {
        let app_id = info.app_id.clone();
        let wakelock = (!self.settings.wakelock_off
            && !self.settings.wakelock_exempt.contains(&app_id))
        .then(|| self.wakelock.clone());

        let mut app = Application::new(
            info,
            arguments,
            self.timers.clone(),
            self.settings.close_grace,
            wakelock,
            self.initial_sizes.clone(),
        );
        if self.settings.lifecycle_exempt.contains(&app_id) {
            app.set_exempt_from_lifecycle(true);
        }
        app
    }

    fn add(&mut self, app: Application) -> ApplicationKey {
        assert!(!self.model_under_change);
        self.model_under_change = true;

        let key = app.key();
        debug!("adding {} to the application list", app.app_id());
        self.applications.insert(key, app);
        let row = self.rows.len();
        self.rows.push(key);

        self.events.push(ManagerEvent::List(ListChange::Inserted {
            first: row,
            last: row,
        }));
        self.events.push(ManagerEvent::CountChanged);
        self.events.push(ManagerEvent::ApplicationAdded(key));

        self.model_under_change = false;
        key
    }

    fn remove(&mut self, key: ApplicationKey) {
        let Some(row) = self.row_of(key) else {
            return;
        };

        assert!(!self.model_under_change);
        self.model_under_change = true;

        self.events.push(ManagerEvent::ApplicationAboutToBeRemoved(key));
        self.rows.remove(row);
        self.events.push(ManagerEvent::List(ListChange::Removed {
            first: row,
            last: row,
        }));
        self.events.push(ManagerEvent::CountChanged);

        self.model_under_change = false;
    }

    fn data_changed(&mut self, key: ApplicationKey, role: Role) {
        if let Some(row) = self.row_of(key) {
            self.events.push(ManagerEvent::List(ListChange::DataChanged {
                row,
                roles: vec![role],
            }));
        }
    }

    fn queue_row_events(&mut self, key: ApplicationKey) {
        let Some(app) = self.applications.get_mut(&key) else {
            return;
        };
        let events = app.take_events();
        for event in events {
            self.on_application_event(key, event.clone(), None);
            self.events.push(ManagerEvent::Application { key, event });
        }
    }

    fn process_application_events(&mut self, key: ApplicationKey, sessions: &mut SessionManager) {
        loop {
            let Some(app) = self.applications.get_mut(&key) else {
                return;
            };
            let events = app.take_events();
            if events.is_empty() {
                return;
            }

            for event in events {
                self.on_application_event(key, event.clone(), Some(&mut *sessions));
                self.events.push(ManagerEvent::Application { key, event });
            }
        }
    }

    fn on_application_event(
        &mut self,
        key: ApplicationKey,
        event: ApplicationEvent,
        sessions: Option<&mut SessionManager>,
    ) {
        match event {
            ApplicationEvent::StateChanged(_) => self.data_changed(key, Role::State),
            ApplicationEvent::FocusedChanged(_) => {
                self.deferred.push_back(Deferred::FocusedChanged(key));
            }
            ApplicationEvent::ExemptFromLifecycleChanged(_) => {
                self.data_changed(key, Role::ExemptFromLifecycle);
            }
            ApplicationEvent::FocusRequested => {
                if let Some(app) = self.applications.get(&key) {
                    let app_id = app.app_id().to_owned();
                    self.events.push(ManagerEvent::FocusRequested(app_id));
                }
            }
            ApplicationEvent::SurfaceFocusRequested(surface) => {
                self.events.push(ManagerEvent::SurfaceFocusRequested(surface));
            }
            ApplicationEvent::Closing => {
                debug!("application {} is closing", key.get());
                self.remove(key);
                if !self.closing.contains(&key) {
                    self.closing.push(key);
                }
            }
            ApplicationEvent::Stopped => {
                self.remove(key);
                self.closing.retain(|k| *k != key);
                self.drop_application(key, sessions);
            }
            ApplicationEvent::StartProcessRequested => {
                if let Some(app) = self.applications.get(&key) {
                    self.deferred.push_back(Deferred::StartProcess {
                        app_id: app.app_id().to_owned(),
                        arguments: app.arguments().to_vec(),
                    });
                }
            }
            ApplicationEvent::StopProcessRequested => {
                let Some(app) = self.applications.get_mut(&key) else {
                    return;
                };
                if !self.task_controller.stop(app.app_id()) {
                    // 不受任务控制器管理
                    debug!("{} has no managed process, terminating it", app.app_id());
                    app.terminate();
                    if let Some(sessions) = sessions {
                        app.set_process_state(ProcessState::Stopped, sessions);
                    }
                }
            }
            ApplicationEvent::SuspendProcessRequested => {
                if let Some(app) = self.applications.get(&key) {
                    if !self.task_controller.suspend(app.app_id()) {
                        debug!("task controller did not suspend {}", app.app_id());
                    }
                }
            }
            ApplicationEvent::ResumeProcessRequested => {
                if let Some(app) = self.applications.get(&key) {
                    if !self.task_controller.resume(app.app_id()) {
                        debug!("task controller did not resume {}", app.app_id());
                    }
                }
            }
            ApplicationEvent::RequestedStateChanged(_)
            | ApplicationEvent::FullscreenChanged(_)
            | ApplicationEvent::InitialSurfaceSizeChanged(_)
            | ApplicationEvent::SurfaceCountChanged(_) => (),
        }
    }

    fn drop_application(&mut self, key: ApplicationKey, sessions: Option<&mut SessionManager>) {
        let Some(app) = self.applications.remove(&key) else {
            return;
        };

        // 残留的会话不再属于任何应用
        if let Some(sessions) = sessions {
            for session in app.sessions() {
                sessions.set_application(session, None);
                sessions.stop(session);
            }
        }
        drop(app);

        let (ready, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.queued_starts)
            .into_iter()
            .partition(|q| q.waiting_for == key);
        self.queued_starts = waiting;
        for queued in ready {
            self.deferred.push_back(Deferred::RetryStart {
                app_id: queued.app_id,
                arguments: queued.arguments,
            });
        }
    }
}

impl std::fmt::Debug for ApplicationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationManager")
            .field("rows", &self.rows)
            .field("closing", &self.closing)
            .field("authorized_pids", &self.authorized_pids)
            .finish_non_exhaustive()
    }
}

/// `/usr/share/applications/foo.desktop` → `foo`
fn app_id_from_desktop_file(path: &str) -> Option<String> {
    let name = Path::new(path).file_name()?.to_str()?;
    let app_id = name.strip_suffix(".desktop").unwrap_or(name);
    if app_id.is_empty() {
        return None;
    }
    Some(short_app_id(app_id).to_owned())
}

/// 授权请求：显示服务器线程阻塞等待答复。
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub pid: Pid,
    reply: mpsc::SyncSender<bool>,
}

impl AuthorizationRequest {
    pub fn respond(self, authorized: bool) {
        // 请求方已经放弃等待
        let _ = self.reply.send(authorized);
    }
}

/// 在显示服务器线程上发起连接授权。
#[derive(Clone)]
pub struct AuthorizationClient {
    sender: Sender<AuthorizationRequest>,
}

impl std::fmt::Debug for AuthorizationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationClient").finish_non_exhaustive()
    }
}

impl AuthorizationClient {
    /// 阻塞直到 GUI 线程答复。GUI 线程已经退出时拒绝。
    pub fn authorize(&self, pid: Pid) -> bool {
        let (reply, answer) = mpsc::sync_channel(1);
        if let Err(err) = self.sender.send(AuthorizationRequest { pid, reply }) {
            warn!("error sending authorization request for {pid}: {err:?}");
            return false;
        }

        answer.recv().unwrap_or_else(|_| {
            warn!("authorization request for {pid} was dropped, rejecting it");
            false
        })
    }
}

pub fn authorization_channel() -> (AuthorizationClient, Channel<AuthorizationRequest>) {
    let (sender, channel) = channel();
    (AuthorizationClient { sender }, channel)
}
