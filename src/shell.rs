//! 把各个组件连起来的上下文
//!
//! 组件之间不直接调用，而是各自把对外的影响记录成事件。[`Shell`] 在每个入口
//! （显示服务器通知、任务控制器事件、定时器、界面操作）之后把这些事件分发到
//! 其他组件，直到没有新事件为止。需要推迟到下一轮事件循环的工作由各组件自己
//! 排队，[`Shell::process_deferred`] 在空闲回调中执行它们。

use std::rc::Rc;

use calloop::LoopHandle;
use smithay::utils::{Logical, Point, Size};

use crate::application::manager::{
    ApplicationManager, ApplicationSettings, AuthorizationRequest, ManagerEvent,
};
use crate::application::session::{SessionEvent, SessionId};
use crate::application::session_manager::SessionManager;
use crate::application::{ApplicationKey, InitialSurfaceSizes, RequestedState};
use crate::config::Config;
use crate::mir::{Pid, PromptSessionManager, WindowController, WindowState};
use crate::notifier::{Notification, SceneEvent};
use crate::proc_info::ProcInfo;
use crate::task_controller::{TaskController, TaskEvent};
use crate::utils::timer::{TimerBackend, TimerSink, TimerTarget, TimerToken};
use crate::wakelock::SharedWakelock;
use crate::window::surface::SurfaceId;
use crate::window::surface_manager::{SurfaceManager, SurfaceManagerEvent};
use crate::window::toplevel::{ModelEvent, TopLevelWindowModel};
use crate::window::WindowChange;

/// 交给界面的变化。
#[derive(Debug, Clone, PartialEq)]
pub enum ShellEvent {
    Applications(ManagerEvent),
    Windows(ModelEvent),
}

/// 外部协作者。
pub struct Collaborators {
    pub task_controller: Rc<dyn TaskController>,
    pub proc_info: Rc<dyn ProcInfo>,
    pub prompt_sessions: Rc<dyn PromptSessionManager>,
    pub window_controller: Rc<dyn WindowController>,
    pub wakelock: Rc<SharedWakelock>,
    pub timers: Rc<dyn TimerBackend>,
}

pub struct Shell {
    pub sessions: SessionManager,
    pub applications: ApplicationManager,
    pub surfaces: SurfaceManager,
    pub windows: TopLevelWindowModel,
    initial_sizes: InitialSurfaceSizes,

    // 没有事件循环时（测试中）由调用者执行推迟的工作
    loop_handle: Option<LoopHandle<'static, Shell>>,
    idle_scheduled: bool,
    events: Vec<ShellEvent>,
}

impl Shell {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        let Collaborators {
            task_controller,
            proc_info,
            prompt_sessions,
            window_controller,
            wakelock,
            timers,
        } = collaborators;

        let initial_sizes = InitialSurfaceSizes::new();
        let sessions = SessionManager::new(
            prompt_sessions,
            timers.clone(),
            config.lifecycle.suspend_grace(),
        );
        let applications = ApplicationManager::new(
            task_controller,
            proc_info,
            wakelock,
            timers,
            initial_sizes.clone(),
            ApplicationSettings::from(config),
        );

        Self {
            sessions,
            applications,
            surfaces: SurfaceManager::new(window_controller),
            windows: TopLevelWindowModel::new(),
            initial_sizes,
            loop_handle: None,
            idle_scheduled: false,
            events: Vec::new(),
        }
    }

    /// 推迟的工作交给这个事件循环的空闲回调。
    pub fn set_loop_handle(&mut self, handle: LoopHandle<'static, Shell>) {
        self.loop_handle = Some(handle);
        self.defer();
    }

    /// 显示服务器线程查询初始表面大小用。
    pub fn initial_sizes(&self) -> &InitialSurfaceSizes {
        &self.initial_sizes
    }

    pub fn take_events(&mut self) -> Vec<ShellEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_deferred(&self) -> bool {
        self.sessions.has_deferred() || self.applications.has_deferred() || self.windows.has_deferred()
    }

    pub fn reload_config(&mut self, config: &Config) {
        debug!("applying new config");
        self.sessions
            .set_suspend_grace(config.lifecycle.suspend_grace());
        self.applications
            .set_settings(ApplicationSettings::from(config));
        self.dispatch();
    }

    pub fn handle_notification(&mut self, notification: Notification) {
        match notification {
            Notification::Window(event) => self.surfaces.handle(event, &mut self.sessions),
            Notification::Scene(event) => self.handle_scene_event(event),
        }
        self.dispatch();
    }

    fn handle_scene_event(&mut self, event: SceneEvent) {
        match event {
            SceneEvent::SessionStarting(scene) => {
                let id = self.sessions.on_session_starting(scene);
                self.applications.on_session_starting(id, &mut self.sessions);
            }
            SceneEvent::SessionStopping(scene) => {
                self.sessions.on_session_stopping(&scene);
            }
            SceneEvent::PromptSessionStarting(prompt_session) => {
                self.sessions.on_prompt_session_starting(prompt_session);
            }
            SceneEvent::PromptSessionStopping(prompt_session) => {
                self.sessions.on_prompt_session_stopping(prompt_session);
            }
            SceneEvent::PromptProviderAdded(prompt_session, provider) => {
                self.sessions
                    .on_prompt_provider_added(prompt_session, &provider);
            }
            SceneEvent::PromptProviderRemoved(_, provider) => {
                self.sessions.on_prompt_provider_removed(&provider);
            }
        }
    }

    pub fn handle_task_event(&mut self, event: TaskEvent) {
        let surfaces = &self.surfaces;
        let is_top_level = |id: SurfaceId| surfaces.is_top_level(id);
        let sessions = &mut self.sessions;

        match event {
            TaskEvent::ProcessStarting(app_id) => {
                self.applications
                    .on_process_starting(&app_id, sessions, is_top_level)
            }
            TaskEvent::ProcessStopped(app_id) => {
                self.applications.on_process_stopped(&app_id, sessions)
            }
            TaskEvent::ProcessSuspended(app_id) => {
                self.applications.on_process_suspended(&app_id, sessions)
            }
            TaskEvent::ProcessFailed(app_id, error) => {
                self.applications.on_process_failed(&app_id, error, sessions)
            }
            TaskEvent::FocusRequested(app_id) => {
                self.applications
                    .on_focus_requested(&app_id, sessions, is_top_level)
            }
            TaskEvent::ResumeRequested(app_id) => {
                self.applications
                    .on_resume_requested(&app_id, sessions, is_top_level)
            }
        }
        self.dispatch();
    }

    pub fn handle_authorization(&mut self, request: AuthorizationRequest) {
        let authorized = self.authorize_session(request.pid);
        request.respond(authorized);
    }

    pub fn authorize_session(&mut self, pid: Pid) -> bool {
        let authorized = self
            .applications
            .authorize_session(pid, &mut self.sessions);
        self.dispatch();
        authorized
    }

    pub fn start_application(&mut self, app_id: &str, arguments: Vec<String>) -> Option<ApplicationKey> {
        let key = self
            .applications
            .start_application(app_id, arguments, &mut self.sessions);
        self.dispatch();
        key
    }

    pub fn stop_application(&mut self, app_id: &str) -> bool {
        let stopped = self
            .applications
            .stop_application(app_id, &mut self.sessions);
        self.dispatch();
        stopped
    }

    pub fn request_focus_application(&mut self, app_id: &str) -> bool {
        let surfaces = &self.surfaces;
        let found = self.applications.request_focus_application(
            app_id,
            &mut self.sessions,
            |id: SurfaceId| surfaces.is_top_level(id),
        );
        self.dispatch();
        found
    }

    pub fn set_requested_state(&mut self, key: ApplicationKey, state: RequestedState) {
        self.applications
            .set_requested_state(key, state, &mut self.sessions);
        self.dispatch();
    }

    pub fn raise_window(&mut self, id: i32) {
        self.windows.raise_id(id, &self.surfaces);
        self.dispatch();
    }

    pub fn focus_window(&mut self, id: i32) {
        self.windows.request_focus(id, &mut self.surfaces);
        self.dispatch();
    }

    pub fn close_window(&mut self, id: i32) {
        self.windows
            .close(id, &mut self.surfaces, &mut self.sessions);
        self.dispatch();
    }

    pub fn request_window_state(&mut self, id: i32, state: WindowState) {
        self.windows.request_state(id, state, &self.surfaces);
        self.dispatch();
    }

    pub fn move_window(&mut self, id: i32, position: Point<i32, Logical>) {
        self.windows
            .set_requested_position(id, position, &self.surfaces);
        self.dispatch();
    }

    pub fn resize_surface(&mut self, id: SurfaceId, size: Size<i32, Logical>) {
        self.surfaces.resize(id, size, &self.sessions);
        self.dispatch();
    }

    pub fn register_view(&mut self, surface: SurfaceId, view: u64) {
        self.surfaces.register_view(surface, view);
    }

    pub fn unregister_view(&mut self, surface: SurfaceId, view: u64) {
        self.surfaces
            .unregister_view(surface, view, &mut self.sessions);
        self.dispatch();
    }

    /// 执行上一轮排队的工作。
    pub fn process_deferred(&mut self) {
        let _span = trace_span!("process_deferred").entered();

        self.idle_scheduled = false;
        self.sessions.process_deferred();
        self.applications.process_deferred(&mut self.sessions);
        self.windows.process_deferred(&self.surfaces);
        self.dispatch();
    }

    fn defer(&mut self) {
        if self.idle_scheduled || !self.has_deferred() {
            return;
        }
        if let Some(handle) = &self.loop_handle {
            handle.insert_idle(|shell| shell.process_deferred());
            self.idle_scheduled = true;
        }
    }

    /// 在组件之间传递事件，直到没有新事件。
    fn dispatch(&mut self) {
        let _span = trace_span!("dispatch").entered();

        loop {
            let mut progressed = false;

            for (session, event) in self.sessions.take_events() {
                progressed = true;
                self.on_session_event(session, event);
            }

            for event in self.surfaces.take_events() {
                progressed = true;
                self.on_surface_event(event);
            }

            for event in self.applications.take_events() {
                progressed = true;
                self.on_manager_event(&event);
                self.events.push(ShellEvent::Applications(event));
            }

            for event in self.windows.take_events() {
                progressed = true;
                self.on_model_event(&event);
                self.events.push(ShellEvent::Windows(event));
            }

            if !progressed {
                break;
            }
        }

        self.defer();
    }

    fn on_session_event(&mut self, session: SessionId, event: SessionEvent) {
        trace!("session {}: {event:?}", session.get());

        match &event {
            SessionEvent::SetFrameDroppers { surfaces, running } => {
                self.surfaces.set_frame_dropping(surfaces, !running);
            }
            SessionEvent::CloseSurfaces(surfaces) => {
                for surface in surfaces {
                    self.surfaces.close(*surface, &mut self.sessions);
                }
            }
            SessionEvent::StateChanged(state) => {
                self.surfaces.on_session_state_changed(session, *state);
            }
            _ => (),
        }

        self.applications
            .on_session_event(session, &event, &mut self.sessions);
    }

    fn on_surface_event(&mut self, event: SurfaceManagerEvent) {
        match event {
            SurfaceManagerEvent::Created(id) => {
                let application = self
                    .surfaces
                    .get(id)
                    .and_then(|s| s.session())
                    .and_then(|session| self.applications.find_with_session(session))
                    // 正在关闭的应用已经离开列表，不再为它添加窗口
                    .filter(|key| self.applications.row_of(*key).is_some())
                    .and_then(|key| self.applications.application(key));
                let application = application.map(|app| (app.key(), app.app_id()));
                self.windows
                    .on_surface_created(id, application, &self.surfaces);
            }
            SurfaceManagerEvent::Surface(id, event) => {
                let applications = &self.applications;
                self.windows
                    .on_surface_event(id, &event, &self.surfaces, |key| {
                        applications.application(key).map(|app| app.state())
                    });
            }
            SurfaceManagerEvent::Destroyed { surface, .. } => {
                self.windows.on_surface_destroyed(surface);
            }
            SurfaceManagerEvent::Raised(surfaces) => self.windows.on_surfaces_raised(&surfaces),
            SurfaceManagerEvent::ModificationsStarted => self.windows.on_modifications_started(),
            SurfaceManagerEvent::ModificationsEnded => self.windows.on_modifications_ended(),
        }
    }

    fn on_manager_event(&mut self, event: &ManagerEvent) {
        match event {
            ManagerEvent::ApplicationAdded(key) => {
                if let Some(app) = self.applications.application(*key) {
                    self.windows.add_application(
                        *key,
                        app.app_id(),
                        app.state(),
                        app.surface_count(),
                        &self.surfaces,
                    );
                }
            }
            ManagerEvent::ApplicationAboutToBeRemoved(key) => {
                self.windows.remove_application(*key);
            }
            ManagerEvent::FocusRequested(app_id) => {
                // 没有表面的应用：聚焦它的占位窗口
                let placeholder = self
                    .applications
                    .find_application(app_id)
                    .and_then(|key| self.windows.placeholder_of(key));
                if let Some(id) = placeholder {
                    self.windows.request_focus(id, &mut self.surfaces);
                }
            }
            ManagerEvent::SurfaceFocusRequested(surface) => {
                self.surfaces.activate(Some(*surface));
            }
            ManagerEvent::List(_)
            | ManagerEvent::CountChanged
            | ManagerEvent::FocusedApplicationIdChanged
            | ManagerEvent::Application { .. } => (),
        }
    }

    fn on_model_event(&mut self, event: &ModelEvent) {
        match event {
            ModelEvent::CloseApplication(key) => {
                self.applications.close(*key, &mut self.sessions);
            }
            ModelEvent::Window {
                id,
                change: WindowChange::FocusRequested,
            } => {
                // 表面请求提升：提到最上面并激活
                if let Some(surface) = self.windows.window(*id).and_then(|w| w.surface()) {
                    self.windows.raise_id(*id, &self.surfaces);
                    self.surfaces.activate(Some(surface));
                }
            }
            _ => (),
        }
    }
}

impl TimerSink for Shell {
    fn on_timer(&mut self, token: TimerToken, target: TimerTarget) {
        match target {
            TimerTarget::SessionSuspend(session) => {
                self.sessions.on_suspend_timer(session, token);
            }
            TimerTarget::ApplicationStop(key) => {
                self.applications
                    .on_stop_timer(key, token, &mut self.sessions);
            }
        }
        self.dispatch();
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("sessions", &self.sessions.len())
            .field("applications", &self.applications)
            .field("surfaces", &self.surfaces)
            .field("windows", &self.windows.count())
            .finish_non_exhaustive()
    }
}
