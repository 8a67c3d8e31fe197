//! 应用的生命周期状态机
//!
//! 一个 [`Application`] 汇总三方面的输入：界面请求的状态（前台运行或挂起）、任务控制器
//! 报告的进程状态、以及它所有会话合并后的状态。每次输入变化后都重新计算一次
//! （[`Application::update_state`]），决定是继续运行、开始挂起、恢复、重启还是关闭。
//!
//! 内部有九个状态，对外只投影成四个（见 [`InternalState::public`]）。
//!
//! 应用自己不调用任务控制器，也不操作列表模型：所有对外的影响都记录为
//! [`ApplicationEvent`]，由 [`ApplicationManager`](manager::ApplicationManager) 取走处理。

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use smithay::utils::{Logical, Size};

use self::info::ApplicationInfo;
use self::session::{SessionEvent, SessionId, SessionState};
use self::session_manager::SessionManager;
use crate::mir::Pid;
use crate::utils::id::unique_id;
use crate::utils::timer::{Timer, TimerBackend, TimerTarget, TimerToken};
use crate::wakelock::{SharedWakelock, WakelockOwner};
use crate::window::surface::SurfaceId;

pub mod info;
pub mod manager;
pub mod session;
pub mod session_manager;

unique_id!(ApplicationKey);

/// 对外可见的应用状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Starting,
    Running,
    Suspended,
    Stopped,
}

/// 界面希望应用处于的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestedState {
    #[default]
    Running,
    Suspended,
}

/// 任务控制器报告的进程状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessState {
    /// 进程不受任务控制器管理（例如从命令行启动），或者还没有消息。
    #[default]
    Unknown,
    Running,
    Suspended,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalState {
    Starting,
    Running,
    /// 免于生命周期管理的应用被“挂起”时停在这里，进程继续运行。
    RunningInBackground,
    /// 等待所有会话挂起。
    SuspendingWaitSession,
    /// 会话已挂起，等待进程确认。
    SuspendingWaitProcess,
    Suspended,
    /// 已请求关闭，等待会话停止。
    Closing,
    /// 进程在后台或挂起时被杀死（通常是内存不足）。用户再次切换过来时重新启动。
    StoppedResumable,
    Stopped,
}

impl InternalState {
    pub fn public(self) -> State {
        match self {
            InternalState::Starting => State::Starting,
            InternalState::Running | InternalState::RunningInBackground | InternalState::Closing => {
                State::Running
            }
            InternalState::SuspendingWaitSession
            | InternalState::SuspendingWaitProcess
            | InternalState::Suspended => State::Suspended,
            InternalState::StoppedResumable | InternalState::Stopped => State::Stopped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationEvent {
    StateChanged(State),
    RequestedStateChanged(RequestedState),
    FocusedChanged(bool),
    FullscreenChanged(bool),
    ExemptFromLifecycleChanged(bool),
    InitialSurfaceSizeChanged(Option<Size<i32, Logical>>),
    SurfaceCountChanged(usize),
    /// 没有可聚焦的表面，由界面决定如何处理（例如显示启动画面）。
    FocusRequested,
    /// 请求聚焦最新的顶层表面。
    SurfaceFocusRequested(SurfaceId),
    Closing,
    Stopped,
    StartProcessRequested,
    StopProcessRequested,
    SuspendProcessRequested,
    ResumeProcessRequested,
}

/// 按进程记录的初始表面大小。
///
/// 显示服务器在客户端第一次创建表面时查询，所以可以跨线程共享。
#[derive(Debug, Clone, Default)]
pub struct InitialSurfaceSizes(Arc<Mutex<HashMap<Pid, Size<i32, Logical>>>>);

impl InitialSurfaceSizes {
    pub fn new() -> Self {
        Self::default()
    }

    // 锁被毒化时继续使用其中的数据
    fn sizes(&self) -> MutexGuard<'_, HashMap<Pid, Size<i32, Logical>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, pid: Pid, size: Size<i32, Logical>) {
        self.sizes().insert(pid, size);
    }

    pub fn get(&self, pid: Pid) -> Option<Size<i32, Logical>> {
        self.sizes().get(&pid).copied()
    }

    pub fn remove(&self, pid: Pid) {
        self.sizes().remove(&pid);
    }
}

pub struct Application {
    key: ApplicationKey,
    info: Rc<ApplicationInfo>,
    arguments: Vec<String>,

    state: InternalState,
    requested_state: RequestedState,
    process_state: ProcessState,
    // 关闭意图：可能暂时进不了 Closing（例如正在等进程挂起），先记下来
    closing: bool,
    exempt_from_lifecycle: bool,

    initial_surface_size: Option<Size<i32, Logical>>,
    initial_sizes: InitialSurfaceSizes,

    // 按加入顺序
    sessions: Vec<(SessionId, Pid)>,
    stop_timer: Timer,
    // None 表示不参与唤醒锁
    wakelock: Option<Rc<SharedWakelock>>,

    // 从会话汇总的缓存值，只用于发出变化事件
    focused: bool,
    fullscreen: bool,
    surface_count: usize,

    events: Vec<ApplicationEvent>,
}

impl Application {
    pub fn new(
        info: Rc<ApplicationInfo>,
        arguments: Vec<String>,
        timers: Rc<dyn TimerBackend>,
        close_grace: Duration,
        wakelock: Option<Rc<SharedWakelock>>,
        initial_sizes: InitialSurfaceSizes,
    ) -> Self {
        let key = ApplicationKey::next();
        debug!("new application {} ({})", info.app_id, key.get());

        let app = Self {
            key,
            info,
            arguments,
            state: InternalState::Starting,
            requested_state: RequestedState::Running,
            process_state: ProcessState::Unknown,
            closing: false,
            exempt_from_lifecycle: false,
            initial_surface_size: None,
            initial_sizes,
            sessions: Vec::new(),
            stop_timer: Timer::new(timers, TimerTarget::ApplicationStop(key), close_grace),
            wakelock,
            focused: false,
            fullscreen: false,
            surface_count: 0,
            events: Vec::new(),
        };

        // 初始状态是 Starting
        app.acquire_wakelock();
        app
    }

    pub fn key(&self) -> ApplicationKey {
        self.key
    }

    pub fn app_id(&self) -> &str {
        &self.info.app_id
    }

    pub fn info(&self) -> &ApplicationInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn comment(&self) -> &str {
        &self.info.comment
    }

    pub fn icon(&self) -> &str {
        &self.info.icon
    }

    pub fn is_touch_app(&self) -> bool {
        self.info.is_touch_app
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn set_arguments(&mut self, arguments: Vec<String>) {
        self.arguments = arguments;
    }

    pub fn state(&self) -> State {
        self.state.public()
    }

    pub fn internal_state(&self) -> InternalState {
        self.state
    }

    pub fn requested_state(&self) -> RequestedState {
        self.requested_state
    }

    pub fn process_state(&self) -> ProcessState {
        self.process_state
    }

    pub fn exempt_from_lifecycle(&self) -> bool {
        self.exempt_from_lifecycle
    }

    pub fn initial_surface_size(&self) -> Option<Size<i32, Logical>> {
        self.initial_surface_size
    }

    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.iter().map(|(id, _)| *id)
    }

    pub fn has_session(&self, id: SessionId) -> bool {
        self.sessions.iter().any(|(s, _)| *s == id)
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn surface_count(&self) -> usize {
        self.surface_count
    }

    pub fn stop_timer_running(&self) -> bool {
        self.stop_timer.is_running()
    }

    pub fn holds_wakelock(&self) -> bool {
        self.wakelock
            .as_ref()
            .is_some_and(|w| w.is_held_by(self.wakelock_owner()))
    }

    pub fn take_events(&mut self) -> Vec<ApplicationEvent> {
        mem::take(&mut self.events)
    }

    fn wakelock_owner(&self) -> WakelockOwner {
        WakelockOwner(self.key.get())
    }

    fn acquire_wakelock(&self) {
        if let Some(wakelock) = &self.wakelock {
            wakelock.acquire(self.wakelock_owner());
        }
    }

    fn release_wakelock(&self) {
        if let Some(wakelock) = &self.wakelock {
            wakelock.release(self.wakelock_owner());
        }
    }

    /// 所有会话的表面，最新的在前。
    pub fn surface_list(&self, sessions: &SessionManager) -> Vec<SurfaceId> {
        self.sessions
            .iter()
            .rev()
            .filter_map(|(id, _)| sessions.get(*id))
            .flat_map(|session| session.surfaces().iter().copied())
            .collect()
    }

    /// 最近加入的会话的提示表面。
    pub fn prompt_surface_list(&self, sessions: &SessionManager) -> Vec<SurfaceId> {
        self.sessions
            .last()
            .map(|(id, _)| sessions.prompt_surfaces(*id))
            .unwrap_or_default()
    }

    fn single_session<'a>(&self, sessions: &'a SessionManager) -> Option<&'a session::Session> {
        match self.sessions.as_slice() {
            [(id, _)] => sessions.get(*id),
            _ => None,
        }
    }

    /// 所有会话中最“靠后”的状态。没有会话时为 `None`。
    fn combined_session_state(&self, sessions: &SessionManager) -> Option<SessionState> {
        self.sessions
            .iter()
            .filter_map(|(id, _)| sessions.get(*id))
            .map(|session| session.state())
            .max()
    }

    pub fn set_requested_state(&mut self, value: RequestedState, sessions: &mut SessionManager) {
        if self.requested_state == value {
            return;
        }

        debug!("{}: requested state {value:?}", self.app_id());
        self.requested_state = value;
        self.events.push(ApplicationEvent::RequestedStateChanged(value));

        self.update_state(sessions);
    }

    /// 只影响以后的挂起，不改变当前状态。
    pub fn set_exempt_from_lifecycle(&mut self, exempt: bool) {
        if self.exempt_from_lifecycle != exempt {
            debug!("{}: exempt from lifecycle {exempt}", self.app_id());
            self.exempt_from_lifecycle = exempt;
            self.events
                .push(ApplicationEvent::ExemptFromLifecycleChanged(exempt));
        }
    }

    pub fn set_initial_surface_size(&mut self, size: Option<Size<i32, Logical>>) {
        if self.initial_surface_size == size {
            return;
        }

        self.initial_surface_size = size;
        if let Some(size) = size.filter(|s| s.w > 0 && s.h > 0) {
            for (_, pid) in &self.sessions {
                self.initial_sizes.set(*pid, size);
            }
        }
        self.events
            .push(ApplicationEvent::InitialSurfaceSizeChanged(size));
    }

    /// 根据当前的所有输入决定下一步。
    pub fn update_state(&mut self, sessions: &mut SessionManager) {
        let (empty_with_closing, lost_all_surfaces, has_closing_surfaces) =
            match self.single_session(sessions) {
                Some(session) => {
                    let empty = session.surfaces().is_empty();
                    let closing = session.has_closing_surfaces();
                    (
                        empty && closing,
                        empty && session.had_surface() && !closing,
                        closing,
                    )
                }
                None => (false, false, false),
            };

        if (self.sessions.is_empty()
            && !matches!(
                self.state,
                InternalState::Starting | InternalState::StoppedResumable
            ))
            || empty_with_closing
        {
            self.closing = true;
        }

        if self.closing
            || (lost_all_surfaces && self.state != InternalState::StoppedResumable)
        {
            self.apply_closing(sessions);
        } else if self.requested_state == RequestedState::Running || has_closing_surfaces {
            self.apply_running(sessions);
        } else {
            self.apply_suspended(sessions);
        }
    }

    fn apply_closing(&mut self, sessions: &mut SessionManager) {
        match self.state {
            InternalState::Starting => {
                warn!("{}: closing while still starting", self.app_id());
            }
            InternalState::Running | InternalState::RunningInBackground => {
                if !self.stop_timer.is_running() {
                    self.stop_timer.start();
                }
                if self.closing {
                    self.set_internal_state(InternalState::Closing, sessions);
                }
            }
            InternalState::SuspendingWaitSession | InternalState::Suspended => {
                self.resume(sessions);
            }
            // 等进程挂起之后再处理
            InternalState::SuspendingWaitProcess => (),
            InternalState::Closing => (),
            InternalState::StoppedResumable => {
                self.set_internal_state(InternalState::Stopped, sessions);
            }
            InternalState::Stopped => (),
        }
    }

    fn apply_running(&mut self, sessions: &mut SessionManager) {
        // 可能是失去所有表面之后又回来了
        self.stop_timer.stop();

        match self.state {
            InternalState::Starting | InternalState::Running => (),
            InternalState::RunningInBackground
            | InternalState::SuspendingWaitSession
            | InternalState::Suspended => self.resume(sessions),
            InternalState::SuspendingWaitProcess => (),
            InternalState::Closing => {
                warn!("{}: asked to run while closing", self.app_id());
            }
            InternalState::StoppedResumable => self.respawn(sessions),
            InternalState::Stopped => (),
        }
    }

    fn apply_suspended(&mut self, sessions: &mut SessionManager) {
        self.stop_timer.stop();

        match self.state {
            InternalState::Running => {
                if self.process_state == ProcessState::Running {
                    self.suspend(sessions);
                } else {
                    // 对进程一无所知时不能挂起
                    trace!(
                        "{}: not suspending, process state is {:?}",
                        self.app_id(),
                        self.process_state
                    );
                }
            }
            InternalState::Starting
            | InternalState::RunningInBackground
            | InternalState::SuspendingWaitSession
            | InternalState::SuspendingWaitProcess
            | InternalState::Suspended
            | InternalState::Closing
            | InternalState::StoppedResumable
            | InternalState::Stopped => (),
        }
    }

    fn suspend(&mut self, sessions: &mut SessionManager) {
        debug!("{}: suspend", self.app_id());
        assert_eq!(self.state, InternalState::Running);
        assert!(!self.sessions.is_empty());

        if self.exempt_from_lifecycle {
            // 进程不会被挂起，不需要唤醒锁
            self.set_internal_state(InternalState::RunningInBackground, sessions);
        } else {
            self.set_internal_state(InternalState::SuspendingWaitSession, sessions);
            for id in self.session_ids() {
                sessions.suspend(id);
            }
        }
    }

    fn resume(&mut self, sessions: &mut SessionManager) {
        debug!("{}: resume", self.app_id());

        match self.state {
            InternalState::Suspended | InternalState::SuspendingWaitProcess => {
                self.events.push(ApplicationEvent::ResumeProcessRequested);
                self.set_internal_state(InternalState::Running, sessions);
                if self.process_state == ProcessState::Suspended {
                    // 不等进程确认。resume 只在 update_state 中调用，直接改字段，
                    // 不经过 set_process_state 再次进入 update_state
                    self.process_state = ProcessState::Running;
                }
                for id in self.session_ids() {
                    sessions.resume(id);
                }
            }
            InternalState::SuspendingWaitSession => {
                self.set_internal_state(InternalState::Running, sessions);
                for id in self.session_ids() {
                    sessions.resume(id);
                }
            }
            InternalState::RunningInBackground => {
                self.set_internal_state(InternalState::Running, sessions);
            }
            _ => (),
        }
    }

    fn respawn(&mut self, sessions: &mut SessionManager) {
        debug!("{}: respawn", self.app_id());
        self.set_internal_state(InternalState::Starting, sessions);
        self.events.push(ApplicationEvent::StartProcessRequested);
    }

    fn stop(&mut self) {
        debug!("{}: stop", self.app_id());
        self.events.push(ApplicationEvent::StopProcessRequested);
    }

    pub fn on_stop_timer(&mut self, token: TimerToken) {
        if self.stop_timer.expire(token) {
            debug!("{}: did not close in time", self.app_id());
            self.stop();
        }
    }

    /// 请求关闭应用。
    pub fn close(&mut self, sessions: &mut SessionManager) {
        debug!("{}: close in {:?}", self.app_id(), self.state);

        match self.state {
            InternalState::Starting => {
                self.stop();
                // 不等确认
                self.set_internal_state(InternalState::Stopped, sessions);
            }
            InternalState::Running
            | InternalState::RunningInBackground
            | InternalState::SuspendingWaitSession
            | InternalState::SuspendingWaitProcess
            | InternalState::Suspended => {
                for id in self.session_ids() {
                    sessions.close(id);
                }
            }
            InternalState::Closing => (),
            // 在挂起时被杀死的应用，现在彻底停止
            InternalState::StoppedResumable => {
                self.set_internal_state(InternalState::Stopped, sessions);
            }
            InternalState::Stopped => (),
        }
    }

    fn set_internal_state(&mut self, state: InternalState, sessions: &mut SessionManager) {
        if self.state == state {
            return;
        }

        debug!("{}: {:?} -> {state:?}", self.app_id(), self.state);

        let old_public = self.state.public();
        self.state = state;

        match state {
            InternalState::Starting | InternalState::Running => self.acquire_wakelock(),
            InternalState::RunningInBackground | InternalState::Suspended => {
                self.release_wakelock()
            }
            InternalState::Closing => {
                self.events.push(ApplicationEvent::Closing);
                self.acquire_wakelock();
            }
            InternalState::StoppedResumable => self.release_wakelock(),
            InternalState::Stopped => {
                self.events.push(ApplicationEvent::Stopped);
                self.release_wakelock();
            }
            InternalState::SuspendingWaitSession | InternalState::SuspendingWaitProcess => (),
        }

        if state.public() != old_public {
            self.events.push(ApplicationEvent::StateChanged(state.public()));
        }

        self.update_state(sessions);
    }

    pub fn set_process_state(&mut self, process_state: ProcessState, sessions: &mut SessionManager) {
        if self.process_state == process_state {
            return;
        }

        if process_state == ProcessState::Unknown {
            warn!("{}: ignoring change to unknown process state", self.app_id());
            return;
        }

        debug!("{}: process {process_state:?}", self.app_id());
        self.process_state = process_state;

        match process_state {
            ProcessState::Unknown => (),
            ProcessState::Running => {
                if self.state == InternalState::StoppedResumable {
                    self.set_internal_state(InternalState::Starting, sessions);
                }
            }
            ProcessState::Suspended => {
                if self.state == InternalState::SuspendingWaitProcess {
                    self.set_internal_state(InternalState::Suspended, sessions);
                } else {
                    warn!(
                        "{}: process suspended unexpectedly in {:?}",
                        self.app_id(),
                        self.state
                    );
                }
            }
            ProcessState::Failed => {
                // 太早了，没法恢复
                if self.state == InternalState::Starting {
                    self.set_internal_state(InternalState::Stopped, sessions);
                }
            }
            ProcessState::Stopped => match self.state {
                InternalState::Starting => {
                    self.set_internal_state(InternalState::Stopped, sessions);
                }
                // 应用自己正常退出了，不用再恢复
                InternalState::StoppedResumable | InternalState::Closing => {
                    self.set_internal_state(InternalState::Stopped, sessions);
                }
                _ => (),
            },
        }

        self.update_state(sessions);
    }

    fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|(id, _)| *id).collect()
    }

    pub fn add_session(&mut self, id: SessionId, sessions: &mut SessionManager) {
        if self.has_session(id) {
            return;
        }
        let Some(pid) = sessions.get(id).map(|s| s.pid()) else {
            return;
        };

        debug!("{}: add session {}", self.app_id(), id.get());
        self.sessions.push((id, pid));
        sessions.set_application(id, Some(self.key));

        match self.state {
            InternalState::Starting
            | InternalState::Running
            | InternalState::RunningInBackground
            | InternalState::Closing => sessions.resume(id),
            InternalState::SuspendingWaitSession
            | InternalState::SuspendingWaitProcess
            | InternalState::Suspended => sessions.suspend(id),
            InternalState::StoppedResumable | InternalState::Stopped => sessions.stop(id),
        }

        if let Some(size) = self.initial_surface_size.filter(|s| s.w > 0 && s.h > 0) {
            if pid != 0 {
                self.initial_sizes.set(pid, size);
            }
        }

        self.refresh(sessions);
        // 会话在加入前可能已经画好了第一帧
        self.on_session_state_changed(sessions);
    }

    pub fn remove_session(&mut self, id: SessionId, sessions: &mut SessionManager) {
        let Some(idx) = self.sessions.iter().position(|(s, _)| *s == id) else {
            return;
        };

        debug!("{}: remove session {}", self.app_id(), id.get());
        let (_, pid) = self.sessions.remove(idx);
        sessions.set_application(id, None);
        self.initial_sizes.remove(pid);

        self.refresh(sessions);
    }

    /// 处理所属会话的事件。
    pub fn on_session_event(
        &mut self,
        id: SessionId,
        event: &SessionEvent,
        sessions: &mut SessionManager,
    ) {
        match event {
            SessionEvent::StateChanged(_) => self.on_session_state_changed(sessions),
            SessionEvent::FullscreenChanged(_) | SessionEvent::FocusedChanged(_) => {
                self.refresh(sessions)
            }
            SessionEvent::HasClosingSurfacesChanged(_) => self.update_state(sessions),
            SessionEvent::SurfacesChanged { .. } => {
                self.refresh(sessions);
                self.update_state(sessions);
            }
            SessionEvent::FocusRequested => self.events.push(ApplicationEvent::FocusRequested),
            SessionEvent::Deleted => self.remove_session(id, sessions),
            SessionEvent::LiveChanged(_)
            | SessionEvent::SetFrameDroppers { .. }
            | SessionEvent::CloseSurfaces(_)
            | SessionEvent::ZombieEmpty => (),
        }
    }

    fn refresh(&mut self, sessions: &SessionManager) {
        let live = || self.sessions.iter().filter_map(|(id, _)| sessions.get(*id));

        let focused = live().any(|s| s.focused());
        let fullscreen = live().any(|s| s.fullscreen());
        let surface_count = live().map(|s| s.surfaces().len()).sum();

        if self.focused != focused {
            debug!("{}: focused {focused}", self.app_id());
            self.focused = focused;
            self.events.push(ApplicationEvent::FocusedChanged(focused));
        }
        if self.fullscreen != fullscreen {
            self.fullscreen = fullscreen;
            self.events.push(ApplicationEvent::FullscreenChanged(fullscreen));
        }
        if self.surface_count != surface_count {
            self.surface_count = surface_count;
            self.events
                .push(ApplicationEvent::SurfaceCountChanged(surface_count));
        }
    }

    fn on_session_state_changed(&mut self, sessions: &mut SessionManager) {
        let Some(combined) = self.combined_session_state(sessions) else {
            return;
        };

        match combined {
            SessionState::Starting | SessionState::Suspending => (),
            SessionState::Running => {
                if self.state == InternalState::Starting {
                    self.set_internal_state(InternalState::Running, sessions);
                }
            }
            SessionState::Suspended => {
                // 事件是延后处理的，期间可能已经被恢复
                if self.state == InternalState::SuspendingWaitSession {
                    self.set_internal_state(InternalState::SuspendingWaitProcess, sessions);
                    self.events.push(ApplicationEvent::SuspendProcessRequested);
                }
            }
            SessionState::Stopped => self.on_session_stopped(sessions),
        }
    }

    fn on_session_stopped(&mut self, sessions: &mut SessionManager) {
        let failed = self.process_state == ProcessState::Failed;

        match self.state {
            // 还没来得及创建表面就停止了，认为是启动时崩溃，不能恢复
            InternalState::Starting => self.set_internal_state(InternalState::Stopped, sessions),
            // 前台应用断开：崩溃或者自己退出，都要移除
            InternalState::Running => self.set_internal_state(InternalState::Stopped, sessions),
            InternalState::RunningInBackground => {
                if failed {
                    // 在后台被杀，用户没有要求关闭，保留在列表里
                    self.set_internal_state(InternalState::StoppedResumable, sessions);
                } else {
                    self.set_internal_state(InternalState::Stopped, sessions);
                }
            }
            InternalState::SuspendingWaitSession | InternalState::SuspendingWaitProcess => {
                if failed {
                    self.set_internal_state(InternalState::StoppedResumable, sessions);
                } else {
                    self.stop();
                    self.set_internal_state(InternalState::Stopped, sessions);
                }
            }
            InternalState::Suspended => {
                if self.process_state != ProcessState::Unknown {
                    self.set_internal_state(InternalState::StoppedResumable, sessions);
                } else {
                    // 不受任务控制器管理，无法重新启动
                    self.set_internal_state(InternalState::Stopped, sessions);
                }
            }
            InternalState::Closing => self.set_internal_state(InternalState::Stopped, sessions),
            InternalState::StoppedResumable | InternalState::Stopped => (),
        }
    }

    /// 聚焦最新的顶层表面；没有表面时交给界面处理。
    pub fn request_focus(&mut self, sessions: &SessionManager, is_top_level: impl Fn(SurfaceId) -> bool) {
        let surface = self
            .surface_list(sessions)
            .into_iter()
            .find(|s| is_top_level(*s));

        match surface {
            Some(surface) => {
                debug!("{}: requesting focus for newest surface", self.app_id());
                self.events
                    .push(ApplicationEvent::SurfaceFocusRequested(surface));
            }
            None => {
                debug!("{}: requesting focus", self.app_id());
                self.events.push(ApplicationEvent::FocusRequested);
            }
        }
    }

    pub fn terminate(&self) {
        self.signal(libc::SIGTERM);
    }

    pub fn kill(&self) {
        self.signal(libc::SIGKILL);
    }

    fn signal(&self, signal: libc::c_int) {
        for (_, pid) in &self.sessions {
            if *pid <= 0 {
                continue;
            }
            if unsafe { libc::kill(*pid, signal) } != 0 {
                let err = std::io::Error::last_os_error();
                warn!("error sending signal {signal} to {pid}: {err:?}");
            }
        }
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        debug!("dropping application {}", self.app_id());
        self.release_wakelock();
        for (_, pid) in &self.sessions {
            self.initial_sizes.remove(*pid);
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("key", &self.key)
            .field("app_id", &self.app_id())
            .field("state", &self.state)
            .field("requested_state", &self.requested_state)
            .field("process_state", &self.process_state)
            .field("sessions", &self.sessions)
            .finish()
    }
}
