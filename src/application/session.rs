//! 单个客户端会话的状态机
//!
//! 会话只修改自身，并把对外的影响记录为 [`SessionEvent`]。子会话的递归、表面的
//! 查询等跨对象的工作由 [`SessionManager`](super::session_manager::SessionManager)
//! 完成。

use std::mem;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::application::ApplicationKey;
use crate::mir::{LifecycleState, Pid, PromptSession, PromptSessionManager, SceneSession};
use crate::utils::id::unique_id;
use crate::utils::timer::{Timer, TimerBackend, TimerTarget, TimerToken};
use crate::window::surface::SurfaceId;

unique_id!(SessionId);

/// 会话状态。声明顺序即严重程度：多个会话合并时取最大者。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    Starting,
    Running,
    Suspending,
    Suspended,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    FullscreenChanged(bool),
    LiveChanged(bool),
    FocusedChanged(bool),
    HasClosingSurfacesChanged(bool),
    SurfacesChanged { count: usize },
    FocusRequested,

    // 需要由持有表面的一方执行的命令
    SetFrameDroppers { surfaces: Vec<SurfaceId>, running: bool },
    CloseSurfaces(Vec<SurfaceId>),

    /// 不再存活、没有子会话也没有表面：可以删除了。
    ZombieEmpty,
    /// 会话已被删除。
    Deleted,
}

pub struct Session {
    id: SessionId,
    scene: Arc<dyn SceneSession>,
    prompt_manager: Rc<dyn PromptSessionManager>,
    application: Option<ApplicationKey>,
    parent: Option<SessionId>,
    children: Vec<SessionId>,

    // 最新的在前
    surfaces: Vec<SurfaceId>,
    // 等待第一帧的表面
    pending_surfaces: Vec<SurfaceId>,
    closing_surfaces: Vec<SurfaceId>,
    prompt_sessions: Vec<PromptSession>,

    state: SessionState,
    live: bool,
    fullscreen: bool,
    focused: bool,
    had_surface: bool,
    deletion_scheduled: bool,

    suspend_timer: Timer,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(
        id: SessionId,
        scene: Arc<dyn SceneSession>,
        prompt_manager: Rc<dyn PromptSessionManager>,
        timers: Rc<dyn TimerBackend>,
        suspend_grace: Duration,
    ) -> Self {
        Self {
            id,
            scene,
            prompt_manager,
            application: None,
            parent: None,
            children: Vec::new(),
            surfaces: Vec::new(),
            pending_surfaces: Vec::new(),
            closing_surfaces: Vec::new(),
            prompt_sessions: Vec::new(),
            state: SessionState::Starting,
            live: true,
            fullscreen: false,
            focused: false,
            had_surface: false,
            deletion_scheduled: false,
            suspend_timer: Timer::new(timers, TimerTarget::SessionSuspend(id), suspend_grace),
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> String {
        self.scene.name()
    }

    pub fn pid(&self) -> Pid {
        self.scene.pid()
    }

    pub fn scene(&self) -> &Arc<dyn SceneSession> {
        &self.scene
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn live(&self) -> bool {
        self.live
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn had_surface(&self) -> bool {
        self.had_surface
    }

    pub fn has_closing_surfaces(&self) -> bool {
        !self.closing_surfaces.is_empty()
    }

    pub fn surfaces(&self) -> &[SurfaceId] {
        &self.surfaces
    }

    pub fn closing_surfaces(&self) -> &[SurfaceId] {
        &self.closing_surfaces
    }

    pub fn children(&self) -> &[SessionId] {
        &self.children
    }

    pub fn parent(&self) -> Option<SessionId> {
        self.parent
    }

    pub fn application(&self) -> Option<ApplicationKey> {
        self.application
    }

    pub fn prompt_sessions(&self) -> &[PromptSession] {
        &self.prompt_sessions
    }

    pub fn active_prompt_session(&self) -> Option<PromptSession> {
        self.prompt_sessions.last().copied()
    }

    pub fn suspend_timer_running(&self) -> bool {
        self.suspend_timer.is_running()
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        mem::take(&mut self.events)
    }

    pub fn set_application(&mut self, application: Option<ApplicationKey>) {
        self.application = application;
    }

    pub(super) fn set_parent(&mut self, parent: Option<SessionId>) {
        self.parent = parent;
    }

    pub(super) fn insert_child(&mut self, index: usize, child: SessionId) {
        if self.children.contains(&child) {
            return;
        }
        let index = index.min(self.children.len());
        self.children.insert(index, child);
    }

    pub(super) fn remove_child(&mut self, child: SessionId) -> bool {
        let len = self.children.len();
        self.children.retain(|c| *c != child);
        self.children.len() != len
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!("session {} ({}): {:?} -> {:?}", self.id.get(), self.name(), self.state, state);
        self.state = state;
        self.events.push(SessionEvent::StateChanged(state));
    }

    /// 开始挂起：通知客户端，宽限期后由定时器完成挂起。
    ///
    /// 只在运行状态下有效，返回是否发生了转换。
    pub(super) fn suspend(&mut self) -> bool {
        if self.state != SessionState::Running {
            return false;
        }

        self.scene.set_lifecycle_state(LifecycleState::WillSuspend);
        self.suspend_timer.start();

        for prompt_session in &self.prompt_sessions {
            self.prompt_manager.suspend_prompt_session(*prompt_session);
        }

        self.set_state(SessionState::Suspending);
        true
    }

    pub(super) fn on_suspend_timer(&mut self, token: TimerToken) {
        if self.suspend_timer.expire(token) {
            self.do_suspend();
        }
    }

    fn do_suspend(&mut self) {
        assert_eq!(self.state, SessionState::Suspending);

        if !self.surfaces.is_empty() {
            self.events.push(SessionEvent::SetFrameDroppers {
                surfaces: self.surfaces.clone(),
                running: false,
            });
        }
        self.set_state(SessionState::Suspended);
    }

    pub(super) fn resume(&mut self) -> bool {
        match self.state {
            SessionState::Suspending => self.suspend_timer.stop(),
            SessionState::Suspended => {
                if !self.surfaces.is_empty() {
                    self.events.push(SessionEvent::SetFrameDroppers {
                        surfaces: self.surfaces.clone(),
                        running: true,
                    });
                }
            }
            _ => return false,
        }

        self.scene.set_lifecycle_state(LifecycleState::Resumed);

        for prompt_session in &self.prompt_sessions {
            self.prompt_manager.resume_prompt_session(*prompt_session);
        }

        self.set_state(SessionState::Running);
        true
    }

    /// 请求关闭所有表面。
    pub(super) fn close(&mut self) {
        if self.state == SessionState::Stopped || self.surfaces.is_empty() {
            return;
        }
        self.events
            .push(SessionEvent::CloseSurfaces(self.surfaces.clone()));
    }

    pub(super) fn stop(&mut self) -> bool {
        if self.state == SessionState::Stopped {
            return false;
        }

        self.stop_prompt_sessions();
        self.suspend_timer.stop();

        if !self.surfaces.is_empty() {
            self.events.push(SessionEvent::SetFrameDroppers {
                surfaces: self.surfaces.clone(),
                running: false,
            });
        }

        self.set_state(SessionState::Stopped);
        true
    }

    pub(super) fn set_live(&mut self, live: bool) {
        if self.live == live {
            return;
        }

        self.live = live;
        self.events.push(SessionEvent::LiveChanged(live));

        if !live {
            self.suspend_timer.stop();
            self.set_state(SessionState::Stopped);
            self.delete_if_zombie_and_empty();
        }
    }

    pub(super) fn set_fullscreen(&mut self, fullscreen: bool) {
        if self.fullscreen != fullscreen {
            self.fullscreen = fullscreen;
            self.events.push(SessionEvent::FullscreenChanged(fullscreen));
        }
    }

    pub(super) fn set_focused(&mut self, focused: bool) {
        if self.focused != focused {
            self.focused = focused;
            self.events.push(SessionEvent::FocusedChanged(focused));
        }
    }

    pub(super) fn request_focus(&mut self) {
        self.events.push(SessionEvent::FocusRequested);
    }

    /// 新表面要等第一帧画好后才出现在表面列表中。
    pub(super) fn register_surface(&mut self, surface: SurfaceId, first_frame_drawn: bool) {
        if self.surfaces.contains(&surface) || self.pending_surfaces.contains(&surface) {
            return;
        }

        if first_frame_drawn {
            self.prepend_surface(surface);
        } else {
            self.pending_surfaces.push(surface);
        }
    }

    pub(super) fn on_first_frame_drawn(&mut self, surface: SurfaceId) {
        let Some(idx) = self.pending_surfaces.iter().position(|s| *s == surface) else {
            return;
        };
        self.pending_surfaces.remove(idx);
        self.prepend_surface(surface);
    }

    fn prepend_surface(&mut self, surface: SurfaceId) {
        self.surfaces.insert(0, surface);
        self.had_surface = true;
        self.events.push(SessionEvent::SurfacesChanged {
            count: self.surfaces.len(),
        });

        if self.state == SessionState::Starting {
            self.set_state(SessionState::Running);
        }
    }

    /// 客户端已被要求关闭这个表面：在它真正消失前放进关闭列表。
    pub(super) fn on_surface_close_requested(&mut self, surface: SurfaceId) {
        let Some(idx) = self.surfaces.iter().position(|s| *s == surface) else {
            return;
        };

        self.surfaces.remove(idx);
        self.closing_surfaces.push(surface);

        if self.closing_surfaces.len() == 1 {
            self.events.push(SessionEvent::HasClosingSurfacesChanged(true));
        }
        self.events.push(SessionEvent::SurfacesChanged {
            count: self.surfaces.len(),
        });
    }

    pub(super) fn remove_surface(&mut self, surface: SurfaceId) -> bool {
        let mut found = false;

        if let Some(idx) = self.pending_surfaces.iter().position(|s| *s == surface) {
            self.pending_surfaces.remove(idx);
            found = true;
        }

        if let Some(idx) = self.surfaces.iter().position(|s| *s == surface) {
            self.surfaces.remove(idx);
            self.events.push(SessionEvent::SurfacesChanged {
                count: self.surfaces.len(),
            });
            found = true;
        }

        if let Some(idx) = self.closing_surfaces.iter().position(|s| *s == surface) {
            self.closing_surfaces.remove(idx);
            if self.closing_surfaces.is_empty() {
                self.events.push(SessionEvent::HasClosingSurfacesChanged(false));
            }
            found = true;
        }

        if found {
            self.delete_if_zombie_and_empty();
        }
        found
    }

    pub(super) fn append_prompt_session(&mut self, prompt_session: PromptSession) {
        if !self.prompt_sessions.contains(&prompt_session) {
            self.prompt_sessions.push(prompt_session);
        }
    }

    pub(super) fn remove_prompt_session(&mut self, prompt_session: PromptSession) -> bool {
        let len = self.prompt_sessions.len();
        self.prompt_sessions.retain(|p| *p != prompt_session);
        self.prompt_sessions.len() != len
    }

    /// 按相反顺序停止自己的提示会话。
    pub(super) fn stop_prompt_sessions(&mut self) {
        for prompt_session in mem::take(&mut self.prompt_sessions).into_iter().rev() {
            self.prompt_manager.stop_prompt_session(prompt_session);
        }
    }

    /// 包括还没画第一帧的和正在关闭的表面。
    pub(super) fn has_no_surfaces(&self) -> bool {
        self.surfaces.is_empty()
            && self.pending_surfaces.is_empty()
            && self.closing_surfaces.is_empty()
    }

    pub(super) fn cancel_deletion(&mut self) {
        self.deletion_scheduled = false;
    }

    /// 不再存活且没有子会话和表面时安排删除。返回是否安排了删除。
    pub(super) fn delete_if_zombie_and_empty(&mut self) -> bool {
        if self.live || !self.children.is_empty() || !self.has_no_surfaces() {
            return false;
        }

        if !self.deletion_scheduled {
            self.deletion_scheduled = true;
            self.events.push(SessionEvent::ZombieEmpty);
        }
        true
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state)
            .field("live", &self.live)
            .field("application", &self.application)
            .field("surfaces", &self.surfaces)
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::{FakePromptSessions, FakeSceneSession};
    use crate::utils::timer::ManualTimers;

    struct Fixture {
        session: Session,
        scene: Arc<FakeSceneSession>,
        prompts: Rc<FakePromptSessions>,
        timers: Rc<ManualTimers>,
    }

    fn fixture() -> Fixture {
        let scene = FakeSceneSession::new("foo", 100);
        let prompts = Rc::new(FakePromptSessions::default());
        let timers = Rc::new(ManualTimers::new());
        let session = Session::new(
            SessionId::next(),
            scene.clone(),
            prompts.clone(),
            timers.clone(),
            Duration::from_millis(1500),
        );
        Fixture {
            session,
            scene,
            prompts,
            timers,
        }
    }

    fn running() -> Fixture {
        let mut f = fixture();
        f.session.register_surface(SurfaceId::next(), true);
        assert_eq!(f.session.state(), SessionState::Running);
        f.session.take_events();
        f
    }

    #[test]
    fn first_frame_moves_to_running() {
        let mut f = fixture();
        let surface = SurfaceId::next();

        f.session.register_surface(surface, false);
        assert_eq!(f.session.state(), SessionState::Starting);
        assert!(f.session.surfaces().is_empty());

        f.session.on_first_frame_drawn(surface);
        assert_eq!(f.session.state(), SessionState::Running);
        assert_eq!(f.session.surfaces(), [surface]);
        assert!(f.session.had_surface());
        assert_eq!(
            f.session.take_events(),
            vec![
                SessionEvent::SurfacesChanged { count: 1 },
                SessionEvent::StateChanged(SessionState::Running),
            ]
        );
    }

    #[test]
    fn suspend_only_from_running() {
        let mut f = fixture();
        assert!(!f.session.suspend());
        assert_eq!(f.session.state(), SessionState::Starting);
        assert_eq!(f.timers.pending_count(), 0);
    }

    #[test]
    fn suspend_waits_for_timer() {
        let mut f = running();
        let target = TimerTarget::SessionSuspend(f.session.id());

        assert!(f.session.suspend());
        assert_eq!(f.session.state(), SessionState::Suspending);
        assert_eq!(f.scene.lifecycle(), vec![LifecycleState::WillSuspend]);
        assert_eq!(f.timers.interval_of(target), Some(Duration::from_millis(1500)));

        let token = f.timers.take(target).unwrap();
        f.session.on_suspend_timer(token);
        assert_eq!(f.session.state(), SessionState::Suspended);

        let events = f.session.take_events();
        assert!(events.contains(&SessionEvent::SetFrameDroppers {
            surfaces: f.session.surfaces().to_vec(),
            running: false,
        }));
    }

    #[test]
    fn resume_while_suspending_cancels_timer() {
        let mut f = running();
        let target = TimerTarget::SessionSuspend(f.session.id());

        f.session.suspend();
        assert!(f.session.resume());
        assert_eq!(f.session.state(), SessionState::Running);
        assert!(!f.timers.is_pending(target));
        assert_eq!(
            f.scene.lifecycle(),
            vec![LifecycleState::WillSuspend, LifecycleState::Resumed]
        );
    }

    #[test]
    fn resume_from_suspended_restarts_frame_droppers() {
        let mut f = running();
        let target = TimerTarget::SessionSuspend(f.session.id());
        f.session.suspend();
        let token = f.timers.take(target).unwrap();
        f.session.on_suspend_timer(token);
        f.session.take_events();

        assert!(f.session.resume());
        assert_eq!(
            f.session.take_events(),
            vec![
                SessionEvent::SetFrameDroppers {
                    surfaces: f.session.surfaces().to_vec(),
                    running: true,
                },
                SessionEvent::StateChanged(SessionState::Running),
            ]
        );
    }

    #[test]
    fn stale_timer_is_ignored() {
        let mut f = running();
        let target = TimerTarget::SessionSuspend(f.session.id());

        f.session.suspend();
        let stale = f.timers.take(target).unwrap();
        f.session.resume();
        f.session.on_suspend_timer(stale);
        assert_eq!(f.session.state(), SessionState::Running);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut f = running();
        let prompt = PromptSession(1);
        let other = PromptSession(2);
        f.session.append_prompt_session(prompt);
        f.session.append_prompt_session(other);

        assert!(f.session.stop());
        assert!(!f.session.stop());
        assert_eq!(f.session.state(), SessionState::Stopped);
        // 逆序停止
        assert_eq!(
            f.prompts.calls(),
            vec![("stop", other), ("stop", prompt)]
        );
        assert!(f.session.active_prompt_session().is_none());
    }

    #[test]
    fn close_requests_every_surface() {
        let mut f = running();
        let second = SurfaceId::next();
        f.session.register_surface(second, true);
        f.session.take_events();

        f.session.close();
        let events = f.session.take_events();
        assert_eq!(events.len(), 1);
        let SessionEvent::CloseSurfaces(surfaces) = &events[0] else {
            panic!("unexpected events: {events:?}");
        };
        assert_eq!(surfaces.len(), 2);
        assert_eq!(surfaces[0], second);

        f.session.stop();
        f.session.take_events();
        f.session.close();
        assert!(f.session.take_events().is_empty());
    }

    #[test]
    fn closing_surfaces_bookkeeping() {
        let mut f = running();
        let first = f.session.surfaces()[0];
        let second = SurfaceId::next();
        f.session.register_surface(second, true);
        f.session.take_events();

        f.session.on_surface_close_requested(first);
        f.session.on_surface_close_requested(second);
        assert!(f.session.has_closing_surfaces());
        assert!(f.session.surfaces().is_empty());
        let events = f.session.take_events();
        let changes = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::HasClosingSurfacesChanged(_)))
            .count();
        assert_eq!(changes, 1);

        f.session.remove_surface(first);
        assert!(f.session.has_closing_surfaces());
        f.session.remove_surface(second);
        assert!(!f.session.has_closing_surfaces());
        assert!(f
            .session
            .take_events()
            .contains(&SessionEvent::HasClosingSurfacesChanged(false)));
    }

    #[test]
    fn zombie_check() {
        for live in [true, false] {
            for has_child in [true, false] {
                for has_surface in [true, false] {
                    let mut f = fixture();
                    if has_child {
                        f.session.insert_child(0, SessionId::next());
                    }
                    if has_surface {
                        f.session.register_surface(SurfaceId::next(), true);
                    }
                    f.session.live = live;

                    let expected = !live && !has_child && !has_surface;
                    assert_eq!(f.session.delete_if_zombie_and_empty(), expected);
                    assert_eq!(
                        f.session.take_events().contains(&SessionEvent::ZombieEmpty),
                        expected
                    );
                }
            }
        }
    }

    #[test]
    fn closing_surface_keeps_zombie_alive() {
        let mut f = running();
        let surface = f.session.surfaces()[0];
        let pending = SurfaceId::next();
        f.session.register_surface(pending, false);
        f.session.on_surface_close_requested(surface);
        f.session.live = false;
        f.session.take_events();

        // 两个表面都还指向这个会话
        assert!(!f.session.delete_if_zombie_and_empty());

        assert!(f.session.remove_surface(pending));
        assert!(!f.session.take_events().contains(&SessionEvent::ZombieEmpty));

        assert!(f.session.remove_surface(surface));
        assert!(f.session.take_events().contains(&SessionEvent::ZombieEmpty));
    }

    #[test]
    fn losing_liveness_stops() {
        let mut f = running();
        f.session.set_live(false);
        assert_eq!(f.session.state(), SessionState::Stopped);
        // 还有表面，不删除
        assert!(!f.session.take_events().contains(&SessionEvent::ZombieEmpty));

        let surface = f.session.surfaces()[0];
        f.session.remove_surface(surface);
        assert!(f.session.take_events().contains(&SessionEvent::ZombieEmpty));
    }
}
