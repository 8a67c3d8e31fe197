//! 会话的所有者
//!
//! 所有 [`Session`] 都存放在这里，按场景会话查找。会话树（提示会话提供者是其应用
//! 会话的子会话）上的递归操作也在这里实现。会话产生的事件按发生顺序汇总到一个
//! 队列中，由 `Shell` 取走并分发。

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use super::session::{Session, SessionEvent, SessionId, SessionState};
use crate::application::ApplicationKey;
use crate::mir::{PromptSession, PromptSessionManager, SceneSession, SceneSessionKey};
use crate::utils::timer::{TimerBackend, TimerToken};
use crate::window::surface::SurfaceId;

pub struct SessionManager {
    sessions: HashMap<SessionId, Session>,
    /// 存活会话，最新的在前。
    order: Vec<SessionId>,
    by_scene: HashMap<SceneSessionKey, SessionId>,
    prompt_manager: Rc<dyn PromptSessionManager>,
    timers: Rc<dyn TimerBackend>,
    suspend_grace: Duration,
    events: VecDeque<(SessionId, SessionEvent)>,
    pending_deletion: Vec<SessionId>,
}

impl SessionManager {
    pub fn new(
        prompt_manager: Rc<dyn PromptSessionManager>,
        timers: Rc<dyn TimerBackend>,
        suspend_grace: Duration,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            by_scene: HashMap::new(),
            prompt_manager,
            timers,
            suspend_grace,
            events: VecDeque::new(),
            pending_deletion: Vec::new(),
        }
    }

    pub fn set_suspend_grace(&mut self, suspend_grace: Duration) {
        self.suspend_grace = suspend_grace;
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn find(&self, scene: &Arc<dyn SceneSession>) -> Option<SessionId> {
        self.by_scene.get(&SceneSessionKey::of(scene)).copied()
    }

    /// 存活的会话，最新的在前。
    pub fn sessions(&self) -> &[SessionId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn take_events(&mut self) -> Vec<(SessionId, SessionEvent)> {
        self.events.drain(..).collect()
    }

    pub fn has_deferred(&self) -> bool {
        !self.pending_deletion.is_empty()
    }

    fn with_session<R>(
        &mut self,
        id: SessionId,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let session = self.sessions.get_mut(&id)?;
        let rv = f(session);
        self.collect(id);
        Some(rv)
    }

    fn collect(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        for event in session.take_events() {
            if event == SessionEvent::ZombieEmpty {
                // 相当于延迟删除
                if !self.pending_deletion.contains(&id) {
                    self.pending_deletion.push(id);
                }
                continue;
            }
            self.events.push_back((id, event));
        }
    }

    pub fn on_session_starting(&mut self, scene: Arc<dyn SceneSession>) -> SessionId {
        if let Some(id) = self.find(&scene) {
            warn!("session {} started twice", scene.name());
            return id;
        }

        let id = SessionId::next();
        debug!("session starting: {} (pid {})", scene.name(), scene.pid());

        let key = SceneSessionKey::of(&scene);
        let session = Session::new(
            id,
            scene,
            self.prompt_manager.clone(),
            self.timers.clone(),
            self.suspend_grace,
        );
        self.sessions.insert(id, session);
        self.by_scene.insert(key, id);
        self.order.insert(0, id);
        id
    }

    pub fn on_session_stopping(&mut self, scene: &Arc<dyn SceneSession>) -> Option<SessionId> {
        let id = self.by_scene.remove(&SceneSessionKey::of(scene))?;
        debug!("session stopping: {}", scene.name());
        self.order.retain(|s| *s != id);
        self.with_session(id, |session| session.set_live(false));
        Some(id)
    }

    pub fn set_application(&mut self, id: SessionId, application: Option<ApplicationKey>) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.set_application(application);
        }
    }

    pub fn set_live(&mut self, id: SessionId, live: bool) {
        self.with_session(id, |session| session.set_live(live));
    }

    /// 挂起会话及其所有子会话。
    pub fn suspend(&mut self, id: SessionId) {
        let Some(changed) = self.with_session(id, Session::suspend) else {
            return;
        };
        if changed {
            for child in self.children_of(id) {
                self.suspend(child);
            }
        }
    }

    pub fn resume(&mut self, id: SessionId) {
        let Some(changed) = self.with_session(id, Session::resume) else {
            return;
        };
        if changed {
            for child in self.children_of(id) {
                self.resume(child);
            }
        }
    }

    pub fn close(&mut self, id: SessionId) {
        self.with_session(id, Session::close);
    }

    /// 停止会话：先停止整棵树的提示会话（子会话优先），再停止各个会话。
    pub fn stop(&mut self, id: SessionId) {
        if self.get(id).map_or(true, |s| s.state() == SessionState::Stopped) {
            return;
        }

        self.stop_prompt_sessions(id);
        self.with_session(id, Session::stop);
        for child in self.children_of(id) {
            self.stop(child);
        }
    }

    fn stop_prompt_sessions(&mut self, id: SessionId) {
        for child in self.children_of(id) {
            self.stop_prompt_sessions(child);
        }
        self.with_session(id, Session::stop_prompt_sessions);
    }

    pub fn on_suspend_timer(&mut self, id: SessionId, token: TimerToken) {
        self.with_session(id, |session| session.on_suspend_timer(token));
    }

    pub fn set_fullscreen(&mut self, id: SessionId, fullscreen: bool) {
        self.with_session(id, |session| session.set_fullscreen(fullscreen));
    }

    pub fn set_focused(&mut self, id: SessionId, focused: bool) {
        self.with_session(id, |session| session.set_focused(focused));
    }

    pub fn request_focus(&mut self, id: SessionId) {
        self.with_session(id, Session::request_focus);
    }

    pub fn register_surface(&mut self, id: SessionId, surface: SurfaceId, first_frame_drawn: bool) {
        self.with_session(id, |session| {
            session.register_surface(surface, first_frame_drawn)
        });
    }

    pub fn on_first_frame_drawn(&mut self, id: SessionId, surface: SurfaceId) {
        self.with_session(id, |session| session.on_first_frame_drawn(surface));
    }

    pub fn on_surface_close_requested(&mut self, id: SessionId, surface: SurfaceId) {
        self.with_session(id, |session| session.on_surface_close_requested(surface));
    }

    pub fn remove_surface(&mut self, id: SessionId, surface: SurfaceId) {
        self.with_session(id, |session| session.remove_surface(surface));
    }

    fn children_of(&self, id: SessionId) -> Vec<SessionId> {
        self.get(id).map(|s| s.children().to_vec()).unwrap_or_default()
    }

    /// 子会话的表面（递归），最新的在前。
    pub fn prompt_surfaces(&self, id: SessionId) -> Vec<SurfaceId> {
        let mut surfaces = Vec::new();
        for child in self.children_of(id) {
            if let Some(session) = self.get(child) {
                surfaces.extend_from_slice(session.surfaces());
            }
            surfaces.extend(self.prompt_surfaces(child));
        }
        surfaces
    }

    pub fn add_child(&mut self, parent: SessionId, child: SessionId) {
        let index = self.get(parent).map_or(0, |s| s.children().len());
        self.insert_child(parent, index, child);
    }

    /// 插入子会话，并让它跟上父会话的状态。
    pub fn insert_child(&mut self, parent: SessionId, index: usize, child: SessionId) {
        if parent == child || !self.contains(child) {
            return;
        }
        let Some(parent_state) = self.get(parent).map(Session::state) else {
            return;
        };

        if let Some(old_parent) = self.get(child).and_then(Session::parent) {
            self.remove_child(old_parent, child);
        }

        self.with_session(parent, |session| session.insert_child(index, child));
        self.with_session(child, |session| session.set_parent(Some(parent)));

        match parent_state {
            SessionState::Starting | SessionState::Running => self.resume(child),
            SessionState::Suspending | SessionState::Suspended => self.suspend(child),
            SessionState::Stopped => self.stop(child),
        }
    }

    pub fn remove_child(&mut self, parent: SessionId, child: SessionId) {
        let removed = self
            .with_session(parent, |session| {
                let removed = session.remove_child(child);
                if removed {
                    session.delete_if_zombie_and_empty();
                }
                removed
            })
            .unwrap_or(false);

        if removed {
            self.with_session(child, |session| session.set_parent(None));
        }
    }

    pub fn on_prompt_session_starting(&mut self, prompt_session: PromptSession) {
        let Some(scene) = self.prompt_manager.application_for(prompt_session) else {
            debug!("no application for prompt session {prompt_session:?}");
            return;
        };
        let Some(id) = self.find(&scene) else {
            debug!("prompt session {prompt_session:?} for unknown session {}", scene.name());
            return;
        };
        self.with_session(id, |session| session.append_prompt_session(prompt_session));
    }

    pub fn on_prompt_session_stopping(&mut self, prompt_session: PromptSession) {
        let ids: Vec<_> = self.sessions.keys().copied().collect();
        for id in ids {
            self.with_session(id, |session| session.remove_prompt_session(prompt_session));
        }
    }

    pub fn on_prompt_provider_added(
        &mut self,
        prompt_session: PromptSession,
        provider: &Arc<dyn SceneSession>,
    ) {
        let Some(scene) = self.prompt_manager.application_for(prompt_session) else {
            return;
        };
        let (Some(parent), Some(child)) = (self.find(&scene), self.find(provider)) else {
            debug!("prompt provider {} for unknown session", provider.name());
            return;
        };
        self.add_child(parent, child);
    }

    pub fn on_prompt_provider_removed(&mut self, provider: &Arc<dyn SceneSession>) {
        if let Some(id) = self.find(provider) {
            self.set_live(id, false);
        }
    }

    /// 删除已安排删除的会话（下一次事件循环迭代时执行）。
    pub fn process_deferred(&mut self) {
        for id in std::mem::take(&mut self.pending_deletion) {
            self.delete(id);
        }
    }

    fn delete(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        // 删除安排之后又有了子会话或表面
        if session.live() || !session.children().is_empty() || !session.has_no_surfaces() {
            debug!("session {} is no longer empty, not deleting", id.get());
            session.cancel_deletion();
            return;
        }

        let parent = session.parent();
        let key = SceneSessionKey::of(session.scene());
        debug!("deleting session {} ({})", id.get(), session.name());

        if self.by_scene.get(&key) == Some(&id) {
            self.by_scene.remove(&key);
        }
        self.order.retain(|s| *s != id);

        if let Some(parent) = parent {
            self.remove_child(parent, id);
        }

        // 应用需要知道会话已删除；事件在会话移除之前入队
        self.events.push_back((id, SessionEvent::Deleted));
        self.sessions.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::{FakePromptSessions, FakeSceneSession};
    use crate::utils::timer::{ManualTimers, TimerTarget};

    struct Fixture {
        manager: SessionManager,
        prompts: Rc<FakePromptSessions>,
        timers: Rc<ManualTimers>,
    }

    fn fixture() -> Fixture {
        let prompts = Rc::new(FakePromptSessions::default());
        let timers = Rc::new(ManualTimers::new());
        let manager =
            SessionManager::new(prompts.clone(), timers.clone(), Duration::from_millis(1500));
        Fixture {
            manager,
            prompts,
            timers,
        }
    }

    fn running_session(manager: &mut SessionManager, name: &str, pid: i32) -> (SessionId, Arc<dyn SceneSession>) {
        let scene: Arc<dyn SceneSession> = FakeSceneSession::new(name, pid);
        let id = manager.on_session_starting(scene.clone());
        manager.register_surface(id, SurfaceId::next(), true);
        (id, scene)
    }

    fn state(manager: &SessionManager, id: SessionId) -> SessionState {
        manager.get(id).unwrap().state()
    }

    #[test]
    fn lookup_by_scene_session() {
        let mut f = fixture();
        let (id, scene) = running_session(&mut f.manager, "foo", 1);
        assert_eq!(f.manager.find(&scene), Some(id));
        assert_eq!(f.manager.sessions(), [id]);

        f.manager.on_session_stopping(&scene);
        assert_eq!(f.manager.find(&scene), None);
        assert_eq!(state(&f.manager, id), SessionState::Stopped);
    }

    #[test]
    fn suspend_and_resume_recurse_into_children() {
        let mut f = fixture();
        let (parent, _) = running_session(&mut f.manager, "app", 1);
        let (child, _) = running_session(&mut f.manager, "provider", 2);
        f.manager.add_child(parent, child);

        f.manager.suspend(parent);
        assert_eq!(state(&f.manager, parent), SessionState::Suspending);
        assert_eq!(state(&f.manager, child), SessionState::Suspending);

        f.manager.resume(parent);
        assert_eq!(state(&f.manager, parent), SessionState::Running);
        assert_eq!(state(&f.manager, child), SessionState::Running);
    }

    #[test]
    fn child_follows_parent_state_on_insert() {
        let mut f = fixture();
        let (parent, _) = running_session(&mut f.manager, "app", 1);
        f.manager.suspend(parent);
        let token = f.timers.take(TimerTarget::SessionSuspend(parent)).unwrap();
        f.manager.on_suspend_timer(parent, token);
        assert_eq!(state(&f.manager, parent), SessionState::Suspended);

        let (child, _) = running_session(&mut f.manager, "provider", 2);
        f.manager.insert_child(parent, 0, child);
        assert_eq!(state(&f.manager, child), SessionState::Suspending);
        assert_eq!(f.manager.get(child).unwrap().parent(), Some(parent));
    }

    #[test]
    fn stop_stops_prompt_sessions_children_first() {
        let mut f = fixture();
        let (parent, parent_scene) = running_session(&mut f.manager, "app", 1);
        let (child, child_scene) = running_session(&mut f.manager, "provider", 2);

        let outer = PromptSession(10);
        let inner = PromptSession(11);
        f.prompts.set_application(outer, parent_scene.clone());
        f.prompts.set_application(inner, child_scene.clone());
        f.manager.on_prompt_session_starting(outer);
        f.manager.on_prompt_session_starting(inner);
        f.manager.on_prompt_provider_added(outer, &child_scene);
        assert_eq!(f.manager.get(parent).unwrap().children(), [child]);

        f.manager.stop(parent);
        assert_eq!(state(&f.manager, parent), SessionState::Stopped);
        assert_eq!(state(&f.manager, child), SessionState::Stopped);
        assert_eq!(f.prompts.calls(), vec![("stop", inner), ("stop", outer)]);
    }

    #[test]
    fn prompt_session_stopping_removes_it_everywhere() {
        let mut f = fixture();
        let (id, scene) = running_session(&mut f.manager, "app", 1);
        let prompt = PromptSession(3);
        f.prompts.set_application(prompt, scene);

        f.manager.on_prompt_session_starting(prompt);
        assert_eq!(f.manager.get(id).unwrap().active_prompt_session(), Some(prompt));

        f.manager.on_prompt_session_stopping(prompt);
        assert_eq!(f.manager.get(id).unwrap().active_prompt_session(), None);
    }

    #[test]
    fn zombie_sessions_are_deleted_on_next_iteration() {
        let mut f = fixture();
        let scene: Arc<dyn SceneSession> = FakeSceneSession::new("foo", 1);
        let id = f.manager.on_session_starting(scene.clone());

        f.manager.on_session_stopping(&scene);
        assert!(f.manager.has_deferred());
        assert!(f.manager.contains(id));

        f.manager.process_deferred();
        assert!(!f.manager.contains(id));
        let events = f.manager.take_events();
        assert_eq!(events.last(), Some(&(id, SessionEvent::Deleted)));
    }

    #[test]
    fn closing_surface_delays_deletion() {
        let mut f = fixture();
        let (id, scene) = running_session(&mut f.manager, "foo", 1);
        let surface = f.manager.get(id).unwrap().surfaces()[0];
        f.manager.on_surface_close_requested(id, surface);

        f.manager.on_session_stopping(&scene);
        assert!(!f.manager.has_deferred());
        f.manager.process_deferred();
        assert!(f.manager.contains(id));

        // 关闭中的表面消失后才删除
        f.manager.remove_surface(id, surface);
        assert!(f.manager.has_deferred());
        f.manager.process_deferred();
        assert!(!f.manager.contains(id));
    }

    #[test]
    fn parent_becomes_zombie_after_last_child() {
        let mut f = fixture();
        let parent_scene: Arc<dyn SceneSession> = FakeSceneSession::new("app", 1);
        let parent = f.manager.on_session_starting(parent_scene.clone());
        let (child, child_scene) = running_session(&mut f.manager, "provider", 2);
        f.manager.add_child(parent, child);

        f.manager.on_session_stopping(&parent_scene);
        f.manager.process_deferred();
        // 还有子会话
        assert!(f.manager.contains(parent));

        f.manager.on_prompt_provider_removed(&child_scene);
        let surface = f.manager.get(child).unwrap().surfaces()[0];
        f.manager.remove_surface(child, surface);
        f.manager.process_deferred();
        assert!(!f.manager.contains(child));

        f.manager.process_deferred();
        assert!(!f.manager.contains(parent));
    }
}
