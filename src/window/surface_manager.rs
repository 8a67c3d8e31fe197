//! 所有表面的所有者
//!
//! 把显示服务器的窗口通知落到对应的 [`Surface`] 上，并维护表面与会话的关联。
//! 窗口被移除后表面不会立即销毁，直到没有任何视图在显示它。

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use smithay::utils::{Logical, Size};

use super::surface::{Surface, SurfaceEvent, SurfaceId};
use crate::application::session::{SessionId, SessionState};
use crate::application::session_manager::SessionManager;
use crate::mir::{WindowController, WindowHandle, WindowHandleId, WindowInfo, WindowState};
use crate::notifier::{NewWindow, WindowEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceManagerEvent {
    Created(SurfaceId),
    Surface(SurfaceId, SurfaceEvent),
    /// 按顺序被提升的表面。
    Raised(Vec<SurfaceId>),
    Destroyed {
        surface: SurfaceId,
        session: Option<SessionId>,
    },
    ModificationsStarted,
    ModificationsEnded,
}

pub struct SurfaceManager {
    surfaces: HashMap<SurfaceId, Surface>,
    // 只包含仍在显示服务器中的窗口
    by_window: HashMap<WindowHandleId, SurfaceId>,
    controller: Rc<dyn WindowController>,
    events: Vec<SurfaceManagerEvent>,
}

impl SurfaceManager {
    pub fn new(controller: Rc<dyn WindowController>) -> Self {
        Self {
            surfaces: HashMap::new(),
            by_window: HashMap::new(),
            controller,
            events: Vec::new(),
        }
    }

    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn get_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    pub fn find(&self, window: &WindowHandle) -> Option<SurfaceId> {
        self.by_window.get(&window.id()).copied()
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn is_top_level(&self, id: SurfaceId) -> bool {
        self.get(id).is_some_and(Surface::is_top_level)
    }

    pub fn take_events(&mut self) -> Vec<SurfaceManagerEvent> {
        self.collect_surface_events();
        mem::take(&mut self.events)
    }

    fn collect_surface_events(&mut self) {
        let mut ids: Vec<_> = self.surfaces.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            if let Some(surface) = self.surfaces.get_mut(&id) {
                for event in surface.take_events() {
                    self.events.push(SurfaceManagerEvent::Surface(id, event));
                }
            }
        }
    }

    fn find_info(&self, info: &WindowInfo) -> Option<SurfaceId> {
        let id = self.find(&info.window);
        if id.is_none() {
            debug!("no surface for window {:?}", info.window);
        }
        id
    }

    pub fn handle(&mut self, event: WindowEvent, sessions: &mut SessionManager) {
        match event {
            WindowEvent::Added(new_window) => self.on_window_added(new_window, sessions),
            WindowEvent::Removed(info) => self.on_window_removed(&info, sessions),
            WindowEvent::Ready(info) => {
                let Some(id) = self.find_info(&info) else {
                    return;
                };
                let Some(surface) = self.surfaces.get_mut(&id) else {
                    return;
                };
                if surface.set_ready() {
                    if let Some(session) = surface.session() {
                        sessions.on_first_frame_drawn(session, id);
                    }
                }
            }
            WindowEvent::Moved(info, top_left) => {
                if let Some(surface) = self.find_info(&info).and_then(|id| self.surfaces.get_mut(&id)) {
                    surface.set_position(top_left);
                }
            }
            WindowEvent::Resized(info, size) => {
                if let Some(surface) = self.find_info(&info).and_then(|id| self.surfaces.get_mut(&id)) {
                    surface.set_size(size);
                }
            }
            WindowEvent::StateChanged(info, state) => {
                let Some(id) = self.find_info(&info) else {
                    return;
                };
                if let Some(surface) = self.surfaces.get_mut(&id) {
                    surface.update_state(state);
                }
                self.sync_session(id, sessions);
            }
            WindowEvent::FocusChanged(info, focused) => {
                let Some(id) = self.find_info(&info) else {
                    return;
                };
                if let Some(surface) = self.surfaces.get_mut(&id) {
                    surface.set_focused(focused);
                }
                self.sync_session(id, sessions);
            }
            WindowEvent::Raised(windows) => {
                let raised = windows.iter().filter_map(|w| self.find(w)).collect();
                self.collect_surface_events();
                self.events.push(SurfaceManagerEvent::Raised(raised));
            }
            WindowEvent::RequestedRaise(info) => {
                if let Some(surface) = self.find_info(&info).and_then(|id| self.surfaces.get_mut(&id)) {
                    surface.request_focus();
                }
            }
            WindowEvent::ModificationsStarted => {
                self.collect_surface_events();
                self.events.push(SurfaceManagerEvent::ModificationsStarted);
            }
            WindowEvent::ModificationsEnded => {
                self.collect_surface_events();
                self.events.push(SurfaceManagerEvent::ModificationsEnded);
            }
        }
    }

    fn on_window_added(&mut self, new_window: NewWindow, sessions: &mut SessionManager) {
        let session = new_window
            .info
            .window
            .application()
            .and_then(|scene| sessions.find(scene));
        let parent = new_window
            .info
            .parent
            .as_ref()
            .and_then(|parent| self.find(parent));
        let handle = new_window.info.window.id();

        let surface = Surface::new(new_window, session, parent, self.controller.clone());
        let id = surface.id();
        debug!("surface created: {} ({:?})", surface.name(), surface.kind());

        self.surfaces.insert(id, surface);
        self.by_window.insert(handle, id);

        if let Some(session) = session {
            sessions.register_surface(session, id, false);
        }
        self.sync_session(id, sessions);

        self.collect_surface_events();
        self.events.push(SurfaceManagerEvent::Created(id));
    }

    fn on_window_removed(&mut self, info: &WindowInfo, sessions: &mut SessionManager) {
        let Some(id) = self.by_window.remove(&info.window.id()) else {
            debug!("removed window {:?} is unknown", info.window);
            return;
        };

        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.set_live(false);
        }
        self.destroy_if_unused(id, sessions);
    }

    /// 让会话的全屏与焦点跟随它的表面。
    fn sync_session(&mut self, id: SurfaceId, sessions: &mut SessionManager) {
        let Some(session) = self.get(id).and_then(Surface::session) else {
            return;
        };

        let owned = || self.surfaces.values().filter(|s| s.session() == Some(session));
        let fullscreen = owned().any(|s| s.live() && s.state() == WindowState::Fullscreen);
        let focused = owned().any(|s| s.live() && s.focused());

        sessions.set_fullscreen(session, fullscreen);
        sessions.set_focused(session, focused);
    }

    fn destroy_if_unused(&mut self, id: SurfaceId, sessions: &mut SessionManager) {
        if !self.get(id).is_some_and(Surface::can_be_destroyed) {
            return;
        }

        self.collect_surface_events();
        let Some(surface) = self.surfaces.remove(&id) else {
            return;
        };
        debug!("surface destroyed: {}", surface.name());

        let session = surface.session();
        if let Some(session) = session {
            // 会话的全屏与焦点不再考虑这个表面
            let others = self
                .surfaces
                .values()
                .filter(|s| s.session() == Some(session) && s.live());
            let (mut fullscreen, mut focused) = (false, false);
            for other in others {
                fullscreen |= other.state() == WindowState::Fullscreen;
                focused |= other.focused();
            }
            sessions.set_fullscreen(session, fullscreen);
            sessions.set_focused(session, focused);
            sessions.remove_surface(session, id);
        }

        self.events
            .push(SurfaceManagerEvent::Destroyed { surface: id, session });
    }

    /// 视图开始显示表面。
    pub fn register_view(&mut self, id: SurfaceId, view: u64) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.register_view(view);
        }
    }

    pub fn unregister_view(&mut self, id: SurfaceId, view: u64, sessions: &mut SessionManager) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.unregister_view(view);
        }
        self.destroy_if_unused(id, sessions);
    }

    pub fn raise(&self, id: SurfaceId) {
        if let Some(surface) = self.get(id) {
            surface.raise();
        }
    }

    /// `None` 表示让所有窗口失去焦点。
    pub fn activate(&self, id: Option<SurfaceId>) {
        match id.and_then(|id| self.get(id)) {
            Some(surface) => surface.activate(),
            None => self.controller.activate(None),
        }
    }

    pub fn request_focus(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.request_focus();
        }
    }

    pub fn request_state(&self, id: SurfaceId, state: WindowState) {
        if let Some(surface) = self.get(id) {
            surface.request_state(state);
        }
    }

    pub fn set_requested_position(&self, id: SurfaceId, position: smithay::utils::Point<i32, Logical>) {
        if let Some(surface) = self.get(id) {
            surface.set_requested_position(position);
        }
    }

    pub fn resize(&mut self, id: SurfaceId, size: Size<i32, Logical>, sessions: &SessionManager) {
        let running = self.client_is_running(id, sessions);
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.resize(size, running);
        }
    }

    /// 请求关闭。表面从会话的表面列表移到关闭中列表。
    pub fn close(&mut self, id: SurfaceId, sessions: &mut SessionManager) {
        let Some(surface) = self.surfaces.get_mut(&id) else {
            return;
        };
        if !surface.live() {
            return;
        }
        surface.close();
        if let Some(session) = surface.session() {
            sessions.on_surface_close_requested(session, id);
        }
    }

    fn client_is_running(&self, id: SurfaceId, sessions: &SessionManager) -> bool {
        let Some(session) = self.get(id).and_then(Surface::session) else {
            return true;
        };
        sessions.get(session).map_or(true, |s| {
            matches!(
                s.state(),
                SessionState::Starting | SessionState::Running | SessionState::Suspending
            )
        })
    }

    /// 会话状态变化后补发暂存的尺寸请求。
    pub fn on_session_state_changed(&mut self, session: SessionId, state: SessionState) {
        let running = matches!(
            state,
            SessionState::Starting | SessionState::Running | SessionState::Suspending
        );
        if !running {
            return;
        }

        for surface in self.surfaces.values_mut() {
            if surface.session() == Some(session) {
                surface.apply_pending_resize();
            }
        }
    }

    pub fn set_frame_dropping(&mut self, surfaces: &[SurfaceId], dropping: bool) {
        for id in surfaces {
            if let Some(surface) = self.surfaces.get_mut(id) {
                surface.set_frame_dropping(dropping);
            }
        }
    }
}

impl std::fmt::Debug for SurfaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceManager")
            .field("surfaces", &self.surfaces.len())
            .field("windows", &self.by_window.len())
            .finish_non_exhaustive()
    }
}
