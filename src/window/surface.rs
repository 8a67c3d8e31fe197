//! 显示服务器表面在 GUI 线程上的镜像
//!
//! 位置、尺寸、状态和焦点由显示服务器通知更新；修改请求经 [`WindowController`]
//! 发回显示服务器，不在本地直接生效。

use std::collections::HashSet;
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use smithay::utils::{Logical, Point, Size};

use crate::application::session::SessionId;
use crate::mir::{RawInputEvent, SceneSurface, WindowController, WindowHandle, WindowInfo, WindowState, WindowType};
use crate::notifier::NewWindow;
use crate::utils::id::unique_id;

unique_id!(SurfaceId);

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// 第一帧已经绘制。
    Ready,
    PositionChanged(Point<i32, Logical>),
    SizeChanged(Size<i32, Logical>),
    StateChanged(WindowState),
    FocusedChanged(bool),
    LiveChanged(bool),
    /// 窗口希望获得焦点，交给界面决定。
    FocusRequested,
    CloseRequested,
}

pub struct Surface {
    id: SurfaceId,
    window: WindowHandle,
    // 保证表面在这里被销毁之前一直存在
    _scene: Arc<dyn SceneSurface>,
    session: Option<SessionId>,
    parent: Option<SurfaceId>,
    kind: WindowType,
    name: String,

    position: Point<i32, Logical>,
    size: Size<i32, Logical>,
    // 客户端不在运行时先记下，恢复后再发
    pending_resize: Option<Size<i32, Logical>>,
    state: WindowState,
    focused: bool,
    ready: bool,
    live: bool,
    frame_dropping: bool,

    views: HashSet<u64>,
    controller: Rc<dyn WindowController>,
    events: Vec<SurfaceEvent>,
}

impl Surface {
    pub fn new(
        new_window: NewWindow,
        session: Option<SessionId>,
        parent: Option<SurfaceId>,
        controller: Rc<dyn WindowController>,
    ) -> Self {
        let NewWindow { info, surface } = new_window;
        let WindowInfo {
            window,
            kind,
            name,
            state,
            top_left,
            size,
            ..
        } = info;

        Self {
            id: SurfaceId::next(),
            window,
            _scene: surface,
            session,
            parent,
            kind,
            name,
            position: top_left,
            size,
            pending_resize: None,
            state,
            focused: false,
            ready: false,
            live: true,
            frame_dropping: false,
            views: HashSet::new(),
            controller,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn window(&self) -> &WindowHandle {
        &self.window
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn parent(&self) -> Option<SurfaceId> {
        self.parent
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    pub fn kind(&self) -> WindowType {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> Point<i32, Logical> {
        self.position
    }

    pub fn size(&self) -> Size<i32, Logical> {
        self.size
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn ready(&self) -> bool {
        self.ready
    }

    pub fn live(&self) -> bool {
        self.live
    }

    pub fn frame_dropping(&self) -> bool {
        self.frame_dropping
    }

    pub fn is_being_displayed(&self) -> bool {
        !self.views.is_empty()
    }

    /// 不再存活且没有视图在显示它。
    pub fn can_be_destroyed(&self) -> bool {
        !self.live && self.views.is_empty()
    }

    pub fn take_events(&mut self) -> Vec<SurfaceEvent> {
        mem::take(&mut self.events)
    }

    pub(super) fn set_ready(&mut self) -> bool {
        if self.ready {
            return false;
        }
        self.ready = true;
        self.events.push(SurfaceEvent::Ready);
        true
    }

    pub(super) fn set_position(&mut self, position: Point<i32, Logical>) {
        if self.position != position {
            self.position = position;
            self.events.push(SurfaceEvent::PositionChanged(position));
        }
    }

    pub(super) fn set_size(&mut self, size: Size<i32, Logical>) {
        if self.size != size {
            self.size = size;
            self.events.push(SurfaceEvent::SizeChanged(size));
        }
    }

    pub(super) fn update_state(&mut self, state: WindowState) {
        if self.state != state {
            self.state = state;
            self.events.push(SurfaceEvent::StateChanged(state));
        }
    }

    pub(super) fn set_focused(&mut self, focused: bool) {
        if self.focused != focused {
            self.focused = focused;
            self.events.push(SurfaceEvent::FocusedChanged(focused));
        }
    }

    pub(super) fn set_live(&mut self, live: bool) {
        if self.live != live {
            self.live = live;
            self.events.push(SurfaceEvent::LiveChanged(live));
        }
    }

    pub(super) fn set_frame_dropping(&mut self, dropping: bool) {
        self.frame_dropping = dropping;
    }

    pub(super) fn register_view(&mut self, view: u64) {
        self.views.insert(view);
    }

    pub(super) fn unregister_view(&mut self, view: u64) {
        self.views.remove(&view);
    }

    pub fn request_focus(&mut self) {
        self.events.push(SurfaceEvent::FocusRequested);
    }

    pub fn activate(&self) {
        if self.live {
            self.controller.activate(Some(&self.window));
        } else {
            debug!("not activating dead surface {}", self.name);
        }
    }

    pub fn raise(&self) {
        self.controller.raise(&self.window);
    }

    pub fn close(&mut self) {
        if !self.live {
            return;
        }
        self.controller.request_close(&self.window);
        self.events.push(SurfaceEvent::CloseRequested);
    }

    pub fn force_close(&self) {
        if self.live {
            self.controller.force_close(&self.window);
        }
    }

    pub fn request_state(&self, state: WindowState) {
        if self.live {
            self.controller.request_state(&self.window, state);
        }
    }

    pub fn set_requested_position(&self, position: Point<i32, Logical>) {
        if self.live {
            self.controller.move_to(&self.window, position);
        }
    }

    /// 客户端没有运行时暂存，等它恢复后由 [`Self::apply_pending_resize`] 发出。
    pub fn resize(&mut self, size: Size<i32, Logical>, client_running: bool) {
        if !self.live {
            return;
        }
        if client_running {
            self.pending_resize = None;
            self.controller.resize(&self.window, size);
        } else {
            trace!("deferring resize of {} to {size:?}", self.name);
            self.pending_resize = Some(size);
        }
    }

    pub fn apply_pending_resize(&mut self) {
        if let Some(size) = self.pending_resize.take() {
            if self.live {
                self.controller.resize(&self.window, size);
            }
        }
    }

    pub fn deliver_keyboard_event(&self, event: &RawInputEvent) {
        if self.live {
            self.controller.deliver_keyboard_event(&self.window, event);
        }
    }

    pub fn deliver_touch_event(&self, event: &RawInputEvent) {
        if self.live {
            self.controller.deliver_touch_event(&self.window, event);
        }
    }

    pub fn deliver_pointer_event(&self, event: &RawInputEvent) {
        if self.live {
            self.controller.deliver_pointer_event(&self.window, event);
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("session", &self.session)
            .field("state", &self.state)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}
