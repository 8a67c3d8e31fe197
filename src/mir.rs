//! 显示服务器（Mir 场景）一侧的协作者
//!
//! 这里只有接口：窗口管理回调在显示服务器线程上产生，真正的实现（合成、输入、
//! 窗口策略）都在外部。本 crate 通过这些 trait 观察会话与窗口，并把命令发回去。

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::utils::id::unique_id;

pub type Pid = i32;

/// 发给客户端的生命周期提示。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    WillSuspend,
    Resumed,
}

/// 一个已连接的客户端会话。
pub trait SceneSession: Send + Sync + fmt::Debug {
    fn name(&self) -> String;
    fn pid(&self) -> Pid;
    fn set_lifecycle_state(&self, state: LifecycleState);
}

/// 显示服务器中的一个表面。生命周期由显示服务器决定。
pub trait SceneSurface: Send + Sync + fmt::Debug {
    fn name(&self) -> String;
}

/// 按指针身份区分场景会话。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneSessionKey(usize);

impl SceneSessionKey {
    pub fn of(session: &Arc<dyn SceneSession>) -> Self {
        Self(Arc::as_ptr(session) as *const () as usize)
    }
}

/// 提示会话（例如输入法或在线账户弹出的信任提示）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromptSession(pub u64);

pub trait PromptSessionManager {
    /// 发起该提示会话的应用会话。
    fn application_for(&self, prompt_session: PromptSession) -> Option<Arc<dyn SceneSession>>;
    fn suspend_prompt_session(&self, prompt_session: PromptSession);
    fn resume_prompt_session(&self, prompt_session: PromptSession);
    fn stop_prompt_session(&self, prompt_session: PromptSession);
}

unique_id!(WindowHandleId);

/// 显示服务器的窗口句柄。
///
/// 只弱引用表面：显示服务器可以在任何时候销毁它。需要强引用时用
/// [`NewWindow`](crate::notifier::NewWindow) 在创建时捕获。
#[derive(Clone)]
pub struct WindowHandle {
    id: WindowHandleId,
    surface: Weak<dyn SceneSurface>,
    application: Option<Arc<dyn SceneSession>>,
}

impl WindowHandle {
    pub fn new(surface: &Arc<dyn SceneSurface>, application: Option<Arc<dyn SceneSession>>) -> Self {
        Self {
            id: WindowHandleId::next(),
            surface: Arc::downgrade(surface),
            application,
        }
    }

    pub fn id(&self) -> WindowHandleId {
        self.id
    }

    pub fn surface(&self) -> Option<Arc<dyn SceneSurface>> {
        self.surface.upgrade()
    }

    pub fn application(&self) -> Option<&Arc<dyn SceneSession>> {
        self.application.as_ref()
    }
}

impl PartialEq for WindowHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WindowHandle {}

impl Hash for WindowHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowHandle")
            .field("id", &self.id)
            .field("alive", &(self.surface.strong_count() > 0))
            .field("pid", &self.application.as_ref().map(|a| a.pid()))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowType {
    Normal,
    Utility,
    Dialog,
    Gloss,
    Freestyle,
    Menu,
    InputMethod,
    Satellite,
    Tip,
    Decoration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WindowState {
    #[default]
    Unknown,
    Restored,
    Minimized,
    Maximized,
    VertMaximized,
    HorizMaximized,
    Fullscreen,
    Hidden,
    MaximizedLeft,
    MaximizedRight,
}

/// 显示服务器对窗口的一次描述快照。
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub window: WindowHandle,
    pub kind: WindowType,
    pub name: String,
    pub state: WindowState,
    pub top_left: Point<i32, Logical>,
    pub size: Size<i32, Logical>,
    pub parent: Option<WindowHandle>,
}

impl WindowInfo {
    pub fn new(window: WindowHandle, kind: WindowType) -> Self {
        Self {
            window,
            kind,
            name: String::new(),
            state: WindowState::Restored,
            top_left: Point::from((0, 0)),
            size: Size::from((0, 0)),
            parent: None,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Margins {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// 原样转交给显示服务器的输入事件，内容不在本 crate 的解释范围内。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInputEvent(pub Box<[u8]>);

/// 发往显示服务器窗口管理的命令。
pub trait WindowController {
    /// `None` 表示让所有窗口失去焦点。
    fn activate(&self, window: Option<&WindowHandle>);
    fn raise(&self, window: &WindowHandle);
    fn resize(&self, window: &WindowHandle, size: Size<i32, Logical>);
    fn move_to(&self, window: &WindowHandle, top_left: Point<i32, Logical>);
    fn request_close(&self, window: &WindowHandle);
    fn force_close(&self, window: &WindowHandle);
    fn request_state(&self, window: &WindowHandle, state: WindowState);
    fn deliver_keyboard_event(&self, window: &WindowHandle, event: &RawInputEvent);
    fn deliver_touch_event(&self, window: &WindowHandle, event: &RawInputEvent);
    fn deliver_pointer_event(&self, window: &WindowHandle, event: &RawInputEvent);
    fn set_window_position_boundaries(&self, boundaries: Rectangle<i32, Logical>);
    fn set_window_margins(&self, kind: WindowType, margins: Margins);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Dummy;

    impl SceneSurface for Dummy {
        fn name(&self) -> String {
            "dummy".to_owned()
        }
    }

    #[test]
    fn handle_does_not_keep_surface_alive() {
        let surface: Arc<dyn SceneSurface> = Arc::new(Dummy);
        let handle = WindowHandle::new(&surface, None);
        assert!(handle.surface().is_some());

        drop(surface);
        assert!(handle.surface().is_none());
    }

    #[test]
    fn handles_compare_by_identity() {
        let surface: Arc<dyn SceneSurface> = Arc::new(Dummy);
        let a = WindowHandle::new(&surface, None);
        let b = WindowHandle::new(&surface, None);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
