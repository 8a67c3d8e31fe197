//! 作用：无头后端
//! 说明：没有显示服务器时使用。窗口命令只记录日志，没有提示会话。
//! 用途：
//!   - 只管理进程生命周期的独立运行
//!   - 在没有图形环境的机器上检查配置和任务控制器

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::mir::{
    Margins, PromptSession, PromptSessionManager, RawInputEvent, SceneSession, WindowController,
    WindowHandle, WindowState, WindowType,
};

// 结构：无头后端
// 记录最近一次设置的窗口边界和边距，方便日志和调试
#[derive(Debug, Default)]
pub struct Headless {
    boundaries: Cell<Option<Rectangle<i32, Logical>>>,
    margins: RefCell<HashMap<WindowType, Margins>>,
}

impl Headless {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boundaries(&self) -> Option<Rectangle<i32, Logical>> {
        self.boundaries.get()
    }

    pub fn margins(&self, kind: WindowType) -> Option<Margins> {
        self.margins.borrow().get(&kind).copied()
    }
}

impl WindowController for Headless {
    fn activate(&self, window: Option<&WindowHandle>) {
        debug!("activate {window:?}");
    }

    fn raise(&self, window: &WindowHandle) {
        debug!("raise {window:?}");
    }

    fn resize(&self, window: &WindowHandle, size: Size<i32, Logical>) {
        debug!("resize {window:?} to {size:?}");
    }

    fn move_to(&self, window: &WindowHandle, top_left: Point<i32, Logical>) {
        debug!("move {window:?} to {top_left:?}");
    }

    fn request_close(&self, window: &WindowHandle) {
        debug!("request close {window:?}");
    }

    fn force_close(&self, window: &WindowHandle) {
        debug!("force close {window:?}");
    }

    fn request_state(&self, window: &WindowHandle, state: WindowState) {
        debug!("request state {state:?} for {window:?}");
    }

    // 输入事件没有可以送达的地方
    fn deliver_keyboard_event(&self, window: &WindowHandle, _event: &RawInputEvent) {
        trace!("dropping keyboard event for {window:?}");
    }

    fn deliver_touch_event(&self, window: &WindowHandle, _event: &RawInputEvent) {
        trace!("dropping touch event for {window:?}");
    }

    fn deliver_pointer_event(&self, window: &WindowHandle, _event: &RawInputEvent) {
        trace!("dropping pointer event for {window:?}");
    }

    fn set_window_position_boundaries(&self, boundaries: Rectangle<i32, Logical>) {
        debug!("window position boundaries: {boundaries:?}");
        self.boundaries.set(Some(boundaries));
    }

    fn set_window_margins(&self, kind: WindowType, margins: Margins) {
        debug!("window margins for {kind:?}: {margins:?}");
        self.margins.borrow_mut().insert(kind, margins);
    }
}

impl PromptSessionManager for Headless {
    fn application_for(&self, _prompt_session: PromptSession) -> Option<Arc<dyn SceneSession>> {
        None
    }

    fn suspend_prompt_session(&self, prompt_session: PromptSession) {
        debug!("suspend {prompt_session:?}");
    }

    fn resume_prompt_session(&self, prompt_session: PromptSession) {
        debug!("resume {prompt_session:?}");
    }

    fn stop_prompt_session(&self, prompt_session: PromptSession) {
        debug!("stop {prompt_session:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_boundaries_and_margins() {
        let headless = Headless::new();
        assert_eq!(headless.boundaries(), None);

        let rect = Rectangle::new(Point::from((0, 10)), Size::from((100, 200)));
        headless.set_window_position_boundaries(rect);
        assert_eq!(headless.boundaries(), Some(rect));

        let margins = Margins {
            left: 1,
            top: 2,
            right: 3,
            bottom: 4,
        };
        headless.set_window_margins(WindowType::Dialog, margins);
        assert_eq!(headless.margins(WindowType::Dialog), Some(margins));
        assert_eq!(headless.margins(WindowType::Normal), None);
    }
}
