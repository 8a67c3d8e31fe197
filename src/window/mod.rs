//! 界面看到的窗口
//!
//! 一个 [`Window`] 要么对应一个表面，要么是占位窗口：应用已经启动但还没有画出
//! 任何表面，或者表面已经消失（例如被内存回收杀掉）但行需要保留。占位窗口的
//! 状态和焦点在本地维护，显示服务器并不知道它们。

use std::mem;

use smithay::utils::{Logical, Point};

use crate::application::session_manager::SessionManager;
use crate::mir::WindowState;

pub mod surface;
pub mod surface_manager;
pub mod toplevel;

use self::surface::{Surface, SurfaceId};
use self::surface_manager::SurfaceManager;

#[derive(Debug, Clone, PartialEq)]
pub enum WindowChange {
    SurfaceChanged(Option<SurfaceId>),
    PositionChanged(Point<i32, Logical>),
    RequestedPositionChanged(Point<i32, Logical>),
    StateChanged(WindowState),
    FocusedChanged(bool),
    FocusRequested,
    CloseRequested,
}

#[derive(Debug)]
pub struct Window {
    id: i32,
    surface: Option<SurfaceId>,
    position: Point<i32, Logical>,
    requested_position: Point<i32, Logical>,
    state: WindowState,
    focused: bool,
    changes: Vec<WindowChange>,
}

impl Window {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            surface: None,
            position: Point::from((0, 0)),
            requested_position: Point::from((0, 0)),
            state: WindowState::Unknown,
            focused: false,
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn is_placeholder(&self) -> bool {
        self.surface.is_none()
    }

    pub fn position(&self) -> Point<i32, Logical> {
        self.position
    }

    pub fn requested_position(&self) -> Point<i32, Logical> {
        self.requested_position
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn focused(&self) -> bool {
        self.focused
    }

    pub fn take_changes(&mut self) -> Vec<WindowChange> {
        mem::take(&mut self.changes)
    }

    pub fn set_requested_position(&mut self, position: Point<i32, Logical>, surfaces: &SurfaceManager) {
        if self.requested_position == position {
            return;
        }
        self.requested_position = position;
        self.changes
            .push(WindowChange::RequestedPositionChanged(position));

        match self.surface {
            Some(surface) => surfaces.set_requested_position(surface, position),
            None => {
                // 没有表面时总是照办
                self.position = position;
                self.changes.push(WindowChange::PositionChanged(position));
            }
        }
    }

    pub fn request_state(&mut self, state: WindowState, surfaces: &SurfaceManager) {
        match self.surface {
            Some(surface) => surfaces.request_state(surface, state),
            None => {
                if self.state != state {
                    self.state = state;
                    self.changes.push(WindowChange::StateChanged(state));
                }
            }
        }
    }

    pub fn request_focus(&mut self, surfaces: &mut SurfaceManager) {
        match self.surface {
            Some(surface) => surfaces.request_focus(surface),
            None => self.changes.push(WindowChange::FocusRequested),
        }
    }

    pub fn close(&mut self, surfaces: &mut SurfaceManager, sessions: &mut SessionManager) {
        match self.surface {
            Some(surface) => surfaces.close(surface, sessions),
            None => self.changes.push(WindowChange::CloseRequested),
        }
    }

    /// 换上新表面（或清空），把已请求的位置和状态转给它，再同步它的实际值。
    pub fn set_surface(&mut self, surface: Option<&Surface>) {
        let id = surface.map(Surface::id);
        if self.surface == id {
            return;
        }
        self.surface = id;

        if let Some(surface) = surface {
            if self.requested_position != Point::from((0, 0)) {
                surface.set_requested_position(self.requested_position);
            }
            if self.state != WindowState::Unknown && self.state != surface.state() {
                surface.request_state(self.state);
            }
            self.sync(surface);
        }

        self.changes.push(WindowChange::SurfaceChanged(id));
    }

    /// 表面的位置、状态或焦点变化后调用。
    pub fn sync(&mut self, surface: &Surface) {
        debug_assert_eq!(self.surface, Some(surface.id()));

        if self.position != surface.position() {
            self.position = surface.position();
            self.changes
                .push(WindowChange::PositionChanged(self.position));
        }
        if self.state != surface.state() {
            self.state = surface.state();
            self.changes.push(WindowChange::StateChanged(self.state));
        }
        if self.focused != surface.focused() {
            self.focused = surface.focused();
            self.changes.push(WindowChange::FocusedChanged(self.focused));
        }
    }

    /// 只用于占位窗口：有表面时焦点来自表面。
    pub fn set_focused(&mut self, focused: bool) {
        if self.focused == focused {
            return;
        }
        debug_assert!(self.surface.is_none());
        self.focused = focused;
        self.changes.push(WindowChange::FocusedChanged(focused));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_complies_locally() {
        let surfaces = SurfaceManager::new(std::rc::Rc::new(
            crate::tests::fixtures::RecordingWindowController::default(),
        ));
        let mut window = Window::new(1);

        window.set_requested_position(Point::from((5, 6)), &surfaces);
        window.request_state(WindowState::Maximized, &surfaces);
        window.set_focused(true);

        assert_eq!(window.position(), Point::from((5, 6)));
        assert_eq!(window.state(), WindowState::Maximized);
        assert!(window.focused());
        assert_eq!(
            window.take_changes(),
            vec![
                WindowChange::RequestedPositionChanged(Point::from((5, 6))),
                WindowChange::PositionChanged(Point::from((5, 6))),
                WindowChange::StateChanged(WindowState::Maximized),
                WindowChange::FocusedChanged(true),
            ]
        );

        // 相同的值不产生变化
        window.set_requested_position(Point::from((5, 6)), &surfaces);
        window.set_focused(true);
        assert!(window.take_changes().is_empty());
    }
}
