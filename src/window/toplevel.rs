//! 顶层窗口列表
//!
//! 界面按这个列表的顺序堆叠窗口，第 0 行在最上面。每个没有表面的运行中应用都有
//! 一个占位行；应用的第一个顶层表面会填进这一行，之后的表面各自新增一行。
//!
//! 焦点变化由显示服务器成批通知（`ModificationsStarted` … `ModificationsEnded`），
//! 一批之内的多次变化合并成一次 [`ModelEvent::FocusedWindowChanged`]。

use std::mem;

use smithay::utils::{Logical, Point};

use super::surface::{Surface, SurfaceEvent, SurfaceId};
use super::surface_manager::SurfaceManager;
use super::{Window, WindowChange};
use crate::application::session_manager::SessionManager;
use crate::application::{ApplicationKey, State};
use crate::mir::{WindowState, WindowType};
use crate::model::{ListChange, ModelState, Role, RoleData};

const MAX_WINDOW_ID: i32 = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    List(ListChange),
    CountChanged,
    FocusedWindowChanged(Option<i32>),
    InputMethodSurfaceChanged(Option<SurfaceId>),
    Window { id: i32, change: WindowChange },
    /// 占位窗口被要求关闭，需要关闭它的应用。
    CloseApplication(ApplicationKey),
}

#[derive(Debug)]
struct Entry {
    window: Window,
    application: ApplicationKey,
    app_id: String,
    remove_once_surface_destroyed: bool,
}

#[derive(Debug)]
pub struct TopLevelWindowModel {
    entries: Vec<Entry>,
    input_method: Option<Window>,
    state: ModelState,
    next_id: i32,

    focused_window: Option<i32>,
    // 一批修改之内的焦点变化
    focused_window_changed: bool,
    newly_focused: Option<i32>,

    deferred_raises: Vec<i32>,
    events: Vec<ModelEvent>,
}

impl Default for TopLevelWindowModel {
    fn default() -> Self {
        Self::new()
    }
}

impl TopLevelWindowModel {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            input_method: None,
            state: ModelState::Idle,
            next_id: 1,
            focused_window: None,
            focused_window_changed: false,
            newly_focused: None,
            deferred_raises: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window_at(&self, row: usize) -> Option<&Window> {
        self.entries.get(row).map(|e| &e.window)
    }

    pub fn surface_at(&self, row: usize) -> Option<SurfaceId> {
        self.window_at(row).and_then(Window::surface)
    }

    pub fn application_at(&self, row: usize) -> Option<ApplicationKey> {
        self.entries.get(row).map(|e| e.application)
    }

    pub fn id_at(&self, row: usize) -> Option<i32> {
        self.window_at(row).map(Window::id)
    }

    pub fn index_for_id(&self, id: i32) -> Option<usize> {
        self.entries.iter().position(|e| e.window.id() == id)
    }

    pub fn window(&self, id: i32) -> Option<&Window> {
        self.index_for_id(id).map(|row| &self.entries[row].window)
    }

    /// 应用的占位窗口 id。
    pub fn placeholder_of(&self, application: ApplicationKey) -> Option<i32> {
        self.entries
            .iter()
            .find(|e| e.application == application && e.window.is_placeholder())
            .map(|e| e.window.id())
    }

    fn index_of_surface(&self, surface: SurfaceId) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.window.surface() == Some(surface))
    }

    pub fn focused_window(&self) -> Option<i32> {
        self.focused_window
    }

    pub fn input_method_surface(&self) -> Option<SurfaceId> {
        self.input_method.as_ref().and_then(Window::surface)
    }

    /// 模型正在修改，或者界面还没有看到上一次的列表变化。
    pub fn is_busy(&self) -> bool {
        self.state != ModelState::Idle
            || self.events.iter().any(|e| matches!(e, ModelEvent::List(_)))
    }

    pub fn take_events(&mut self) -> Vec<ModelEvent> {
        mem::take(&mut self.events)
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred_raises.is_empty()
    }

    pub fn data(&self, row: usize, role: Role) -> Option<RoleData> {
        let entry = self.entries.get(row)?;
        match role {
            Role::Window => Some(RoleData::Window {
                id: entry.window.id(),
                surface: entry.window.surface(),
                state: entry.window.state(),
                position: entry.window.position(),
            }),
            Role::Application => Some(RoleData::Application(entry.application)),
            _ => None,
        }
    }

    /// 重新载入整个应用列表。
    pub fn reset<'a>(
        &mut self,
        applications: impl IntoIterator<Item = (ApplicationKey, &'a str, State, usize)>,
        surfaces: &SurfaceManager,
    ) {
        assert_eq!(self.state, ModelState::Idle);
        self.state = ModelState::Resetting;

        self.entries.clear();
        self.focused_window = None;
        self.newly_focused = None;
        self.focused_window_changed = false;
        for (key, app_id, state, surface_count) in applications {
            self.add_application(key, app_id, state, surface_count, surfaces);
        }

        self.events.push(ModelEvent::List(ListChange::Reset));
        self.events.push(ModelEvent::CountChanged);
        self.state = ModelState::Idle;
        self.publish_focused_placeholder();
    }

    pub fn add_application(
        &mut self,
        key: ApplicationKey,
        app_id: &str,
        state: State,
        surface_count: usize,
        surfaces: &SurfaceManager,
    ) {
        debug!("add_application {app_id}");
        if state != State::Stopped && surface_count == 0 {
            self.prepend(None, key, app_id, surfaces);
        }
    }

    pub fn remove_application(&mut self, key: ApplicationKey) {
        assert_eq!(self.state, ModelState::Idle);

        let mut row = 0;
        while row < self.entries.len() {
            if self.entries[row].application == key {
                self.remove_at(row);
            } else {
                row += 1;
            }
        }
    }

    pub fn on_surface_created(
        &mut self,
        id: SurfaceId,
        application: Option<(ApplicationKey, &str)>,
        surfaces: &SurfaceManager,
    ) {
        let Some(surface) = surfaces.get(id) else {
            return;
        };

        if surface.kind() == WindowType::InputMethod {
            let mut window = Window::new(self.generate_id());
            window.set_surface(Some(surface));
            window.take_changes();
            if self.input_method.replace(window).is_some() {
                warn!("multiple input method surfaces, replacing the old one");
            }
            self.events
                .push(ModelEvent::InputMethodSurfaceChanged(Some(id)));
            return;
        }

        if !surface.is_top_level() {
            return;
        }

        match application {
            Some((key, app_id)) => self.prepend_surface(surface, key, app_id, surfaces),
            // 提示会话的表面出现在发起它的应用的提示表面列表中
            None => debug!("surface {} belongs to no application", surface.name()),
        }
    }

    fn prepend_surface(
        &mut self,
        surface: &Surface,
        key: ApplicationKey,
        app_id: &str,
        surfaces: &SurfaceManager,
    ) {
        let placeholder = self
            .entries
            .iter()
            .position(|e| e.application == key && e.window.is_placeholder());

        match placeholder {
            Some(row) => {
                self.entries[row].window.set_surface(Some(surface));
                self.flush_window(row);
                debug!("{app_id}: filled placeholder, now {}", self.dump());
            }
            None => {
                debug!("{app_id}: adding a row for a new surface");
                self.prepend(Some(surface), key, app_id, surfaces);
            }
        }
    }

    fn prepend(
        &mut self,
        surface: Option<&Surface>,
        key: ApplicationKey,
        app_id: &str,
        surfaces: &SurfaceManager,
    ) {
        let signal = match self.state {
            ModelState::Idle => {
                self.state = ModelState::Inserting;
                true
            }
            state => {
                // 整体重置时没有必要逐行通知
                assert_eq!(state, ModelState::Resetting);
                false
            }
        };

        let id = self.generate_id();
        let mut window = Window::new(id);
        window.set_surface(surface);
        window.take_changes();
        self.entries.insert(
            0,
            Entry {
                window,
                application: key,
                app_id: app_id.to_owned(),
                remove_once_surface_destroyed: false,
            },
        );

        if signal {
            self.events
                .push(ModelEvent::List(ListChange::Inserted { first: 0, last: 0 }));
            self.events.push(ModelEvent::CountChanged);
            self.state = ModelState::Idle;
        }

        if surface.is_none() {
            // 显示服务器不知道占位窗口，只能由我们给它焦点
            self.entries[0].window.set_focused(true);
            self.flush_window(0);

            let previous_has_surface = self
                .focused_window
                .and_then(|id| self.window(id))
                .is_some_and(|w| !w.is_placeholder());
            if self.state == ModelState::Idle {
                self.set_focused_window(Some(id));
            } else {
                self.focused_window = Some(id);
            }
            if previous_has_surface {
                surfaces.activate(None);
            }
        }

        trace!("after prepend: {}", self.dump());
    }

    fn publish_focused_placeholder(&mut self) {
        if self.focused_window.is_some() {
            self.events
                .push(ModelEvent::FocusedWindowChanged(self.focused_window));
        }
    }

    fn remove_at(&mut self, row: usize) {
        let signal = match self.state {
            ModelState::Idle => {
                self.state = ModelState::Removing;
                true
            }
            state => {
                assert_eq!(state, ModelState::Resetting);
                false
            }
        };

        let entry = self.entries.remove(row);
        let id = entry.window.id();

        if signal {
            self.events.push(ModelEvent::List(ListChange::Removed {
                first: row,
                last: row,
            }));
            self.events.push(ModelEvent::CountChanged);
            self.state = ModelState::Idle;
        }

        if self.newly_focused == Some(id) {
            self.newly_focused = None;
        }
        if self.focused_window == Some(id) {
            self.set_focused_window(None);
        }
        self.deferred_raises.retain(|r| *r != id);

        trace!("after remove: {}", self.dump());
    }

    fn move_row(&mut self, from: usize, to: usize) {
        if from == to || from >= self.entries.len() || to >= self.entries.len() {
            return;
        }

        assert_eq!(self.state, ModelState::Idle);
        self.state = ModelState::Moving;

        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        self.events.push(ModelEvent::List(ListChange::Moved {
            from,
            to: ListChange::move_destination(from, to),
        }));

        self.state = ModelState::Idle;
        trace!("after move: {}", self.dump());
    }

    fn set_focused_window(&mut self, id: Option<i32>) {
        if self.focused_window == id {
            return;
        }
        debug!("focused window: {id:?}");

        let previous = mem::replace(&mut self.focused_window, id);
        self.events.push(ModelEvent::FocusedWindowChanged(id));

        // 显示服务器不知道占位窗口，由我们取消它的焦点
        if let Some(row) = previous.and_then(|id| self.index_for_id(id)) {
            let window = &mut self.entries[row].window;
            if window.focused() && window.is_placeholder() {
                window.set_focused(false);
                self.flush_window(row);
            }
        }
    }

    fn generate_id(&mut self) -> i32 {
        let id = self.next_free_id(self.next_id);
        self.next_id = self.next_free_id(id + 1);
        id
    }

    fn next_free_id(&self, mut candidate: i32) -> i32 {
        debug_assert!(self.entries.len() < MAX_WINDOW_ID as usize);
        loop {
            if candidate > MAX_WINDOW_ID {
                candidate = 1;
            }
            if self.index_for_id(candidate).is_none() {
                return candidate;
            }
            candidate += 1;
        }
    }

    /// 把窗口的变化转发出去，并记录表面焦点的变化。
    fn flush_window(&mut self, row: usize) {
        let entry = &mut self.entries[row];
        let id = entry.window.id();
        let has_surface = !entry.window.is_placeholder();

        for change in entry.window.take_changes() {
            if let WindowChange::FocusedChanged(focused) = change {
                if has_surface {
                    self.focused_window_changed = true;
                    if focused {
                        if self.newly_focused.is_some() {
                            debug!("more than one window gained focus in one batch");
                        }
                        self.newly_focused = Some(id);
                    }
                }
            }
            self.events.push(ModelEvent::Window { id, change });
        }
    }

    pub fn on_surface_event(
        &mut self,
        id: SurfaceId,
        event: &SurfaceEvent,
        surfaces: &SurfaceManager,
        application_state: impl Fn(ApplicationKey) -> Option<State>,
    ) {
        if self.input_method_surface() == Some(id) {
            match event {
                SurfaceEvent::LiveChanged(false) => self.remove_input_method(),
                _ => {
                    if let (Some(window), Some(surface)) = (self.input_method.as_mut(), surfaces.get(id)) {
                        window.sync(surface);
                        window.take_changes();
                    }
                }
            }
            return;
        }

        let Some(row) = self.index_of_surface(id) else {
            return;
        };
        let window_id = self.entries[row].window.id();

        match event {
            SurfaceEvent::LiveChanged(false) => self.on_surface_died(row, application_state),
            SurfaceEvent::PositionChanged(_)
            | SurfaceEvent::StateChanged(_)
            | SurfaceEvent::FocusedChanged(_) => {
                if let Some(surface) = surfaces.get(id) {
                    self.entries[row].window.sync(surface);
                }
                self.flush_window(row);
            }
            SurfaceEvent::FocusRequested => self.events.push(ModelEvent::Window {
                id: window_id,
                change: WindowChange::FocusRequested,
            }),
            SurfaceEvent::CloseRequested => self.events.push(ModelEvent::Window {
                id: window_id,
                change: WindowChange::CloseRequested,
            }),
            SurfaceEvent::Ready | SurfaceEvent::SizeChanged(_) | SurfaceEvent::LiveChanged(true) => (),
        }
    }

    fn on_surface_died(&mut self, row: usize, application_state: impl Fn(ApplicationKey) -> Option<State>) {
        let entry = &mut self.entries[row];
        let state = application_state(entry.application);
        if state == Some(State::Starting) {
            warn!("{} is starting but already had a surface", entry.app_id);
        }

        // 不是在运行中失去表面的，多半是被内存回收杀掉了：保留这一行，界面可以
        // 显示截图
        entry.remove_once_surface_destroyed = matches!(state, Some(State::Running) | None);
    }

    pub fn on_surface_destroyed(&mut self, id: SurfaceId) {
        if self.input_method_surface() == Some(id) {
            self.remove_input_method();
            return;
        }

        let Some(row) = self.index_of_surface(id) else {
            return;
        };

        if self.entries[row].remove_once_surface_destroyed {
            self.remove_at(row);
        } else {
            let window = &mut self.entries[row].window;
            window.set_surface(None);
            window.set_focused(false);
            self.flush_window(row);
            debug!("kept row without surface: {}", self.dump());
        }
    }

    fn remove_input_method(&mut self) {
        if self.input_method.take().is_some() {
            self.events.push(ModelEvent::InputMethodSurfaceChanged(None));
        }
    }

    pub fn on_surfaces_raised(&mut self, raised: &[SurfaceId]) {
        for surface in raised {
            if let Some(from) = self.index_of_surface(*surface) {
                self.move_row(from, 0);
            }
        }
    }

    pub fn on_modifications_started(&mut self) {}

    pub fn on_modifications_ended(&mut self) {
        if self.focused_window_changed {
            // 占位窗口的焦点不受表面失去焦点的影响
            let keep_placeholder = self.newly_focused.is_none()
                && self
                    .focused_window
                    .and_then(|id| self.window(id))
                    .is_some_and(|w| w.is_placeholder() && w.focused());
            if !keep_placeholder {
                self.set_focused_window(self.newly_focused);
            }
        }

        self.focused_window_changed = false;
        self.newly_focused = None;
    }

    /// 把窗口提到最上面。列表刚变化过时推迟到下一轮事件循环。
    pub fn raise_id(&mut self, id: i32, surfaces: &SurfaceManager) {
        if self.is_busy() {
            debug!("raise_id({id}): model busy, trying again later");
            if !self.deferred_raises.contains(&id) {
                self.deferred_raises.push(id);
            }
            return;
        }

        let Some(row) = self.index_for_id(id) else {
            return;
        };
        match self.entries[row].window.surface() {
            Some(surface) => surfaces.raise(surface),
            // 显示服务器不知道占位窗口，自己移动
            None => self.move_row(row, 0),
        }
    }

    pub fn process_deferred(&mut self, surfaces: &SurfaceManager) {
        for id in mem::take(&mut self.deferred_raises) {
            self.raise_id(id, surfaces);
        }
    }

    pub fn request_focus(&mut self, id: i32, surfaces: &mut SurfaceManager) {
        let Some(row) = self.index_for_id(id) else {
            return;
        };

        if !self.entries[row].window.is_placeholder() {
            self.entries[row].window.request_focus(surfaces);
            return;
        }

        self.entries[row].window.set_focused(true);
        self.flush_window(row);

        let previous = self.focused_window;
        self.raise_id(id, surfaces);
        self.set_focused_window(Some(id));

        let previous_surface_focused = previous
            .and_then(|id| self.window(id))
            .and_then(Window::surface)
            .and_then(|s| surfaces.get(s))
            .is_some_and(Surface::focused);
        if previous_surface_focused {
            surfaces.activate(None);
        }
    }

    pub fn close(&mut self, id: i32, surfaces: &mut SurfaceManager, sessions: &mut SessionManager) {
        let Some(row) = self.index_for_id(id) else {
            return;
        };

        let entry = &mut self.entries[row];
        if entry.window.is_placeholder() {
            let key = entry.application;
            self.events.push(ModelEvent::CloseApplication(key));
        } else {
            entry.window.close(surfaces, sessions);
            self.flush_window(row);
        }
    }

    pub fn request_state(&mut self, id: i32, state: WindowState, surfaces: &SurfaceManager) {
        if let Some(row) = self.index_for_id(id) {
            self.entries[row].window.request_state(state, surfaces);
            self.flush_window(row);
        }
    }

    pub fn set_requested_position(
        &mut self,
        id: i32,
        position: Point<i32, Logical>,
        surfaces: &SurfaceManager,
    ) {
        if let Some(row) = self.index_for_id(id) {
            self.entries[row]
                .window
                .set_requested_position(position, surfaces);
            self.flush_window(row);
        }
    }

    /// 每行一条，用于日志和测试。
    pub fn dump(&self) -> String {
        let mut lines = Vec::with_capacity(self.entries.len());
        for (row, entry) in self.entries.iter().enumerate() {
            let window = &entry.window;
            let mut line = format!("{row}: {} id={}", entry.app_id, window.id());
            if window.is_placeholder() {
                line.push_str(" placeholder");
            }
            if window.focused() {
                line.push_str(" focused");
            }
            if self.focused_window == Some(window.id()) {
                line.push_str(" *");
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::Duration;

    use insta::assert_snapshot;

    use super::*;
    use crate::mir::SceneSession;
    use crate::notifier::{NewWindow, WindowEvent};
    use crate::tests::fixtures::{
        window_info, Command, FakePromptSessions, FakeSceneSession, FakeSceneSurface,
        RecordingWindowController,
    };
    use crate::utils::timer::ManualTimers;
    use crate::window::surface_manager::SurfaceManagerEvent;

    struct Fixture {
        model: TopLevelWindowModel,
        surfaces: SurfaceManager,
        sessions: SessionManager,
        controller: Rc<RecordingWindowController>,
        // 保持场景表面存活
        scene_surfaces: Vec<Arc<FakeSceneSurface>>,
    }

    impl Fixture {
        fn new() -> Self {
            let controller = Rc::new(RecordingWindowController::default());
            Self {
                model: TopLevelWindowModel::new(),
                surfaces: SurfaceManager::new(controller.clone()),
                sessions: SessionManager::new(
                    Rc::new(FakePromptSessions::default()),
                    Rc::new(ManualTimers::new()),
                    Duration::from_millis(1500),
                ),
                controller,
                scene_surfaces: Vec::new(),
            }
        }

        fn add_app(&mut self, app_id: &str) -> ApplicationKey {
            let key = ApplicationKey::next();
            self.model
                .add_application(key, app_id, State::Starting, 0, &self.surfaces);
            key
        }

        fn add_surface(&mut self, key: ApplicationKey, app_id: &str, kind: WindowType) -> (SurfaceId, crate::mir::WindowInfo) {
            let scene: Arc<dyn SceneSession> = FakeSceneSession::new(app_id, 1);
            let surface = FakeSceneSurface::new(app_id);
            let info = window_info(&surface, Some(scene), kind);
            self.scene_surfaces.push(surface);

            self.surfaces.handle(
                WindowEvent::Added(NewWindow::new(info.clone()).unwrap()),
                &mut self.sessions,
            );
            let id = self.surfaces.find(&info.window).unwrap();
            self.model
                .on_surface_created(id, Some((key, app_id)), &self.surfaces);
            (id, info)
        }

        fn notify(&mut self, event: WindowEvent, state: Option<State>) {
            self.surfaces.handle(event, &mut self.sessions);
            for event in self.surfaces.take_events() {
                match event {
                    SurfaceManagerEvent::Surface(id, ev) => {
                        self.model
                            .on_surface_event(id, &ev, &self.surfaces, |_| state);
                    }
                    SurfaceManagerEvent::Destroyed {
                        surface, ..
                    } => self.model.on_surface_destroyed(surface),
                    SurfaceManagerEvent::Raised(ids) => {
                        self.model.on_surfaces_raised(&ids)
                    }
                    SurfaceManagerEvent::ModificationsStarted => {
                        self.model.on_modifications_started()
                    }
                    SurfaceManagerEvent::ModificationsEnded => {
                        self.model.on_modifications_ended()
                    }
                    SurfaceManagerEvent::Created(_) => (),
                }
            }
        }
    }

    #[test]
    fn placeholder_is_filled_by_first_surface() {
        let mut f = Fixture::new();
        let key = f.add_app("foo");
        assert_snapshot!(f.model.dump(), @"0: foo id=1 placeholder focused *");

        let (surface, _) = f.add_surface(key, "foo", WindowType::Normal);
        assert_eq!(f.model.count(), 1);
        assert_eq!(f.model.surface_at(0), Some(surface));

        f.add_surface(key, "foo", WindowType::Normal);
        assert_eq!(f.model.count(), 2);
        assert_snapshot!(f.model.dump(), @r"
        0: foo id=2
        1: foo id=1 *
        ");
    }

    #[test]
    fn stopped_or_drawn_app_gets_no_placeholder() {
        let mut f = Fixture::new();
        f.model
            .add_application(ApplicationKey::next(), "a", State::Stopped, 0, &f.surfaces);
        f.model
            .add_application(ApplicationKey::next(), "b", State::Running, 1, &f.surfaces);
        assert!(f.model.is_empty());
    }

    #[test]
    fn removing_app_removes_all_rows() {
        let mut f = Fixture::new();
        let foo = f.add_app("foo");
        let bar = f.add_app("bar");
        f.add_surface(foo, "foo", WindowType::Normal);
        f.add_surface(foo, "foo", WindowType::Normal);
        assert_eq!(f.model.count(), 3);
        f.model.take_events();

        f.model.remove_application(foo);
        assert_eq!(f.model.count(), 1);
        assert_eq!(f.model.application_at(0), Some(bar));
        let removed = f
            .model
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, ModelEvent::List(ListChange::Removed { .. })))
            .count();
        assert_eq!(removed, 2);
    }

    #[test]
    fn prompt_and_child_surfaces_are_ignored() {
        let mut f = Fixture::new();
        let scene = FakeSceneSurface::new("prompt");
        let info = window_info(&scene, None, WindowType::Normal);
        f.surfaces.handle(
            WindowEvent::Added(NewWindow::new(info.clone()).unwrap()),
            &mut f.sessions,
        );
        let id = f.surfaces.find(&info.window).unwrap();
        f.model.on_surface_created(id, None, &f.surfaces);
        assert!(f.model.is_empty());
    }

    #[test]
    fn input_method_uses_its_own_slot() {
        let mut f = Fixture::new();
        let key = f.add_app("maliit");
        let (first, _) = f.add_surface(key, "maliit", WindowType::InputMethod);
        let (second, info) = f.add_surface(key, "maliit", WindowType::InputMethod);

        assert_eq!(f.model.input_method_surface(), Some(second));
        assert_ne!(first, second);
        // 只有应用的占位行
        assert_eq!(f.model.count(), 1);

        f.notify(WindowEvent::Removed(info), Some(State::Running));
        assert_eq!(f.model.input_method_surface(), None);
        assert!(f
            .model
            .take_events()
            .contains(&ModelEvent::InputMethodSurfaceChanged(None)));
    }

    #[test]
    fn running_app_row_goes_with_its_surface() {
        let mut f = Fixture::new();
        let key = f.add_app("foo");
        let (_, info) = f.add_surface(key, "foo", WindowType::Normal);

        f.notify(WindowEvent::Removed(info), Some(State::Running));
        assert!(f.model.is_empty());
    }

    #[test]
    fn killed_app_keeps_its_row() {
        let mut f = Fixture::new();
        let key = f.add_app("foo");
        let (_, info) = f.add_surface(key, "foo", WindowType::Normal);

        f.notify(WindowEvent::Removed(info), Some(State::Suspended));
        assert_eq!(f.model.count(), 1);
        assert_eq!(f.model.surface_at(0), None);
        assert!(!f.model.window_at(0).unwrap().focused());
    }

    #[test]
    fn raised_windows_move_to_top_in_order() {
        let mut f = Fixture::new();
        let a = f.add_app("a");
        let b = f.add_app("b");
        let c = f.add_app("c");
        let (sa, ia) = f.add_surface(a, "a", WindowType::Normal);
        let (_, ib) = f.add_surface(b, "b", WindowType::Normal);
        let (sc, ic) = f.add_surface(c, "c", WindowType::Normal);
        assert_eq!(f.model.surface_at(2), Some(sa));
        assert_eq!(f.model.surface_at(0), Some(sc));
        f.model.take_events();

        f.notify(
            WindowEvent::Raised(vec![ia.window, ib.window, ic.window]),
            Some(State::Running),
        );
        let moves: Vec<_> = f
            .model
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                ModelEvent::List(change) => Some(change),
                _ => None,
            })
            .collect();
        assert_eq!(
            moves,
            vec![
                ListChange::Moved { from: 2, to: 0 },
                ListChange::Moved { from: 2, to: 0 },
                ListChange::Moved { from: 2, to: 0 },
            ]
        );
        assert_eq!(f.model.surface_at(0), Some(sc));
    }

    fn moves(model: &mut TopLevelWindowModel) -> Vec<ListChange> {
        model
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                ModelEvent::List(change @ ListChange::Moved { .. }) => Some(change),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn raising_two_windows_skips_the_one_on_top() {
        let mut f = Fixture::new();
        let a = f.add_app("a");
        let b = f.add_app("b");
        let (w1, i1) = f.add_surface(a, "a", WindowType::Normal);
        let (w2, i2) = f.add_surface(b, "b", WindowType::Normal);
        // 自底向上是 [W1, W2]
        assert_eq!(f.model.surface_at(0), Some(w2));
        assert_eq!(f.model.surface_at(1), Some(w1));
        f.model.take_events();

        f.notify(
            WindowEvent::Raised(vec![i2.window, i1.window]),
            Some(State::Running),
        );
        // W2 已经在第 0 行，只移动 W1
        assert_eq!(moves(&mut f.model), vec![ListChange::Moved { from: 1, to: 0 }]);
        assert_eq!(f.model.surface_at(0), Some(w1));
        assert_eq!(f.model.surface_at(1), Some(w2));

        // 向下移动时目标是原位置之后
        f.model.move_row(0, 1);
        assert_eq!(moves(&mut f.model), vec![ListChange::Moved { from: 0, to: 2 }]);
        assert_eq!(f.model.surface_at(0), Some(w2));
        assert_eq!(f.model.surface_at(1), Some(w1));
    }

    #[test]
    fn moving_down_uses_destination_past_target() {
        let mut f = Fixture::new();
        f.add_app("a");
        f.add_app("b");
        f.model.take_events();

        f.model.move_row(0, 1);
        assert_eq!(
            f.model.take_events(),
            vec![ModelEvent::List(ListChange::Moved { from: 0, to: 2 })]
        );

        f.model.move_row(1, 1);
        assert!(f.model.take_events().is_empty());
    }

    #[test]
    fn raise_is_deferred_while_busy() {
        let mut f = Fixture::new();
        f.add_app("a");
        let b = f.add_app("b");
        let id_a = f.model.id_at(1).unwrap();
        assert_eq!(f.model.application_at(0), Some(b));

        // 插入还没有被界面看到
        f.model.raise_id(id_a, &f.surfaces);
        assert!(f.model.has_deferred());
        assert_eq!(f.model.id_at(1), Some(id_a));

        f.model.take_events();
        f.model.process_deferred(&f.surfaces);
        assert!(!f.model.has_deferred());
        assert_eq!(f.model.id_at(0), Some(id_a));
    }

    #[test]
    fn raising_a_surface_goes_to_display_server() {
        let mut f = Fixture::new();
        let key = f.add_app("foo");
        let (_, info) = f.add_surface(key, "foo", WindowType::Normal);
        f.model.take_events();
        f.controller.commands();

        let id = f.model.id_at(0).unwrap();
        f.model.raise_id(id, &f.surfaces);
        assert_eq!(f.controller.commands(), vec![Command::Raise(info.window.id())]);
    }

    #[test]
    fn focus_changes_are_condensed() {
        let mut f = Fixture::new();
        let a = f.add_app("a");
        let b = f.add_app("b");
        let (_, ia) = f.add_surface(a, "a", WindowType::Normal);
        let (_, ib) = f.add_surface(b, "b", WindowType::Normal);
        let id_a = f.model.id_at(1).unwrap();
        let id_b = f.model.id_at(0).unwrap();

        f.notify(WindowEvent::ModificationsStarted, Some(State::Running));
        f.notify(WindowEvent::FocusChanged(ia.clone(), true), Some(State::Running));
        f.notify(WindowEvent::ModificationsEnded, Some(State::Running));
        assert_eq!(f.model.focused_window(), Some(id_a));
        f.model.take_events();

        f.notify(WindowEvent::ModificationsStarted, Some(State::Running));
        f.notify(WindowEvent::FocusChanged(ia, false), Some(State::Running));
        f.notify(WindowEvent::FocusChanged(ib, true), Some(State::Running));
        f.notify(WindowEvent::ModificationsEnded, Some(State::Running));

        let focus_changes: Vec<_> = f
            .model
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, ModelEvent::FocusedWindowChanged(_)))
            .collect();
        assert_eq!(focus_changes, vec![ModelEvent::FocusedWindowChanged(Some(id_b))]);
    }

    #[test]
    fn placeholder_takes_focus_from_surface() {
        let mut f = Fixture::new();
        let a = f.add_app("a");
        let (_, ia) = f.add_surface(a, "a", WindowType::Normal);
        f.notify(WindowEvent::ModificationsStarted, Some(State::Running));
        f.notify(WindowEvent::FocusChanged(ia.clone(), true), Some(State::Running));
        f.notify(WindowEvent::ModificationsEnded, Some(State::Running));
        f.controller.commands();

        f.add_app("b");
        let placeholder = f.model.id_at(0).unwrap();
        assert_eq!(f.model.focused_window(), Some(placeholder));
        assert_eq!(f.controller.commands(), vec![Command::Activate(None)]);

        // 显示服务器随后报告表面失去焦点，占位窗口保持焦点
        f.notify(WindowEvent::ModificationsStarted, Some(State::Running));
        f.notify(WindowEvent::FocusChanged(ia, false), Some(State::Running));
        f.notify(WindowEvent::ModificationsEnded, Some(State::Running));
        assert_eq!(f.model.focused_window(), Some(placeholder));
        assert!(f.model.window(placeholder).unwrap().focused());
    }

    #[test]
    fn placeholder_focus_request() {
        let mut f = Fixture::new();
        f.add_app("a");
        f.add_app("b");
        let id_a = f.model.id_at(1).unwrap();
        let id_b = f.model.id_at(0).unwrap();
        f.model.take_events();

        f.model.request_focus(id_a, &mut f.surfaces);
        assert_eq!(f.model.focused_window(), Some(id_a));
        assert!(f.model.window(id_a).unwrap().focused());
        assert!(!f.model.window(id_b).unwrap().focused());
        assert_eq!(f.model.id_at(0), Some(id_a));
    }

    #[test]
    fn closing_placeholder_closes_app() {
        let mut f = Fixture::new();
        let key = f.add_app("a");
        let id = f.model.id_at(0).unwrap();
        f.model.close(id, &mut f.surfaces, &mut f.sessions);
        assert!(f
            .model
            .take_events()
            .contains(&ModelEvent::CloseApplication(key)));
    }

    #[test]
    fn ids_wrap_and_skip_used() {
        let mut model = TopLevelWindowModel::new();
        model.next_id = MAX_WINDOW_ID;
        let surfaces = SurfaceManager::new(Rc::new(RecordingWindowController::default()));

        model.add_application(ApplicationKey::next(), "a", State::Starting, 0, &surfaces);
        assert_eq!(model.id_at(0), Some(MAX_WINDOW_ID));
        assert_eq!(model.next_id, 1);

        model.add_application(ApplicationKey::next(), "b", State::Starting, 0, &surfaces);
        assert_eq!(model.id_at(0), Some(1));

        model.next_id = MAX_WINDOW_ID;
        model.add_application(ApplicationKey::next(), "c", State::Starting, 0, &surfaces);
        // MAX_WINDOW_ID 和 1 都被占用
        assert_eq!(model.id_at(0), Some(2));
        assert_eq!(model.next_id, 3);
    }

    #[test]
    fn reset_rebuilds_without_row_events() {
        let mut f = Fixture::new();
        let a = ApplicationKey::next();
        let b = ApplicationKey::next();
        f.model.reset(
            [
                (a, "a", State::Running, 0),
                (b, "b", State::Stopped, 0),
            ],
            &f.surfaces,
        );

        assert_eq!(f.model.count(), 1);
        let events = f.model.take_events();
        assert!(events.contains(&ModelEvent::List(ListChange::Reset)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, ModelEvent::List(ListChange::Inserted { .. }))));
    }
}
