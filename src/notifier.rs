//! 显示服务器线程到 GUI 线程的有序通知
//!
//! 窗口管理回调在显示服务器的线程上执行。它们把事件放进一个 calloop 通道，
//! GUI 线程按先进先出的顺序消费。会话事件与窗口事件共用同一个通道，这样
//! “会话开始”一定先于它的第一个窗口被处理。

use std::sync::Arc;

use calloop::channel::{channel, Channel, Sender};
use smithay::utils::{Logical, Point, Size};

use crate::mir::{PromptSession, SceneSession, SceneSurface, WindowHandle, WindowInfo, WindowState};

/// 新窗口的描述，外加创建时捕获的表面强引用。
///
/// [`WindowHandle`] 只持有弱引用；如果等到 GUI 线程处理时才升级，表面可能早已被
/// 显示服务器销毁。
#[derive(Debug, Clone)]
pub struct NewWindow {
    pub info: WindowInfo,
    pub surface: Arc<dyn SceneSurface>,
}

impl NewWindow {
    /// 表面已经不存在时返回 `None`。
    pub fn new(info: WindowInfo) -> Option<Self> {
        let surface = info.window.surface()?;
        Some(Self { info, surface })
    }
}

#[derive(Debug, Clone)]
pub enum WindowEvent {
    Added(NewWindow),
    Removed(WindowInfo),
    Ready(WindowInfo),
    Moved(WindowInfo, Point<i32, Logical>),
    Resized(WindowInfo, Size<i32, Logical>),
    StateChanged(WindowInfo, WindowState),
    FocusChanged(WindowInfo, bool),
    /// 按顺序被提升的窗口。
    Raised(Vec<WindowHandle>),
    RequestedRaise(WindowInfo),
    ModificationsStarted,
    ModificationsEnded,
}

#[derive(Debug, Clone)]
pub enum SceneEvent {
    SessionStarting(Arc<dyn SceneSession>),
    SessionStopping(Arc<dyn SceneSession>),
    PromptSessionStarting(PromptSession),
    PromptSessionStopping(PromptSession),
    PromptProviderAdded(PromptSession, Arc<dyn SceneSession>),
    PromptProviderRemoved(PromptSession, Arc<dyn SceneSession>),
}

#[derive(Debug, Clone)]
pub enum Notification {
    Window(WindowEvent),
    Scene(SceneEvent),
}

/// 可以在任何线程使用的发送端。
#[derive(Clone)]
pub struct WindowModelNotifier {
    sender: Sender<Notification>,
}

impl std::fmt::Debug for WindowModelNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowModelNotifier").finish_non_exhaustive()
    }
}

pub fn notifier() -> (WindowModelNotifier, Channel<Notification>) {
    let (sender, channel) = channel();
    (WindowModelNotifier { sender }, channel)
}

impl WindowModelNotifier {
    pub fn window_added(&self, info: WindowInfo) {
        match NewWindow::new(info) {
            Some(window) => self.send(Notification::Window(WindowEvent::Added(window))),
            None => warn!("window was destroyed before it could be announced"),
        }
    }

    pub fn window_removed(&self, info: WindowInfo) {
        self.window(WindowEvent::Removed(info));
    }

    pub fn window_ready(&self, info: WindowInfo) {
        self.window(WindowEvent::Ready(info));
    }

    pub fn window_moved(&self, info: WindowInfo, top_left: Point<i32, Logical>) {
        self.window(WindowEvent::Moved(info, top_left));
    }

    pub fn window_resized(&self, info: WindowInfo, size: Size<i32, Logical>) {
        self.window(WindowEvent::Resized(info, size));
    }

    pub fn window_state_changed(&self, info: WindowInfo, state: WindowState) {
        self.window(WindowEvent::StateChanged(info, state));
    }

    pub fn window_focus_changed(&self, info: WindowInfo, focused: bool) {
        self.window(WindowEvent::FocusChanged(info, focused));
    }

    pub fn windows_raised(&self, windows: Vec<WindowHandle>) {
        self.window(WindowEvent::Raised(windows));
    }

    pub fn window_requested_raise(&self, info: WindowInfo) {
        self.window(WindowEvent::RequestedRaise(info));
    }

    pub fn modifications_started(&self) {
        self.window(WindowEvent::ModificationsStarted);
    }

    pub fn modifications_ended(&self) {
        self.window(WindowEvent::ModificationsEnded);
    }

    pub fn session_starting(&self, session: Arc<dyn SceneSession>) {
        self.scene(SceneEvent::SessionStarting(session));
    }

    pub fn session_stopping(&self, session: Arc<dyn SceneSession>) {
        self.scene(SceneEvent::SessionStopping(session));
    }

    pub fn prompt_session_starting(&self, prompt_session: PromptSession) {
        self.scene(SceneEvent::PromptSessionStarting(prompt_session));
    }

    pub fn prompt_session_stopping(&self, prompt_session: PromptSession) {
        self.scene(SceneEvent::PromptSessionStopping(prompt_session));
    }

    pub fn prompt_provider_added(&self, prompt_session: PromptSession, provider: Arc<dyn SceneSession>) {
        self.scene(SceneEvent::PromptProviderAdded(prompt_session, provider));
    }

    pub fn prompt_provider_removed(
        &self,
        prompt_session: PromptSession,
        provider: Arc<dyn SceneSession>,
    ) {
        self.scene(SceneEvent::PromptProviderRemoved(prompt_session, provider));
    }

    fn window(&self, event: WindowEvent) {
        self.send(Notification::Window(event));
    }

    fn scene(&self, event: SceneEvent) {
        self.send(Notification::Scene(event));
    }

    fn send(&self, notification: Notification) {
        if let Err(err) = self.sender.send(notification) {
            warn!("error sending window model notification: {err:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use calloop::EventLoop;

    use super::*;
    use crate::mir::WindowType;

    #[derive(Debug)]
    struct Dummy;

    impl SceneSurface for Dummy {
        fn name(&self) -> String {
            String::new()
        }
    }

    #[test]
    fn new_window_captures_strong_reference() {
        let surface: Arc<dyn SceneSurface> = Arc::new(Dummy);
        let info = WindowInfo::new(WindowHandle::new(&surface, None), WindowType::Normal);

        let new_window = NewWindow::new(info.clone()).unwrap();
        drop(surface);

        // 表面仍由 NewWindow 持有
        assert!(info.window.surface().is_some());
        drop(new_window);
        assert!(info.window.surface().is_none());
        assert!(NewWindow::new(info).is_none());
    }

    #[test]
    fn events_arrive_in_order_across_threads() {
        let (notifier, channel) = notifier();
        let mut event_loop = EventLoop::<Vec<i32>>::try_new().unwrap();
        event_loop
            .handle()
            .insert_source(channel, |event, _, received| {
                if let calloop::channel::Event::Msg(Notification::Window(WindowEvent::Moved(
                    _,
                    point,
                ))) = event
                {
                    received.push(point.x);
                }
            })
            .unwrap();

        let surface: Arc<dyn SceneSurface> = Arc::new(Dummy);
        let info = WindowInfo::new(WindowHandle::new(&surface, None), WindowType::Normal);

        let sender = thread::spawn(move || {
            for x in 0..100 {
                notifier.window_moved(info.clone(), Point::from((x, 0)));
            }
        });
        sender.join().unwrap();

        let mut received = Vec::new();
        for _ in 0..10 {
            event_loop
                .dispatch(Duration::from_millis(10), &mut received)
                .unwrap();
            if received.len() == 100 {
                break;
            }
        }

        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }
}
