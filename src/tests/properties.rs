use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use proptest_derive::Arbitrary;

use super::fixtures::{FakeSceneSession, Harness};
use crate::application::{InternalState, RequestedState};
use crate::mir::{Pid, SceneSession, WindowInfo, WindowType};
use crate::model::ListChange;
use crate::notifier::{Notification, SceneEvent, WindowEvent};
use crate::shell::ShellEvent;
use crate::task_controller::{TaskError, TaskEvent};
use crate::utils::timer::TimerTarget;
use crate::window::toplevel::ModelEvent;

const APPS: [&str; 3] = ["foo", "bar", "baz"];

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Op {
    Start {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    Stop {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    Connect {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    Disconnect {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    AddWindow {
        #[proptest(strategy = "0..3usize")]
        app: usize,
        drawn: bool,
        input_method: bool,
    },
    RemoveWindow {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    FocusChanged {
        #[proptest(strategy = "0..3usize")]
        app: usize,
        focused: bool,
    },
    RaiseWindows {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    RequestState {
        #[proptest(strategy = "0..3usize")]
        app: usize,
        suspended: bool,
    },
    ProcessStarting {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    ProcessStopped {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    ProcessSuspended {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    ProcessFailed {
        #[proptest(strategy = "0..3usize")]
        app: usize,
    },
    FireTimers,
    RaiseRow {
        #[proptest(strategy = "0..4usize")]
        row: usize,
    },
    FocusRow {
        #[proptest(strategy = "0..4usize")]
        row: usize,
    },
    CloseRow {
        #[proptest(strategy = "0..4usize")]
        row: usize,
    },
}

struct Client {
    scene: Arc<FakeSceneSession>,
    windows: Vec<WindowInfo>,
}

struct World {
    h: Harness,
    clients: [Option<Client>; 3],
    next_pid: Pid,
    // 只根据 List 事件维护的行，None 是还没有核对过的新行
    mirror: Vec<Option<i32>>,
}

impl World {
    fn new() -> Self {
        Self {
            h: Harness::new(),
            clients: [None, None, None],
            next_pid: 100,
            mirror: Vec::new(),
        }
    }

    fn apply(&mut self, op: Op) {
        let h = &mut self.h;
        match op {
            Op::Start { app } => {
                h.shell.start_application(APPS[app], Vec::new());
                h.pump();
            }
            Op::Stop { app } => {
                h.shell.stop_application(APPS[app]);
                h.pump();
            }
            Op::Connect { app } => {
                if self.clients[app].is_some() {
                    return;
                }
                let pid = self.next_pid;
                self.next_pid += 1;

                h.task.set_pid(APPS[app], pid);
                if !h.shell.authorize_session(pid) {
                    return;
                }
                let fake = FakeSceneSession::new(APPS[app], pid);
                let scene: Arc<dyn SceneSession> = fake.clone();
                h.notify(Notification::Scene(SceneEvent::SessionStarting(scene)));
                self.clients[app] = Some(Client {
                    scene: fake,
                    windows: Vec::new(),
                });
            }
            Op::Disconnect { app } => {
                let Some(client) = self.clients[app].take() else {
                    return;
                };
                h.disconnect(&client.scene);
                for info in &client.windows {
                    h.remove_window(info);
                }
            }
            Op::AddWindow {
                app,
                drawn,
                input_method,
            } => {
                let Some(client) = &mut self.clients[app] else {
                    return;
                };
                let kind = if input_method {
                    WindowType::InputMethod
                } else {
                    WindowType::Normal
                };
                let info = if drawn {
                    h.add_window(&client.scene, kind)
                } else {
                    h.add_window_without_frame(&client.scene, kind)
                };
                client.windows.push(info);
            }
            Op::RemoveWindow { app } => {
                let Some(info) = self.clients[app].as_mut().and_then(|c| c.windows.pop()) else {
                    return;
                };
                h.remove_window(&info);
            }
            Op::FocusChanged { app, focused } => {
                let Some(info) = self.clients[app].as_ref().and_then(|c| c.windows.last()) else {
                    return;
                };
                let info = info.clone();
                h.notify(Notification::Window(WindowEvent::ModificationsStarted));
                h.notify(Notification::Window(WindowEvent::FocusChanged(info, focused)));
                h.notify(Notification::Window(WindowEvent::ModificationsEnded));
            }
            Op::RaiseWindows { app } => {
                let Some(client) = &self.clients[app] else {
                    return;
                };
                let handles = client.windows.iter().map(|info| info.window.clone()).collect();
                h.notify(Notification::Window(WindowEvent::Raised(handles)));
            }
            Op::RequestState { app, suspended } => {
                let Some(key) = h.shell.applications.find_application(APPS[app]) else {
                    return;
                };
                let state = if suspended {
                    RequestedState::Suspended
                } else {
                    RequestedState::Running
                };
                h.shell.set_requested_state(key, state);
                h.pump();
            }
            Op::ProcessStarting { app } => {
                h.task_event(TaskEvent::ProcessStarting(APPS[app].to_owned()))
            }
            Op::ProcessStopped { app } => {
                h.task_event(TaskEvent::ProcessStopped(APPS[app].to_owned()))
            }
            Op::ProcessSuspended { app } => {
                h.task_event(TaskEvent::ProcessSuspended(APPS[app].to_owned()))
            }
            Op::ProcessFailed { app } => h.task_event(TaskEvent::ProcessFailed(
                APPS[app].to_owned(),
                TaskError::Crashed,
            )),
            Op::FireTimers => {
                let mut targets: Vec<_> = h
                    .shell
                    .sessions
                    .sessions()
                    .iter()
                    .map(|id| TimerTarget::SessionSuspend(*id))
                    .collect();
                targets.extend(
                    h.shell
                        .applications
                        .applications()
                        .chain(h.shell.applications.closing_applications())
                        .map(|app| TimerTarget::ApplicationStop(app.key())),
                );
                for target in targets {
                    h.fire(target);
                }
            }
            Op::RaiseRow { row } => {
                if let Some(id) = h.shell.windows.id_at(row) {
                    h.shell.raise_window(id);
                    h.pump();
                }
            }
            Op::FocusRow { row } => {
                if let Some(id) = h.shell.windows.id_at(row) {
                    h.shell.focus_window(id);
                    h.pump();
                }
            }
            Op::CloseRow { row } => {
                if let Some(id) = h.shell.windows.id_at(row) {
                    h.shell.close_window(id);
                    h.pump();
                }
            }
        }
    }

    fn replay_list_changes(&mut self) {
        for event in self.h.shell.take_events() {
            let ShellEvent::Windows(ModelEvent::List(change)) = event else {
                continue;
            };
            match change {
                ListChange::Inserted { first, last } => {
                    for row in first..=last {
                        self.mirror.insert(row, None);
                    }
                }
                ListChange::Removed { first, last } => {
                    self.mirror.drain(first..=last);
                }
                ListChange::Moved { from, to } => {
                    let id = self.mirror.remove(from);
                    let to = if to > from { to - 1 } else { to };
                    self.mirror.insert(to, id);
                }
                ListChange::Reset => self.mirror = self.actual_rows(),
                ListChange::DataChanged { .. } => (),
            }
        }

        let actual = self.actual_rows();
        assert_eq!(self.mirror.len(), actual.len());
        for (mirrored, actual) in self.mirror.iter_mut().zip(&actual) {
            mirrored.get_or_insert(actual.unwrap_or_default());
        }
        assert_eq!(self.mirror, actual);
    }

    fn actual_rows(&self) -> Vec<Option<i32>> {
        let windows = &self.h.shell.windows;
        (0..windows.count()).map(|row| windows.id_at(row)).collect()
    }

    fn check_invariants(&self) {
        let shell = &self.h.shell;
        let windows = &shell.windows;
        let applications = &shell.applications;

        let mut ids = HashSet::new();
        for row in 0..windows.count() {
            let id = windows.id_at(row).unwrap();
            assert!((1..=1_000_000).contains(&id));
            assert!(ids.insert(id), "duplicate window id {id}");

            // 每一行都属于列表中的应用
            let key = windows.application_at(row).unwrap();
            assert!(applications.row_of(key).is_some(), "{}", windows.dump());
        }

        if let Some(id) = windows.focused_window() {
            assert!(windows.index_for_id(id).is_some());
        }

        let mut app_ids = HashSet::new();
        for app in applications.applications() {
            assert!(app_ids.insert(app.app_id().to_owned()));
            assert!(!matches!(
                app.internal_state(),
                InternalState::Closing | InternalState::Stopped
            ));
        }
        for app in applications.closing_applications() {
            assert_eq!(app.internal_state(), InternalState::Closing);
        }

        let (requested, cleared) = (self.h.wakelock.requested(), self.h.wakelock.cleared());
        assert!(cleared <= requested && requested - cleared <= 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 500,
        max_shrink_iters: 10000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn random_operations_keep_models_consistent(ops: Vec<Op>) {
        let mut world = World::new();
        for op in ops {
            world.apply(op);
            world.replay_list_changes();
            world.check_invariants();
        }
    }
}

#[test]
fn move_destination_points_past_target_when_moving_down() {
    assert_eq!(ListChange::move_destination(0, 2), 3);
    assert_eq!(ListChange::move_destination(2, 0), 0);
    assert_eq!(ListChange::move_destination(1, 1), 1);
}
