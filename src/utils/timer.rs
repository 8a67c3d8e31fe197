//! 宽限期定时器
//!
//! 会话挂起（1.5秒）和应用关闭（1秒）都依赖单次定时器。状态机只持有
//! [`Timer`]，真正的调度由 [`TimerBackend`] 完成：生产环境中是 calloop 的
//! `Timer` 事件源，测试中是可以手动触发的 [`ManualTimers`]。
//!
//! 定时器触发时 [`TimerSink::on_timer`] 收到令牌和目标。已经被停止或重启的定时器
//! 会留下过期令牌，[`Timer::expire`] 负责过滤掉它们。

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use calloop::timer::{TimeoutAction, Timer as LoopTimer};
use calloop::{LoopHandle, RegistrationToken};

use crate::application::session::SessionId;
use crate::application::ApplicationKey;
use crate::utils::id::IdCounter;

/// 定时器到期后应该通知谁。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerTarget {
    SessionSuspend(SessionId),
    ApplicationStop(ApplicationKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

pub trait TimerBackend {
    fn schedule(&self, target: TimerTarget, interval: Duration) -> TimerToken;
    fn cancel(&self, token: TimerToken);
}

/// 接收到期通知的一方（通常是 `Shell`）。
pub trait TimerSink {
    fn on_timer(&mut self, token: TimerToken, target: TimerTarget);
}

/// 单次定时器句柄。
pub struct Timer {
    backend: Rc<dyn TimerBackend>,
    target: TimerTarget,
    interval: Duration,
    token: Option<TimerToken>,
}

impl Timer {
    pub fn new(backend: Rc<dyn TimerBackend>, target: TimerTarget, interval: Duration) -> Self {
        Self {
            backend,
            target,
            interval,
            token: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn is_running(&self) -> bool {
        self.token.is_some()
    }

    /// 启动定时器；已在运行时重新计时。
    pub fn start(&mut self) {
        if let Some(token) = self.token.take() {
            self.backend.cancel(token);
        }
        self.token = Some(self.backend.schedule(self.target, self.interval));
    }

    pub fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            self.backend.cancel(token);
        }
    }

    /// 处理一次到期。令牌属于当前这一轮计时才返回 `true`。
    pub fn expire(&mut self, token: TimerToken) -> bool {
        if self.token == Some(token) {
            self.token = None;
            true
        } else {
            false
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("target", &self.target)
            .field("interval", &self.interval)
            .field("token", &self.token)
            .finish()
    }
}

/// 基于 calloop 事件循环的定时器后端。
pub struct LoopTimers<S: 'static> {
    handle: LoopHandle<'static, S>,
    ids: IdCounter,
    registered: Rc<RefCell<HashMap<TimerToken, RegistrationToken>>>,
}

impl<S: 'static> LoopTimers<S> {
    pub fn new(handle: LoopHandle<'static, S>) -> Self {
        Self {
            handle,
            ids: IdCounter::new(),
            registered: Rc::new(RefCell::new(HashMap::new())),
        }
    }
}

impl<S: TimerSink + 'static> TimerBackend for LoopTimers<S> {
    fn schedule(&self, target: TimerTarget, interval: Duration) -> TimerToken {
        let token = TimerToken(self.ids.next());

        let registered = self.registered.clone();
        let timer = LoopTimer::from_duration(interval);
        let res = self.handle.insert_source(timer, move |_, _, state| {
            // 先登记移除，回调里可能再次启动或取消别的定时器
            registered.borrow_mut().remove(&token);
            state.on_timer(token, target);
            TimeoutAction::Drop
        });

        match res {
            Ok(registration) => {
                self.registered.borrow_mut().insert(token, registration);
            }
            Err(err) => warn!("error inserting timer for {target:?}: {:?}", err.error),
        }

        token
    }

    fn cancel(&self, token: TimerToken) {
        let registration = self.registered.borrow_mut().remove(&token);
        if let Some(registration) = registration {
            self.handle.remove(registration);
        }
    }
}

/// 测试用后端：记录已计划的定时器，由测试决定何时“到期”。
#[derive(Debug, Default)]
pub struct ManualTimers {
    ids: IdCounter,
    pending: RefCell<Vec<(TimerToken, TimerTarget, Duration)>>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, target: TimerTarget) -> bool {
        self.pending.borrow().iter().any(|(_, t, _)| *t == target)
    }

    pub fn interval_of(&self, target: TimerTarget) -> Option<Duration> {
        self.pending
            .borrow()
            .iter()
            .find(|(_, t, _)| *t == target)
            .map(|(_, _, interval)| *interval)
    }

    /// 取出目标最早计划的定时器，相当于让它到期。
    pub fn take(&self, target: TimerTarget) -> Option<TimerToken> {
        let mut pending = self.pending.borrow_mut();
        let idx = pending.iter().position(|(_, t, _)| *t == target)?;
        Some(pending.remove(idx).0)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl TimerBackend for ManualTimers {
    fn schedule(&self, target: TimerTarget, interval: Duration) -> TimerToken {
        let token = TimerToken(self.ids.next());
        self.pending.borrow_mut().push((token, target, interval));
        token
    }

    fn cancel(&self, token: TimerToken) {
        self.pending.borrow_mut().retain(|(t, _, _)| *t != token);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use calloop::EventLoop;

    use super::*;

    fn app_target() -> TimerTarget {
        TimerTarget::ApplicationStop(ApplicationKey::next())
    }

    #[test]
    fn restart_invalidates_old_token() {
        let backend = Rc::new(ManualTimers::new());
        let target = app_target();
        let mut timer = Timer::new(backend.clone(), target, Duration::from_secs(1));

        timer.start();
        let first = backend.take(target).unwrap();
        timer.start();
        timer.start();
        assert_eq!(backend.pending_count(), 1);

        assert!(!timer.expire(first));
        assert!(timer.is_running());

        let second = backend.take(target).unwrap();
        assert!(timer.expire(second));
        assert!(!timer.is_running());
    }

    #[test]
    fn drop_cancels() {
        let backend = Rc::new(ManualTimers::new());
        let target = app_target();
        {
            let mut timer = Timer::new(backend.clone(), target, Duration::from_millis(1500));
            timer.start();
            assert_eq!(backend.interval_of(target), Some(Duration::from_millis(1500)));
        }
        assert!(!backend.is_pending(target));
    }

    struct Sink {
        fired: Vec<TimerTarget>,
        done: Rc<Cell<bool>>,
    }

    impl TimerSink for Sink {
        fn on_timer(&mut self, _token: TimerToken, target: TimerTarget) {
            self.fired.push(target);
            self.done.set(true);
        }
    }

    #[test]
    fn loop_timers_fire_and_cancel() {
        let mut event_loop = EventLoop::<Sink>::try_new().unwrap();
        let timers = LoopTimers::new(event_loop.handle());

        let cancelled = app_target();
        let fired = app_target();

        let token = timers.schedule(cancelled, Duration::ZERO);
        timers.cancel(token);
        timers.schedule(fired, Duration::ZERO);

        let done = Rc::new(Cell::new(false));
        let mut sink = Sink {
            fired: Vec::new(),
            done: done.clone(),
        };

        for _ in 0..10 {
            event_loop
                .dispatch(Duration::from_millis(10), &mut sink)
                .unwrap();
            if done.get() {
                break;
            }
        }

        assert_eq!(sink.fired, vec![fired]);
    }
}
