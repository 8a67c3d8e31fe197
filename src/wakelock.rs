//! 共享唤醒锁
//!
//! 任意多个拥有者可以持有同一个系统唤醒锁。只要还有拥有者，后端的锁就处于启用
//! 状态；最后一个拥有者释放后锁被清除。获取与释放对每个拥有者都是幂等的。

use std::cell::RefCell;
use std::collections::HashSet;

use anyhow::Context;

pub trait WakelockBackend {
    /// 请求系统保持唤醒，返回之后用于清除的 cookie。
    fn request(&self) -> anyhow::Result<String>;
    fn clear(&self, cookie: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakelockOwner(pub u64);

pub struct SharedWakelock {
    backend: Box<dyn WakelockBackend>,
    owners: RefCell<HashSet<WakelockOwner>>,
    cookie: RefCell<Option<String>>,
}

impl SharedWakelock {
    pub fn new(backend: Box<dyn WakelockBackend>) -> Self {
        Self {
            backend,
            owners: RefCell::new(HashSet::new()),
            cookie: RefCell::new(None),
        }
    }

    pub fn enabled(&self) -> bool {
        self.cookie.borrow().is_some()
    }

    pub fn is_held_by(&self, owner: WakelockOwner) -> bool {
        self.owners.borrow().contains(&owner)
    }

    pub fn acquire(&self, owner: WakelockOwner) {
        if !self.owners.borrow_mut().insert(owner) {
            return;
        }

        if self.cookie.borrow().is_some() {
            return;
        }

        match self.backend.request() {
            Ok(cookie) => {
                debug!("wakelock acquired");
                *self.cookie.borrow_mut() = Some(cookie);
            }
            Err(err) => warn!("error acquiring wakelock: {err:?}"),
        }
    }

    pub fn release(&self, owner: WakelockOwner) {
        let now_empty = {
            let mut owners = self.owners.borrow_mut();
            if !owners.remove(&owner) {
                return;
            }
            owners.is_empty()
        };

        if !now_empty {
            return;
        }

        let cookie = self.cookie.borrow_mut().take();
        if let Some(cookie) = cookie {
            match self.backend.clear(&cookie) {
                Ok(()) => debug!("wakelock released"),
                Err(err) => warn!("error releasing wakelock: {err:?}"),
            }
        }
    }
}

impl Drop for SharedWakelock {
    fn drop(&mut self) {
        if let Some(cookie) = self.cookie.get_mut().take() {
            if let Err(err) = self.backend.clear(&cookie) {
                warn!("error releasing wakelock: {err:?}");
            }
        }
    }
}

/// 没有可用的电源服务时使用：只记录日志。
#[derive(Debug, Default)]
pub struct LoggingWakelock;

impl WakelockBackend for LoggingWakelock {
    fn request(&self) -> anyhow::Result<String> {
        trace!("wakelock requested (no backend)");
        Ok(String::from("logging"))
    }

    fn clear(&self, cookie: &str) -> anyhow::Result<()> {
        trace!("wakelock {cookie} cleared (no backend)");
        Ok(())
    }
}

/// 以唤醒锁文件实现的后端（`/sys/power/wake_lock`）。
#[derive(Debug)]
pub struct SysfsWakelock {
    name: String,
}

impl SysfsWakelock {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl WakelockBackend for SysfsWakelock {
    fn request(&self) -> anyhow::Result<String> {
        std::fs::write("/sys/power/wake_lock", &self.name)
            .context("error writing /sys/power/wake_lock")?;
        Ok(self.name.clone())
    }

    fn clear(&self, cookie: &str) -> anyhow::Result<()> {
        std::fs::write("/sys/power/wake_unlock", cookie)
            .context("error writing /sys/power/wake_unlock")
    }
}
