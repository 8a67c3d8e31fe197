// powerd 系统唤醒锁
// 通过系统总线上的 com.canonical.powerd 请求 "active" 系统状态

use anyhow::Context;
use zbus::blocking::Connection;
use zbus::proxy;

use crate::wakelock::WakelockBackend;

// 系统状态 1 = active（屏幕可以熄灭，但系统不会休眠）
const SYS_STATE_ACTIVE: i32 = 1;

#[proxy(
    interface = "com.canonical.powerd",
    default_service = "com.canonical.powerd",
    default_path = "/com/canonical/powerd"
)]
trait Powerd {
    #[zbus(name = "requestSysState")]
    fn request_sys_state(&self, name: &str, sys_state: i32) -> zbus::Result<String>;

    #[zbus(name = "clearSysState")]
    fn clear_sys_state(&self, cookie: &str) -> zbus::Result<()>;
}

pub struct PowerdWakelock {
    proxy: PowerdProxyBlocking<'static>,
}

impl PowerdWakelock {
    pub fn connect() -> anyhow::Result<Self> {
        let conn = Connection::system().context("error connecting to the system bus")?;
        let proxy = PowerdProxyBlocking::new(&conn).context("error creating powerd proxy")?;
        Ok(Self { proxy })
    }
}

impl WakelockBackend for PowerdWakelock {
    fn request(&self) -> anyhow::Result<String> {
        let cookie = self
            .proxy
            .request_sys_state("active", SYS_STATE_ACTIVE)
            .context("error calling requestSysState")?;
        trace!("powerd cookie: {cookie}");
        Ok(cookie)
    }

    fn clear(&self, cookie: &str) -> anyhow::Result<()> {
        self.proxy
            .clear_sys_state(cookie)
            .context("error calling clearSysState")
    }
}
