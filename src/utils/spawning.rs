//! 应用进程的生成
//!
//! 与一次性的辅助命令不同，应用进程需要被跟踪：我们保留 `Child`，在单独的线程里
//! 等待它退出，从而知道进程是正常停止还是崩溃。

use std::ffi::OsStr;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::{io, thread};

use atomic::Atomic;
use libc::{getrlimit, rlim_t, rlimit, setrlimit, RLIMIT_NOFILE};

use crate::utils::expand_home;

/// 子进程不应继承我们为自己设置的 `RUST_BACKTRACE`。
pub static REMOVE_ENV_RUST_BACKTRACE: AtomicBool = AtomicBool::new(false);
pub static REMOVE_ENV_RUST_LIB_BACKTRACE: AtomicBool = AtomicBool::new(false);

static ORIGINAL_NOFILE_RLIMIT_CUR: Atomic<rlim_t> = Atomic::new(0);
static ORIGINAL_NOFILE_RLIMIT_MAX: Atomic<rlim_t> = Atomic::new(0);

/// 提高自身的文件描述符上限，并记住原值以便子进程恢复。
pub fn store_and_increase_nofile_rlimit() {
    let mut rlim = rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { getrlimit(RLIMIT_NOFILE, &mut rlim) } != 0 {
        let err = io::Error::last_os_error();
        warn!("error getting nofile rlimit: {err:?}");
        return;
    }

    ORIGINAL_NOFILE_RLIMIT_CUR.store(rlim.rlim_cur, Ordering::SeqCst);
    ORIGINAL_NOFILE_RLIMIT_MAX.store(rlim.rlim_max, Ordering::SeqCst);

    trace!("changing nofile rlimit from {} to {}", rlim.rlim_cur, rlim.rlim_max);
    rlim.rlim_cur = rlim.rlim_max;

    if unsafe { setrlimit(RLIMIT_NOFILE, &rlim) } != 0 {
        let err = io::Error::last_os_error();
        warn!("error setting nofile rlimit: {err:?}");
    }
}

pub fn restore_nofile_rlimit() {
    let rlim_cur = ORIGINAL_NOFILE_RLIMIT_CUR.load(Ordering::SeqCst);
    let rlim_max = ORIGINAL_NOFILE_RLIMIT_MAX.load(Ordering::SeqCst);

    if rlim_cur == 0 {
        return;
    }

    let rlim = rlimit { rlim_cur, rlim_max };
    unsafe { setrlimit(RLIMIT_NOFILE, &rlim) };
}

/// 进程是怎样结束的。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// 退出码为 0，或被 SIGTERM/SIGHUP/SIGINT 正常结束。
    Clean,
    /// 非零退出码或其他信号（SIGKILL、SIGSEGV……）。
    Failed,
}

impl ExitKind {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Clean;
        }
        match status.signal() {
            Some(libc::SIGTERM | libc::SIGHUP | libc::SIGINT) => Self::Clean,
            _ => Self::Failed,
        }
    }
}

/// 生成一个应用进程。
///
/// `command` 的第一个元素是可执行文件，支持 `~` 展开。`APP_ID` 环境变量被设置为
/// 应用 ID。
pub fn spawn_application<T: AsRef<OsStr>>(
    command: &[T],
    app_id: &str,
) -> io::Result<Child> {
    let Some((program, args)) = command.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
    };

    let mut program = program.as_ref();
    let expanded = expand_home(Path::new(program));
    match &expanded {
        Ok(Some(expanded)) => program = expanded.as_ref(),
        Ok(None) => (),
        Err(err) => warn!("error expanding ~: {err:?}"),
    }

    let mut process = Command::new(program);
    process
        .args(args)
        .env("APP_ID", app_id)
        .stdin(Stdio::null());

    if REMOVE_ENV_RUST_BACKTRACE.load(Ordering::Relaxed) {
        process.env_remove("RUST_BACKTRACE");
    }
    if REMOVE_ENV_RUST_LIB_BACKTRACE.load(Ordering::Relaxed) {
        process.env_remove("RUST_LIB_BACKTRACE");
    }

    unsafe {
        process.pre_exec(|| {
            restore_nofile_rlimit();
            Ok(())
        });
    }

    process.spawn()
}

/// 在后台线程等待子进程结束，然后调用 `on_exit`。
pub fn wait_in_background(
    mut child: Child,
    name: String,
    on_exit: impl FnOnce(io::Result<ExitStatus>) + Send + 'static,
) -> io::Result<()> {
    thread::Builder::new()
        .name(format!("Waiter for {name}"))
        .spawn(move || {
            let status = child.wait();
            on_exit(status);
        })?;
    Ok(())
}
