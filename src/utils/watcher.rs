//! 配置文件监视
//!
//! 后台线程定期比较文件的规范路径和修改时间。轮询而不是 inotify，这样符号链接被
//! 替换（例如由 home-manager 管理的配置）也能被发现。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, SystemTime};

use calloop::channel::SyncSender;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 丢弃时停止监视线程。
pub struct Watcher {
    should_stop: Arc<AtomicBool>,
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }
}

fn props(path: &Path) -> Option<(SystemTime, PathBuf)> {
    path.canonicalize()
        .and_then(|canon| {
            let modified = canon.metadata()?.modified()?;
            Ok((modified, canon))
        })
        .ok()
}

impl Watcher {
    /// 文件发生变化时在监视线程上调用 `process`，把结果发到 `changed`。
    pub fn new<T: Send + 'static>(
        path: PathBuf,
        process: impl FnMut(&Path) -> T + Send + 'static,
        changed: SyncSender<T>,
    ) -> anyhow::Result<Self> {
        Self::with_options(path, DEFAULT_POLL_INTERVAL, process, changed, None)
    }

    pub fn with_options<T: Send + 'static>(
        path: PathBuf,
        interval: Duration,
        mut process: impl FnMut(&Path) -> T + Send + 'static,
        changed: SyncSender<T>,
        started: Option<mpsc::SyncSender<()>>,
    ) -> anyhow::Result<Self> {
        let should_stop = Arc::new(AtomicBool::new(false));

        {
            let should_stop = should_stop.clone();
            thread::Builder::new()
                .name(format!("Config watcher for {}", path.to_string_lossy()))
                .spawn(move || {
                    let mut last_props = props(&path);

                    if let Some(started) = started {
                        let _ = started.send(());
                    }

                    loop {
                        thread::sleep(interval);

                        if should_stop.load(Ordering::SeqCst) {
                            break;
                        }

                        // 文件暂时不存在时保持上一次的状态，重新出现即视为变化
                        let Some(new_props) = props(&path) else {
                            continue;
                        };

                        if last_props.as_ref() == Some(&new_props) {
                            continue;
                        }

                        trace!("file changed: {}", path.to_string_lossy());

                        let rv = process(&path);
                        if let Err(err) = changed.send(rv) {
                            warn!("error sending change notification: {err:?}");
                            break;
                        }

                        last_props = Some(new_props);
                    }

                    debug!("exiting watcher thread for {}", path.to_string_lossy());
                })?;
        }

        Ok(Self { should_stop })
    }
}
