#[macro_use]
extern crate tracing;

use std::io;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::{env, mem};

use calloop::channel::Event;
use calloop::EventLoop;
use clap::{CommandFactory, Parser};
use sd_notify::NotifyState;
use shell_lifecycle::application::manager::authorization_channel;
use shell_lifecycle::backend::Headless;
use shell_lifecycle::cli::{Cli, Sub};
use shell_lifecycle::config::{config_path, Config, CONFIG_PATH_ENV};
use shell_lifecycle::notifier::notifier;
use shell_lifecycle::proc_info::LinuxProcInfo;
use shell_lifecycle::shell::{Collaborators, Shell};
use shell_lifecycle::task_controller::process::ProcessTaskController;
use shell_lifecycle::utils::spawning::{
    store_and_increase_nofile_rlimit, REMOVE_ENV_RUST_BACKTRACE, REMOVE_ENV_RUST_LIB_BACKTRACE,
};
use shell_lifecycle::utils::timer::LoopTimers;
use shell_lifecycle::utils::watcher::Watcher;
use shell_lifecycle::utils::{version, IS_SYSTEMD_SERVICE};
use shell_lifecycle::wakelock::{LoggingWakelock, SharedWakelock, WakelockBackend};
use tracing_subscriber::EnvFilter;

// 默认日志过滤规则
const DEFAULT_LOG_FILTER: &str = "shell_lifecycle=debug";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 子进程不继承我们设置的 backtrace 变量
    if env::var_os("RUST_BACKTRACE").is_none() {
        env::set_var("RUST_BACKTRACE", "1");
        REMOVE_ENV_RUST_BACKTRACE.store(true, Ordering::Relaxed);
    }
    if env::var_os("RUST_LIB_BACKTRACE").is_none() {
        env::set_var("RUST_LIB_BACKTRACE", "0");
        REMOVE_ENV_RUST_LIB_BACKTRACE.store(true, Ordering::Relaxed);
    }

    let directives = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_owned());
    let env_filter = EnvFilter::builder().parse_lossy(directives);
    tracing_subscriber::fmt()
        .compact()
        .with_writer(io::stderr)
        .with_env_filter(env_filter)
        .init();

    if env::var_os("NOTIFY_SOCKET").is_some() {
        IS_SYSTEMD_SERVICE.store(true, Ordering::Relaxed);
    }

    let cli = Cli::parse();

    if let Some(subcommand) = cli.subcommand {
        match subcommand {
            Sub::Validate { config } => {
                let (path, _) = config_path(config)?;
                Config::load(&path)?;
                info!("config is valid");
                return Ok(());
            }
            Sub::Completions { shell } => {
                clap_complete::generate(
                    shell,
                    &mut Cli::command(),
                    "shell-lifecycle",
                    &mut io::stdout(),
                );
                return Ok(());
            }
        }
    }

    info!("starting version {}", &version());

    // 配置路径出错时仍然可以用默认配置运行，只是无法监视
    let path = config_path(cli.config)
        .map_err(|err| warn!("{err:?}"))
        .ok()
        .map(|(path, _)| path);
    env::remove_var(CONFIG_PATH_ENV);

    let mut config = match &path {
        Some(path) => Config::load(path)
            .map_err(|err| warn!("{err:?}"))
            .unwrap_or_default(),
        None => Config::default(),
    };
    let spawn_at_startup = mem::take(&mut config.spawn_at_startup);

    store_and_increase_nofile_rlimit();

    let mut event_loop = EventLoop::<Shell>::try_new()?;
    let handle = event_loop.handle();

    let proc_info = Rc::new(LinuxProcInfo::default());
    let (task_controller, task_events) =
        ProcessTaskController::new(config.application_infos(), proc_info.clone());
    let task_controller = Rc::new(task_controller);
    let headless = Rc::new(Headless::new());

    let mut shell = Shell::new(
        Collaborators {
            task_controller: task_controller.clone(),
            proc_info,
            prompt_sessions: headless.clone(),
            window_controller: headless,
            wakelock: Rc::new(SharedWakelock::new(wakelock_backend(cli.session))),
            timers: Rc::new(LoopTimers::new(handle.clone())),
        },
        &config,
    );
    shell.set_loop_handle(handle.clone());

    handle
        .insert_source(task_events, |event, _, shell| match event {
            Event::Msg(event) => shell.handle_task_event(event),
            Event::Closed => (),
        })
        .map_err(|err| err.error)?;

    // 显示服务器线程持有通知器和授权客户端。无头运行时没有显示服务器，
    // 但保持通道打开
    let (_notifier, notifications) = notifier();
    handle
        .insert_source(notifications, |event, _, shell| match event {
            Event::Msg(notification) => shell.handle_notification(notification),
            Event::Closed => (),
        })
        .map_err(|err| err.error)?;

    let (_authorization, authorization_requests) = authorization_channel();
    handle
        .insert_source(authorization_requests, |event, _, shell| match event {
            Event::Msg(request) => shell.handle_authorization(request),
            Event::Closed => (),
        })
        .map_err(|err| err.error)?;

    let _watcher = path.and_then(|path| {
        let process = |path: &Path| {
            Config::load(path).map_err(|err| {
                warn!("{:?}", err.context("error loading config"));
            })
        };

        let (tx, rx) = calloop::channel::sync_channel(1);
        let watcher = Watcher::new(path, process, tx)
            .map_err(|err| warn!("error starting config watcher: {err:?}"))
            .ok()?;

        let task_controller = task_controller.clone();
        handle
            .insert_source(rx, move |event, _, shell| match event {
                Event::Msg(Ok(config)) => {
                    task_controller.set_infos(config.application_infos());
                    shell.reload_config(&config);
                }
                Event::Msg(Err(())) | Event::Closed => (),
            })
            .map_err(|err| warn!("error watching config: {:?}", err.error))
            .ok()?;
        Some(watcher)
    });

    if cli.session {
        if let Err(err) = sd_notify::notify(true, &[NotifyState::Ready]) {
            warn!("error notifying systemd: {err:?}");
        }
    }

    for app_id in spawn_at_startup.into_iter().chain(cli.command) {
        if shell.start_application(&app_id, Vec::new()).is_none() {
            warn!("error starting {app_id}");
        }
    }

    event_loop.run(None, &mut shell, |shell| {
        for event in shell.take_events() {
            trace!("{event:?}");
        }
    })?;

    Ok(())
}

fn wakelock_backend(session: bool) -> Box<dyn WakelockBackend> {
    #[cfg(feature = "dbus")]
    {
        if session {
            match shell_lifecycle::dbus::powerd::PowerdWakelock::connect() {
                Ok(powerd) => return Box::new(powerd),
                Err(err) => warn!("error connecting to powerd, wakelocks are only logged: {err:?}"),
            }
        }
    }

    #[cfg(not(feature = "dbus"))]
    let _ = session;

    Box::new(LoggingWakelock)
}
