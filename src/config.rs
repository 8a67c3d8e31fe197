//! 配置
//!
//! JSON 格式，默认位于 `$XDG_CONFIG_HOME/shell-lifecycle/config.json`。所有字段都有
//! 默认值，文件缺失时直接使用默认配置。

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::info::{ApplicationInfo, Color, Orientations, SplashInfo};

pub const CONFIG_PATH_ENV: &str = "SHELL_LIFECYCLE_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    pub lifecycle: Lifecycle,
    pub wakelock: Wakelock,
    pub trusted_processes: TrustedProcesses,
    pub applications: Vec<ApplicationConfig>,
    /// 启动后立即运行的应用 ID。
    pub spawn_at_startup: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::default(),
            wakelock: Wakelock::default(),
            trusted_processes: TrustedProcesses::default(),
            applications: Vec::new(),
            spawn_at_startup: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Lifecycle {
    /// 会话收到挂起提示后，等待多久再真正挂起。
    pub suspend_grace_ms: u64,
    /// 应用关闭最后一个窗口后，等待多久再强制停止进程。
    pub close_grace_ms: u64,
    /// 这些应用被要求挂起时只进入后台运行。
    pub exempt_app_ids: Vec<String>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            suspend_grace_ms: 1500,
            close_grace_ms: 1000,
            exempt_app_ids: Vec::new(),
        }
    }
}

impl Lifecycle {
    pub fn suspend_grace(&self) -> Duration {
        Duration::from_millis(self.suspend_grace_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Wakelock {
    pub off: bool,
    /// 不参与唤醒锁的应用。
    pub exempt_app_ids: Vec<String>,
}

impl Default for Wakelock {
    fn default() -> Self {
        Self {
            off: false,
            exempt_app_ids: vec![String::from("unity8-dash")],
        }
    }
}

/// 无需对应应用即可连接的进程。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct TrustedProcesses {
    pub command_prefixes: Vec<String>,
    pub command_substrings: Vec<String>,
}

impl Default for TrustedProcesses {
    fn default() -> Self {
        Self {
            command_prefixes: vec![String::from("maliit-server")],
            command_substrings: vec![String::from("qt5/libexec/QtWebProcess")],
        }
    }
}

impl TrustedProcesses {
    pub fn matches(&self, command_line: &str) -> bool {
        self.command_prefixes
            .iter()
            .any(|prefix| command_line.starts_with(prefix.as_str()))
            || self
                .command_substrings
                .iter()
                .any(|needle| command_line.contains(needle.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    Portrait,
    Landscape,
    InvertedPortrait,
    InvertedLandscape,
    Primary,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Splash {
    pub title: String,
    pub image: Option<PathBuf>,
    pub show_header: bool,
    pub color: String,
    pub color_header: String,
    pub color_footer: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ApplicationConfig {
    pub app_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub icon: Option<PathBuf>,
    #[serde(default)]
    pub exec: Vec<String>,
    #[serde(default)]
    pub splash: Splash,
    #[serde(default)]
    pub supported_orientations: Vec<Orientation>,
    #[serde(default)]
    pub rotates_window_contents: bool,
    #[serde(default = "default_true")]
    pub touch_app: bool,
}

fn default_true() -> bool {
    true
}

impl From<&ApplicationConfig> for ApplicationInfo {
    fn from(config: &ApplicationConfig) -> Self {
        let supported_orientations = if config.supported_orientations.is_empty() {
            Orientations::default()
        } else {
            config
                .supported_orientations
                .iter()
                .fold(Orientations::empty(), |acc, o| {
                    acc | match o {
                        Orientation::Portrait => Orientations::PORTRAIT,
                        Orientation::Landscape => Orientations::LANDSCAPE,
                        Orientation::InvertedPortrait => Orientations::INVERTED_PORTRAIT,
                        Orientation::InvertedLandscape => Orientations::INVERTED_LANDSCAPE,
                        Orientation::Primary => Orientations::PRIMARY,
                    }
                })
        };

        Self {
            app_id: config.app_id.clone(),
            name: config.name.clone(),
            comment: config.comment.clone(),
            icon: config.icon.clone(),
            splash: SplashInfo {
                title: config.splash.title.clone(),
                image: config.splash.image.clone(),
                show_header: config.splash.show_header,
                color: Color::parse_lenient(&config.splash.color),
                color_header: Color::parse_lenient(&config.splash.color_header),
                color_footer: Color::parse_lenient(&config.splash.color_footer),
            },
            supported_orientations,
            rotates_window_contents: config.rotates_window_contents,
            is_touch_app: config.touch_app,
            exec: config.exec.clone(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("error reading {path:?}"))?;
        let config = Self::parse(&contents).with_context(|| format!("error parsing {path:?}"))?;
        debug!("loaded config from {path:?}");
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config = serde_json::from_str(text)?;
        Ok(config)
    }

    pub fn application_infos(&self) -> impl Iterator<Item = ApplicationInfo> + '_ {
        self.applications.iter().map(ApplicationInfo::from)
    }
}

/// 解析配置路径：命令行参数优先，其次是环境变量，最后是默认位置。
///
/// 返回路径和它是否来自默认位置。
pub fn config_path(cli_path: Option<PathBuf>) -> anyhow::Result<(PathBuf, bool)> {
    if let Some(path) = cli_path {
        return Ok((path, false));
    }

    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        return Ok((PathBuf::from(path), false));
    }

    let dirs = ProjectDirs::from("", "", "shell-lifecycle")
        .context("error retrieving the home directory")?;
    Ok((dirs.config_dir().join("config.json"), true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.lifecycle.suspend_grace(), Duration::from_millis(1500));
        assert_eq!(config.lifecycle.close_grace(), Duration::from_secs(1));
        assert_eq!(config.wakelock.exempt_app_ids, vec!["unity8-dash"]);
    }

    #[test]
    fn parse_applications() {
        let config = Config::parse(
            r##"{
                "lifecycle": { "exempt-app-ids": ["music-app"] },
                "applications": [
                    {
                        "app-id": "gallery-app",
                        "name": "Gallery",
                        "exec": ["gallery-app", "--fullscreen"],
                        "splash": { "color": "#102030", "show-header": true },
                        "supported-orientations": ["portrait", "primary"],
                        "touch-app": false
                    }
                ],
                "spawn-at-startup": ["gallery-app"]
            }"##,
        )
        .unwrap();

        assert_eq!(config.lifecycle.exempt_app_ids, vec!["music-app"]);
        assert_eq!(config.lifecycle.suspend_grace_ms, 1500);

        let info: Vec<_> = config.application_infos().collect();
        assert_eq!(info.len(), 1);
        let info = &info[0];
        assert_eq!(info.name, "Gallery");
        assert_eq!(info.exec, vec!["gallery-app", "--fullscreen"]);
        assert_eq!(info.splash.color, Color::rgb(0x10, 0x20, 0x30));
        assert!(info.splash.show_header);
        assert_eq!(
            info.supported_orientations,
            Orientations::PORTRAIT | Orientations::PRIMARY
        );
        assert!(!info.is_touch_app);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::parse(r#"{ "lifecycle": { "suspend-grace": 5 } }"#).is_err());
    }

    #[test]
    fn trusted_process_matching() {
        let trusted = TrustedProcesses::default();
        assert!(trusted.matches("maliit-server --foo"));
        assert!(trusted.matches("/usr/lib/arm/qt5/libexec/QtWebProcess 3"));
        assert!(!trusted.matches("/usr/bin/maliit-server"));
    }

    #[test]
    fn cli_path_wins() {
        let (path, is_default) = config_path(Some(PathBuf::from("/tmp/x.json"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.json"));
        assert!(!is_default);
    }
}
