use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use directories::UserDirs;
use git_version::git_version;

pub mod id;
pub mod spawning;
pub mod timer;
pub mod watcher;

pub static IS_SYSTEMD_SERVICE: AtomicBool = AtomicBool::new(false);

pub fn version() -> String {
    if let Some(v) = option_env!("SHELL_LIFECYCLE_BUILD_VERSION_STRING") {
        return String::from(v);
    }

    const MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
    const MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");
    const PATCH: &str = env!("CARGO_PKG_VERSION_PATCH");

    let commit = option_env!("SHELL_LIFECYCLE_BUILD_COMMIT")
        .unwrap_or(git_version!(fallback = "unknown commit"));

    if PATCH == "0" {
        format!("{MAJOR}.{MINOR} ({commit})")
    } else {
        format!("{MAJOR}.{MINOR}.{PATCH} ({commit})")
    }
}

pub fn expand_home(path: &Path) -> anyhow::Result<Option<PathBuf>> {
    if let Ok(rest) = path.strip_prefix("~") {
        let dirs = UserDirs::new().context("error retrieving home directory")?;
        Ok(Some([dirs.home_dir(), rest].iter().collect()))
    } else {
        Ok(None)
    }
}

/// 把 `包名_应用名_版本` 形式的长应用 ID 缩短为 `包名_应用名`。
///
/// 不是长格式的 ID 原样返回。
pub fn short_app_id(app_id: &str) -> &str {
    if !is_long_app_id(app_id) {
        return app_id;
    }

    // 长格式恰好有两个下划线
    let cut = app_id.rfind('_').unwrap_or(app_id.len());
    &app_id[..cut]
}

// [a-z0-9][a-z0-9+.-]+_[a-zA-Z0-9+.-]+_[0-9][a-zA-Z0-9.+:~-]*
fn is_long_app_id(app_id: &str) -> bool {
    let mut parts = app_id.split('_');
    let (Some(package), Some(app), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let package_ok = {
        let mut chars = package.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            && package.len() >= 2
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+.-".contains(c))
    };

    let app_ok = !app.is_empty()
        && app
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+.-".contains(c));

    let version_ok = {
        let mut chars = version.chars();
        chars.next().is_some_and(|c| c.is_ascii_digit())
            && chars.all(|c| c.is_ascii_alphanumeric() || ".+:~-".contains(c))
    };

    package_ok && app_ok && version_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_app_ids_are_shortened() {
        assert_eq!(
            short_app_id("com.ubuntu.gallery_gallery_1.2.3"),
            "com.ubuntu.gallery_gallery"
        );
        assert_eq!(short_app_id("webbrowser-app_webbrowser_0.1~beta"), "webbrowser-app_webbrowser");
    }

    #[test]
    fn other_ids_are_kept() {
        assert_eq!(short_app_id("gallery-app"), "gallery-app");
        assert_eq!(short_app_id("com.ubuntu.gallery_gallery"), "com.ubuntu.gallery_gallery");
        // 版本必须以数字开头
        assert_eq!(short_app_id("pkg_app_v1"), "pkg_app_v1");
        // 包名不允许大写
        assert_eq!(short_app_id("Pkg_app_1"), "Pkg_app_1");
        assert_eq!(short_app_id("a_b_1_2"), "a_b_1_2");
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home(Path::new("/usr/bin/foo")).unwrap(), None);
    }
}
