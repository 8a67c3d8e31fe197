//! 应用元数据
//!
//! 由任务控制器从配置中提供。桌面文件的解析不在这里进行。

use std::path::PathBuf;

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Orientations: u8 {
        const PORTRAIT = 1;
        const LANDSCAPE = 1 << 1;
        const INVERTED_PORTRAIT = 1 << 2;
        const INVERTED_LANDSCAPE = 1 << 3;
        /// 跟随设备的主方向。
        const PRIMARY = 1 << 4;
    }
}

impl Default for Orientations {
    fn default() -> Self {
        Self::PORTRAIT | Self::LANDSCAPE | Self::INVERTED_PORTRAIT | Self::INVERTED_LANDSCAPE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// 宽松地解析闪屏颜色。
    ///
    /// 空字符串得到透明色；无法解析时记录警告并得到透明色；能解析的颜色一律
    /// 强制为不透明。
    pub fn parse_lenient(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::TRANSPARENT;
        }

        match parse_color(text) {
            Some(color) => Self { a: 255, ..color },
            None => {
                warn!("invalid color {text:?}, using transparent");
                Self::TRANSPARENT
            }
        }
    }
}

fn parse_color(text: &str) -> Option<Color> {
    if let Some(hex) = text.strip_prefix('#') {
        let digit = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            3 => Some(Color::rgb(digit(0)? * 17, digit(1)? * 17, digit(2)? * 17)),
            6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            // #AARRGGBB
            8 => Some(Color {
                a: byte(0)?,
                r: byte(2)?,
                g: byte(4)?,
                b: byte(6)?,
            }),
            _ => None,
        };
    }

    let color = match text.to_ascii_lowercase().as_str() {
        "black" => Color::rgb(0, 0, 0),
        "white" => Color::rgb(255, 255, 255),
        "red" => Color::rgb(255, 0, 0),
        "green" => Color::rgb(0, 128, 0),
        "blue" => Color::rgb(0, 0, 255),
        "gray" | "grey" => Color::rgb(128, 128, 128),
        "orange" => Color::rgb(255, 165, 0),
        "purple" => Color::rgb(128, 0, 128),
        "transparent" => Color::TRANSPARENT,
        _ => return None,
    };
    Some(color)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplashInfo {
    pub title: String,
    pub image: Option<PathBuf>,
    pub show_header: bool,
    pub color: Color,
    pub color_header: Color,
    pub color_footer: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationInfo {
    pub app_id: String,
    pub name: String,
    pub comment: String,
    pub icon: Option<PathBuf>,
    pub splash: SplashInfo,
    pub supported_orientations: Orientations,
    pub rotates_window_contents: bool,
    pub is_touch_app: bool,
    /// 启动该应用的命令。
    pub exec: Vec<String>,
}

impl ApplicationInfo {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: String::new(),
            comment: String::new(),
            icon: None,
            splash: SplashInfo::default(),
            supported_orientations: Orientations::default(),
            rotates_window_contents: false,
            is_touch_app: true,
            exec: Vec::new(),
        }
    }
}
