//! 作用：显示服务器一侧的实现
//! 说明：核心只通过 `mir` 中的 trait 与显示服务器交互，这里提供具体的实现。
//! 目前只有无头后端：没有真正的显示服务器，窗口命令只记录日志。

pub mod headless;
pub use headless::Headless;
