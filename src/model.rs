//! 列表模型的变更通知
//!
//! 应用列表和顶层窗口列表都以有序列表的形式暴露给界面。每次修改只产生一个
//! [`ListChange`]，修改过程中模型处于对应的 [`ModelState`]，期间不允许再次修改。

use smithay::utils::{Logical, Point};

use crate::application::{ApplicationKey, State};
use crate::mir::WindowState;
use crate::window::surface::SurfaceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange {
    /// 插入了 `first..=last` 行。
    Inserted { first: usize, last: usize },
    /// 删除了 `first..=last` 行。
    Removed { first: usize, last: usize },
    /// 第 `from` 行被移走，`to` 是按移动前索引表示的插入位置，见
    /// [`ListChange::move_destination`]。
    Moved { from: usize, to: usize },
    DataChanged { row: usize, roles: Vec<Role> },
    Reset,
}

impl ListChange {
    /// 按“移动前”索引表达的目标位置：向下移动时是 `to + 1`。
    pub fn move_destination(from: usize, to: usize) -> usize {
        if to > from {
            to + 1
        } else {
            to
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelState {
    #[default]
    Idle,
    Inserting,
    Removing,
    Moving,
    Resetting,
}

/// 列表模型暴露的数据角色。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    AppId,
    Name,
    Comment,
    Icon,
    State,
    Focused,
    IsTouchApp,
    ExemptFromLifecycle,
    Application,
    Window,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoleData {
    String(String),
    Bool(bool),
    State(State),
    Application(ApplicationKey),
    Window {
        id: i32,
        surface: Option<SurfaceId>,
        state: WindowState,
        position: Point<i32, Logical>,
    },
}
