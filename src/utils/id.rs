// 文件: utils/id.rs
// 作用: 原子ID生成器，为会话、表面、应用和定时器分配进程内唯一的标识

use std::sync::atomic::{AtomicU64, Ordering};

/// 计数器，返回唯一ID。
#[derive(Debug)]
pub struct IdCounter {
    value: AtomicU64,
}

impl IdCounter {
    pub const fn new() -> Self {
        Self {
            // 从1开始，0留给“无效”
            value: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// 定义一个由全局计数器分配的ID新类型。
macro_rules! unique_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub fn next() -> Self {
                static COUNTER: $crate::utils::id::IdCounter = $crate::utils::id::IdCounter::new();
                Self(COUNTER.next())
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }
    };
}

pub(crate) use unique_id;
