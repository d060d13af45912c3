//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 任务标识
//!
//! 任务编号按创建顺序分配，任务退出后不复用

use core::fmt;

/// 任务标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u16);

impl TaskId {
    pub(crate) const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {}", self.0)
    }
}
