//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Rux 网络协议栈
//!
//! 面向小型嵌入式系统的消息驱动 IPv6/UDP 协议栈。
//! 协议层作为独立任务运行，通过 netapi 消息和引用计数的数据包缓冲区协作。
//!
//! 典型的初始化顺序：
//!
//! ```ignore
//! let stack = NetStack::default();
//! let link = link::init(&stack, Link::new(dev, 1))?;
//! let ipv6 = ipv6::init(&stack, ipv6)?;
//! let udp = udp::init(&stack, Udp::new())?;
//! loop {
//!     stack.run();
//! }
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod net;
pub mod sched;

pub use net::{NetError, NetResult, NetStack, StackConfig};
