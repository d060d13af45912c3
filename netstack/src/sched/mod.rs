//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 协议任务调度器
//!
//! 每个协议层是一个独立的任务，拥有一个有界的消息队列。
//! 任务之间只通过消息通信，任务自身的状态只在分发时被访问。
//!
//! 当前实现: 单核协作式轮转调度
//! - 一次只分发一条消息，分发期间任务处于 Dispatching 状态
//! - 发送方和中断上下文只向队列追加消息，从不直接调用任务

pub mod pid;
pub mod task;

pub use pid::TaskId;
pub use task::{ProtocolTask, Scheduler, TaskState, Undelivered};
