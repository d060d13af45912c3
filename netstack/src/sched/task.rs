//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 任务表与消息分发
//!
//! 参考 Linux 的 kthread worker：任务体只在自己的分发循环里运行，
//! 其他上下文通过队列投递工作项

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, warn};
use spin::Mutex;

use crate::net::error::{NetError, NetResult};
use crate::net::netapi::Message;
use crate::net::NetStack;
use crate::sched::pid::TaskId;

/// 协议任务
///
/// 每条消息调用一次 `dispatch`，处理完一条才会收到下一条。
/// 收到的数据包归任务所有，必须转发或释放
pub trait ProtocolTask: Send {
    /// 任务名称，用于日志
    fn name(&self) -> &'static str;

    /// 处理一条消息
    fn dispatch(&mut self, stack: &NetStack, msg: Message);
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// 等待消息
    Idle,
    /// 正在处理消息
    Dispatching,
}

/// 投递失败的消息
///
/// 消息原样交还给发送方，由发送方释放其中的数据包
#[derive(Debug)]
pub struct Undelivered {
    pub reason: NetError,
    pub msg: Message,
}

struct TaskSlot {
    name: &'static str,
    state: TaskState,
    mailbox: VecDeque<Message>,
    body: Option<Box<dyn ProtocolTask>>,
    handled: u64,
}

/// 调度器
pub struct Scheduler {
    tasks: Mutex<Vec<Option<TaskSlot>>>,
    max_tasks: usize,
    mailbox_size: usize,
    cursor: AtomicUsize,
}

impl Scheduler {
    /// 创建调度器
    ///
    /// # 参数
    /// - `max_tasks`: 最多可创建的任务数
    /// - `mailbox_size`: 每个任务的消息队列长度
    pub fn new(max_tasks: usize, mailbox_size: usize) -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            max_tasks: max_tasks.min(u16::MAX as usize),
            mailbox_size: mailbox_size.max(1),
            cursor: AtomicUsize::new(0),
        }
    }

    /// 创建任务
    ///
    /// # 返回
    /// 成功返回新任务的 TaskId，任务表已满返回 `TableFull`
    pub fn spawn(&self, body: Box<dyn ProtocolTask>) -> NetResult<TaskId> {
        let mut tasks = self.tasks.lock();
        if tasks.len() >= self.max_tasks {
            warn!("sched: cannot spawn {}: task table full", body.name());
            return Err(NetError::TableFull);
        }
        let pid = TaskId::new(tasks.len() as u16);
        let name = body.name();
        tasks.push(Some(TaskSlot {
            name,
            state: TaskState::Idle,
            mailbox: VecDeque::with_capacity(self.mailbox_size),
            body: Some(body),
            handled: 0,
        }));
        debug!("sched: spawned {} as {}", name, pid);
        Ok(pid)
    }

    /// 向任务投递消息
    ///
    /// 可以在中断上下文调用，不会阻塞
    pub fn send(&self, pid: TaskId, msg: Message) -> Result<(), Undelivered> {
        let mut tasks = self.tasks.lock();
        let Some(slot) = tasks.get_mut(pid.index()).and_then(Option::as_mut) else {
            return Err(Undelivered { reason: NetError::NoSuchTask, msg });
        };
        if slot.mailbox.len() >= self.mailbox_size {
            return Err(Undelivered { reason: NetError::MailboxFull, msg });
        }
        slot.mailbox.push_back(msg);
        Ok(())
    }

    /// 终止任务
    ///
    /// # 返回
    /// 队列中尚未处理的消息，由调用者负责清理
    pub fn terminate(&self, pid: TaskId) -> Option<Vec<Message>> {
        let mut tasks = self.tasks.lock();
        let slot = tasks.get_mut(pid.index())?.take()?;
        debug!("sched: {} ({}) terminated after {} messages", slot.name, pid, slot.handled);
        Some(slot.mailbox.into_iter().collect())
    }

    /// 分发一条消息
    ///
    /// 从上次停下的位置开始轮转，找到第一个有消息的空闲任务
    ///
    /// # 返回
    /// 是否分发了消息
    pub fn run_once(&self, stack: &NetStack) -> bool {
        let picked = {
            let mut tasks = self.tasks.lock();
            let count = tasks.len();
            let start = self.cursor.load(Ordering::Relaxed);
            let mut picked = None;
            for i in 0..count {
                let index = (start + i) % count;
                let Some(slot) = tasks[index].as_mut() else {
                    continue;
                };
                if slot.state != TaskState::Idle || slot.body.is_none() {
                    continue;
                }
                let Some(msg) = slot.mailbox.pop_front() else {
                    continue;
                };
                if let Some(body) = slot.body.take() {
                    slot.state = TaskState::Dispatching;
                    picked = Some((index, body, msg));
                }
                break;
            }
            picked
        };

        let Some((index, mut body, msg)) = picked else {
            return false;
        };
        self.cursor.store(index + 1, Ordering::Relaxed);

        // 分发期间不持有任务表的锁，任务可以继续向其他任务投递
        body.dispatch(stack, msg);

        let mut tasks = self.tasks.lock();
        if let Some(slot) = tasks.get_mut(index).and_then(Option::as_mut) {
            slot.body = Some(body);
            slot.state = TaskState::Idle;
            slot.handled += 1;
        }
        true
    }

    /// 一直分发直到所有队列都为空
    ///
    /// # 返回
    /// 分发的消息数
    pub fn run(&self, stack: &NetStack) -> usize {
        let mut count = 0;
        while self.run_once(stack) {
            count += 1;
        }
        count
    }

    /// 一直分发直到条件成立或没有可分发的消息
    ///
    /// # 返回
    /// 条件是否成立
    pub fn run_until(&self, stack: &NetStack, cond: impl Fn() -> bool) -> bool {
        loop {
            if cond() {
                return true;
            }
            if !self.run_once(stack) {
                return cond();
            }
        }
    }

    /// 任务状态，任务不存在时返回 None
    pub fn state(&self, pid: TaskId) -> Option<TaskState> {
        let tasks = self.tasks.lock();
        tasks.get(pid.index())?.as_ref().map(|slot| slot.state)
    }

    /// 任务名称
    pub fn name(&self, pid: TaskId) -> Option<&'static str> {
        let tasks = self.tasks.lock();
        tasks.get(pid.index())?.as_ref().map(|slot| slot.name)
    }

    /// 任务队列中等待的消息数
    pub fn pending(&self, pid: TaskId) -> usize {
        let tasks = self.tasks.lock();
        tasks
            .get(pid.index())
            .and_then(Option::as_ref)
            .map_or(0, |slot| slot.mailbox.len())
    }

    /// 任务已处理的消息数
    pub fn handled(&self, pid: TaskId) -> u64 {
        let tasks = self.tasks.lock();
        tasks
            .get(pid.index())
            .and_then(Option::as_ref)
            .map_or(0, |slot| slot.handled)
    }

    /// 存活的任务数
    pub fn task_count(&self) -> usize {
        self.tasks.lock().iter().filter(|slot| slot.is_some()).count()
    }

    /// 每个任务的队列长度
    pub fn mailbox_size(&self) -> usize {
        self.mailbox_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::nettype::NetType;
    use crate::net::testutil::{recorder, test_stack};

    #[test]
    fn test_spawn_and_dispatch_fifo() {
        let stack = test_stack();
        let (pid, log) = recorder(&stack, true);
        let a = stack.pktbuf.alloc(4, NetType::Undef).unwrap();
        let b = stack.pktbuf.alloc(4, NetType::Undef).unwrap();
        stack.sched.send(pid, Message::Receive(a)).unwrap();
        stack.sched.send(pid, Message::Send(b)).unwrap();
        assert_eq!(stack.sched.pending(pid), 2);
        assert_eq!(stack.run(), 2);

        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].pkt, Some(a));
        assert_eq!(log[1].pkt, Some(b));
        assert_eq!(stack.sched.handled(pid), 2);
        assert_eq!(stack.sched.state(pid), Some(TaskState::Idle));
        assert!(stack.pktbuf.is_empty());
    }

    #[test]
    fn test_mailbox_full_returns_message() {
        let stack = test_stack();
        let (pid, _log) = recorder(&stack, true);
        let size = stack.sched.mailbox_size();
        let pkt = stack.pktbuf.alloc(1, NetType::Undef).unwrap();
        stack.pktbuf.hold(pkt, size as u32).unwrap();
        for _ in 0..size {
            stack.sched.send(pid, Message::Receive(pkt)).unwrap();
        }
        let err = stack.sched.send(pid, Message::Receive(pkt)).unwrap_err();
        assert_eq!(err.reason, NetError::MailboxFull);
        assert_eq!(err.msg.snip(), Some(pkt));
        stack.pktbuf.release(pkt).unwrap();
        stack.run();
        assert!(stack.pktbuf.is_empty());
    }

    #[test]
    fn test_send_to_unknown_task() {
        let stack = test_stack();
        let pkt = stack.pktbuf.alloc(1, NetType::Undef).unwrap();
        let err = stack.sched.send(TaskId::new(42), Message::Receive(pkt)).unwrap_err();
        assert_eq!(err.reason, NetError::NoSuchTask);
        stack.pktbuf.release(pkt).unwrap();
    }

    #[test]
    fn test_round_robin_between_tasks() {
        let stack = test_stack();
        let (first, first_log) = recorder(&stack, true);
        let (second, second_log) = recorder(&stack, true);
        for _ in 0..2 {
            let a = stack.pktbuf.alloc(1, NetType::Undef).unwrap();
            let b = stack.pktbuf.alloc(1, NetType::Undef).unwrap();
            stack.sched.send(first, Message::Receive(a)).unwrap();
            stack.sched.send(second, Message::Receive(b)).unwrap();
        }
        assert!(stack.run_once());
        assert!(stack.run_once());
        assert_eq!(first_log.lock().len(), 1);
        assert_eq!(second_log.lock().len(), 1);
        stack.run();
        assert!(stack.pktbuf.is_empty());
    }

    #[test]
    fn test_spawn_limit() {
        let stack = test_stack();
        let max = stack.config().max_tasks;
        for _ in 0..max {
            recorder(&stack, true);
        }
        assert_eq!(stack.sched.task_count(), max);
        let (body, _) = crate::net::testutil::Recorder::new(true);
        assert_eq!(stack.sched.spawn(Box::new(body)).unwrap_err(), NetError::TableFull);
    }

    #[test]
    fn test_terminate_returns_pending() {
        let stack = test_stack();
        let (pid, _log) = recorder(&stack, true);
        let pkt = stack.pktbuf.alloc(1, NetType::Undef).unwrap();
        stack.sched.send(pid, Message::Receive(pkt)).unwrap();
        let pending = stack.sched.terminate(pid).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(stack.sched.state(pid), None);
        assert!(stack.sched.terminate(pid).is_none());
        stack.pktbuf.release(pkt).unwrap();
    }
}
