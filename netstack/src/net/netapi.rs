//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 协议层之间的统一消息接口
//!
//! | 消息      | 内容               | 方向       | 应答              |
//! |-----------|--------------------|------------|-------------------|
//! | `Send`    | 数据包             | 向下       | 无                |
//! | `Receive` | 数据包             | 向上       | 无                |
//! | `Get`     | 选项 + 值缓冲区    | 任意       | 值长度或错误      |
//! | `Set`     | 选项 + 值          | 任意       | 成功或错误        |
//!
//! 数据包的所有权随消息转移，投递失败时由发送方释放

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use log::warn;
use spin::Mutex;

use crate::config::NETAPI_OPT_BUF_SIZE;
use crate::net::error::{NetError, NetResult};
use crate::net::netconf::NetOpt;
use crate::net::netreg::DemuxKey;
use crate::net::nettype::NetType;
use crate::net::pktbuf::SnipId;
use crate::net::NetStack;
use crate::sched::TaskId;

/// 消息种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    Receive,
    Send,
    Set,
    Get,
}

impl MsgKind {
    /// 消息类型编码
    pub const fn code(self) -> u16 {
        match self {
            MsgKind::Receive => 0x0201,
            MsgKind::Send => 0x0202,
            MsgKind::Set => 0x0203,
            MsgKind::Get => 0x0204,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MsgKind::Receive => "receive",
            MsgKind::Send => "send",
            MsgKind::Set => "set",
            MsgKind::Get => "get",
        }
    }
}

/// 选项值缓冲区
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct OptBuf {
    data: [u8; NETAPI_OPT_BUF_SIZE],
    len: usize,
}

impl OptBuf {
    pub const fn new() -> Self {
        Self {
            data: [0; NETAPI_OPT_BUF_SIZE],
            len: 0,
        }
    }

    /// 从字节构造，超过缓冲区大小返回 `InvalidValue`
    pub fn from_slice(value: &[u8]) -> NetResult<Self> {
        let mut buf = Self::new();
        buf.set(value)?;
        Ok(buf)
    }

    pub fn from_u8(value: u8) -> Self {
        let mut buf = Self::new();
        buf.data[0] = value;
        buf.len = 1;
        buf
    }

    pub fn from_u16(value: u16) -> Self {
        let mut buf = Self::new();
        buf.data[..2].copy_from_slice(&value.to_be_bytes());
        buf.len = 2;
        buf
    }

    /// 替换内容
    pub fn set(&mut self, value: &[u8]) -> NetResult<usize> {
        if value.len() > NETAPI_OPT_BUF_SIZE {
            return Err(NetError::InvalidValue);
        }
        self.data[..value.len()].copy_from_slice(value);
        self.len = value.len();
        Ok(value.len())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        NETAPI_OPT_BUF_SIZE
    }

    /// 按 u8 解释，长度必须为 1
    pub fn as_u8(&self) -> NetResult<u8> {
        match self.as_slice() {
            [value] => Ok(*value),
            _ => Err(NetError::InvalidValue),
        }
    }

    /// 按网络字节序的 u16 解释，长度必须为 2
    pub fn as_u16(&self) -> NetResult<u16> {
        match self.as_slice() {
            [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(NetError::InvalidValue),
        }
    }

    fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }
}

impl Default for OptBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OptBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

type ReplyCell = Arc<Mutex<Option<(NetResult<usize>, OptBuf)>>>;

/// get/set 请求
///
/// 请求在没有应答的情况下被丢弃时，请求方收到 `NoReply`
pub struct OptRequest {
    pub opt: NetOpt,
    pub value: OptBuf,
    reply: ReplyCell,
}

impl OptRequest {
    fn new(opt: NetOpt, value: OptBuf) -> (Self, ReplyCell) {
        let reply: ReplyCell = Arc::new(Mutex::new(None));
        (
            Self {
                opt,
                value,
                reply: reply.clone(),
            },
            reply,
        )
    }

    /// 应答请求
    ///
    /// get 的结果是写入 `value` 的字节数，set 的结果被忽略
    pub fn reply(self, result: NetResult<usize>) {
        *self.reply.lock() = Some((result, self.value));
    }

    /// 用给定的值应答 get
    pub fn reply_value(mut self, value: &[u8]) {
        let result = self.value.set(value);
        self.reply(result);
    }

    pub fn reply_u8(self, value: u8) {
        self.reply_value(&[value]);
    }

    pub fn reply_u16(self, value: u16) {
        self.reply_value(&value.to_be_bytes());
    }
}

impl Drop for OptRequest {
    fn drop(&mut self) {
        let mut reply = self.reply.lock();
        if reply.is_none() {
            *reply = Some((Err(NetError::NoReply), self.value));
        }
    }
}

impl fmt::Debug for OptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptRequest")
            .field("opt", &self.opt)
            .field("value", &self.value)
            .finish()
    }
}

/// 协议层之间传递的消息
#[derive(Debug)]
pub enum Message {
    /// 向下发送的数据包
    Send(SnipId),
    /// 向上交付的数据包
    Receive(SnipId),
    /// 读取选项
    Get(OptRequest),
    /// 设置选项
    Set(OptRequest),
}

impl Message {
    pub fn kind(&self) -> MsgKind {
        match self {
            Message::Send(_) => MsgKind::Send,
            Message::Receive(_) => MsgKind::Receive,
            Message::Get(_) => MsgKind::Get,
            Message::Set(_) => MsgKind::Set,
        }
    }

    /// 消息携带的数据包
    pub fn snip(&self) -> Option<SnipId> {
        match self {
            Message::Send(pkt) | Message::Receive(pkt) => Some(*pkt),
            Message::Get(_) | Message::Set(_) => None,
        }
    }
}

fn post(stack: &NetStack, pid: TaskId, msg: Message) -> NetResult<()> {
    stack.sched.send(pid, msg).map_err(|undelivered| {
        let kind = undelivered.msg.kind();
        if let Some(pkt) = undelivered.msg.snip() {
            if let Err(err) = stack.pktbuf.release(pkt) {
                warn!("netapi: release of {} failed: {}", pkt, err);
            }
        }
        warn!("netapi: {} to {} dropped: {}", kind.name(), pid, undelivered.reason);
        undelivered.reason
    })
}

/// 把数据包发送给下层任务
///
/// 投递失败时数据包已被释放
pub fn send(stack: &NetStack, pid: TaskId, pkt: SnipId) -> NetResult<()> {
    post(stack, pid, Message::Send(pkt))
}

/// 把数据包交付给上层任务
///
/// 投递失败时数据包已被释放
pub fn receive(stack: &NetStack, pid: TaskId, pkt: SnipId) -> NetResult<()> {
    post(stack, pid, Message::Receive(pkt))
}

/// 把数据包分发给所有注册了 (nettype, demux) 的任务
///
/// # 参数
/// - `make`: 消息构造函数，`Message::Send` 或 `Message::Receive`
///
/// # 返回
/// 成功投递的任务数。没有订阅者时数据包直接释放
///
/// # 说明
/// 除第一个接收者外，每多一个接收者数据包的引用计数加 1。
/// 按键精确匹配，`DEMUX_ANY` 只投递给用 `DEMUX_ANY` 注册的任务，
/// 这样上层协议任务和按端口注册的应用不会重复收到同一个数据包
pub fn dispatch(
    stack: &NetStack,
    nettype: NetType,
    demux: DemuxKey,
    make: fn(SnipId) -> Message,
    pkt: SnipId,
) -> NetResult<usize> {
    let targets: Vec<TaskId> = stack.netreg.lookup_exact(nettype, demux).collect();
    if targets.is_empty() {
        stack.pktbuf.release(pkt)?;
        return Ok(0);
    }
    if targets.len() > 1 {
        stack
            .pktbuf
            .hold(pkt, (targets.len() - 1) as u32)
            .map_err(|err| stack.pktbuf.release_err(pkt, err))?;
    }
    let delivered = targets
        .into_iter()
        .filter(|pid| post(stack, *pid, make(pkt)).is_ok())
        .count();
    Ok(delivered)
}

/// 读取任务的选项
///
/// 在协作式调度下，等待期间继续分发其他消息直到对方应答
pub fn get(stack: &NetStack, pid: TaskId, opt: NetOpt) -> NetResult<OptBuf> {
    let (req, reply) = OptRequest::new(opt, OptBuf::new());
    post(stack, pid, Message::Get(req))?;
    stack.sched.run_until(stack, || reply.lock().is_some());
    let result = reply.lock().take();
    match result {
        Some((Ok(len), mut value)) => {
            value.truncate(len);
            Ok(value)
        }
        Some((Err(err), _)) => Err(err),
        None => Err(NetError::NoReply),
    }
}

/// 设置任务的选项
pub fn set(stack: &NetStack, pid: TaskId, opt: NetOpt, value: &[u8]) -> NetResult<()> {
    let (req, reply) = OptRequest::new(opt, OptBuf::from_slice(value)?);
    post(stack, pid, Message::Set(req))?;
    stack.sched.run_until(stack, || reply.lock().is_some());
    let result = reply.lock().take();
    match result {
        Some((Ok(_), _)) => Ok(()),
        Some((Err(err), _)) => Err(err),
        None => Err(NetError::NoReply),
    }
}

/// 读取 u16 类型的选项
pub fn get_u16(stack: &NetStack, pid: TaskId, opt: NetOpt) -> NetResult<u16> {
    get(stack, pid, opt)?.as_u16()
}

/// 设置 u16 类型的选项
pub fn set_u16(stack: &NetStack, pid: TaskId, opt: NetOpt, value: u16) -> NetResult<()> {
    set(stack, pid, opt, &value.to_be_bytes())
}
