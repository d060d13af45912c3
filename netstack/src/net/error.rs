//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络协议栈错误类型
//!
//! 每种错误都可以转换成 Linux 风格的错误码 (include/uapi/asm-generic/errno.h)

use core::fmt;

/// 协议栈错误
///
/// 除了 get/set 之外的操作失败时，由当前持有数据包的一方负责释放，
/// 错误本身只用于日志和返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// 字节池或片段表已满 (ENOMEM)
    OutOfMemory,
    /// 头部长度或字段不合法 (EBADMSG)
    MalformedHeader,
    /// 校验和错误 (EPROTO)
    ChecksumMismatch,
    /// 转发表中没有到目的地址的路由 (EHOSTUNREACH)
    NoRoute,
    /// 邻居缓存或接口表中没有链路信息 (ENXIO)
    NoLinkInfo,
    /// 不支持的上层协议 (EPROTONOSUPPORT)
    UnknownProtocol,
    /// 相同的 (类型, 分用键, 任务) 已经注册 (EEXIST)
    DuplicateRegistration,
    /// 固定大小的表已满 (ENOSPC)
    TableFull,
    /// 注册表中没有对应条目 (ENOENT)
    NotRegistered,
    /// 片段句柄已失效 (EBADF)
    InvalidSnip,
    /// 片段被多个持有者共享，不能原地修改 (EBUSY)
    SnipShared,
    /// 目标任务不存在 (ESRCH)
    NoSuchTask,
    /// 目标任务的消息队列已满 (EAGAIN)
    MailboxFull,
    /// 选项不被支持 (ENOTSUP)
    NotSupported,
    /// 选项值长度或内容不合法 (EINVAL)
    InvalidValue,
    /// 请求没有得到应答 (ETIMEDOUT)
    NoReply,
    /// 设备发送失败 (EIO)
    DeviceError,
}

/// 协议栈操作结果
pub type NetResult<T> = Result<T, NetError>;

impl NetError {
    /// 转换为负的错误码（系统调用风格）
    pub const fn to_errno(self) -> i32 {
        let errno = match self {
            NetError::OutOfMemory => 12,
            NetError::MalformedHeader => 74,
            NetError::ChecksumMismatch => 71,
            NetError::NoRoute => 113,
            NetError::NoLinkInfo => 6,
            NetError::UnknownProtocol => 93,
            NetError::DuplicateRegistration => 17,
            NetError::TableFull => 28,
            NetError::NotRegistered => 2,
            NetError::InvalidSnip => 9,
            NetError::SnipShared => 16,
            NetError::NoSuchTask => 3,
            NetError::MailboxFull => 11,
            NetError::NotSupported => 95,
            NetError::InvalidValue => 22,
            NetError::NoReply => 110,
            NetError::DeviceError => 5,
        };
        -errno
    }

    /// 错误描述
    pub const fn as_str(self) -> &'static str {
        match self {
            NetError::OutOfMemory => "out of packet memory",
            NetError::MalformedHeader => "malformed header",
            NetError::ChecksumMismatch => "checksum mismatch",
            NetError::NoRoute => "no route to destination",
            NetError::NoLinkInfo => "no link-layer information",
            NetError::UnknownProtocol => "unknown protocol",
            NetError::DuplicateRegistration => "duplicate registration",
            NetError::TableFull => "table full",
            NetError::NotRegistered => "not registered",
            NetError::InvalidSnip => "invalid snip handle",
            NetError::SnipShared => "snip is shared",
            NetError::NoSuchTask => "no such task",
            NetError::MailboxFull => "mailbox full",
            NetError::NotSupported => "option not supported",
            NetError::InvalidValue => "invalid option value",
            NetError::NoReply => "no reply",
            NetError::DeviceError => "device error",
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
