//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络类型标签
//!
//! 每个片段都带有一个类型标签，注册表也按类型分用

use core::fmt;

/// IPv6 下一头部: 逐跳选项（上层未填写时也是 0）
pub const PROTNUM_HOPOPT: u8 = 0;
/// IPv6 下一头部: TCP
pub const PROTNUM_TCP: u8 = 6;
/// IPv6 下一头部: UDP
pub const PROTNUM_UDP: u8 = 17;
/// IPv6 下一头部: ICMPv6
pub const PROTNUM_ICMPV6: u8 = 58;
/// IPv6 下一头部: 无下一头部
pub const PROTNUM_NONE: u8 = 59;

/// 网络类型
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetType {
    /// 未定义（通常是负载）
    Undef = 0,
    /// 通用链路层头部
    Link = 1,
    /// IPv6
    Ipv6 = 2,
    /// ICMPv6
    Icmpv6 = 3,
    /// UDP
    Udp = 4,
    /// TCP
    Tcp = 5,
    /// RPL 控制消息
    Rpl = 6,
}

impl NetType {
    /// 从 u8 转换
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NetType::Undef),
            1 => Some(NetType::Link),
            2 => Some(NetType::Ipv6),
            3 => Some(NetType::Icmpv6),
            4 => Some(NetType::Udp),
            5 => Some(NetType::Tcp),
            6 => Some(NetType::Rpl),
            _ => None,
        }
    }

    /// 转换为 u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// 由 IPv6 下一头部字段得到类型
    pub fn from_next_header(next_header: u8) -> Option<Self> {
        match next_header {
            PROTNUM_TCP => Some(NetType::Tcp),
            PROTNUM_UDP => Some(NetType::Udp),
            PROTNUM_ICMPV6 => Some(NetType::Icmpv6),
            _ => None,
        }
    }

    /// 得到类型对应的 IPv6 下一头部字段
    pub fn to_next_header(self) -> Option<u8> {
        match self {
            NetType::Tcp => Some(PROTNUM_TCP),
            NetType::Udp => Some(PROTNUM_UDP),
            NetType::Icmpv6 => Some(PROTNUM_ICMPV6),
            _ => None,
        }
    }

    /// 类型名称
    pub fn name(self) -> &'static str {
        match self {
            NetType::Undef => "undef",
            NetType::Link => "link",
            NetType::Ipv6 => "ipv6",
            NetType::Icmpv6 => "icmpv6",
            NetType::Udp => "udp",
            NetType::Tcp => "tcp",
            NetType::Rpl => "rpl",
        }
    }
}

impl fmt::Display for NetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_header_mapping() {
        assert_eq!(NetType::from_next_header(17), Some(NetType::Udp));
        assert_eq!(NetType::from_next_header(58), Some(NetType::Icmpv6));
        assert_eq!(NetType::from_next_header(PROTNUM_NONE), None);
        assert_eq!(NetType::Tcp.to_next_header(), Some(6));
        assert_eq!(NetType::Link.to_next_header(), None);
    }

    #[test]
    fn test_u8_conversion() {
        for t in [NetType::Undef, NetType::Link, NetType::Ipv6, NetType::Rpl] {
            assert_eq!(NetType::from_u8(t.to_u8()), Some(t));
        }
        assert_eq!(NetType::from_u8(42), None);
    }
}
