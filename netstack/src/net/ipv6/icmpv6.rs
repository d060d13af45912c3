//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! ICMPv6
//!
//! 参考 RFC 4443。ICMPv6 没有独立的任务，由 IPv6 任务同步处理：
//! 校验后按消息类型分发，RPL 控制消息交给 RPL 任务

use alloc::vec::Vec;

use log::debug;

use super::checksum;
use super::{build_header, Ipv6, Ipv6Addr, Ipv6Hdr};
use crate::net::error::{NetError, NetResult};
use crate::net::netapi::{self, Message};
use crate::net::netreg::{DemuxKey, DEMUX_ANY};
use crate::net::nettype::{NetType, PROTNUM_ICMPV6};
use crate::net::pktbuf::SnipId;
use crate::net::NetStack;

/// ICMPv6 头部长度（类型、代码、校验和）
pub const ICMPV6_HDR_LEN: usize = 4;

/// 目的不可达
pub const ICMPV6_DST_UNREACH: u8 = 1;
/// 数据包过大
pub const ICMPV6_PKT_TOO_BIG: u8 = 2;
/// 超时
pub const ICMPV6_TIME_EXCEEDED: u8 = 3;
/// 参数错误
pub const ICMPV6_PARAM_PROB: u8 = 4;
/// 回显请求
pub const ICMPV6_ECHO_REQUEST: u8 = 128;
/// 回显应答
pub const ICMPV6_ECHO_REPLY: u8 = 129;
/// 路由器请求
pub const ICMPV6_ROUTER_SOL: u8 = 133;
/// 路由器通告
pub const ICMPV6_ROUTER_ADV: u8 = 134;
/// 邻居请求
pub const ICMPV6_NEIGHBOR_SOL: u8 = 135;
/// 邻居通告
pub const ICMPV6_NEIGHBOR_ADV: u8 = 136;
/// RPL 控制消息 (RFC 6550)
pub const ICMPV6_RPL_CTRL: u8 = 155;

/// ICMPv6 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmpv6Hdr {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
}

impl Icmpv6Hdr {
    pub fn parse(data: &[u8]) -> NetResult<Self> {
        if data.len() < ICMPV6_HDR_LEN {
            return Err(NetError::MalformedHeader);
        }
        Ok(Self {
            icmp_type: data[0],
            code: data[1],
            checksum: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    pub fn write(&self, buf: &mut [u8]) -> NetResult<()> {
        if buf.len() < ICMPV6_HDR_LEN {
            return Err(NetError::InvalidValue);
        }
        buf[0] = self.icmp_type;
        buf[1] = self.code;
        buf[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        Ok(())
    }
}

/// 消息类型对应的注册表键
pub fn demux_of(icmp_type: u8) -> (NetType, DemuxKey) {
    if icmp_type == ICMPV6_RPL_CTRL {
        (NetType::Rpl, DEMUX_ANY)
    } else {
        (NetType::Icmpv6, icmp_type as DemuxKey)
    }
}

/// 处理收到的 ICMPv6 消息
///
/// # 参数
/// - `ip`: 数据包链首（IPv6 头部），处理完后被消耗
/// - `icmp`: ICMPv6 片段
/// - `hdr`: 已解析的 IPv6 头部
pub(super) fn process(
    ipv6: &mut Ipv6,
    stack: &NetStack,
    ip: SnipId,
    icmp: SnipId,
    hdr: &Ipv6Hdr,
) -> NetResult<()> {
    let pktbuf = &stack.pktbuf;

    let (icmp_hdr, valid) = pktbuf
        .read(icmp, |data| {
            Icmpv6Hdr::parse(data).map(|h| {
                let csum = checksum::upper_layer_checksum(&hdr.src, &hdr.dst, PROTNUM_ICMPV6, &[data]);
                (h, csum == 0)
            })
        })
        .and_then(|r| r)
        .map_err(|err| pktbuf.release_err(ip, err))?;
    if !valid {
        return Err(pktbuf.release_err(ip, NetError::ChecksumMismatch));
    }

    let (nettype, demux) = demux_of(icmp_hdr.icmp_type);
    if icmp_hdr.icmp_type == ICMPV6_ECHO_REQUEST && stack.netreg.num_of(nettype, demux) == 0 {
        return echo_reply(ipv6, stack, ip, icmp, hdr);
    }

    let delivered = netapi::dispatch(stack, nettype, demux, Message::Receive, ip)?;
    if delivered == 0 {
        debug!("icmpv6: no receiver for type {}, dropped", icmp_hdr.icmp_type);
    }
    Ok(())
}

/// 没有任务订阅回显请求时直接应答
fn echo_reply(
    ipv6: &mut Ipv6,
    stack: &NetStack,
    ip: SnipId,
    icmp: SnipId,
    hdr: &Ipv6Hdr,
) -> NetResult<()> {
    let pktbuf = &stack.pktbuf;

    let mut body: Vec<u8> = pktbuf
        .read(icmp, |data| data.to_vec())
        .map_err(|err| pktbuf.release_err(ip, err))?;
    pktbuf.release(ip)?;

    let reply_hdr = Icmpv6Hdr {
        icmp_type: ICMPV6_ECHO_REPLY,
        code: 0,
        checksum: 0,
    };
    reply_hdr.write(&mut body)?;

    let reply = pktbuf.add(None, Some(&body), body.len(), NetType::Icmpv6)?;
    // 对组播请求的应答由发送路径选择源地址
    let src = if hdr.dst.is_multicast() {
        Ipv6Addr::UNSPECIFIED
    } else {
        hdr.dst
    };
    let out = build_header(pktbuf, Some(reply), Some(src), hdr.src)
        .map_err(|err| pktbuf.release_err(reply, err))?;
    debug!("icmpv6: echo reply to {}", hdr.src);
    ipv6.send(stack, out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse() {
        let hdr = Icmpv6Hdr::parse(&[128, 0, 0x12, 0x34, 0, 1]).unwrap();
        assert_eq!(hdr.icmp_type, ICMPV6_ECHO_REQUEST);
        assert_eq!(hdr.checksum, 0x1234);
        assert_eq!(Icmpv6Hdr::parse(&[128, 0, 0]), Err(NetError::MalformedHeader));
    }

    #[test]
    fn test_demux_of() {
        assert_eq!(demux_of(ICMPV6_RPL_CTRL), (NetType::Rpl, DEMUX_ANY));
        assert_eq!(demux_of(ICMPV6_ECHO_REPLY), (NetType::Icmpv6, 129));
    }
}
