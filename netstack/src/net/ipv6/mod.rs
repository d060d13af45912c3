//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IPv6 协议层
//!
//! 参考 RFC 8200
//!
//! 接收路径: 链路层 -> 去掉链路层头部 -> 校验头部 -> 拆分头部 -> 按下一头部分发
//! 发送路径: 上层 -> 查转发表 -> 查邻居缓存 -> 补全头部和上层校验和 -> 加链路层头部 -> 链路层
//!
//! 不转发目的地址不是本机的数据包

pub mod checksum;
pub mod fib;
pub mod icmpv6;
pub mod nc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use log::{debug, warn};

use crate::net::error::{NetError, NetResult};
use crate::net::llhdr::{self, LinkAddr, LlFlags, LlHdr};
use crate::net::netapi::{self, Message, OptRequest};
use crate::net::netconf::NetOpt;
use crate::net::netreg::DEMUX_ANY;
use crate::net::nettype::{NetType, PROTNUM_HOPOPT, PROTNUM_ICMPV6, PROTNUM_NONE, PROTNUM_UDP};
use crate::net::pktbuf::{PktBuf, SnipId};
use crate::net::{NetStack, StackConfig};
use crate::sched::{ProtocolTask, TaskId};

use self::fib::Fib;
use self::nc::NeighborCache;

/// IPv6 头部长度
pub const IPV6_HDR_LEN: usize = 40;

/// IPv6 版本号
pub const IPV6_VERSION: u8 = 6;

/// IPv6 地址
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ipv6Addr([u8; 16]);

impl Ipv6Addr {
    /// 未指定地址 ::
    pub const UNSPECIFIED: Self = Self([0; 16]);
    /// 环回地址 ::1
    pub const LOOPBACK: Self = Self([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
    /// 链路本地所有节点组播地址 ff02::1
    pub const ALL_NODES: Self = Self([0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    pub const fn new(octets: [u8; 16]) -> Self {
        Self(octets)
    }

    /// 从 8 个 16 位分组构造
    pub fn from_segments(segments: [u16; 8]) -> Self {
        let mut octets = [0u8; 16];
        for (i, seg) in segments.iter().enumerate() {
            octets[i * 2..i * 2 + 2].copy_from_slice(&seg.to_be_bytes());
        }
        Self(octets)
    }

    pub fn from_slice(data: &[u8]) -> NetResult<Self> {
        let octets: [u8; 16] = data.try_into().map_err(|_| NetError::InvalidValue)?;
        Ok(Self(octets))
    }

    pub const fn octets(&self) -> [u8; 16] {
        self.0
    }

    pub fn segments(&self) -> [u16; 8] {
        let mut segments = [0u16; 8];
        for (i, seg) in segments.iter_mut().enumerate() {
            *seg = u16::from_be_bytes([self.0[i * 2], self.0[i * 2 + 1]]);
        }
        segments
    }

    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }

    pub fn is_loopback(&self) -> bool {
        *self == Self::LOOPBACK
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] == 0xff
    }

    /// fe80::/10
    pub fn is_link_local(&self) -> bool {
        self.0[0] == 0xfe && (self.0[1] & 0xc0) == 0x80
    }

    /// 检查前 `prefix_len` 位是否与 `prefix` 相同
    pub fn prefix_matches(&self, prefix: &Ipv6Addr, prefix_len: u8) -> bool {
        let bits = prefix_len.min(128) as usize;
        let bytes = bits / 8;
        if self.0[..bytes] != prefix.0[..bytes] {
            return false;
        }
        let rem = bits % 8;
        if rem == 0 {
            return true;
        }
        let mask = 0xffu8 << (8 - rem);
        (self.0[bytes] & mask) == (prefix.0[bytes] & mask)
    }
}

impl fmt::Display for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments = self.segments();

        // 找出最长的连续全 0 分组，用 :: 缩写
        let (mut best_start, mut best_len) = (0, 0);
        let mut i = 0;
        while i < 8 {
            if segments[i] == 0 {
                let start = i;
                while i < 8 && segments[i] == 0 {
                    i += 1;
                }
                if i - start > best_len {
                    best_start = start;
                    best_len = i - start;
                }
            } else {
                i += 1;
            }
        }

        if best_len < 2 {
            for (i, seg) in segments.iter().enumerate() {
                if i > 0 {
                    f.write_str(":")?;
                }
                write!(f, "{:x}", seg)?;
            }
            return Ok(());
        }

        for (i, seg) in segments[..best_start].iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:x}", seg)?;
        }
        f.write_str("::")?;
        for (i, seg) in segments[best_start + best_len..].iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:x}", seg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Ipv6Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// IPv6 头部
///
/// ```text
/// +---------+---------------+-----------------------+
/// | version | traffic class |      flow label       |
/// +---------+---------------+-----+-----------------+
/// |    payload length       | next hdr | hop limit  |
/// +-------------------------+----------+------------+
/// |              source address (16 字节)            |
/// |           destination address (16 字节)          |
/// +--------------------------------------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Hdr {
    pub traffic_class: u8,
    pub flow_label: u32,
    pub payload_len: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
}

impl Ipv6Hdr {
    /// 创建头部，负载长度和跳数限制由发送路径补全
    pub fn new(next_header: u8, src: Ipv6Addr, dst: Ipv6Addr) -> Self {
        Self {
            traffic_class: 0,
            flow_label: 0,
            payload_len: 0,
            next_header,
            hop_limit: 0,
            src,
            dst,
        }
    }

    /// 解析头部
    ///
    /// # 返回
    /// 长度不足或版本号不是 6 时返回 `MalformedHeader`
    pub fn parse(data: &[u8]) -> NetResult<Self> {
        if data.len() < IPV6_HDR_LEN {
            return Err(NetError::MalformedHeader);
        }
        if data[0] >> 4 != IPV6_VERSION {
            return Err(NetError::MalformedHeader);
        }
        Ok(Self {
            traffic_class: (data[0] << 4) | (data[1] >> 4),
            flow_label: ((data[1] as u32 & 0x0f) << 16) | ((data[2] as u32) << 8) | data[3] as u32,
            payload_len: u16::from_be_bytes([data[4], data[5]]),
            next_header: data[6],
            hop_limit: data[7],
            src: Ipv6Addr::from_slice(&data[8..24])?,
            dst: Ipv6Addr::from_slice(&data[24..40])?,
        })
    }

    /// 写入头部
    pub fn write(&self, buf: &mut [u8]) -> NetResult<()> {
        if buf.len() < IPV6_HDR_LEN {
            return Err(NetError::InvalidValue);
        }
        buf[0] = (IPV6_VERSION << 4) | (self.traffic_class >> 4);
        buf[1] = (self.traffic_class << 4) | ((self.flow_label >> 16) & 0x0f) as u8;
        buf[2] = (self.flow_label >> 8) as u8;
        buf[3] = self.flow_label as u8;
        buf[4..6].copy_from_slice(&self.payload_len.to_be_bytes());
        buf[6] = self.next_header;
        buf[7] = self.hop_limit;
        buf[8..24].copy_from_slice(&self.src.octets());
        buf[24..40].copy_from_slice(&self.dst.octets());
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; IPV6_HDR_LEN] {
        let mut buf = [0u8; IPV6_HDR_LEN];
        // 缓冲区长度固定为 IPV6_HDR_LEN，不会失败
        let _ = self.write(&mut buf);
        buf
    }
}

/// 在 `payload` 前面添加一个 IPv6 头部片段
///
/// # 参数
/// - `payload`: 上层数据包，下一头部字段由它的类型决定
/// - `src`: 源地址，为 `None` 时由发送路径按接口地址补全
/// - `dst`: 目的地址
pub fn build_header(
    pktbuf: &PktBuf,
    payload: Option<SnipId>,
    src: Option<Ipv6Addr>,
    dst: Ipv6Addr,
) -> NetResult<SnipId> {
    let (next_header, payload_len) = match payload {
        Some(payload) => (
            pktbuf
                .nettype(payload)?
                .to_next_header()
                .unwrap_or(PROTNUM_NONE),
            pktbuf.chain_size(payload)?,
        ),
        None => (PROTNUM_NONE, 0),
    };
    let mut hdr = Ipv6Hdr::new(next_header, src.unwrap_or(Ipv6Addr::UNSPECIFIED), dst);
    hdr.payload_len = u16::try_from(payload_len).map_err(|_| NetError::InvalidValue)?;
    pktbuf.add(payload, Some(&hdr.to_bytes()), IPV6_HDR_LEN, NetType::Ipv6)
}

/// IPv6 接口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Iface {
    /// 接口编号，与链路层任务注册的分用键相同
    pub ifindex: u16,
    /// 接口的 IPv6 地址
    pub addr: Ipv6Addr,
    /// 接口的链路地址
    pub ll_addr: LinkAddr,
}

/// IPv6 协议任务
pub struct Ipv6 {
    ifaces: Vec<Ipv6Iface>,
    fib: Fib,
    nc: NeighborCache,
    hop_limit: u8,
    mtu: u16,
}

impl Ipv6 {
    pub fn new(config: &StackConfig) -> Self {
        Self {
            ifaces: Vec::new(),
            fib: Fib::new(config.fib_size),
            nc: NeighborCache::new(config.nc_size),
            hop_limit: config.hop_limit,
            mtu: config.ipv6_mtu,
        }
    }

    /// 添加接口，相同编号的接口会被替换
    pub fn add_iface(&mut self, iface: Ipv6Iface) {
        match self.ifaces.iter_mut().find(|i| i.ifindex == iface.ifindex) {
            Some(existing) => *existing = iface,
            None => self.ifaces.push(iface),
        }
    }

    pub fn iface(&self, ifindex: u16) -> Option<&Ipv6Iface> {
        self.ifaces.iter().find(|i| i.ifindex == ifindex)
    }

    pub fn fib_mut(&mut self) -> &mut Fib {
        &mut self.fib
    }

    pub fn nc_mut(&mut self) -> &mut NeighborCache {
        &mut self.nc
    }

    /// 目的地址是否由本机接收
    ///
    /// 接口地址和所有组播地址都算本机地址
    pub fn is_local(&self, addr: &Ipv6Addr) -> bool {
        addr.is_multicast() || self.ifaces.iter().any(|i| i.addr == *addr)
    }

    fn receive(&mut self, stack: &NetStack, pkt: SnipId) {
        let pktbuf = &stack.pktbuf;

        // 链路层头部在链首，只保留后面的 IP 数据
        let data = match pktbuf.nettype(pkt) {
            Ok(NetType::Link) => match pktbuf.next(pkt) {
                Ok(Some(next)) => {
                    if let Err(err) = pktbuf.hold(next, 1) {
                        warn!("ipv6: receive: {}", pktbuf.release_err(pkt, err));
                        return;
                    }
                    pktbuf.discard(pkt);
                    next
                }
                _ => {
                    debug!("ipv6: receive: empty packet after link header");
                    pktbuf.discard(pkt);
                    return;
                }
            },
            Ok(_) => pkt,
            Err(err) => {
                warn!("ipv6: receive: {}: {}", pkt, err);
                return;
            }
        };

        if let Err(err) = self.process(stack, data) {
            debug!("ipv6: receive: packet dropped: {}", err);
        }
    }

    /// 处理一个以 IPv6 头部开头的数据包，任何情况下数据包都被消耗
    fn process(&mut self, stack: &NetStack, pkt: SnipId) -> NetResult<()> {
        let pktbuf = &stack.pktbuf;

        let hdr = pktbuf
            .read(pkt, Ipv6Hdr::parse)
            .and_then(|r| r)
            .map_err(|err| pktbuf.release_err(pkt, err))?;
        let ip = pktbuf
            .start_write(pkt)
            .map_err(|err| pktbuf.release_err(pkt, err))?;
        pktbuf
            .set_nettype(ip, NetType::Ipv6)
            .map_err(|err| pktbuf.release_err(ip, err))?;

        if !self.is_local(&hdr.dst) {
            debug!("ipv6: packet to {} is not for us, dropped", hdr.dst);
            pktbuf.release(ip)?;
            return Ok(());
        }

        // 负载长度以头部为准，多出来的链路层填充截掉
        let available = pktbuf.size(ip)? - IPV6_HDR_LEN;
        let payload_len = hdr.payload_len as usize;
        if payload_len > available {
            return Err(pktbuf.release_err(ip, NetError::MalformedHeader));
        }
        let ip = if payload_len < available {
            pktbuf
                .realloc(ip, IPV6_HDR_LEN + payload_len)
                .map_err(|err| pktbuf.release_err(ip, err))?
        } else {
            ip
        };

        let payload = pktbuf
            .mark(ip, IPV6_HDR_LEN, NetType::Ipv6)
            .map_err(|err| pktbuf.release_err(ip, err))?;

        match NetType::from_next_header(hdr.next_header) {
            Some(NetType::Icmpv6) => {
                pktbuf
                    .set_nettype(payload, NetType::Icmpv6)
                    .map_err(|err| pktbuf.release_err(ip, err))?;
                icmpv6::process(self, stack, ip, payload, &hdr)
            }
            Some(nettype @ (NetType::Udp | NetType::Tcp)) => {
                pktbuf
                    .set_nettype(payload, nettype)
                    .map_err(|err| pktbuf.release_err(ip, err))?;
                netapi::dispatch(stack, nettype, DEMUX_ANY, Message::Receive, ip)?;
                Ok(())
            }
            _ => {
                debug!("ipv6: next header {} not supported, dropped", hdr.next_header);
                pktbuf.release(ip)?;
                Ok(())
            }
        }
    }

    /// 发送以 IPv6 头部开头的数据包
    pub(crate) fn send(&mut self, stack: &NetStack, pkt: SnipId) {
        let pktbuf = &stack.pktbuf;
        match pktbuf.nettype(pkt) {
            Ok(NetType::Ipv6) => {}
            Ok(other) => {
                warn!("ipv6: send: expected ipv6 header, got {}", other);
                pktbuf.discard(pkt);
                return;
            }
            Err(err) => {
                warn!("ipv6: send: {}: {}", pkt, err);
                return;
            }
        }
        let ip = match pktbuf.start_write(pkt) {
            Ok(ip) => ip,
            Err(err) => {
                debug!("ipv6: send: {}", pktbuf.release_err(pkt, err));
                return;
            }
        };
        match self.prepare(stack, ip) {
            Ok((link, frame)) => {
                if let Err(err) = netapi::send(stack, link, frame) {
                    debug!("ipv6: send: link layer refused packet: {}", err);
                }
            }
            Err(err) => {
                debug!("ipv6: send: packet dropped: {}", pktbuf.release_err(ip, err));
            }
        }
    }

    /// 补全头部并加上链路层头部
    ///
    /// 失败时 `ip` 仍归调用者所有
    fn prepare(&mut self, stack: &NetStack, ip: SnipId) -> NetResult<(TaskId, SnipId)> {
        let pktbuf = &stack.pktbuf;
        let mut hdr = pktbuf.read(ip, Ipv6Hdr::parse)??;
        if hdr.next_header == PROTNUM_HOPOPT {
            warn!("ipv6: send: upper layer did not set next header");
            return Err(NetError::MalformedHeader);
        }

        let (ll_dst, ifindex) = self.resolve(&hdr.dst)?;
        let iface = *self.iface(ifindex).ok_or(NetError::NoLinkInfo)?;

        if hdr.src.is_unspecified() {
            hdr.src = iface.addr;
        }
        let payload_len = match pktbuf.next(ip)? {
            Some(next) => pktbuf.chain_size(next)?,
            None => 0,
        };
        if payload_len + IPV6_HDR_LEN > self.mtu as usize {
            debug!("ipv6: send: {} bytes exceed mtu {}", payload_len + IPV6_HDR_LEN, self.mtu);
        }
        hdr.payload_len = u16::try_from(payload_len).map_err(|_| NetError::InvalidValue)?;
        if hdr.hop_limit == 0 {
            hdr.hop_limit = self.hop_limit;
        }
        pktbuf.write(ip, |buf| hdr.write(buf))??;

        self.fill_upper_checksum(stack, ip, &hdr)?;

        let link = stack
            .netreg
            .lookup_first(NetType::Link, ifindex as u32)
            .ok_or(NetError::NoLinkInfo)?
            .pid();
        let flags = if hdr.dst.is_multicast() {
            LlFlags::MULTICAST
        } else {
            LlFlags::empty()
        };
        let ll = LlHdr::new(iface.ll_addr, ll_dst, flags)?;
        let frame = llhdr::build(pktbuf, Some(ip), &ll)?;
        Ok((link, frame))
    }

    /// 查找目的地址对应的链路地址和接口
    fn resolve(&self, dst: &Ipv6Addr) -> NetResult<(LinkAddr, u16)> {
        if dst.is_multicast() {
            let ifindex = self
                .fib
                .lookup(dst)
                .map(|e| e.iface)
                .or_else(|| self.ifaces.first().map(|i| i.ifindex))
                .ok_or(NetError::NoRoute)?;
            let iface = self.iface(ifindex).ok_or(NetError::NoLinkInfo)?;
            return Ok((LinkAddr::broadcast(iface.ll_addr.len()), ifindex));
        }
        let (next_hop, _) = self.fib.next_hop(dst).ok_or(NetError::NoRoute)?;
        let neighbor = self.nc.lookup(&next_hop).ok_or(NetError::NoLinkInfo)?;
        Ok((neighbor.ll_addr, neighbor.iface))
    }

    /// 计算 UDP / ICMPv6 的校验和
    ///
    /// UDP 使用 `StackConfig::udp_checksum` 选出的函数，与接收时的校验一致
    fn fill_upper_checksum(&self, stack: &NetStack, ip: SnipId, hdr: &Ipv6Hdr) -> NetResult<()> {
        let pktbuf = &stack.pktbuf;
        let Some(upper) = pktbuf.next(ip)? else {
            return Ok(());
        };
        let (proto, field) = match pktbuf.nettype(upper)? {
            NetType::Udp => (PROTNUM_UDP, 6),
            NetType::Icmpv6 => (PROTNUM_ICMPV6, 2),
            _ => return Ok(()),
        };
        let udp_csum = if proto == PROTNUM_UDP {
            let select = stack.config().udp_checksum;
            Some(select(NetType::Ipv6).ok_or(NetError::UnknownProtocol)?)
        } else {
            None
        };
        let writable = pktbuf.start_write(upper)?;
        if writable != upper {
            pktbuf.set_next(ip, Some(writable))?;
        }
        pktbuf.write(writable, |buf| {
            if buf.len() < field + 2 {
                return Err(NetError::MalformedHeader);
            }
            buf[field..field + 2].fill(0);
            Ok(())
        })??;

        let network = hdr.to_bytes();
        let mut csum = pktbuf.with_chain(writable, |views| {
            let segments: Vec<&[u8]> = views.iter().map(|v| v.data).collect();
            match udp_csum {
                Some(csum) => csum(&network, &segments),
                None => Ok(checksum::upper_layer_checksum(&hdr.src, &hdr.dst, proto, &segments)),
            }
        })??;
        // UDP 中 0 表示没有校验和，IPv6 下必须发送 0xffff
        if proto == PROTNUM_UDP && csum == 0 {
            csum = 0xffff;
        }
        pktbuf.write(writable, |buf| buf[field..field + 2].copy_from_slice(&csum.to_be_bytes()))?;
        Ok(())
    }

    fn get(&self, req: OptRequest) {
        match req.opt {
            NetOpt::Address => match self.ifaces.first() {
                Some(iface) => req.reply_value(&iface.addr.octets()),
                None => req.reply(Err(NetError::NotSupported)),
            },
            NetOpt::AddrLen => req.reply_u16(16),
            NetOpt::MaxPacketSize => req.reply_u16(self.mtu),
            NetOpt::Proto => req.reply_u8(NetType::Ipv6.to_u8()),
            _ => req.reply(Err(NetError::NotSupported)),
        }
    }

    fn set(&mut self, req: OptRequest) {
        match req.opt {
            NetOpt::Address => {
                let addr = match Ipv6Addr::from_slice(req.value.as_slice()) {
                    Ok(addr) => addr,
                    Err(err) => return req.reply(Err(err)),
                };
                match self.ifaces.first_mut() {
                    Some(iface) => {
                        iface.addr = addr;
                        req.reply(Ok(16));
                    }
                    None => req.reply(Err(NetError::NotSupported)),
                }
            }
            _ => req.reply(Err(NetError::NotSupported)),
        }
    }
}

impl ProtocolTask for Ipv6 {
    fn name(&self) -> &'static str {
        "ipv6"
    }

    fn dispatch(&mut self, stack: &NetStack, msg: Message) {
        match msg {
            Message::Receive(pkt) => self.receive(stack, pkt),
            Message::Send(pkt) => self.send(stack, pkt),
            Message::Get(req) => self.get(req),
            Message::Set(req) => self.set(req),
        }
    }
}

/// 创建 IPv6 任务并注册为 (Ipv6, DEMUX_ANY)
pub fn init(stack: &NetStack, ipv6: Ipv6) -> NetResult<TaskId> {
    let pid = stack.sched.spawn(Box::new(ipv6))?;
    stack.netreg.register(NetType::Ipv6, DEMUX_ANY, pid)?;
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ipv6::fib::FibEntry;
    use crate::net::testutil::{test_stack, LOCAL_ADDR, PEER_ADDR};

    #[test]
    fn test_addr_display() {
        assert_eq!(alloc::format!("{}", Ipv6Addr::UNSPECIFIED), "::");
        assert_eq!(alloc::format!("{}", Ipv6Addr::ALL_NODES), "ff02::1");
        let addr = Ipv6Addr::from_segments([0x2001, 0xdb8, 0, 0, 1, 0, 0, 1]);
        assert_eq!(alloc::format!("{}", addr), "2001:db8::1:0:0:1");
        let full = Ipv6Addr::from_segments([1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(alloc::format!("{}", full), "1:2:3:4:5:6:7:8");
    }

    #[test]
    fn test_addr_classes() {
        assert!(Ipv6Addr::ALL_NODES.is_multicast());
        assert!(LOCAL_ADDR.is_link_local());
        assert!(Ipv6Addr::LOOPBACK.is_loopback());
        assert!(!LOCAL_ADDR.is_multicast());
    }

    #[test]
    fn test_prefix_matches() {
        let a = Ipv6Addr::from_segments([0x2001, 0xdb8, 0xff00, 0, 0, 0, 0, 1]);
        let p = Ipv6Addr::from_segments([0x2001, 0xdb8, 0xf000, 0, 0, 0, 0, 0]);
        assert!(a.prefix_matches(&p, 36));
        assert!(!a.prefix_matches(&p, 40));
        assert!(a.prefix_matches(&Ipv6Addr::UNSPECIFIED, 0));
    }

    #[test]
    fn test_header_write_parse() {
        let mut hdr = Ipv6Hdr::new(PROTNUM_UDP, LOCAL_ADDR, PEER_ADDR);
        hdr.traffic_class = 0xab;
        hdr.flow_label = 0x12345;
        hdr.payload_len = 18;
        hdr.hop_limit = 64;
        let bytes = hdr.to_bytes();
        assert_eq!(bytes[0], 0x6a);
        assert_eq!(bytes[1], 0xb1);
        assert_eq!(Ipv6Hdr::parse(&bytes), Ok(hdr));
    }

    #[test]
    fn test_header_rejects_bad_version_and_length() {
        let mut bytes = Ipv6Hdr::new(PROTNUM_UDP, LOCAL_ADDR, PEER_ADDR).to_bytes();
        assert_eq!(Ipv6Hdr::parse(&bytes[..39]), Err(NetError::MalformedHeader));
        bytes[0] = 0x45;
        assert_eq!(Ipv6Hdr::parse(&bytes), Err(NetError::MalformedHeader));
    }

    #[test]
    fn test_resolve() {
        let mut ip = Ipv6::new(&StackConfig::default());
        ip.add_iface(Ipv6Iface {
            ifindex: 1,
            addr: LOCAL_ADDR,
            ll_addr: LinkAddr::short(1),
        });
        let far = Ipv6Addr::from_segments([0x2001, 0xdb8, 0, 0, 0, 0, 0, 1]);
        assert_eq!(ip.resolve(&far), Err(NetError::NoRoute));

        let fe80 = Ipv6Addr::from_segments([0xfe80, 0, 0, 0, 0, 0, 0, 0]);
        ip.fib_mut().add(FibEntry::new(fe80, 64, None, 1)).unwrap();
        assert_eq!(ip.resolve(&PEER_ADDR), Err(NetError::NoLinkInfo));

        ip.nc_mut().update(PEER_ADDR, 1, LinkAddr::short(2));
        assert_eq!(ip.resolve(&PEER_ADDR), Ok((LinkAddr::short(2), 1)));

        // 组播发往链路广播地址
        assert_eq!(ip.resolve(&Ipv6Addr::ALL_NODES), Ok((LinkAddr::broadcast(2), 1)));

        // 默认路由经网关
        ip.fib_mut().add(FibEntry::default_route(PEER_ADDR, 1)).unwrap();
        assert_eq!(ip.resolve(&far), Ok((LinkAddr::short(2), 1)));
    }

    #[test]
    fn test_is_local() {
        let mut ip = Ipv6::new(&StackConfig::default());
        assert!(!ip.is_local(&LOCAL_ADDR));
        ip.add_iface(Ipv6Iface {
            ifindex: 1,
            addr: LOCAL_ADDR,
            ll_addr: LinkAddr::short(1),
        });
        assert!(ip.is_local(&LOCAL_ADDR));
        assert!(ip.is_local(&Ipv6Addr::ALL_NODES));
        assert!(!ip.is_local(&PEER_ADDR));
    }

    #[test]
    fn test_build_header_uses_payload_type() {
        let stack = test_stack();
        let pktbuf = &stack.pktbuf;
        let udp = pktbuf.alloc(12, NetType::Udp).unwrap();
        let ip = build_header(pktbuf, Some(udp), None, PEER_ADDR).unwrap();
        let hdr = pktbuf.read(ip, Ipv6Hdr::parse).unwrap().unwrap();
        assert_eq!(hdr.next_header, PROTNUM_UDP);
        assert_eq!(hdr.payload_len, 12);
        assert!(hdr.src.is_unspecified());
        assert_eq!(pktbuf.nettype(ip).unwrap(), NetType::Ipv6);
        pktbuf.release(ip).unwrap();
        assert!(pktbuf.is_empty());
    }
}
