//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! UDP 协议
//!
//! 参考 RFC 768，IPv6 下的校验和见 RFC 8200 8.1 节
//!
//! 接收: 找到 UDP 片段 -> 拆分头部和负载 -> 校验 -> 按目的端口分发
//! 发送: 填写长度 -> 交给网络层，校验和由网络层在确定源地址后用同一个校验和函数计算

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::debug;

use crate::net::error::{NetError, NetResult};
use crate::net::ipv6::{checksum, Ipv6Hdr};
use crate::net::netapi::{self, Message};
use crate::net::netreg::{DemuxKey, DEMUX_ANY};
use crate::net::nettype::{NetType, PROTNUM_UDP};
use crate::net::pktbuf::{PktBuf, SnipId};
use crate::net::NetStack;
use crate::sched::{ProtocolTask, TaskId};

/// UDP 头部长度
pub const UDP_HLEN: usize = 8;

/// UDP 端口号
pub type UdpPort = u16;

/// UDP 头部
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpHdr {
    /// 源端口
    pub src_port: UdpPort,
    /// 目的端口
    pub dst_port: UdpPort,
    /// 长度（头部 + 负载）
    pub length: u16,
    /// 校验和
    pub checksum: u16,
}

impl UdpHdr {
    /// 解析头部
    pub fn parse(data: &[u8]) -> NetResult<Self> {
        if data.len() < UDP_HLEN {
            return Err(NetError::MalformedHeader);
        }
        Ok(Self {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            checksum: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// 写入头部
    pub fn write(&self, buf: &mut [u8]) -> NetResult<()> {
        if buf.len() < UDP_HLEN {
            return Err(NetError::InvalidValue);
        }
        buf[..UDP_HLEN].copy_from_slice(&self.to_bytes());
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; UDP_HLEN] {
        let mut buf = [0u8; UDP_HLEN];
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.checksum.to_be_bytes());
        buf
    }
}

/// 校验和函数
///
/// # 参数
/// - `network`: 外层网络层头部
/// - `segments`: UDP 头部和负载
///
/// # 返回
/// 校验和字段为 0 时得到应填入的值；字段已填写时正确的数据返回 0
pub type ChecksumFn = fn(network: &[u8], segments: &[&[u8]]) -> NetResult<u16>;

/// 按网络层类型选择校验和函数
pub type ChecksumSelector = fn(NetType) -> Option<ChecksumFn>;

/// IPv6 下的 UDP 校验和
pub fn ipv6_checksum(network: &[u8], segments: &[&[u8]]) -> NetResult<u16> {
    let hdr = Ipv6Hdr::parse(network)?;
    Ok(checksum::upper_layer_checksum(&hdr.src, &hdr.dst, PROTNUM_UDP, segments))
}

/// 默认的校验和选择
pub fn checksum_for(nettype: NetType) -> Option<ChecksumFn> {
    match nettype {
        NetType::Ipv6 => Some(ipv6_checksum),
        _ => None,
    }
}

/// 在 `payload` 前面添加一个 UDP 头部片段
///
/// 长度按负载计算，校验和留空
pub fn build_header(
    pktbuf: &PktBuf,
    payload: Option<SnipId>,
    src_port: UdpPort,
    dst_port: UdpPort,
) -> NetResult<SnipId> {
    let payload_len = match payload {
        Some(payload) => pktbuf.chain_size(payload)?,
        None => 0,
    };
    let length = u16::try_from(UDP_HLEN + payload_len).map_err(|_| NetError::InvalidValue)?;
    let hdr = UdpHdr {
        src_port,
        dst_port,
        length,
        checksum: 0,
    };
    pktbuf.add(payload, Some(&hdr.to_bytes()), UDP_HLEN, NetType::Udp)
}

/// UDP 协议任务
///
/// 校验和函数由 `StackConfig::udp_checksum` 按外层网络层选择，
/// 网络层发送时补全校验和也用同一个选择
#[derive(Debug, Default, Clone, Copy)]
pub struct Udp;

impl Udp {
    pub fn new() -> Self {
        Self
    }

    fn receive(&mut self, stack: &NetStack, pkt: SnipId) {
        if let Err(err) = self.try_receive(stack, pkt) {
            debug!("udp: receive: packet dropped: {}", err);
        }
    }

    fn try_receive(&mut self, stack: &NetStack, pkt: SnipId) -> NetResult<()> {
        let pktbuf = &stack.pktbuf;

        let udp = pktbuf
            .search_type(pkt, NetType::Udp)
            .and_then(|udp| udp.ok_or(NetError::MalformedHeader))
            .map_err(|err| pktbuf.release_err(pkt, err))?;
        let size = pktbuf.size(udp).map_err(|err| pktbuf.release_err(pkt, err))?;
        if size < UDP_HLEN {
            return Err(pktbuf.release_err(pkt, NetError::MalformedHeader));
        }

        // write_path 失败时已经释放了整条链
        let (head, udp) = pktbuf.write_path(pkt, udp)?;

        let hdr = pktbuf
            .read(udp, UdpHdr::parse)
            .and_then(|r| r)
            .map_err(|err| pktbuf.release_err(head, err))?;
        let length = hdr.length as usize;
        if length < UDP_HLEN || length > size || hdr.dst_port == 0 {
            return Err(pktbuf.release_err(head, NetError::MalformedHeader));
        }
        if length < size {
            pktbuf
                .realloc(udp, length)
                .map_err(|err| pktbuf.release_err(head, err))?;
        }
        pktbuf
            .mark(udp, UDP_HLEN, NetType::Udp)
            .map_err(|err| pktbuf.release_err(head, err))?;

        if hdr.checksum == 0 {
            // IPv6 下校验和是必须的
            return Err(pktbuf.release_err(head, NetError::ChecksumMismatch));
        }
        let select = stack.config().udp_checksum;
        let result = pktbuf
            .with_chain(head, |views| {
                let pos = views.iter().position(|v| v.id == udp)?;
                let network = views[..pos].last()?;
                let csum = select(network.nettype)?;
                let segments: Vec<&[u8]> = views[pos..].iter().map(|v| v.data).collect();
                Some(csum(network.data, &segments))
            })
            .map_err(|err| pktbuf.release_err(head, err))?;
        match result {
            Some(Ok(0)) => {}
            Some(Ok(_)) => return Err(pktbuf.release_err(head, NetError::ChecksumMismatch)),
            Some(Err(err)) => return Err(pktbuf.release_err(head, err)),
            None => return Err(pktbuf.release_err(head, NetError::UnknownProtocol)),
        }

        let delivered = netapi::dispatch(
            stack,
            NetType::Udp,
            hdr.dst_port as DemuxKey,
            Message::Receive,
            head,
        )?;
        if delivered == 0 {
            debug!("udp: no receiver on port {}", hdr.dst_port);
        }
        Ok(())
    }

    fn send(&mut self, stack: &NetStack, pkt: SnipId) {
        if let Err(err) = self.try_send(stack, pkt) {
            debug!("udp: send: packet dropped: {}", err);
        }
    }

    fn try_send(&mut self, stack: &NetStack, pkt: SnipId) -> NetResult<()> {
        let pktbuf = &stack.pktbuf;

        let udp = pktbuf
            .search_type(pkt, NetType::Udp)
            .and_then(|udp| udp.ok_or(NetError::MalformedHeader))
            .map_err(|err| pktbuf.release_err(pkt, err))?;
        if udp == pkt {
            // 缺少网络层头部，无法确定下一层
            return Err(pktbuf.release_err(pkt, NetError::UnknownProtocol));
        }
        let network = pktbuf
            .nettype(pkt)
            .map_err(|err| pktbuf.release_err(pkt, err))?;

        let (head, udp) = pktbuf.write_path(pkt, udp)?;
        let size = pktbuf.size(udp).map_err(|err| pktbuf.release_err(head, err))?;
        if size < UDP_HLEN {
            return Err(pktbuf.release_err(head, NetError::MalformedHeader));
        }
        // 头部片段可能还带着负载
        let payload_len = pktbuf
            .chain_size(udp)
            .map_err(|err| pktbuf.release_err(head, err))?
            - UDP_HLEN;
        let length = u16::try_from(UDP_HLEN + payload_len)
            .map_err(|_| pktbuf.release_err(head, NetError::InvalidValue))?;
        pktbuf
            .write(udp, |buf| {
                buf[4..6].copy_from_slice(&length.to_be_bytes());
                buf[6..8].fill(0);
            })
            .map_err(|err| pktbuf.release_err(head, err))?;

        netapi::dispatch(stack, network, DEMUX_ANY, Message::Send, head)?;
        Ok(())
    }
}

impl ProtocolTask for Udp {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn dispatch(&mut self, stack: &NetStack, msg: Message) {
        match msg {
            Message::Receive(pkt) => self.receive(stack, pkt),
            Message::Send(pkt) => self.send(stack, pkt),
            Message::Get(req) | Message::Set(req) => req.reply(Err(NetError::NotSupported)),
        }
    }
}

/// 创建 UDP 任务并注册为 (Udp, DEMUX_ANY)
pub fn init(stack: &NetStack, udp: Udp) -> NetResult<TaskId> {
    let pid = stack.sched.spawn(Box::new(udp))?;
    stack.netreg.register(NetType::Udp, DEMUX_ANY, pid)?;
    Ok(pid)
}
