//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 测试辅助

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::net::error::{NetError, NetResult};
use crate::net::ipv6::fib::FibEntry;
use crate::net::ipv6::icmpv6::ICMPV6_ECHO_REQUEST;
use crate::net::ipv6::{self, checksum, Ipv6, Ipv6Addr, Ipv6Hdr, Ipv6Iface};
use crate::net::link::{self, Link, LinkDevice, RxFrame};
use crate::net::llhdr::LinkAddr;
use crate::net::netapi::{Message, MsgKind, OptBuf};
use crate::net::netconf::NetOpt;
use crate::net::nettype::{PROTNUM_ICMPV6, PROTNUM_UDP};
use crate::net::pktbuf::SnipId;
use crate::net::udp::{self, Udp, UdpHdr, UDP_HLEN};
use crate::net::{NetStack, StackConfig};
use crate::sched::{ProtocolTask, TaskId};

/// 本机地址 fe80::1
pub const LOCAL_ADDR: Ipv6Addr =
    Ipv6Addr::new([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01]);
/// 对端地址 fe80::2
pub const PEER_ADDR: Ipv6Addr =
    Ipv6Addr::new([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x02]);

pub const LOCAL_LL: LinkAddr = LinkAddr::short(0x0001);
pub const PEER_LL: LinkAddr = LinkAddr::short(0x0002);

pub fn test_stack() -> NetStack {
    NetStack::new(StackConfig::default())
}

/// 记录下来的一条消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub kind: MsgKind,
    pub pkt: Option<SnipId>,
}

pub type Log = Arc<Mutex<Vec<Record>>>;

/// 记录收到的消息
///
/// `release` 为 true 时收到的数据包立即释放，否则留给测试检查。
/// get/set 请求不应答
pub struct Recorder {
    log: Log,
    release: bool,
}

impl Recorder {
    pub fn new(release: bool) -> (Self, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                log: log.clone(),
                release,
            },
            log,
        )
    }
}

impl ProtocolTask for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn dispatch(&mut self, stack: &NetStack, msg: Message) {
        let pkt = msg.snip();
        self.log.lock().push(Record {
            kind: msg.kind(),
            pkt,
        });
        if let (true, Some(pkt)) = (self.release, pkt) {
            stack.pktbuf.release(pkt).unwrap();
        }
    }
}

pub fn recorder(stack: &NetStack, release: bool) -> (TaskId, Log) {
    let (body, log) = Recorder::new(release);
    let pid = stack.sched.spawn(Box::new(body)).unwrap();
    (pid, log)
}

pub type Frames = Arc<Mutex<Vec<Vec<u8>>>>;

/// 把发送的帧记下来的链路设备
pub struct TestDevice {
    addr: LinkAddr,
    channel: u16,
    frames: Frames,
}

impl TestDevice {
    pub fn new(addr: LinkAddr) -> (Self, Frames) {
        let frames: Frames = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                addr,
                channel: 11,
                frames: frames.clone(),
            },
            frames,
        )
    }
}

impl LinkDevice for TestDevice {
    fn transmit(&mut self, frame: &[u8]) -> NetResult<()> {
        self.frames.lock().push(frame.to_vec());
        Ok(())
    }

    fn address(&self) -> LinkAddr {
        self.addr
    }

    fn set_address(&mut self, addr: LinkAddr) -> NetResult<()> {
        self.addr = addr;
        Ok(())
    }

    fn max_packet_size(&self) -> u16 {
        1280
    }

    fn get_option(&self, opt: NetOpt) -> NetResult<OptBuf> {
        match opt {
            NetOpt::Channel => Ok(OptBuf::from_u16(self.channel)),
            _ => Err(NetError::NotSupported),
        }
    }

    fn set_option(&mut self, opt: NetOpt, value: &[u8]) -> NetResult<()> {
        match opt {
            NetOpt::Channel => {
                self.channel = OptBuf::from_slice(value)?.as_u16()?;
                Ok(())
            }
            _ => Err(NetError::NotSupported),
        }
    }
}

/// 链路层 + IPv6 + UDP 组成的完整协议栈
pub struct Fixture {
    pub stack: NetStack,
    pub link: TaskId,
    pub ipv6: TaskId,
    pub udp: TaskId,
    pub frames: Frames,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(StackConfig::default())
    }

    pub fn with_config(config: StackConfig) -> Self {
        let stack = NetStack::new(config);
        let (dev, frames) = TestDevice::new(LOCAL_LL);
        let link = link::init(&stack, Link::new(dev, 1)).unwrap();

        let mut ip = Ipv6::new(stack.config());
        ip.add_iface(Ipv6Iface {
            ifindex: 1,
            addr: LOCAL_ADDR,
            ll_addr: LOCAL_LL,
        });
        let fe80 = Ipv6Addr::from_segments([0xfe80, 0, 0, 0, 0, 0, 0, 0]);
        ip.fib_mut().add(FibEntry::new(fe80, 64, None, 1)).unwrap();
        ip.nc_mut().update(PEER_ADDR, 1, PEER_LL);
        let ipv6 = ipv6::init(&stack, ip).unwrap();
        let udp = udp::init(&stack, Udp::new()).unwrap();

        Self {
            stack,
            link,
            ipv6,
            udp,
            frames,
        }
    }

    /// 模拟设备收到一帧
    pub fn inject(&self, payload: &[u8]) {
        let frame = RxFrame {
            payload,
            src: PEER_LL,
            dst: LOCAL_LL,
            rssi: 0,
            lqi: 0xff,
        };
        link::on_frame_received(&self.stack, self.link, &frame).unwrap();
    }
}

/// 构造一个 IPv6 + UDP 数据报，校验和已填好
pub fn udp_datagram(src: Ipv6Addr, dst: Ipv6Addr, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let len = (UDP_HLEN + payload.len()) as u16;
    let mut udp = UdpHdr {
        src_port,
        dst_port,
        length: len,
        checksum: 0,
    };
    let csum = checksum::upper_layer_checksum(&src, &dst, PROTNUM_UDP, &[&udp.to_bytes()[..], payload]);
    udp.checksum = if csum == 0 { 0xffff } else { csum };

    let mut ip = Ipv6Hdr::new(PROTNUM_UDP, src, dst);
    ip.payload_len = len;
    ip.hop_limit = 64;

    let mut bytes = ip.to_bytes().to_vec();
    bytes.extend_from_slice(&udp.to_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// 构造一个 IPv6 + ICMPv6 报文，`body` 是 4 字节头部之后的内容
pub fn icmpv6_packet(src: Ipv6Addr, dst: Ipv6Addr, icmp_type: u8, body: &[u8]) -> Vec<u8> {
    let mut icmp = Vec::new();
    icmp.extend_from_slice(&[icmp_type, 0, 0, 0]);
    icmp.extend_from_slice(body);
    let csum = checksum::upper_layer_checksum(&src, &dst, PROTNUM_ICMPV6, &[icmp.as_slice()]);
    icmp[2..4].copy_from_slice(&csum.to_be_bytes());

    let mut ip = Ipv6Hdr::new(PROTNUM_ICMPV6, src, dst);
    ip.payload_len = icmp.len() as u16;
    ip.hop_limit = 255;

    let mut bytes = ip.to_bytes().to_vec();
    bytes.extend_from_slice(&icmp);
    bytes
}

/// 构造一个回显请求
pub fn echo_request(src: Ipv6Addr, dst: Ipv6Addr, id: u16, seq: u16, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&id.to_be_bytes());
    body.extend_from_slice(&seq.to_be_bytes());
    body.extend_from_slice(data);
    icmpv6_packet(src, dst, ICMPV6_ECHO_REQUEST, &body)
}
