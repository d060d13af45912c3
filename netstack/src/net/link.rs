//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 链路层适配任务
//!
//! 把具体的链路设备接入协议栈：
//! - 中断上下文收到帧后调用 `on_frame_received`，由它生成带通用链路层头部的数据包
//! - 链路层任务把收到的数据包交给上层协议，把上层发来的数据包交给设备发送
//!
//! 设备接口参考 Linux 的 net_device_ops (include/linux/netdevice.h)

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{debug, warn};
use spin::Mutex;

use crate::net::error::{NetError, NetResult};
use crate::net::llhdr::{self, LinkAddr, LlFlags, LlHdr};
use crate::net::netapi::{self, Message, OptBuf, OptRequest};
use crate::net::netconf::{Enable, NetOpt, NetState};
use crate::net::netreg::{DemuxKey, DEMUX_ANY};
use crate::net::nettype::NetType;
use crate::net::pktbuf::SnipId;
use crate::net::NetStack;
use crate::sched::{ProtocolTask, TaskId};

/// 链路设备
///
/// 所有方法都在链路层任务中调用
pub trait LinkDevice: Send {
    /// 发送一帧
    ///
    /// # 参数
    /// - `frame`: 不含通用链路层头部的帧内容
    fn transmit(&mut self, frame: &[u8]) -> NetResult<()>;

    /// 设备的链路地址
    fn address(&self) -> LinkAddr;

    /// 修改链路地址
    fn set_address(&mut self, _addr: LinkAddr) -> NetResult<()> {
        Err(NetError::NotSupported)
    }

    /// 一帧最多可以携带的字节数
    fn max_packet_size(&self) -> u16;

    /// 读取设备特有的选项（信道、发送功率等）
    fn get_option(&self, _opt: NetOpt) -> NetResult<OptBuf> {
        Err(NetError::NotSupported)
    }

    /// 设置设备特有的选项
    fn set_option(&mut self, _opt: NetOpt, _value: &[u8]) -> NetResult<()> {
        Err(NetError::NotSupported)
    }
}

/// 设备收到的一帧
#[derive(Debug, Clone, Copy)]
pub struct RxFrame<'a> {
    pub payload: &'a [u8],
    pub src: LinkAddr,
    pub dst: LinkAddr,
    pub rssi: u8,
    pub lqi: u8,
}

/// 链路统计信息
///
/// 对应 Linux 的 rtnl_link_stats64 中协议栈关心的部分
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// 接收包数
    pub rx_packets: u64,
    /// 接收字节数
    pub rx_bytes: u64,
    /// 接收丢弃数
    pub rx_dropped: u64,
    /// 发送包数
    pub tx_packets: u64,
    /// 发送字节数
    pub tx_bytes: u64,
    /// 发送丢弃数
    pub tx_dropped: u64,
    /// 发送错误数
    pub tx_errors: u64,
}

/// 设备收到帧时调用
///
/// # 参数
/// - `link`: 链路层任务
/// - `frame`: 收到的帧
///
/// # 说明
/// 可以在中断上下文调用。生成 `Link -> Undef` 两个片段的数据包，
/// 投递失败时数据包已被释放
pub fn on_frame_received(stack: &NetStack, link: TaskId, frame: &RxFrame<'_>) -> NetResult<()> {
    let pktbuf = &stack.pktbuf;

    let mut flags = LlFlags::empty();
    if frame.dst.is_broadcast() {
        flags |= LlFlags::BROADCAST;
    }
    let mut hdr = LlHdr::new(frame.src, frame.dst, flags)?;
    hdr.rssi = frame.rssi;
    hdr.lqi = frame.lqi;

    let payload = pktbuf.add(None, Some(frame.payload), frame.payload.len(), NetType::Undef)?;
    let pkt = llhdr::build(pktbuf, Some(payload), &hdr)
        .map_err(|err| pktbuf.release_err(payload, err))?;
    netapi::receive(stack, link, pkt)
}

/// 链路层任务
pub struct Link<D: LinkDevice> {
    dev: D,
    ifindex: u16,
    proto: NetType,
    promiscuous: bool,
    state: NetState,
    stats: Arc<Mutex<LinkStats>>,
}

impl<D: LinkDevice> Link<D> {
    /// 创建链路层任务，上层协议默认为 IPv6
    ///
    /// # 参数
    /// - `dev`: 链路设备
    /// - `ifindex`: 接口编号，从 1 开始
    pub fn new(dev: D, ifindex: u16) -> Self {
        Self::with_proto(dev, ifindex, NetType::Ipv6)
    }

    pub fn with_proto(dev: D, ifindex: u16, proto: NetType) -> Self {
        Self {
            dev,
            ifindex,
            proto,
            promiscuous: false,
            state: NetState::Idle,
            stats: Arc::new(Mutex::new(LinkStats::default())),
        }
    }

    pub fn ifindex(&self) -> u16 {
        self.ifindex
    }

    /// 统计信息，任务创建后仍可读取
    pub fn stats(&self) -> Arc<Mutex<LinkStats>> {
        self.stats.clone()
    }

    /// 目的地址是否由本接口接收
    fn accepts(&self, hdr: &LlHdr) -> bool {
        self.promiscuous
            || hdr.flags.intersects(LlFlags::BROADCAST | LlFlags::MULTICAST)
            || hdr.dst.is_broadcast()
            || hdr.dst == self.dev.address()
    }

    fn receive(&mut self, stack: &NetStack, pkt: SnipId) {
        let pktbuf = &stack.pktbuf;

        let hdr = match pktbuf.nettype(pkt) {
            Ok(NetType::Link) => pktbuf.read(pkt, LlHdr::parse).and_then(|r| r),
            Ok(_) => Err(NetError::MalformedHeader),
            Err(err) => Err(err),
        };
        let hdr = match hdr {
            Ok(hdr) => hdr,
            Err(err) => {
                warn!("link: receive: {}", pktbuf.release_err(pkt, err));
                self.stats.lock().rx_dropped += 1;
                return;
            }
        };
        if !self.state.is_up() || !self.accepts(&hdr) {
            debug!("link: frame to {} not for us, dropped", hdr.dst);
            pktbuf.discard(pkt);
            self.stats.lock().rx_dropped += 1;
            return;
        }

        let size = pktbuf.chain_size(pkt).unwrap_or(0).saturating_sub(hdr.size());
        {
            let mut stats = self.stats.lock();
            stats.rx_packets += 1;
            stats.rx_bytes += size as u64;
        }
        match netapi::dispatch(stack, self.proto, DEMUX_ANY, Message::Receive, pkt) {
            Ok(0) => debug!("link: no {} task, frame dropped", self.proto),
            Ok(_) => {}
            Err(err) => debug!("link: receive: {}", err),
        }
    }

    fn send(&mut self, stack: &NetStack, pkt: SnipId) {
        if !self.state.is_up() {
            debug!("link: interface {} is {:?}, packet dropped", self.ifindex, self.state);
            stack.pktbuf.discard(pkt);
            self.stats.lock().tx_dropped += 1;
            return;
        }
        match self.try_send(stack, pkt) {
            Ok(len) => {
                let mut stats = self.stats.lock();
                stats.tx_packets += 1;
                stats.tx_bytes += len as u64;
            }
            Err(NetError::DeviceError) => self.stats.lock().tx_errors += 1,
            Err(err) => {
                debug!("link: send: packet dropped: {}", err);
                self.stats.lock().tx_dropped += 1;
            }
        }
    }

    /// 把数据包交给设备发送，数据包在返回前被释放
    ///
    /// # 返回
    /// 发出的帧长度。设备发送失败返回 `DeviceError`
    fn try_send(&mut self, stack: &NetStack, pkt: SnipId) -> NetResult<usize> {
        let frame = self.flatten(stack, pkt)?;
        let max = self.dev.max_packet_size() as usize;
        if frame.len() > max {
            debug!("link: {} bytes exceed max packet size {}", frame.len(), max);
            return Err(NetError::InvalidValue);
        }
        self.dev.transmit(&frame).map_err(|err| {
            warn!("link: transmit on interface {} failed: {}", self.ifindex, err);
            NetError::DeviceError
        })?;
        Ok(frame.len())
    }

    /// 去掉链路层头部，把剩下的片段复制成一帧
    ///
    /// 数据包在返回前被释放
    fn flatten(&self, stack: &NetStack, pkt: SnipId) -> NetResult<Vec<u8>> {
        let pktbuf = &stack.pktbuf;
        let nettype = pktbuf.nettype(pkt)?;
        if nettype != NetType::Link {
            return Err(pktbuf.release_err(pkt, NetError::MalformedHeader));
        }
        let frame = pktbuf.with_chain(pkt, |views| {
            let len = views.iter().skip(1).map(|v| v.data.len()).sum();
            let mut frame = Vec::with_capacity(len);
            for view in views.iter().skip(1) {
                frame.extend_from_slice(view.data);
            }
            frame
        });
        pktbuf.discard(pkt);
        frame
    }

    fn get(&self, req: OptRequest) {
        match req.opt {
            NetOpt::Address => {
                let addr = self.dev.address();
                req.reply_value(addr.as_slice());
            }
            NetOpt::AddrLen => req.reply_u16(self.dev.address().len() as u16),
            NetOpt::MaxPacketSize => req.reply_u16(self.dev.max_packet_size()),
            NetOpt::Proto => req.reply_u8(self.proto.to_u8()),
            NetOpt::Promiscuous => req.reply_u8(Enable::from(self.promiscuous) as u8),
            NetOpt::State => req.reply_u8(self.state as u8),
            opt => match self.dev.get_option(opt) {
                Ok(value) => req.reply_value(value.as_slice()),
                Err(err) => req.reply(Err(err)),
            },
        }
    }

    fn set(&mut self, req: OptRequest) {
        let value = req.value;
        let result = match req.opt {
            NetOpt::Address => LinkAddr::new(value.as_slice()).and_then(|addr| self.dev.set_address(addr)),
            NetOpt::Proto => value
                .as_u8()
                .and_then(|v| NetType::from_u8(v).ok_or(NetError::InvalidValue))
                .map(|proto| self.proto = proto),
            NetOpt::Promiscuous => value
                .as_u8()
                .and_then(|v| Enable::from_u8(v).ok_or(NetError::InvalidValue))
                .map(|enable| self.promiscuous = enable.into()),
            NetOpt::State => value
                .as_u8()
                .and_then(|v| NetState::from_u8(v).ok_or(NetError::InvalidValue))
                .map(|state| {
                    debug!("link: interface {} {:?} -> {:?}", self.ifindex, self.state, state);
                    // 复位后回到空闲状态
                    self.state = if state == NetState::Reset {
                        NetState::Idle
                    } else {
                        state
                    };
                }),
            opt => self.dev.set_option(opt, value.as_slice()),
        };
        req.reply(result.map(|_| value.len()));
    }
}

impl<D: LinkDevice> ProtocolTask for Link<D> {
    fn name(&self) -> &'static str {
        "link"
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

/// 创建链路层任务并注册为 (Link, ifindex)
///
/// # 返回
/// 接口编号为 0 时返回 `InvalidValue`，0 是通配分用键
pub fn init<D: LinkDevice + 'static>(stack: &NetStack, link: Link<D>) -> NetResult<TaskId> {
    let ifindex = link.ifindex;
    if ifindex as DemuxKey == DEMUX_ANY {
        return Err(NetError::InvalidValue);
    }
    let pid = stack.sched.spawn(Box::new(link))?;
    stack.netreg.register(NetType::Link, ifindex as DemuxKey, pid)?;
    Ok(pid)
}
