//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 通用链路层头部
//!
//! 与具体链路技术无关的头部，链路层任务和上层之间用它传递地址和接收质量：
//!
//! ```text
//! +----------+------+-----+---------+------------------+------------------+
//! | addr_len | rssi | lqi | options | src (addr_len 字节) | dst (addr_len 字节) |
//! +----------+------+-----+---------+------------------+------------------+
//! ```

use core::fmt;

use bitflags::bitflags;

use crate::net::error::{NetError, NetResult};
use crate::net::nettype::NetType;
use crate::net::pktbuf::{PktBuf, SnipId};

/// 固定部分长度
pub const LLHDR_FIXED_LEN: usize = 4;

/// 链路地址最大长度 (EUI-64)
pub const LINK_ADDR_MAX: usize = 8;

bitflags! {
    /// 链路层头部选项
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LlFlags: u8 {
        /// 目的地址是广播地址
        const BROADCAST = 0x01;
        /// 目的地址是组播地址
        const MULTICAST = 0x02;
    }
}

/// 链路地址
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkAddr {
    bytes: [u8; LINK_ADDR_MAX],
    len: u8,
}

impl LinkAddr {
    /// 从字节构造，超过 `LINK_ADDR_MAX` 返回 `InvalidValue`
    pub fn new(addr: &[u8]) -> NetResult<Self> {
        if addr.len() > LINK_ADDR_MAX {
            return Err(NetError::InvalidValue);
        }
        let mut bytes = [0; LINK_ADDR_MAX];
        bytes[..addr.len()].copy_from_slice(addr);
        Ok(Self {
            bytes,
            len: addr.len() as u8,
        })
    }

    /// 16 位短地址 (IEEE 802.15.4)
    pub const fn short(addr: u16) -> Self {
        let be = addr.to_be_bytes();
        Self {
            bytes: [be[0], be[1], 0, 0, 0, 0, 0, 0],
            len: 2,
        }
    }

    /// 指定长度的广播地址
    pub fn broadcast(len: usize) -> Self {
        let len = len.min(LINK_ADDR_MAX);
        let mut bytes = [0; LINK_ADDR_MAX];
        bytes[..len].fill(0xff);
        Self {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_broadcast(&self) -> bool {
        !self.is_empty() && self.as_slice().iter().all(|b| *b == 0xff)
    }
}

impl fmt::Debug for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.as_slice().iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// 链路层头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlHdr {
    pub rssi: u8,
    pub lqi: u8,
    pub flags: LlFlags,
    pub src: LinkAddr,
    pub dst: LinkAddr,
}

impl LlHdr {
    /// 创建头部，源地址和目的地址长度必须相同
    pub fn new(src: LinkAddr, dst: LinkAddr, flags: LlFlags) -> NetResult<Self> {
        if src.len() != dst.len() {
            return Err(NetError::InvalidValue);
        }
        Ok(Self {
            rssi: 0,
            lqi: 0,
            flags,
            src,
            dst,
        })
    }

    /// 头部总长度
    pub fn size(&self) -> usize {
        LLHDR_FIXED_LEN + 2 * self.src.len()
    }

    /// 解析头部
    pub fn parse(data: &[u8]) -> NetResult<Self> {
        if data.len() < LLHDR_FIXED_LEN {
            return Err(NetError::MalformedHeader);
        }
        let addr_len = data[0] as usize;
        if addr_len > LINK_ADDR_MAX || data.len() < LLHDR_FIXED_LEN + 2 * addr_len {
            return Err(NetError::MalformedHeader);
        }
        let src_start = LLHDR_FIXED_LEN;
        let dst_start = src_start + addr_len;
        Ok(Self {
            rssi: data[1],
            lqi: data[2],
            flags: LlFlags::from_bits_truncate(data[3]),
            src: LinkAddr::new(&data[src_start..dst_start])?,
            dst: LinkAddr::new(&data[dst_start..dst_start + addr_len])?,
        })
    }

    /// 写入头部
    pub fn write(&self, buf: &mut [u8]) -> NetResult<usize> {
        let size = self.size();
        if buf.len() < size {
            return Err(NetError::InvalidValue);
        }
        let addr_len = self.src.len();
        buf[0] = addr_len as u8;
        buf[1] = self.rssi;
        buf[2] = self.lqi;
        buf[3] = self.flags.bits();
        buf[LLHDR_FIXED_LEN..LLHDR_FIXED_LEN + addr_len].copy_from_slice(self.src.as_slice());
        buf[LLHDR_FIXED_LEN + addr_len..size].copy_from_slice(self.dst.as_slice());
        Ok(size)
    }
}

/// 在 `next` 前面添加一个链路层头部片段
///
/// # 返回
/// 类型为 `Link` 的新片段
pub fn build(pktbuf: &PktBuf, next: Option<SnipId>, hdr: &LlHdr) -> NetResult<SnipId> {
    let mut bytes = [0u8; LLHDR_FIXED_LEN + 2 * LINK_ADDR_MAX];
    let size = hdr.write(&mut bytes)?;
    pktbuf.add(next, Some(&bytes[..size]), size, NetType::Link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_parse() {
        let src = LinkAddr::new(&[1, 2]).unwrap();
        let dst = LinkAddr::new(&[3, 4]).unwrap();
        let mut hdr = LlHdr::new(src, dst, LlFlags::MULTICAST).unwrap();
        hdr.rssi = 0x40;
        let mut buf = [0u8; 8];
        assert_eq!(hdr.write(&mut buf), Ok(8));
        assert_eq!(buf, [2, 0x40, 0, 0x02, 1, 2, 3, 4]);
        assert_eq!(LlHdr::parse(&buf), Ok(hdr));
    }

    #[test]
    fn test_parse_truncated() {
        assert_eq!(LlHdr::parse(&[8, 0, 0, 0, 1, 2]), Err(NetError::MalformedHeader));
        assert_eq!(LlHdr::parse(&[9; 40]), Err(NetError::MalformedHeader));
    }

    #[test]
    fn test_mismatched_addr_len() {
        let src = LinkAddr::new(&[1, 2]).unwrap();
        let dst = LinkAddr::new(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(LlHdr::new(src, dst, LlFlags::empty()), Err(NetError::InvalidValue));
    }

    #[test]
    fn test_broadcast() {
        let bcast = LinkAddr::broadcast(2);
        assert!(bcast.is_broadcast());
        assert_eq!(bcast.as_slice(), &[0xff, 0xff]);
        assert!(!LinkAddr::default().is_broadcast());
        assert_eq!(alloc::format!("{}", LinkAddr::new(&[0xab, 1]).unwrap()), "ab:01");
    }

    #[test]
    fn test_build_snip() {
        let pktbuf = PktBuf::new(512, 8);
        let payload = pktbuf.alloc(3, NetType::Undef).unwrap();
        let hdr = LlHdr::new(LinkAddr::broadcast(2), LinkAddr::broadcast(2), LlFlags::BROADCAST).unwrap();
        let ll = build(&pktbuf, Some(payload), &hdr).unwrap();
        assert_eq!(pktbuf.nettype(ll).unwrap(), NetType::Link);
        assert_eq!(pktbuf.size(ll).unwrap(), 8);
        assert_eq!(pktbuf.read(ll, LlHdr::parse).unwrap(), Ok(hdr));
        pktbuf.release(ll).unwrap();
        assert!(pktbuf.is_empty());
    }
}
