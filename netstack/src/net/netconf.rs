//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 协议层和设备的可配置选项
//!
//! 选项值按 `OptBuf` 传递，多字节整数使用网络字节序

/// 选项
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetOpt {
    /// 信道 (u16)
    Channel = 0,
    /// 信道是否空闲 (u8, `Enable`)
    IsChannelClear = 1,
    /// 短地址或本层地址
    Address = 2,
    /// 长地址
    AddressLong = 3,
    /// 地址长度 (u16)
    AddrLen = 4,
    /// 网络标识 (u16)
    Nid = 5,
    /// 发送功率 (i16)
    TxPower = 6,
    /// 最大包长 (u16)
    MaxPacketSize = 7,
    /// 预装载发送 (u8, `Enable`)
    Preloading = 8,
    /// 混杂模式 (u8, `Enable`)
    Promiscuous = 9,
    /// 自动应答 (u8, `Enable`)
    AutoAck = 10,
    /// 上层协议 (u8, `NetType`)
    Proto = 11,
    /// 设备状态 (u8, `NetState`)
    State = 12,
}

impl NetOpt {
    /// 选项名称
    pub fn name(self) -> &'static str {
        match self {
            NetOpt::Channel => "channel",
            NetOpt::IsChannelClear => "is_channel_clear",
            NetOpt::Address => "address",
            NetOpt::AddressLong => "address_long",
            NetOpt::AddrLen => "addr_len",
            NetOpt::Nid => "nid",
            NetOpt::TxPower => "tx_power",
            NetOpt::MaxPacketSize => "max_packet_size",
            NetOpt::Preloading => "preloading",
            NetOpt::Promiscuous => "promiscuous",
            NetOpt::AutoAck => "autoack",
            NetOpt::Proto => "proto",
            NetOpt::State => "state",
        }
    }
}

/// 设备状态
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetState {
    /// 关闭
    Off = 0,
    /// 休眠
    Sleep = 1,
    /// 空闲，可以收发
    Idle = 2,
    /// 正在接收
    Rx = 3,
    /// 正在发送
    Tx = 4,
    /// 复位
    Reset = 5,
}

impl NetState {
    /// 从 u8 转换
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NetState::Off),
            1 => Some(NetState::Sleep),
            2 => Some(NetState::Idle),
            3 => Some(NetState::Rx),
            4 => Some(NetState::Tx),
            5 => Some(NetState::Reset),
            _ => None,
        }
    }

    /// 是否可以收发数据
    pub fn is_up(self) -> bool {
        !matches!(self, NetState::Off | NetState::Sleep)
    }
}

/// 开关类选项的取值
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enable {
    Disable = 0,
    Enable = 1,
}

impl Enable {
    /// 从 u8 转换
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Enable::Disable),
            1 => Some(Enable::Enable),
            _ => None,
        }
    }
}

impl From<bool> for Enable {
    fn from(value: bool) -> Self {
        if value {
            Enable::Enable
        } else {
            Enable::Disable
        }
    }
}

impl From<Enable> for bool {
    fn from(value: Enable) -> Self {
        value == Enable::Enable
    }
}
