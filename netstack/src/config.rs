//! Rux 网络协议栈配置（自动生成）
//!
//! 此文件由 build.rs 根据 Netstack.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 协议栈名称
pub const STACK_NAME: &str = "rux-net";

/// 协议栈版本
pub const STACK_VERSION: &str = "0.1.0";

// ============================================================
// 数据包缓冲区配置
// ============================================================

/// 字节池大小（字节）
pub const PKTBUF_SIZE: usize = 6144;

/// 最大片段数
pub const PKTBUF_MAX_SNIPS: usize = 64;

// ============================================================
// 注册表配置
// ============================================================

/// 注册表最大条目数
pub const NETREG_SIZE: usize = 16;

// ============================================================
// 调度器配置
// ============================================================

/// 最大协议任务数
pub const SCHED_MAX_TASKS: usize = 8;

/// 每个任务的消息队列长度
pub const SCHED_MAILBOX_SIZE: usize = 16;

// ============================================================
// netapi 配置
// ============================================================

/// 选项值缓冲区大小（字节）
pub const NETAPI_OPT_BUF_SIZE: usize = 16;

// ============================================================
// IPv6 配置
// ============================================================

/// 转发表大小
pub const IPV6_FIB_SIZE: usize = 8;

/// 邻居缓存大小
pub const IPV6_NC_SIZE: usize = 8;

/// 默认跳数限制
pub const IPV6_DEFAULT_HOP_LIMIT: u8 = 64;

/// 链路 MTU
pub const IPV6_MTU: u16 = 1280;
