//! Rux 网络协议栈构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Netstack.toml 配置文件
//! 2. 生成 src/config.rs

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// 读取整数配置项，缺失时使用默认值
fn int_value(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

/// 读取字符串配置项，缺失时使用默认值
fn str_value<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Netstack.toml");
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()));
    let config_path = manifest_dir.join("..").join("Netstack.toml");

    // 配置文件缺失或解析失败时回退到内置默认值
    let config = match fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str::<toml::Value>(&content) {
            Ok(value) => value,
            Err(err) => {
                println!("cargo:warning=Netstack.toml parse error: {}, using defaults", err);
                toml::Value::Table(toml::map::Map::new())
            }
        },
        Err(_) => {
            println!("cargo:warning=Netstack.toml not found, using defaults");
            toml::Value::Table(toml::map::Map::new())
        }
    };

    generate_config_code(&config, &manifest_dir);
}

fn generate_config_code(config: &toml::Value, manifest_dir: &Path) {
    let config_code = format!(
        r#"//! Rux 网络协议栈配置（自动生成）
//!
//! 此文件由 build.rs 根据 Netstack.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 协议栈名称
pub const STACK_NAME: &str = "{}";

/// 协议栈版本
pub const STACK_VERSION: &str = "{}";

// ============================================================
// 数据包缓冲区配置
// ============================================================

/// 字节池大小（字节）
pub const PKTBUF_SIZE: usize = {};

/// 最大片段数
pub const PKTBUF_MAX_SNIPS: usize = {};

// ============================================================
// 注册表配置
// ============================================================

/// 注册表最大条目数
pub const NETREG_SIZE: usize = {};

// ============================================================
// 调度器配置
// ============================================================

/// 最大协议任务数
pub const SCHED_MAX_TASKS: usize = {};

/// 每个任务的消息队列长度
pub const SCHED_MAILBOX_SIZE: usize = {};

// ============================================================
// netapi 配置
// ============================================================

/// 选项值缓冲区大小（字节）
pub const NETAPI_OPT_BUF_SIZE: usize = {};

// ============================================================
// IPv6 配置
// ============================================================

/// 转发表大小
pub const IPV6_FIB_SIZE: usize = {};

/// 邻居缓存大小
pub const IPV6_NC_SIZE: usize = {};

/// 默认跳数限制
pub const IPV6_DEFAULT_HOP_LIMIT: u8 = {};

/// 链路 MTU
pub const IPV6_MTU: u16 = {};
"#,
        str_value(config, "general", "name", "rux-net"),
        str_value(config, "general", "version", "0.1.0"),
        int_value(config, "pktbuf", "size", 6144),
        int_value(config, "pktbuf", "max_snips", 64),
        int_value(config, "netreg", "size", 16),
        int_value(config, "scheduler", "max_tasks", 8),
        int_value(config, "scheduler", "mailbox_size", 16),
        int_value(config, "netapi", "option_buf_size", 16),
        int_value(config, "ipv6", "fib_size", 8),
        int_value(config, "ipv6", "nc_size", 8),
        int_value(config, "ipv6", "default_hop_limit", 64) as u8,
        int_value(config, "ipv6", "mtu", 1280) as u16,
    );

    let config_file = manifest_dir.join("src").join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing_content = fs::read_to_string(&config_file).unwrap_or_default();
    if existing_content != config_code {
        if let Err(err) = fs::write(&config_file, &config_code) {
            println!("cargo:warning=failed to write config.rs: {}", err);
        }
    }
}
