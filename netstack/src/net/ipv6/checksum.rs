//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Internet 校验和
//!
//! 遵循 RFC 1071，伪头部格式见 RFC 8200 8.1 节

use super::Ipv6Addr;

/// 把数据按 16 位大端字累加到 `acc`
///
/// # 说明
/// 奇数长度的最后一个字节按高位补齐。分段数据用 `upper_layer_checksum`，
/// 它会把奇数字节和下一段的第一个字节拼成一个字
pub fn sum(mut acc: u32, data: &[u8]) -> u32 {
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        acc = acc.wrapping_add(u16::from_be_bytes([word[0], word[1]]) as u32);
    }
    if let [last] = words.remainder() {
        acc = acc.wrapping_add((*last as u32) << 8);
    }
    acc
}

/// 折叠进位
pub fn fold(mut acc: u32) -> u16 {
    while acc >> 16 != 0 {
        acc = (acc & 0xffff) + (acc >> 16);
    }
    acc as u16
}

/// 计算校验和
///
/// # 返回
/// 数据中已包含正确校验和时返回 0
pub fn ip_checksum(data: &[u8]) -> u16 {
    !fold(sum(0, data))
}

/// IPv6 伪头部的累加和
///
/// # 参数
/// - `src` / `dst`: 源地址和目的地址
/// - `next_header`: 上层协议号
/// - `len`: 上层数据长度（头部 + 负载）
pub fn pseudo_header_sum(src: &Ipv6Addr, dst: &Ipv6Addr, next_header: u8, len: u32) -> u32 {
    let mut acc = sum(0, &src.octets());
    acc = sum(acc, &dst.octets());
    acc = sum(acc, &len.to_be_bytes());
    sum(acc, &[0, 0, 0, next_header])
}

/// 计算上层协议的校验和
///
/// # 参数
/// - `segments`: 上层头部和负载，按顺序排列
///
/// # 返回
/// 校验和字段为 0 时得到应填入的值；字段已填写时正确的数据返回 0
pub fn upper_layer_checksum(
    src: &Ipv6Addr,
    dst: &Ipv6Addr,
    next_header: u8,
    segments: &[&[u8]],
) -> u16 {
    let len: usize = segments.iter().map(|s| s.len()).sum();
    let mut acc = pseudo_header_sum(src, dst, next_header, len as u32);
    // 上一段剩下的奇数字节，作为下一个字的高位
    let mut odd: Option<u8> = None;
    for segment in segments {
        let mut data = *segment;
        if let Some(hi) = odd {
            let Some((lo, rest)) = data.split_first() else {
                continue;
            };
            acc = acc.wrapping_add(u16::from_be_bytes([hi, *lo]) as u32);
            odd = None;
            data = rest;
        }
        let even = data.len() & !1;
        acc = sum(acc, &data[..even]);
        if even < data.len() {
            odd = Some(data[even]);
        }
    }
    if let Some(hi) = odd {
        acc = acc.wrapping_add((hi as u32) << 8);
    }
    !fold(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_checksum() {
        let mut data = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(ip_checksum(&data), 0xb861);
        data[10] = 0xb8;
        data[11] = 0x61;
        assert_eq!(ip_checksum(&data), 0);
    }

    #[test]
    fn test_odd_length() {
        assert_eq!(sum(0, &[0x01]), 0x0100);
        assert_eq!(sum(0, &[0x12, 0x34, 0x56]), 0x1234 + 0x5600);
    }

    #[test]
    fn test_segments_match_contiguous() {
        let src = Ipv6Addr::new([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let dst = Ipv6Addr::new([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
        let hdr = [0x30, 0x39, 0x00, 0x35, 0x00, 0x0d, 0x00, 0x00];
        let payload = [1, 2, 3, 4, 5];
        let mut whole = hdr.to_vec();
        whole.extend_from_slice(&payload);

        let split = upper_layer_checksum(&src, &dst, 17, &[&hdr, &payload]);
        assert_eq!(split, upper_layer_checksum(&src, &dst, 17, &[&whole]));

        whole[6..8].copy_from_slice(&split.to_be_bytes());
        assert_eq!(upper_layer_checksum(&src, &dst, 17, &[&whole]), 0);
    }

    #[test]
    fn test_odd_segment_in_middle() {
        let src = Ipv6Addr::new([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let dst = Ipv6Addr::new([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
        let hdr = [0x03, 0xe8, 0x16, 0x33, 0x00, 0x0d, 0x00, 0x00];
        let whole = [0x03, 0xe8, 0x16, 0x33, 0x00, 0x0d, 0x00, 0x00, 1, 2, 3, 4, 5];
        let expected = upper_layer_checksum(&src, &dst, 17, &[&whole]);

        assert_eq!(upper_layer_checksum(&src, &dst, 17, &[&hdr, &[1, 2, 3], &[4, 5]]), expected);
        assert_eq!(upper_layer_checksum(&src, &dst, 17, &[&hdr, &[1], &[2], &[3, 4, 5]]), expected);
        // 空片段不影响奇偶
        assert_eq!(upper_layer_checksum(&src, &dst, 17, &[&hdr, &[1, 2, 3], &[], &[4, 5]]), expected);
        assert_eq!(upper_layer_checksum(&src, &dst, 17, &[&whole[..9], &whole[9..]]), expected);
    }
}
