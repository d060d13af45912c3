//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 数据包缓冲区
//!
//! 所有协议层共享的数据包内存池。一个数据包由若干片段 (snip) 组成单链表，
//! 链表从最外层（最后添加的）头部指向最内层的负载。
//!
//! ```text
//!  片段表 (固定槽位, 句柄带代数)               字节池 (首次适配)
//!  +--------+--------+-----+                 +-----------+------+-----------+
//!  | slot 0 | slot 1 | ... | --chunk/偏移--> |  chunk A  | hole |  chunk B  |
//!  +--------+--------+-----+                 +-----------+------+-----------+
//! ```
//!
//! # 所有权
//! - `hold` / `release` 作用于整条链上的每个片段
//! - 引用计数大于 1 的片段只读，修改前必须 `start_write`
//! - `mark` 拆分头部时不复制数据，多个片段共享同一个 chunk，
//!   最后一个引用释放后 chunk 才归还给字节池
//! - 所有操作只在很短的临界区内持有自旋锁

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

use linked_list_allocator::Heap;
use log::warn;
use spin::Mutex;

use crate::net::error::{NetError, NetResult};
use crate::net::nettype::NetType;

/// 字节池的最小容量
pub const PKTBUF_MIN_SIZE: usize = 64;

const WORD: usize = core::mem::size_of::<usize>();

/// 片段句柄
///
/// 槽位被回收后代数加一，旧句柄随即失效
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnipId {
    index: u16,
    gen: u16,
}

impl SnipId {
    /// 槽位索引
    pub fn index(&self) -> u16 {
        self.index
    }
}

impl fmt::Display for SnipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snip#{}.{}", self.index, self.gen)
    }
}

/// 片段的只读视图
#[derive(Debug, Clone, Copy)]
pub struct SnipView<'a> {
    pub id: SnipId,
    pub nettype: NetType,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
struct Chunk {
    offset: usize,
    layout: Layout,
    refs: u16,
}

#[derive(Debug, Clone, Copy)]
struct Snip {
    chunk: Option<u16>,
    offset: usize,
    size: usize,
    nettype: NetType,
    next: Option<SnipId>,
    users: u32,
}

struct Slot {
    gen: u16,
    snip: Option<Snip>,
}

struct Pool {
    heap: Heap,
    base: NonNull<u8>,
    capacity: usize,
    slots: Vec<Slot>,
    free_slots: Vec<u16>,
    chunks: Vec<Option<Chunk>>,
    free_chunks: Vec<u16>,
}

// SAFETY: 字节池区域由 Pool 独占，只通过 PktBuf 的锁访问
unsafe impl Send for Pool {}

impl Pool {
    fn new(capacity: usize, max_snips: usize) -> Self {
        // 按机器字分配，保证空闲链表节点对齐
        let words = capacity.max(PKTBUF_MIN_SIZE).div_ceil(WORD);
        let capacity = words * WORD;
        let max_snips = max_snips.clamp(1, u16::MAX as usize);

        let region: Box<[usize]> = alloc::vec![0usize; words].into_boxed_slice();
        let raw = Box::into_raw(region) as *mut u8;
        // SAFETY: Box::into_raw 不会返回空指针
        let base = unsafe { NonNull::new_unchecked(raw) };

        let mut heap = Heap::empty();
        // SAFETY: [base, base + capacity) 在 Drop 之前一直有效且只交给 heap 管理
        unsafe { heap.init(base.as_ptr(), capacity) };

        Self {
            heap,
            base,
            capacity,
            slots: (0..max_snips).map(|_| Slot { gen: 0, snip: None }).collect(),
            free_slots: (0..max_snips as u16).rev().collect(),
            chunks: alloc::vec![None; max_snips],
            free_chunks: (0..max_snips as u16).rev().collect(),
        }
    }

    fn snip(&self, id: SnipId) -> NetResult<&Snip> {
        let slot = self.slots.get(id.index as usize).ok_or(NetError::InvalidSnip)?;
        if slot.gen != id.gen {
            return Err(NetError::InvalidSnip);
        }
        slot.snip.as_ref().ok_or(NetError::InvalidSnip)
    }

    fn snip_mut(&mut self, id: SnipId) -> NetResult<&mut Snip> {
        let slot = self.slots.get_mut(id.index as usize).ok_or(NetError::InvalidSnip)?;
        if slot.gen != id.gen {
            return Err(NetError::InvalidSnip);
        }
        slot.snip.as_mut().ok_or(NetError::InvalidSnip)
    }

    fn bytes(&self, snip: &Snip) -> &[u8] {
        if snip.size == 0 {
            return &[];
        }
        // SAFETY: [offset, offset + size) 位于一个仍被引用的 chunk 内
        unsafe { core::slice::from_raw_parts(self.base.as_ptr().add(snip.offset), snip.size) }
    }

    fn bytes_mut(&mut self, snip: Snip) -> &mut [u8] {
        if snip.size == 0 {
            return &mut [];
        }
        // SAFETY: 同上，且不同片段的区间互不重叠
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr().add(snip.offset), snip.size) }
    }

    /// 分配一个 chunk，返回 (chunk 索引, 区域内偏移)
    fn alloc_chunk(&mut self, size: usize) -> NetResult<Option<(u16, usize)>> {
        if size == 0 {
            return Ok(None);
        }
        let index = *self.free_chunks.last().ok_or(NetError::OutOfMemory)?;
        let layout = Layout::from_size_align(size, 1).map_err(|_| NetError::OutOfMemory)?;
        let ptr = self
            .heap
            .allocate_first_fit(layout)
            .map_err(|_| NetError::OutOfMemory)?;
        self.free_chunks.pop();

        let offset = ptr.as_ptr() as usize - self.base.as_ptr() as usize;
        self.chunks[index as usize] = Some(Chunk { offset, layout, refs: 1 });
        Ok(Some((index, offset)))
    }

    fn get_chunk(&mut self, index: u16) {
        if let Some(chunk) = self.chunks.get_mut(index as usize).and_then(Option::as_mut) {
            chunk.refs += 1;
        }
    }

    fn put_chunk(&mut self, index: u16) {
        let Some(chunk) = self.chunks.get_mut(index as usize).and_then(Option::as_mut) else {
            return;
        };
        chunk.refs -= 1;
        if chunk.refs > 0 {
            return;
        }
        let chunk = *chunk;
        self.chunks[index as usize] = None;
        // SAFETY: offset 和 layout 都来自 allocate_first_fit
        unsafe {
            let ptr = NonNull::new_unchecked(self.base.as_ptr().add(chunk.offset));
            self.heap.deallocate(ptr, chunk.layout);
        }
        self.free_chunks.push(index);
    }

    fn new_snip(&mut self, snip: Snip) -> NetResult<SnipId> {
        let index = self.free_slots.pop().ok_or(NetError::OutOfMemory)?;
        let slot = &mut self.slots[index as usize];
        slot.snip = Some(snip);
        Ok(SnipId { index, gen: slot.gen })
    }

    fn free_snip(&mut self, id: SnipId) {
        let slot = &mut self.slots[id.index as usize];
        let Some(snip) = slot.snip.take() else {
            return;
        };
        slot.gen = slot.gen.wrapping_add(1);
        self.free_slots.push(id.index);
        if let Some(chunk) = snip.chunk {
            self.put_chunk(chunk);
        }
    }

    fn create(
        &mut self,
        next: Option<SnipId>,
        data: Option<&[u8]>,
        size: usize,
        nettype: NetType,
    ) -> NetResult<SnipId> {
        if let Some(next) = next {
            self.snip(next)?;
        }
        // 先确认有空闲槽位，失败时字节池不受影响
        if self.free_slots.is_empty() {
            return Err(NetError::OutOfMemory);
        }
        let (chunk, offset) = match self.alloc_chunk(size)? {
            Some((chunk, offset)) => (Some(chunk), offset),
            None => (None, 0),
        };
        let snip = Snip { chunk, offset, size, nettype, next, users: 1 };
        let id = self.new_snip(snip)?;

        let buf = self.bytes_mut(snip);
        match data {
            Some(data) => {
                let n = data.len().min(size);
                buf[..n].copy_from_slice(&data[..n]);
                buf[n..].fill(0);
            }
            None => buf.fill(0),
        }
        Ok(id)
    }

    fn hold(&mut self, head: SnipId, num: u32) -> NetResult<()> {
        let mut cur = Some(head);
        while let Some(id) = cur {
            let snip = self.snip_mut(id)?;
            snip.users += num;
            cur = snip.next;
        }
        Ok(())
    }

    fn release(&mut self, head: SnipId) -> NetResult<()> {
        let mut cur = Some(head);
        while let Some(id) = cur {
            let snip = self.snip_mut(id)?;
            snip.users -= 1;
            cur = snip.next;
            if snip.users == 0 {
                self.free_snip(id);
            }
        }
        Ok(())
    }

    fn start_write(&mut self, id: SnipId) -> NetResult<SnipId> {
        let snip = *self.snip(id)?;
        if snip.users == 1 {
            return Ok(id);
        }
        if self.free_slots.is_empty() {
            return Err(NetError::OutOfMemory);
        }
        let (chunk, offset) = match self.alloc_chunk(snip.size)? {
            Some((chunk, offset)) => (Some(chunk), offset),
            None => (None, 0),
        };
        if snip.size > 0 {
            // SAFETY: 新 chunk 与原片段区间不重叠
            unsafe {
                core::ptr::copy_nonoverlapping(
                    self.base.as_ptr().add(snip.offset),
                    self.base.as_ptr().add(offset),
                    snip.size,
                );
            }
        }
        // 副本沿用原来的 next，尾部的引用计数不变
        let copy = self.new_snip(Snip { chunk, offset, users: 1, ..snip })?;
        self.snip_mut(id)?.users -= 1;
        Ok(copy)
    }

    fn contains(&self, head: SnipId, target: SnipId) -> NetResult<bool> {
        let mut cur = Some(head);
        while let Some(id) = cur {
            if id == target {
                return Ok(true);
            }
            cur = self.snip(id)?.next;
        }
        Ok(false)
    }

    /// 失败时释放调用者持有的整条链
    fn write_path(&mut self, head: SnipId, target: SnipId) -> NetResult<(SnipId, SnipId)> {
        match self.contains(head, target) {
            Ok(true) => {}
            Ok(false) => return Err(self.release_err(head, NetError::InvalidSnip)),
            Err(err) => return Err(self.release_err(head, err)),
        }
        let new_head = self.start_write(head).map_err(|err| self.release_err(head, err))?;
        if head == target {
            return Ok((new_head, new_head));
        }
        let mut prev = new_head;
        loop {
            let cur = match self.snip(prev).map(|s| s.next) {
                Ok(Some(cur)) => cur,
                Ok(None) => return Err(self.release_err(new_head, NetError::InvalidSnip)),
                Err(err) => return Err(self.release_err(new_head, err)),
            };
            let copy = self.start_write(cur).map_err(|err| self.release_err(new_head, err))?;
            if copy != cur {
                // prev 是独占的，直接改写 next
                if let Ok(snip) = self.snip_mut(prev) {
                    snip.next = Some(copy);
                }
            }
            if cur == target {
                return Ok((new_head, copy));
            }
            prev = copy;
        }
    }

    fn mark(&mut self, id: SnipId, hdr_size: usize, nettype: NetType) -> NetResult<SnipId> {
        let snip = *self.snip(id)?;
        if snip.users > 1 {
            return Err(NetError::SnipShared);
        }
        if hdr_size > snip.size {
            return Err(NetError::MalformedHeader);
        }
        let payload = self.new_snip(Snip {
            chunk: snip.chunk,
            offset: snip.offset + hdr_size,
            size: snip.size - hdr_size,
            nettype: NetType::Undef,
            next: snip.next,
            users: 1,
        })?;
        if let Some(chunk) = snip.chunk {
            self.get_chunk(chunk);
        }
        let hdr = self.snip_mut(id)?;
        hdr.size = hdr_size;
        hdr.nettype = nettype;
        hdr.next = Some(payload);
        Ok(payload)
    }

    fn realloc(&mut self, id: SnipId, size: usize) -> NetResult<SnipId> {
        let snip = *self.snip(id)?;
        if snip.users == 1 && size <= snip.size {
            self.snip_mut(id)?.size = size;
            return Ok(id);
        }
        if snip.users > 1 && self.free_slots.is_empty() {
            return Err(NetError::OutOfMemory);
        }
        let (chunk, offset) = match self.alloc_chunk(size)? {
            Some((chunk, offset)) => (Some(chunk), offset),
            None => (None, 0),
        };
        let keep = snip.size.min(size);
        if keep > 0 {
            // SAFETY: 新 chunk 与原片段区间不重叠
            unsafe {
                core::ptr::copy_nonoverlapping(
                    self.base.as_ptr().add(snip.offset),
                    self.base.as_ptr().add(offset),
                    keep,
                );
            }
        }
        let grown = Snip { chunk, offset, size, users: 1, ..snip };
        self.bytes_mut(grown)[keep..].fill(0);

        if snip.users == 1 {
            if let Some(old) = snip.chunk {
                self.put_chunk(old);
            }
            *self.snip_mut(id)? = grown;
            Ok(id)
        } else {
            let copy = self.new_snip(grown)?;
            self.snip_mut(id)?.users -= 1;
            Ok(copy)
        }
    }

    fn release_err(&mut self, head: SnipId, err: NetError) -> NetError {
        if let Err(e) = self.release(head) {
            warn!("pktbuf: release of {} failed: {}", head, e);
        }
        err
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // SAFETY: 与 new() 中的 Box::into_raw 对应
        unsafe {
            let region = core::ptr::slice_from_raw_parts_mut(
                self.base.as_ptr() as *mut usize,
                self.capacity / WORD,
            );
            drop(Box::from_raw(region));
        }
    }
}

/// 数据包缓冲区
///
/// 中断上下文和任务上下文都可以调用
pub struct PktBuf {
    pool: Mutex<Pool>,
}

impl PktBuf {
    /// 创建数据包缓冲区
    ///
    /// # 参数
    /// - `capacity`: 字节池大小，小于 `PKTBUF_MIN_SIZE` 时按最小值处理
    /// - `max_snips`: 片段表槽位数
    pub fn new(capacity: usize, max_snips: usize) -> Self {
        Self {
            pool: Mutex::new(Pool::new(capacity, max_snips)),
        }
    }

    /// 分配一个新的片段
    ///
    /// 内容初始化为 0，引用计数为 1
    pub fn alloc(&self, size: usize, nettype: NetType) -> NetResult<SnipId> {
        self.pool.lock().create(None, None, size, nettype)
    }

    /// 在 `next` 前面添加一个新片段
    ///
    /// # 参数
    /// - `next`: 新片段之后的链表，可以为空
    /// - `data`: 初始内容，为 `None` 时填 0
    /// - `size`: 片段大小
    /// - `nettype`: 类型标签
    ///
    /// # 说明
    /// 失败时不改变字节池和 `next` 的状态
    pub fn add(
        &self,
        next: Option<SnipId>,
        data: Option<&[u8]>,
        size: usize,
        nettype: NetType,
    ) -> NetResult<SnipId> {
        self.pool.lock().create(next, data, size, nettype)
    }

    /// 给链上每个片段的引用计数加 `num`
    pub fn hold(&self, head: SnipId, num: u32) -> NetResult<()> {
        self.pool.lock().hold(head, num)
    }

    /// 给链上每个片段的引用计数减 1，降到 0 的片段立即回收
    pub fn release(&self, head: SnipId) -> NetResult<()> {
        self.pool.lock().release(head)
    }

    /// 丢弃数据包，释放失败只记录日志
    pub fn discard(&self, head: SnipId) {
        if let Err(err) = self.release(head) {
            warn!("pktbuf: release of {} failed: {}", head, err);
        }
    }

    /// 释放数据包并原样返回错误，便于在 `map_err` 中使用
    pub fn release_err(&self, head: SnipId, err: NetError) -> NetError {
        self.pool.lock().release_err(head, err)
    }

    /// 取得片段的独占写权限
    ///
    /// # 返回
    /// 引用计数为 1 时返回原句柄；否则返回一份拷贝，原片段引用计数减 1
    ///
    /// # 说明
    /// 拷贝与原片段共享 next，失败时什么都不改变
    pub fn start_write(&self, id: SnipId) -> NetResult<SnipId> {
        self.pool.lock().start_write(id)
    }

    /// 让从 `head` 到 `target` 的路径全部可写
    ///
    /// # 返回
    /// (新的链头, target 的可写句柄)
    ///
    /// # 说明
    /// 路径上被复制的片段会重新链接到前驱。失败时调用者持有的整条链已被释放
    pub fn write_path(&self, head: SnipId, target: SnipId) -> NetResult<(SnipId, SnipId)> {
        self.pool.lock().write_path(head, target)
    }

    /// 把片段前 `hdr_size` 字节标记为 `nettype` 类型的头部
    ///
    /// # 返回
    /// 剩余部分组成的新片段（类型为 `Undef`），紧跟在头部之后
    ///
    /// # 说明
    /// 不复制数据；片段必须是独占的
    pub fn mark(&self, id: SnipId, hdr_size: usize, nettype: NetType) -> NetResult<SnipId> {
        self.pool.lock().mark(id, hdr_size, nettype)
    }

    /// 调整片段大小
    ///
    /// 独占片段缩小时原地截断；扩大或片段被共享时重新分配并复制，
    /// 多出来的部分填 0
    pub fn realloc(&self, id: SnipId, size: usize) -> NetResult<SnipId> {
        self.pool.lock().realloc(id, size)
    }

    /// 以只读方式访问片段内容
    pub fn read<R>(&self, id: SnipId, f: impl FnOnce(&[u8]) -> R) -> NetResult<R> {
        let pool = self.pool.lock();
        let snip = pool.snip(id)?;
        Ok(f(pool.bytes(snip)))
    }

    /// 修改独占片段的内容
    pub fn write<R>(&self, id: SnipId, f: impl FnOnce(&mut [u8]) -> R) -> NetResult<R> {
        let mut pool = self.pool.lock();
        let snip = *pool.snip(id)?;
        if snip.users > 1 {
            return Err(NetError::SnipShared);
        }
        Ok(f(pool.bytes_mut(snip)))
    }

    /// 以只读方式访问整条链
    pub fn with_chain<R>(&self, head: SnipId, f: impl FnOnce(&[SnipView<'_>]) -> R) -> NetResult<R> {
        let pool = self.pool.lock();
        let mut views = Vec::new();
        let mut cur = Some(head);
        while let Some(id) = cur {
            if views.len() >= pool.slots.len() {
                return Err(NetError::InvalidSnip);
            }
            let snip = pool.snip(id)?;
            views.push(SnipView {
                id,
                nettype: snip.nettype,
                data: pool.bytes(snip),
            });
            cur = snip.next;
        }
        Ok(f(&views))
    }

    /// 把整条链的内容拼接成连续的字节
    pub fn flatten(&self, head: SnipId) -> NetResult<Vec<u8>> {
        self.with_chain(head, |views| {
            let mut out = Vec::with_capacity(views.iter().map(|v| v.data.len()).sum());
            for view in views {
                out.extend_from_slice(view.data);
            }
            out
        })
    }

    /// 片段大小
    pub fn size(&self, id: SnipId) -> NetResult<usize> {
        Ok(self.pool.lock().snip(id)?.size)
    }

    /// 片段类型
    pub fn nettype(&self, id: SnipId) -> NetResult<NetType> {
        Ok(self.pool.lock().snip(id)?.nettype)
    }

    /// 设置独占片段的类型
    pub fn set_nettype(&self, id: SnipId, nettype: NetType) -> NetResult<()> {
        let mut pool = self.pool.lock();
        let snip = pool.snip_mut(id)?;
        if snip.users > 1 {
            return Err(NetError::SnipShared);
        }
        snip.nettype = nettype;
        Ok(())
    }

    /// 下一个片段
    pub fn next(&self, id: SnipId) -> NetResult<Option<SnipId>> {
        Ok(self.pool.lock().snip(id)?.next)
    }

    /// 修改独占片段的 next
    ///
    /// 原来的 next 不做任何处理，调用者对它的引用随链接一起转移
    pub fn set_next(&self, id: SnipId, next: Option<SnipId>) -> NetResult<()> {
        let mut pool = self.pool.lock();
        if let Some(next) = next {
            pool.snip(next)?;
        }
        let snip = pool.snip_mut(id)?;
        if snip.users > 1 {
            return Err(NetError::SnipShared);
        }
        snip.next = next;
        Ok(())
    }

    /// 片段的引用计数
    pub fn users(&self, id: SnipId) -> NetResult<u32> {
        Ok(self.pool.lock().snip(id)?.users)
    }

    /// 句柄是否仍然有效
    pub fn is_valid(&self, id: SnipId) -> bool {
        self.pool.lock().snip(id).is_ok()
    }

    /// 链上片段个数
    pub fn chain_len(&self, head: SnipId) -> NetResult<usize> {
        self.with_chain(head, |views| views.len())
    }

    /// 链上所有片段大小之和
    pub fn chain_size(&self, head: SnipId) -> NetResult<usize> {
        self.with_chain(head, |views| views.iter().map(|v| v.data.len()).sum())
    }

    /// 在链上查找第一个指定类型的片段
    pub fn search_type(&self, head: SnipId, nettype: NetType) -> NetResult<Option<SnipId>> {
        self.with_chain(head, |views| {
            views.iter().find(|v| v.nettype == nettype).map(|v| v.id)
        })
    }

    /// 字节池剩余字节数
    pub fn free_bytes(&self) -> usize {
        self.pool.lock().heap.free()
    }

    /// 字节池已用字节数
    pub fn used_bytes(&self) -> usize {
        self.pool.lock().heap.used()
    }

    /// 字节池可分配的总字节数
    pub fn capacity(&self) -> usize {
        self.pool.lock().heap.size()
    }

    /// 当前存活的片段数
    pub fn live_snips(&self) -> usize {
        let pool = self.pool.lock();
        pool.slots.len() - pool.free_slots.len()
    }

    /// 字节池和片段表是否都已清空
    pub fn is_empty(&self) -> bool {
        let pool = self.pool.lock();
        pool.free_slots.len() == pool.slots.len() && pool.heap.used() == 0
    }
}
