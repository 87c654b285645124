//! 短操作缓存管理器实现
//!
//! 对应 yaffs 的 `yaffs_cache.c`：固定槽数组上的查找、抓取（grab）、
//! LRU 标记、写回和失效。
//!
//! # 一致性规则
//!
//! - 同一 (对象, chunk) 在任意时刻至多占一个槽
//! - 脏槽是该 chunk 数据的唯一有效副本：写回成功才清脏标志，
//!   写回失败时槽保持脏，之后的 flush 可以重试
//! - 锁定的槽不参与淘汰，也不会被 flush 复用
//! - 数据被丢弃只发生在显式失效（删除/截断/整块覆盖）时，
//!   那时数据在语义上已经不存在

use crate::chunk::ChunkWriter;
use crate::consts::{CACHE_USE_RESET_THRESHOLD, MAX_SHORT_OP_CACHES};
use crate::error::Result;
use crate::types::ObjectId;

use super::slot::{CacheSlot, SlotId};
use alloc::vec::Vec;

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 查找命中次数
    pub hits: u64,
    /// 脏 chunk 写回次数
    pub writebacks: u64,
    /// 当前脏槽数量
    pub dirty_chunks: usize,
    /// 当前占用槽数量
    pub used: usize,
    /// 槽总数
    pub capacity: usize,
}

/// 短操作缓存管理器
///
/// 对应 yaffs 的 `struct yaffs_cache_manager`，每个设备实例拥有一个。
/// `use_counter` / `hits` 都是设备级状态，随管理器构造和销毁，
/// 不存在跨设备的隐藏耦合。
///
/// # 槽句柄
///
/// 查找和分配返回 [`SlotId`]（槽数组下标）。句柄只在下一次
/// 失效/淘汰前有效，调用方不得跨越这些操作保留对槽缓冲区的引用；
/// 单次读写调用内通过 [`slot`](Self::slot) / [`slot_mut`](Self::slot_mut)
/// 短暂借用缓冲区。
///
/// # 生命周期
///
/// 管理器随设备挂载创建（[`new`](Self::new)）、随卸载销毁（`Drop`）。
/// 槽缓冲区由管理器独占拥有，释放只会随所有权发生一次，
/// 不存在 C 里 deinit 被调两次的问题。
pub struct ChunkCache {
    /// 固定槽数组，长度即 n_slots，挂载时一次性分配
    slots: Vec<CacheSlot>,

    /// LRU 单调递增计数器
    use_counter: u32,

    /// 查找命中计数（仅诊断用，不参与任何策略决策）
    hits: u64,

    /// 脏 chunk 写回计数
    writebacks: u64,
}

impl ChunkCache {
    /// 创建缓存管理器
    ///
    /// 对应 yaffs 的 `yaffs_cache_init`
    ///
    /// # 参数
    ///
    /// * `capacity` - 槽数量，超过 [`MAX_SHORT_OP_CACHES`] 时钳制；
    ///   0 表示完全禁用缓存（所有操作变成未命中/不可用的空操作）
    /// * `chunk_size` - 每槽缓冲区大小（字节）
    ///
    /// # 错误
    ///
    /// 槽缓冲区分配失败返回 `NoMemory`；构造失败的管理器不可使用，
    /// 对应挂载失败。`capacity > 0` 而 `chunk_size == 0` 返回
    /// `InvalidInput`。
    pub fn new(capacity: usize, chunk_size: usize) -> Result<Self> {
        let capacity = if capacity > MAX_SHORT_OP_CACHES {
            log::warn!(
                "[CACHE] capacity {} clamped to {}",
                capacity,
                MAX_SHORT_OP_CACHES
            );
            MAX_SHORT_OP_CACHES
        } else {
            capacity
        };

        if capacity > 0 && chunk_size == 0 {
            return Err(crate::error::Error::new(
                crate::error::ErrorKind::InvalidInput,
                "chunk_size must be non-zero",
            ));
        }

        let mut slots = Vec::new();
        if capacity > 0 {
            slots
                .try_reserve_exact(capacity)
                .map_err(|e| {
                    crate::error::Error::with_cause(
                        crate::error::ErrorKind::NoMemory,
                        "slot array alloc failed",
                        e,
                    )
                })?;
            for _ in 0..capacity {
                slots.push(CacheSlot::new(chunk_size)?);
            }
        }

        Ok(Self {
            slots,
            use_counter: 0,
            hits: 0,
            writebacks: 0,
        })
    }

    /// 槽总数
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 缓存是否启用（capacity > 0）
    pub fn is_enabled(&self) -> bool {
        !self.slots.is_empty()
    }

    /// 借用槽（只读）
    pub fn slot(&self, id: SlotId) -> &CacheSlot {
        &self.slots[id]
    }

    /// 借用槽（可变）
    pub fn slot_mut(&mut self, id: SlotId) -> &mut CacheSlot {
        &mut self.slots[id]
    }

    /// 查找已缓存的 chunk
    ///
    /// 对应 yaffs 的 `yaffs_find_chunk_cache`
    ///
    /// 对全部槽做线性扫描；命中时递增命中计数（这是 `hits`
    /// 唯一变化的地方）。查找本身不更新 LRU 次序，新旧标记
    /// 只由 [`mark_used`](Self::mark_used) 负责。
    ///
    /// # 返回
    ///
    /// 命中返回槽 ID；缓存禁用或未命中返回 `None`
    pub fn find(&mut self, obj: ObjectId, chunk_id: u32) -> Option<SlotId> {
        let found = self.slots.iter().position(|s| s.matches(obj, chunk_id));
        if let Some(id) = found {
            self.hits += 1;
            log::trace!("[CACHE] find {} chunk={} HIT slot={}", obj, chunk_id, id);
        }
        found
    }

    /// 抓取一个可用槽
    ///
    /// 对应 yaffs 的 `yaffs_grab_chunk_cache`，仅在查找未命中后调用。
    ///
    /// 1. 有空槽：按扫描序返回第一个（first-fit，槽没用完前不淘汰）
    /// 2. 否则在未锁定的槽里选 `last_use` 最小的做牺牲者
    ///    （严格 LRU；并列时取扫描序先遇到的，决策是确定性的）
    /// 3. 全部被锁定：返回 `None`，调用方按"缓存暂不可用"处理，
    ///    回退到不经缓存的 I/O —— 这不是致命错误
    /// 4. 牺牲者是脏槽时先写回（`discard = true` 连带清掉归属），
    ///    腾出空槽返回
    ///
    /// # 错误
    ///
    /// 牺牲者写回失败时向上传播 I/O 错误，槽保持脏不被复用。
    pub fn allocate<W: ChunkWriter>(&mut self, writer: &mut W) -> Result<Option<SlotId>> {
        if self.slots.is_empty() {
            return Ok(None);
        }

        if let Some(id) = self.slots.iter().position(|s| s.is_free()) {
            return Ok(Some(id));
        }

        // 全部占用：选未锁定槽中最久未用的
        let mut victim: Option<SlotId> = None;
        let mut lowest = 0u32;
        for (i, slot) in self.slots.iter().enumerate() {
            if !slot.is_locked() && (victim.is_none() || slot.last_use < lowest) {
                lowest = slot.last_use;
                victim = Some(i);
            }
        }

        let id = match victim {
            Some(id) => id,
            None => {
                log::debug!("[CACHE] allocate: all {} slots locked", self.slots.len());
                return Ok(None);
            }
        };

        log::debug!(
            "[CACHE] allocate: evicting slot={} last_use={} dirty={}",
            id,
            self.slots[id].last_use,
            self.slots[id].is_dirty()
        );
        self.flush_one(id, writer, true)?;
        Ok(Some(id))
    }

    /// 把槽绑定到 (对象, chunk)
    ///
    /// 在 [`allocate`](Self::allocate) 拿到空槽后调用，数据由调用方
    /// 随后装入。同一 (对象, chunk) 绑定前必须先 [`find`](Self::find)，
    /// 保证不会出现重复缓存。
    pub fn bind(&mut self, id: SlotId, obj: ObjectId, chunk_id: u32) {
        debug_assert!(
            !self
                .slots
                .iter()
                .enumerate()
                .any(|(i, s)| i != id && s.matches(obj, chunk_id)),
            "chunk already cached in another slot"
        );
        self.slots[id].assign(obj, chunk_id);
    }

    /// 标记槽刚被使用（LRU 新旧排序）
    ///
    /// 对应 yaffs 的 `yaffs_use_cache`，每次命中或新装入后、
    /// 即将读写槽数据时调用。
    ///
    /// `use_counter` 越过阈值后先做一次重整：按当前相对新旧次序给
    /// 所有槽的 `last_use` 重新编号（空槽归 0），计数器回到小值。
    /// 重整前后槽之间的 LRU 相对顺序完全不变，淘汰决策不受影响。
    ///
    /// # 参数
    ///
    /// * `id` - 槽 ID
    /// * `is_write` - 写访问时槽变脏
    pub fn mark_used(&mut self, id: SlotId, is_write: bool) {
        if self.slots.is_empty() {
            return;
        }

        if self.use_counter > CACHE_USE_RESET_THRESHOLD {
            self.renumber_last_use();
        }

        self.use_counter += 1;
        self.slots[id].last_use = self.use_counter;

        if is_write {
            self.slots[id].mark_dirty();
        }
    }

    /// 按相对新旧次序重排所有槽的 `last_use`
    ///
    /// 稳定排序：并列的槽维持扫描序，空槽归 0。
    fn renumber_last_use(&mut self) {
        let mut order: Vec<SlotId> = (0..self.slots.len()).collect();
        order.sort_by_key(|&i| self.slots[i].last_use);

        self.use_counter = 0;
        for &i in &order {
            if self.slots[i].is_free() {
                self.slots[i].last_use = 0;
            } else {
                self.use_counter += 1;
                self.slots[i].last_use = self.use_counter;
            }
        }
        log::debug!(
            "[CACHE] use_counter renumbered, now {}",
            self.use_counter
        );
    }

    /// 写回单个槽
    ///
    /// 对应 yaffs 的 `yaffs_flush_single_cache`
    ///
    /// 锁定的槽整个跳过。脏槽把 `data[..n_bytes]` 通过 chunk 写入
    /// 协作者写回 flash，成功才清脏标志。`discard` 为真时随后释放槽
    /// （变回空槽）。
    ///
    /// # 错误
    ///
    /// 写穿失败原样上抛；槽保持脏且不被丢弃，之后的 flush 可重试。
    pub fn flush_one<W: ChunkWriter>(
        &mut self,
        id: SlotId,
        writer: &mut W,
        discard: bool,
    ) -> Result<()> {
        if self.slots[id].is_locked() {
            return Ok(());
        }

        if self.slots[id].is_dirty() {
            if let Some(owner) = self.slots[id].owner {
                let slot = &self.slots[id];
                log::trace!(
                    "[CACHE] flush slot={} {} chunk={} n_bytes={}",
                    id,
                    owner,
                    slot.chunk_id,
                    slot.n_bytes
                );
                writer.write_chunk(owner, slot.chunk_id, &slot.data[..slot.n_bytes], true)?;
                self.slots[id].mark_clean();
                self.writebacks += 1;
            }
        }

        if discard {
            self.slots[id].release();
        }
        Ok(())
    }

    /// 写回一个对象的全部缓存槽
    ///
    /// 对应 yaffs 的 `yaffs_flush_file_cache`
    ///
    /// # 参数
    ///
    /// * `obj` - 对象标识
    /// * `discard` - 写回后是否释放槽
    pub fn flush_object<W: ChunkWriter>(
        &mut self,
        obj: ObjectId,
        writer: &mut W,
        discard: bool,
    ) -> Result<()> {
        if self.slots.is_empty() {
            return Ok(());
        }

        for id in 0..self.slots.len() {
            if self.slots[id].owner == Some(obj) {
                self.flush_one(id, writer, discard)?;
            }
        }
        Ok(())
    }

    /// 写回全部脏槽
    ///
    /// 对应 yaffs 的 `yaffs_flush_whole_cache`
    ///
    /// 反复找出任意一个占用且脏（且未锁定）的槽，把它整个对象
    /// 一起写回，直到不再有这样的槽。按对象而不是按槽批量写回，
    /// 底层写入器把同一对象的相邻 chunk 一起写往往更便宜。
    /// 每轮至少清掉选中的那个脏槽，循环必然终止。
    pub fn flush_all<W: ChunkWriter>(&mut self, writer: &mut W, discard: bool) -> Result<()> {
        loop {
            let obj = self
                .slots
                .iter()
                .find(|s| !s.is_free() && s.is_dirty() && !s.is_locked())
                .and_then(|s| s.owner);

            match obj {
                Some(obj) => self.flush_object(obj, writer, discard)?,
                None => break,
            }
        }
        Ok(())
    }

    /// 使单个 chunk 的缓存失效
    ///
    /// 对应 yaffs 的 `yaffs_invalidate_chunk_cache`
    ///
    /// 整个 chunk 即将被直接覆盖写入时调用：缓存里的短副本已经过时，
    /// 规范数据正在直接写往 flash，所以丢弃时**不写回**。
    pub fn invalidate_chunk(&mut self, obj: ObjectId, chunk_id: u32) {
        if let Some(id) = self.find(obj, chunk_id) {
            self.slots[id].release();
        }
    }

    /// 使一个对象的全部缓存失效
    ///
    /// 对应 yaffs 的 `yaffs_invalidate_file_cache`
    ///
    /// 对象被删除或截断时调用：它的 chunk 正在消失，缓存里的脏数据
    /// 若写回只会落进一个逻辑上已不存在的 chunk，所以直接丢弃。
    pub fn invalidate_object(&mut self, obj: ObjectId) {
        for slot in self.slots.iter_mut() {
            if slot.owner == Some(obj) {
                slot.release();
            }
        }
    }

    /// 统计脏槽数量
    ///
    /// 对应 yaffs 的 `yaffs_count_dirty_caches`
    ///
    /// 上层（例如全设备 sync）用它判断是否需要一轮 flush。
    /// 纯读取，无副作用。
    pub fn count_dirty(&self) -> usize {
        self.slots.iter().filter(|s| s.is_dirty()).count()
    }

    /// 检查某对象是否有脏缓存
    ///
    /// 对应 yaffs 的 `yaffs_obj_cache_dirty`
    pub fn is_object_dirty(&self, obj: ObjectId) -> bool {
        self.slots
            .iter()
            .any(|s| s.owner == Some(obj) && s.is_dirty())
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            writebacks: self.writebacks,
            dirty_chunks: self.count_dirty(),
            used: self.slots.iter().filter(|s| !s.is_free()).count(),
            capacity: self.slots.len(),
        }
    }
}

impl core::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChunkCache")
            .field("capacity", &self.slots.len())
            .field("used", &self.slots.iter().filter(|s| !s.is_free()).count())
            .field("dirty", &self.count_dirty())
            .field("use_counter", &self.use_counter)
            .field("hits", &self.hits)
            .finish()
    }
}
