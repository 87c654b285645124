//! 缓存槽结构
//!
//! 对应 yaffs 的 `struct yaffs_cache`

use crate::error::{Error, ErrorKind, Result};
use crate::types::ObjectId;
use alloc::boxed::Box;
use alloc::vec::Vec;
use bitflags::bitflags;

/// 缓存槽 ID，用于索引和关联
pub type SlotId = usize;

bitflags! {
    /// 缓存槽标志
    ///
    /// 对应 yaffs 的 `cache->dirty` / `cache->locked` 字段
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotFlags: u8 {
        /// 数据比 flash 上的副本新，丢弃前必须写回
        const DIRTY  = 0x01;
        /// 槽正在被多步操作使用，不参与淘汰和 flush
        const LOCKED = 0x02;
    }
}

/// 缓存槽
///
/// 对应 yaffs 的 `struct yaffs_cache`
///
/// 在 yaffs 的 C 实现中，`cache->object` 是指向对象的裸指针，空槽用
/// NULL 表示。在 Rust 实现中，我们用 `Option<ObjectId>` 表达空/占用
/// 两态，让 free/occupied 的分支在编译期被穷尽检查；对象标识只做
/// 相等比较，不维持对象存活。
///
/// # 字段说明
///
/// - `owner`: 当前缓存的对象（`None` = 空槽）
/// - `chunk_id`: `owner` 的第几个 chunk（仅 `owner` 存在时有意义）
/// - `data`: 固定大小的缓冲区，恰好一个 chunk 的载荷；管理器初始化
///   时分配一次，之后不再重新分配
/// - `n_bytes`: `data` 中有效字节数（短缓存可能只装了部分 chunk）
/// - `flags`: 脏/锁定标志
/// - `last_use`: LRU 次序键，单调递增计数器的快照，不是时钟
pub struct CacheSlot {
    /// 当前缓存的对象（`None` = 空槽）
    pub owner: Option<ObjectId>,

    /// chunk 编号
    pub chunk_id: u32,

    /// chunk 数据缓冲区
    pub data: Box<[u8]>,

    /// 有效字节数
    pub n_bytes: usize,

    /// 槽状态标志
    pub flags: SlotFlags,

    /// LRU 次序键（越小越旧）
    pub last_use: u32,
}

impl core::fmt::Debug for CacheSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheSlot")
            .field("owner", &self.owner)
            .field("chunk_id", &self.chunk_id)
            .field("data_len", &self.data.len())
            .field("n_bytes", &self.n_bytes)
            .field("flags", &self.flags)
            .field("last_use", &self.last_use)
            .finish()
    }
}

impl CacheSlot {
    /// 创建新的空缓存槽
    ///
    /// # 参数
    ///
    /// * `chunk_size` - 缓冲区大小（字节），即一个 chunk 的载荷大小
    ///
    /// # 错误
    ///
    /// 缓冲区分配失败返回 `NoMemory`。挂载路径上不允许 panic，
    /// 所以这里走 `try_reserve` 而不是 `vec!`。
    pub fn new(chunk_size: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(chunk_size)
            .map_err(|e| Error::with_cause(ErrorKind::NoMemory, "slot buffer alloc failed", e))?;
        buf.resize(chunk_size, 0);

        Ok(Self {
            owner: None,
            chunk_id: 0,
            data: buf.into_boxed_slice(),
            n_bytes: 0,
            flags: SlotFlags::empty(),
            last_use: 0,
        })
    }

    /// 检查是否是空槽
    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    /// 检查槽是否缓存着指定对象的指定 chunk
    pub fn matches(&self, obj: ObjectId, chunk_id: u32) -> bool {
        self.owner == Some(obj) && self.chunk_id == chunk_id
    }

    /// 标记为脏（比 flash 上的副本新）
    pub fn mark_dirty(&mut self) {
        self.flags.insert(SlotFlags::DIRTY);
    }

    /// 标记为干净（已写回 flash）
    pub fn mark_clean(&mut self) {
        self.flags.remove(SlotFlags::DIRTY);
    }

    /// 检查是否是脏槽
    pub fn is_dirty(&self) -> bool {
        self.flags.contains(SlotFlags::DIRTY)
    }

    /// 锁定槽，使其不参与淘汰和 flush
    pub fn lock(&mut self) {
        self.flags.insert(SlotFlags::LOCKED);
    }

    /// 解除锁定
    pub fn unlock(&mut self) {
        self.flags.remove(SlotFlags::LOCKED);
    }

    /// 检查槽是否被锁定
    pub fn is_locked(&self) -> bool {
        self.flags.contains(SlotFlags::LOCKED)
    }

    /// 把槽绑定到 (对象, chunk)
    ///
    /// 清掉上一任主人的残留状态，数据由调用方随后装入。
    pub fn assign(&mut self, obj: ObjectId, chunk_id: u32) {
        self.owner = Some(obj);
        self.chunk_id = chunk_id;
        self.n_bytes = 0;
        self.flags = SlotFlags::empty();
        self.last_use = 0;
    }

    /// 释放槽（变回空槽）
    ///
    /// 不变量：空槽永远不脏。失效路径直接走这里丢弃数据，
    /// 写回与否由调用方在释放前决定。
    pub fn release(&mut self) {
        self.owner = None;
        self.chunk_id = 0;
        self.n_bytes = 0;
        self.flags = SlotFlags::empty();
        self.last_use = 0;
    }
}
