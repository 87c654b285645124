//! chunk 句柄 - RAII 风格的缓存 chunk 访问
//!
//! 对应 yaffs 里围绕 `yaffs_grab_chunk_cache` + `cache->locked`
//! 的多步操作模式

use crate::chunk::{ChunkDev, ChunkDevice};
use crate::cache::SlotId;
use crate::error::{Error, ErrorKind, Result};
use crate::types::ObjectId;

/// 缓存 chunk 句柄
///
/// 提供 RAII 风格的 chunk 访问：
/// - 获取时自动命中缓存或抓槽装入
/// - 持有期间槽被锁定（`locked`），分配器和淘汰器都会绕开它，
///   多步操作中途槽不会被复用
/// - 每次访问都做 LRU 标记，写访问自动把槽标脏
/// - 丢弃时解除锁定，脏数据留在缓存里等批量写回
/// - 缓存暂不可用（槽全被锁定或容量为 0）时退化为本地副本，
///   修改在句柄释放时直接写穿设备
///
/// # 设计说明
///
/// 句柄持有 `&mut ChunkDev`，同一时刻只会有一个句柄存在；
/// `locked` 标志保护的是句柄存续期间发生的分配（例如
/// [`with_data_mut`](Self::with_data_mut) 之外调用方自己驱动的
/// 抓槽），它们不会把句柄指着的槽当牺牲者。
///
/// # 示例
///
/// ```rust,ignore
/// // 读改一个 chunk 的几个字节
/// let mut chunk = CachedChunk::get(&mut dev, obj, 3)?;
/// chunk.with_data_mut(|data| {
///     data[10] = 0x42;
/// })?;
/// // chunk 超出作用域时解锁，脏数据等 flush 批量写回
///
/// // 马上要整块覆盖：不从 flash 读旧数据
/// let mut chunk = CachedChunk::prepare(&mut dev, obj, 4)?;
/// chunk.with_data_mut(|data| {
///     data.fill(0xFF);
/// })?;
/// ```
pub struct CachedChunk<'a, D: ChunkDevice> {
    /// 设备绑定引用
    dev: &'a mut ChunkDev<D>,
    /// 对象标识
    obj: ObjectId,
    /// chunk 编号
    chunk_id: u32,
    /// 持有并锁定的缓存槽
    slot: Option<SlotId>,
    /// 本地数据副本（仅在缓存不可用时使用）
    local_data: Option<alloc::vec::Vec<u8>>,
    /// 本地脏标志（仅在缓存不可用时使用）
    local_dirty: bool,
}

impl<'a, D: ChunkDevice> CachedChunk<'a, D> {
    /// 获取 chunk（装入数据）
    ///
    /// # 缓存路径
    ///
    /// 1. 查找命中：直接锁定该槽
    /// 2. 未命中：抓一个槽（必要时淘汰并写回），把整个 chunk
    ///    从设备装入，然后锁定
    ///
    /// # 无缓存路径
    ///
    /// 缓存不可用时把 chunk 读进本地缓冲区
    ///
    /// # 参数
    ///
    /// * `dev` - 设备绑定
    /// * `obj` - 对象标识
    /// * `chunk_id` - 对象内的 chunk 编号
    pub fn get(dev: &'a mut ChunkDev<D>, obj: ObjectId, chunk_id: u32) -> Result<Self> {
        if let Some(id) = dev.cache.find(obj, chunk_id) {
            dev.cache.slot_mut(id).lock();
            return Ok(Self {
                dev,
                obj,
                chunk_id,
                slot: Some(id),
                local_data: None,
                local_dirty: false,
            });
        }

        match dev.cache.allocate(&mut dev.device)? {
            Some(id) => {
                dev.cache.bind(id, obj, chunk_id);
                dev.fill_slot(id, obj, chunk_id)?;
                dev.cache.slot_mut(id).lock();
                Ok(Self {
                    dev,
                    obj,
                    chunk_id,
                    slot: Some(id),
                    local_data: None,
                    local_dirty: false,
                })
            }
            None => {
                // 缓存暂不可用：读进本地副本
                let chunk_size = dev.chunk_size();
                let mut data = alloc::vec![0u8; chunk_size];
                dev.inc_physical_read_count();
                dev.device.read_chunk(obj, chunk_id, &mut data)?;
                Ok(Self {
                    dev,
                    obj,
                    chunk_id,
                    slot: None,
                    local_data: Some(data),
                    local_dirty: false,
                })
            }
        }
    }

    /// 获取 chunk（不装入数据）
    ///
    /// # 语义
    ///
    /// "在槽池里给我留一个位置，标记属于 (obj, chunk_id)。
    /// 因为我马上要覆盖整个 chunk，不需要浪费时间把 flash 上的
    /// 旧数据读进来。"
    ///
    /// 调用方必须随后用 [`with_data_mut`](Self::with_data_mut)
    /// 覆盖整个 chunk，否则写回的会是残留数据。
    ///
    /// # 参数
    ///
    /// * `dev` - 设备绑定
    /// * `obj` - 对象标识
    /// * `chunk_id` - 对象内的 chunk 编号
    pub fn prepare(dev: &'a mut ChunkDev<D>, obj: ObjectId, chunk_id: u32) -> Result<Self> {
        // 已缓存：直接复用，反正马上被覆盖
        if let Some(id) = dev.cache.find(obj, chunk_id) {
            dev.cache.slot_mut(id).lock();
            return Ok(Self {
                dev,
                obj,
                chunk_id,
                slot: Some(id),
                local_data: None,
                local_dirty: false,
            });
        }

        match dev.cache.allocate(&mut dev.device)? {
            Some(id) => {
                dev.cache.bind(id, obj, chunk_id);
                dev.cache.slot_mut(id).lock();
                Ok(Self {
                    dev,
                    obj,
                    chunk_id,
                    slot: Some(id),
                    local_data: None,
                    local_dirty: false,
                })
            }
            None => {
                let chunk_size = dev.chunk_size();
                Ok(Self {
                    dev,
                    obj,
                    chunk_id,
                    slot: None,
                    local_data: Some(alloc::vec![0u8; chunk_size]),
                    local_dirty: false,
                })
            }
        }
    }

    /// 获取对象标识
    pub fn object(&self) -> ObjectId {
        self.obj
    }

    /// 获取 chunk 编号
    pub fn chunk_id(&self) -> u32 {
        self.chunk_id
    }

    /// 访问 chunk 数据（只读）
    ///
    /// 通过闭包访问数据，每次访问都做 LRU 标记。
    pub fn with_data<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> R,
    {
        if let Some(id) = self.slot {
            self.dev.cache.mark_used(id, false);
            Ok(f(&self.dev.cache.slot(id).data))
        } else if let Some(data) = &self.local_data {
            Ok(f(data))
        } else {
            Err(Error::new(ErrorKind::InvalidState, "chunk not initialized"))
        }
    }

    /// 访问 chunk 数据（可写）
    ///
    /// 通过闭包修改数据，自动标脏并做 LRU 标记。
    pub fn with_data_mut<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        if let Some(id) = self.slot {
            self.dev.cache.mark_used(id, true);
            let slot = self.dev.cache.slot_mut(id);
            let result = f(&mut slot.data);
            // 闭包可以写缓冲区的任何位置，整块视为有效
            slot.n_bytes = slot.data.len();
            Ok(result)
        } else if let Some(data) = &mut self.local_data {
            let result = f(data);
            self.local_dirty = true;
            Ok(result)
        } else {
            Err(Error::new(ErrorKind::InvalidState, "chunk not initialized"))
        }
    }

    /// 手动释放句柄（消费 self）
    ///
    /// 通常不需要手动调用，Drop 会自动处理；需要拿到本地副本
    /// 写穿的错误时才显式调用。
    pub fn release(mut self) -> Result<()> {
        self.do_release()
    }

    /// 实际的释放逻辑
    fn do_release(&mut self) -> Result<()> {
        if let Some(id) = self.slot.take() {
            // 解除锁定，脏数据留在缓存里等批量写回
            self.dev.cache.slot_mut(id).unlock();
            Ok(())
        } else if self.local_dirty {
            // 本地副本有修改：直接写穿设备
            self.local_dirty = false;
            if let Some(data) = self.local_data.take() {
                self.dev.inc_physical_write_count();
                self.dev
                    .device
                    .write_chunk(self.obj, self.chunk_id, &data, false)?;
            }
            Ok(())
        } else {
            Ok(())
        }
    }
}

/// 实现 Drop trait，自动释放句柄
impl<'a, D: ChunkDevice> Drop for CachedChunk<'a, D> {
    fn drop(&mut self) {
        // 忽略错误（drop 不能返回 Result）
        let _ = self.do_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkWriter;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;

    const CHUNK_SIZE: usize = 512;

    struct MockNand {
        chunk_size: usize,
        store: BTreeMap<(u32, u32), Vec<u8>>,
    }

    impl MockNand {
        fn new() -> Self {
            Self {
                chunk_size: CHUNK_SIZE,
                store: BTreeMap::new(),
            }
        }

        fn chunk(&self, obj: ObjectId, chunk_id: u32) -> Option<&Vec<u8>> {
            self.store.get(&(obj.0, chunk_id))
        }
    }

    impl ChunkWriter for MockNand {
        fn write_chunk(
            &mut self,
            obj: ObjectId,
            chunk_id: u32,
            data: &[u8],
            _use_reserve: bool,
        ) -> Result<usize> {
            let mut chunk = alloc::vec![0u8; self.chunk_size];
            chunk[..data.len()].copy_from_slice(data);
            self.store.insert((obj.0, chunk_id), chunk);
            Ok(data.len())
        }
    }

    impl ChunkDevice for MockNand {
        fn chunk_size(&self) -> usize {
            self.chunk_size
        }

        fn read_chunk(&mut self, obj: ObjectId, chunk_id: u32, buf: &mut [u8]) -> Result<usize> {
            let n = self.chunk_size.min(buf.len());
            match self.store.get(&(obj.0, chunk_id)) {
                Some(chunk) => buf[..n].copy_from_slice(&chunk[..n]),
                None => buf[..n].fill(0),
            }
            Ok(n)
        }
    }

    #[test]
    fn test_handle_get_reads_and_locks() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(1), 0, &[0x3C; CHUNK_SIZE], false)
            .unwrap();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();

        let mut chunk = CachedChunk::get(&mut dev, ObjectId(1), 0).unwrap();
        assert_eq!(chunk.object(), ObjectId(1));
        assert_eq!(chunk.chunk_id(), 0);

        // 持有期间槽被锁定
        let id = chunk.slot.unwrap();
        assert!(chunk.dev.cache.slot(id).is_locked());

        let first = chunk.with_data(|data| data[0]).unwrap();
        assert_eq!(first, 0x3C);
        chunk.release().unwrap();

        // 释放后解锁，chunk 还留在缓存里
        assert!(!dev.cache().slot(id).is_locked());
        assert_eq!(dev.cache_mut().find(ObjectId(1), 0), Some(id));
    }

    #[test]
    fn test_handle_modify_marks_dirty() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(2), 1, &[0u8; CHUNK_SIZE], false)
            .unwrap();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();

        {
            let mut chunk = CachedChunk::get(&mut dev, ObjectId(2), 1).unwrap();
            chunk
                .with_data_mut(|data| {
                    data[0] = 0x42;
                    data[1] = 0x43;
                })
                .unwrap();
        } // 自动释放

        // 修改攒在缓存里，flash 未动
        assert_eq!(dev.count_dirty(), 1);
        assert_eq!(dev.device().chunk(ObjectId(2), 1).unwrap()[0], 0);

        dev.flush_object(ObjectId(2), false).unwrap();
        let chunk = dev.device().chunk(ObjectId(2), 1).unwrap();
        assert_eq!(&chunk[..2], &[0x42, 0x43]);
    }

    #[test]
    fn test_handle_prepare_overwrites_without_read() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(3), 0, &[0xAA; CHUNK_SIZE], false)
            .unwrap();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();
        let before = dev.physical_read_count();

        {
            let mut chunk = CachedChunk::prepare(&mut dev, ObjectId(3), 0).unwrap();
            chunk
                .with_data_mut(|data| {
                    data.fill(0xFF);
                })
                .unwrap();
        }

        // prepare 不读 flash
        assert_eq!(dev.physical_read_count(), before);

        dev.flush_all(false).unwrap();
        let chunk = dev.device().chunk(ObjectId(3), 0).unwrap();
        assert_eq!(chunk.as_slice(), &[0xFF; CHUNK_SIZE]);
    }

    #[test]
    fn test_handle_local_fallback_writes_through_on_release() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(4), 2, &[0x10; CHUNK_SIZE], false)
            .unwrap();
        // 缓存禁用：句柄退化为本地副本
        let mut dev = ChunkDev::new(nand).unwrap();

        {
            let mut chunk = CachedChunk::get(&mut dev, ObjectId(4), 2).unwrap();
            assert!(chunk.slot.is_none());
            chunk
                .with_data_mut(|data| {
                    data[5] = 0x77;
                })
                .unwrap();
        } // drop 时直接写穿

        let chunk = dev.device().chunk(ObjectId(4), 2).unwrap();
        assert_eq!(chunk[5], 0x77);
        assert_eq!(chunk[0], 0x10);
    }

    #[test]
    fn test_handle_sequential_access_hits_cache() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(5), 0, &[0x01; CHUNK_SIZE], false)
            .unwrap();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();

        {
            let mut chunk = CachedChunk::get(&mut dev, ObjectId(5), 0).unwrap();
            chunk.with_data_mut(|data| data[0] = 0x99).unwrap();
        }

        // 第二个句柄命中同一个槽，看到未写回的修改
        {
            let mut chunk = CachedChunk::get(&mut dev, ObjectId(5), 0).unwrap();
            let first = chunk.with_data(|data| data[0]).unwrap();
            assert_eq!(first, 0x99);
        }
        assert_eq!(dev.physical_read_count(), 1);
    }
}
