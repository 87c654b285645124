//! chunk I/O 操作实现
//!
//! 短读短写先走缓存；整块操作和缓存不可用时直接落设备。

use super::{ChunkDev, ChunkDevice};
use crate::cache::SlotId;
use crate::error::{Error, ErrorKind, Result};
use crate::types::ObjectId;
use alloc::vec;

impl<D: ChunkDevice> ChunkDev<D> {
    /// 短读：读取一个 chunk 内的字节区间
    ///
    /// 命中缓存时直接拷贝，不触碰 flash。短读未命中时抓一个槽、
    /// 把整个 chunk 装入缓存再截取，后续的顺序短读都会命中。
    /// 整块读不经过缓存（不挤占本来就很小的槽池），缓存暂不可用
    /// （槽全被锁定）时退化为直接读。
    ///
    /// # 参数
    ///
    /// * `obj` - 对象标识
    /// * `chunk_id` - 对象内的 chunk 编号
    /// * `offset` - chunk 内起始偏移
    /// * `buf` - 目标缓冲区，`offset + buf.len()` 不得越过 chunk 边界
    ///
    /// # 返回
    ///
    /// 成功返回读取的字节数
    pub fn read_bytes(
        &mut self,
        obj: ObjectId,
        chunk_id: u32,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<usize> {
        let chunk_size = self.device.chunk_size();
        if buf.is_empty() {
            return Ok(0);
        }
        if offset >= chunk_size || buf.len() > chunk_size - offset {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "read range exceeds chunk",
            ));
        }

        self.inc_read_count();

        if let Some(id) = self.cache.find(obj, chunk_id) {
            self.cache.mark_used(id, false);
            let slot = self.cache.slot(id);
            buf.copy_from_slice(&slot.data[offset..offset + buf.len()]);
            return Ok(buf.len());
        }

        if buf.len() == chunk_size {
            // 整块读：不污染缓存
            self.inc_physical_read_count();
            return self.device.read_chunk(obj, chunk_id, buf);
        }

        match self.cache.allocate(&mut self.device)? {
            Some(id) => {
                self.cache.bind(id, obj, chunk_id);
                self.fill_slot(id, obj, chunk_id)?;
                self.cache.mark_used(id, false);
                let slot = self.cache.slot(id);
                buf.copy_from_slice(&slot.data[offset..offset + buf.len()]);
                Ok(buf.len())
            }
            None => {
                // 缓存暂不可用：整块读进临时缓冲再截取
                let mut temp = vec![0u8; chunk_size];
                self.inc_physical_read_count();
                self.device.read_chunk(obj, chunk_id, &mut temp)?;
                buf.copy_from_slice(&temp[offset..offset + buf.len()]);
                Ok(buf.len())
            }
        }
    }

    /// 短写：写入一个 chunk 内的字节区间
    ///
    /// 整块覆盖写先使缓存失效再直接写穿——缓存里的短副本已经过时，
    /// 规范数据正在直接落盘。短写则进缓存攒着（槽变脏），由之后的
    /// flush/淘汰批量写回。短写未命中时先把旧数据装入槽（短写不覆盖
    /// 整块）。缓存暂不可用时退化为读-改-写直写。
    ///
    /// # 参数
    ///
    /// * `obj` - 对象标识
    /// * `chunk_id` - 对象内的 chunk 编号
    /// * `offset` - chunk 内起始偏移
    /// * `buf` - 源数据，`offset + buf.len()` 不得越过 chunk 边界
    ///
    /// # 返回
    ///
    /// 成功返回写入的字节数
    pub fn write_bytes(
        &mut self,
        obj: ObjectId,
        chunk_id: u32,
        offset: usize,
        buf: &[u8],
    ) -> Result<usize> {
        let chunk_size = self.device.chunk_size();
        if buf.is_empty() {
            return Ok(0);
        }
        if offset >= chunk_size || buf.len() > chunk_size - offset {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "write range exceeds chunk",
            ));
        }

        self.inc_write_count();

        if offset == 0 && buf.len() == chunk_size {
            // 整块覆盖：缓存短副本作废，直接写穿
            self.cache.invalidate_chunk(obj, chunk_id);
            self.inc_physical_write_count();
            return self.device.write_chunk(obj, chunk_id, buf, false);
        }

        if let Some(id) = self.cache.find(obj, chunk_id) {
            let end = offset + buf.len();
            let slot = self.cache.slot_mut(id);
            slot.data[offset..end].copy_from_slice(buf);
            if slot.n_bytes < end {
                slot.n_bytes = end;
            }
            self.cache.mark_used(id, true);
            return Ok(buf.len());
        }

        match self.cache.allocate(&mut self.device)? {
            Some(id) => {
                self.cache.bind(id, obj, chunk_id);
                // 短写不覆盖整块，先装入旧数据
                self.fill_slot(id, obj, chunk_id)?;
                let slot = self.cache.slot_mut(id);
                slot.data[offset..offset + buf.len()].copy_from_slice(buf);
                self.cache.mark_used(id, true);
                Ok(buf.len())
            }
            None => {
                // 缓存暂不可用：读-改-写直写，性能降级但语义不变
                let mut temp = vec![0u8; chunk_size];
                self.inc_physical_read_count();
                self.device.read_chunk(obj, chunk_id, &mut temp)?;
                temp[offset..offset + buf.len()].copy_from_slice(buf);
                self.inc_physical_write_count();
                self.device.write_chunk(obj, chunk_id, &temp, false)?;
                Ok(buf.len())
            }
        }
    }

    /// 直接读取整个 chunk（绕过缓存）
    ///
    /// 主要用于读取元数据或实现特殊的 I/O 策略，避免挤占缓存。
    ///
    /// # 参数
    ///
    /// * `obj` - 对象标识
    /// * `chunk_id` - 对象内的 chunk 编号
    /// * `buf` - 目标缓冲区（大小至少为 chunk_size）
    ///
    /// # 返回
    ///
    /// 成功返回读取的字节数
    pub fn read_chunk_direct(
        &mut self,
        obj: ObjectId,
        chunk_id: u32,
        buf: &mut [u8],
    ) -> Result<usize> {
        if buf.len() < self.device.chunk_size() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for chunk",
            ));
        }
        self.inc_read_count();
        self.inc_physical_read_count();
        self.device.read_chunk(obj, chunk_id, buf)
    }

    /// 直接写入整个 chunk（绕过缓存）
    ///
    /// 注意：不处理缓存一致性，如果该 chunk 可能在缓存里，
    /// 调用方应先 [`invalidate_chunk`](Self::invalidate_chunk)。
    ///
    /// # 参数
    ///
    /// * `obj` - 对象标识
    /// * `chunk_id` - 对象内的 chunk 编号
    /// * `buf` - 源数据缓冲区
    ///
    /// # 返回
    ///
    /// 成功返回写入的字节数
    pub fn write_chunk_direct(
        &mut self,
        obj: ObjectId,
        chunk_id: u32,
        buf: &[u8],
    ) -> Result<usize> {
        self.inc_write_count();
        self.inc_physical_write_count();
        self.device.write_chunk(obj, chunk_id, buf, false)
    }

    /// 把整个 chunk 从设备装入指定槽
    ///
    /// 装入失败时槽被释放回空闲态，错误上抛。
    pub(super) fn fill_slot(&mut self, id: SlotId, obj: ObjectId, chunk_id: u32) -> Result<()> {
        self.inc_physical_read_count();
        let res = self
            .device
            .read_chunk(obj, chunk_id, &mut self.cache.slot_mut(id).data);
        match res {
            Ok(n) => {
                let slot = self.cache.slot_mut(id);
                if n < slot.data.len() {
                    slot.data[n..].fill(0);
                }
                slot.n_bytes = slot.data.len();
                Ok(())
            }
            Err(e) => {
                self.cache.slot_mut(id).release();
                Err(e)
            }
        }
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
        fail_writes: bool,
    }

    impl MockNand {
        fn new() -> Self {
            Self {
                chunk_size: CHUNK_SIZE,
                store: BTreeMap::new(),
                fail_writes: false,
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
            if self.fail_writes {
                return Err(Error::new(ErrorKind::Io, "mock write failure"));
            }
            let mut chunk = vec![0u8; self.chunk_size];
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
                // 未写入的 chunk 读出全零
                None => buf[..n].fill(0),
            }
            Ok(n)
        }
    }

    #[test]
    fn test_short_read_installs_cache() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(1), 0, &[0xAB; CHUNK_SIZE], false)
            .unwrap();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();

        let mut buf = [0u8; 16];
        dev.read_bytes(ObjectId(1), 0, 32, &mut buf).unwrap();
        assert_eq!(buf, [0xAB; 16]);
        assert_eq!(dev.physical_read_count(), 1);

        // 第二次短读命中缓存，不再触碰设备
        dev.read_bytes(ObjectId(1), 0, 100, &mut buf).unwrap();
        assert_eq!(buf, [0xAB; 16]);
        assert_eq!(dev.physical_read_count(), 1);
        assert_eq!(dev.read_count(), 2);
        assert_eq!(dev.cache_stats().hits, 1);
    }

    #[test]
    fn test_whole_chunk_read_bypasses_cache() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(1), 3, &[0x11; CHUNK_SIZE], false)
            .unwrap();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();

        let mut buf = [0u8; CHUNK_SIZE];
        dev.read_bytes(ObjectId(1), 3, 0, &mut buf).unwrap();
        assert_eq!(buf[0], 0x11);

        // 没有装入缓存
        assert_eq!(dev.cache_stats().used, 0);
        dev.read_bytes(ObjectId(1), 3, 0, &mut buf).unwrap();
        assert_eq!(dev.physical_read_count(), 2);
    }

    #[test]
    fn test_short_write_is_cached_until_flush() {
        let nand = MockNand::new();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();
        let obj = ObjectId(7);

        dev.write_bytes(obj, 2, 10, &[0xCD; 8]).unwrap();
        assert_eq!(dev.count_dirty(), 1);
        // 数据还攒在缓存里，flash 上没有
        assert!(dev.device().chunk(obj, 2).is_none());

        // 读回走缓存
        let mut buf = [0u8; 8];
        dev.read_bytes(obj, 2, 10, &mut buf).unwrap();
        assert_eq!(buf, [0xCD; 8]);

        dev.flush_object(obj, false).unwrap();
        assert_eq!(dev.count_dirty(), 0);
        let chunk = dev.device().chunk(obj, 2).unwrap();
        assert_eq!(&chunk[10..18], &[0xCD; 8]);
        assert_eq!(&chunk[..10], &[0u8; 10]);
    }

    #[test]
    fn test_short_write_miss_preserves_old_data() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(5), 1, &[0x77; CHUNK_SIZE], false)
            .unwrap();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();

        // 短写未命中：先装入旧数据再改写区间
        dev.write_bytes(ObjectId(5), 1, 4, &[0xEE; 4]).unwrap();
        dev.flush_all(false).unwrap();

        let chunk = dev.device().chunk(ObjectId(5), 1).unwrap();
        assert_eq!(&chunk[..4], &[0x77; 4]);
        assert_eq!(&chunk[4..8], &[0xEE; 4]);
        assert_eq!(&chunk[8..12], &[0x77; 4]);
    }

    #[test]
    fn test_whole_chunk_write_invalidates_cache() {
        let nand = MockNand::new();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();
        let obj = ObjectId(9);

        // 先用短写在缓存里留下一个脏的短副本
        dev.write_bytes(obj, 0, 0, &[0x01; 4]).unwrap();
        assert_eq!(dev.count_dirty(), 1);

        // 整块覆盖：短副本作废（不写回），新数据直接落盘
        dev.write_bytes(obj, 0, 0, &[0xFF; CHUNK_SIZE]).unwrap();
        assert_eq!(dev.count_dirty(), 0);
        assert_eq!(dev.cache_mut().find(obj, 0), None);
        let chunk = dev.device().chunk(obj, 0).unwrap();
        assert_eq!(chunk.as_slice(), &[0xFF; CHUNK_SIZE]);
    }

    #[test]
    fn test_uncached_fallback() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(2), 0, &[0x42; CHUNK_SIZE], false)
            .unwrap();
        // 容量 0：缓存禁用，一切直接落设备
        let mut dev = ChunkDev::new(nand).unwrap();
        assert!(!dev.has_cache());

        let mut buf = [0u8; 8];
        dev.read_bytes(ObjectId(2), 0, 0, &mut buf).unwrap();
        assert_eq!(buf, [0x42; 8]);
        assert_eq!(dev.physical_read_count(), 1);

        // 短写退化为读-改-写直写
        dev.write_bytes(ObjectId(2), 0, 2, &[0x43; 2]).unwrap();
        assert_eq!(dev.count_dirty(), 0);
        let chunk = dev.device().chunk(ObjectId(2), 0).unwrap();
        assert_eq!(&chunk[..4], &[0x42, 0x42, 0x43, 0x43]);
        assert_eq!(dev.physical_write_count(), 1);
    }

    #[test]
    fn test_eviction_writes_back_through_device() {
        let nand = MockNand::new();
        let mut dev = ChunkDev::new_with_cache(nand, 2).unwrap();
        let obj = ObjectId(1);

        // 两个槽都被脏短写占满
        dev.write_bytes(obj, 0, 0, &[0xA0; 4]).unwrap();
        dev.write_bytes(obj, 1, 0, &[0xA1; 4]).unwrap();
        assert_eq!(dev.count_dirty(), 2);

        // 第三个 chunk 的短写逼出 LRU 槽（chunk 0），脏数据先写回
        dev.write_bytes(obj, 2, 0, &[0xA2; 4]).unwrap();
        let chunk0 = dev.device().chunk(obj, 0).unwrap();
        assert_eq!(&chunk0[..4], &[0xA0; 4]);
        assert_eq!(dev.cache_mut().find(obj, 0), None);
        assert!(dev.cache_mut().find(obj, 2).is_some());
    }

    #[test]
    fn test_flush_failure_surfaces_and_retries() {
        let nand = MockNand::new();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();
        let obj = ObjectId(3);

        dev.write_bytes(obj, 0, 0, &[0x5A; 4]).unwrap();

        dev.device_mut().fail_writes = true;
        assert!(dev.sync().is_err());
        // 失败的写回不丢数据：槽保持脏
        assert_eq!(dev.count_dirty(), 1);

        dev.device_mut().fail_writes = false;
        dev.sync().unwrap();
        assert_eq!(dev.count_dirty(), 0);
        let chunk = dev.device().chunk(obj, 0).unwrap();
        assert_eq!(&chunk[..4], &[0x5A; 4]);
    }

    #[test]
    fn test_read_range_validation() {
        let nand = MockNand::new();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();

        let mut buf = [0u8; 32];
        // 越过 chunk 边界
        assert!(dev
            .read_bytes(ObjectId(1), 0, CHUNK_SIZE - 16, &mut buf)
            .is_err());
        assert!(dev.write_bytes(ObjectId(1), 0, CHUNK_SIZE, &buf).is_err());
        // 空请求是 no-op
        assert_eq!(dev.read_bytes(ObjectId(1), 0, 0, &mut []).unwrap(), 0);
    }

    #[test]
    fn test_close_flushes_dirty_chunks() {
        let nand = MockNand::new();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();
        let obj = ObjectId(11);

        dev.write_bytes(obj, 0, 0, &[0x99; 4]).unwrap();
        dev.close().unwrap();

        let chunk = dev.device().chunk(obj, 0).unwrap();
        assert_eq!(&chunk[..4], &[0x99; 4]);
    }

    #[test]
    fn test_cache_hit_rate() {
        let mut nand = MockNand::new();
        nand.write_chunk(ObjectId(1), 0, &[1; CHUNK_SIZE], false)
            .unwrap();
        let mut dev = ChunkDev::with_default_cache(nand).unwrap();

        let mut buf = [0u8; 4];
        for _ in 0..4 {
            dev.read_bytes(ObjectId(1), 0, 0, &mut buf).unwrap();
        }
        // 4 次读里只有 1 次物理读
        assert_eq!(dev.read_count(), 4);
        assert_eq!(dev.physical_read_count(), 1);
        assert!((dev.cache_hit_rate() - 0.75).abs() < 1e-9);
    }
}
