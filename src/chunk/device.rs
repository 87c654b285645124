//! chunk 设备核心类型

use crate::cache::ChunkCache;
use crate::consts::DEFAULT_SHORT_OP_CACHES;
use crate::error::{Error, ErrorKind, Result};
use crate::types::ObjectId;

/// chunk 写穿接口
///
/// 对应 yaffs 的 `yaffs_wr_data_obj`：缓存写回脏槽时走的唯一出口。
/// 缓存只通过这个窄接口接触 flash 层，不关心底层的分配和磨损均衡。
pub trait ChunkWriter {
    /// 把一个 chunk 的有效数据写入 flash
    ///
    /// # 参数
    ///
    /// * `obj` - 对象标识
    /// * `chunk_id` - 对象内的 chunk 编号
    /// * `data` - 有效载荷（长度即有效字节数，短缓存可能不满一个 chunk）
    /// * `use_reserve` - 允许动用保留空间（缓存淘汰等必须成功的写回
    ///   场景传 `true`）
    ///
    /// # 返回
    ///
    /// 成功返回写入的字节数
    fn write_chunk(
        &mut self,
        obj: ObjectId,
        chunk_id: u32,
        data: &[u8],
        use_reserve: bool,
    ) -> Result<usize>;
}

/// chunk 设备接口
///
/// 实现此 trait 以提供底层 chunk 访问。
///
/// # 示例
///
/// ```rust,ignore
/// use yaffs_core::{ChunkDevice, ChunkWriter, ObjectId, Result};
///
/// struct MyNand {
///     // ...
/// }
///
/// impl ChunkWriter for MyNand {
///     fn write_chunk(
///         &mut self,
///         obj: ObjectId,
///         chunk_id: u32,
///         data: &[u8],
///         use_reserve: bool,
///     ) -> Result<usize> {
///         // 实现 chunk 写入
///         Ok(data.len())
///     }
/// }
///
/// impl ChunkDevice for MyNand {
///     fn chunk_size(&self) -> usize {
///         2048
///     }
///
///     fn read_chunk(&mut self, obj: ObjectId, chunk_id: u32, buf: &mut [u8]) -> Result<usize> {
///         // 实现 chunk 读取
///         Ok(self.chunk_size())
///     }
/// }
/// ```
pub trait ChunkDevice: ChunkWriter {
    /// 每 chunk 数据载荷大小（字节，通常 2048）
    fn chunk_size(&self) -> usize;

    /// 读取一个 chunk
    ///
    /// 尚未写入过的 chunk 应读出全零数据而不是报错。
    ///
    /// # 参数
    ///
    /// * `obj` - 对象标识
    /// * `chunk_id` - 对象内的 chunk 编号
    /// * `buf` - 目标缓冲区（大小至少为 chunk_size）
    ///
    /// # 返回
    ///
    /// 成功返回实际读取的字节数
    fn read_chunk(&mut self, obj: ObjectId, chunk_id: u32, buf: &mut [u8]) -> Result<usize>;

    /// 刷新设备自身的缓冲
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// 打开设备
    ///
    /// 在开始使用设备前调用，用于初始化设备资源。
    /// 默认实现什么都不做，设备可以根据需要覆盖此方法。
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// 关闭设备
    ///
    /// 在停止使用设备后调用，用于清理设备资源。
    /// 默认实现什么都不做，设备可以根据需要覆盖此方法。
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// chunk 设备绑定
///
/// 把一个缓存管理器和一个设备实例绑在一起，并携带统计信息。
/// 缓存的写回通过设备绑定转发给底层 chunk I/O。
///
/// # 并发使用
///
/// ChunkDev 本身不包含内部锁，设计上假定调用方串行化对单个设备的
/// 访问（例如持有设备级锁再进入）。多线程环境用 [`DeviceLock`]
/// trait 在外层包装：
///
/// ```rust,ignore
/// use std::sync::{Arc, Mutex};
///
/// // 单线程
/// let mut dev = ChunkDev::with_default_cache(nand)?;
///
/// // 多线程
/// let dev = Arc::new(Mutex::new(ChunkDev::with_default_cache(nand)?));
/// ```
///
/// [`DeviceLock`]: crate::chunk::DeviceLock
pub struct ChunkDev<D> {
    /// 底层设备
    pub(super) device: D,
    /// 短操作缓存（容量 0 = 禁用）
    pub(super) cache: ChunkCache,
    /// 逻辑读取次数（包括缓存命中）
    read_count: u64,
    /// 逻辑写入次数（包括缓存写入）
    write_count: u64,
    /// 物理读取次数（实际设备操作）
    physical_read_count: u64,
    /// 物理写入次数（实际设备操作）
    physical_write_count: u64,
}

impl<D: ChunkDevice> ChunkDev<D> {
    /// 创建新的设备绑定（无缓存）
    ///
    /// 所有短操作都直接落到设备上，语义不变、性能降级。
    pub fn new(device: D) -> Result<Self> {
        let chunk_size = device.chunk_size();
        Ok(Self {
            device,
            cache: ChunkCache::new(0, chunk_size)?,
            read_count: 0,
            write_count: 0,
            physical_read_count: 0,
            physical_write_count: 0,
        })
    }

    /// 创建带缓存的设备绑定
    ///
    /// # 参数
    ///
    /// * `device` - 底层 chunk 设备
    /// * `n_caches` - 缓存槽数量（超上限时钳制，0 = 禁用）
    ///
    /// # 错误
    ///
    /// 设备报告的 chunk_size 为 0 返回 `InvalidInput`；
    /// 槽缓冲区分配失败返回 `NoMemory`，设备不可挂载。
    pub fn new_with_cache(device: D, n_caches: usize) -> Result<Self> {
        let chunk_size = device.chunk_size();
        if chunk_size == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "device reports zero chunk size",
            ));
        }
        Ok(Self {
            device,
            cache: ChunkCache::new(n_caches, chunk_size)?,
            read_count: 0,
            write_count: 0,
            physical_read_count: 0,
            physical_write_count: 0,
        })
    }

    /// 创建使用默认缓存大小的设备绑定
    ///
    /// 使用 [`DEFAULT_SHORT_OP_CACHES`] (10 槽) 作为缓存大小
    pub fn with_default_cache(device: D) -> Result<Self> {
        Self::new_with_cache(device, DEFAULT_SHORT_OP_CACHES)
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 获取底层设备的可变引用
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// 获取缓存管理器的引用
    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    /// 获取缓存管理器的可变引用
    ///
    /// 文件读写路径可以直接驱动 find/allocate/mark_used 协议；
    /// 淘汰时的写回请改走 [`flush_object`](Self::flush_object) 等
    /// 转发接口，它们会把底层设备递给缓存。
    pub fn cache_mut(&mut self) -> &mut ChunkCache {
        &mut self.cache
    }

    /// 获取 chunk 载荷大小
    pub fn chunk_size(&self) -> usize {
        self.device.chunk_size()
    }

    /// 获取逻辑读取次数（包括缓存命中）
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// 获取逻辑写入次数（包括缓存写入）
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// 获取物理读取次数（实际设备操作）
    pub fn physical_read_count(&self) -> u64 {
        self.physical_read_count
    }

    /// 获取物理写入次数（实际设备操作）
    pub fn physical_write_count(&self) -> u64 {
        self.physical_write_count
    }

    /// 获取缓存命中率
    ///
    /// 返回 0.0 到 1.0 之间的值，表示读请求中未触碰设备的比例
    pub fn cache_hit_rate(&self) -> f64 {
        if self.read_count == 0 {
            return 0.0;
        }
        let hits = self.read_count.saturating_sub(self.physical_read_count);
        hits as f64 / self.read_count as f64
    }

    // 内部辅助方法

    /// 增加读计数
    pub(super) fn inc_read_count(&mut self) {
        self.read_count += 1;
    }

    /// 增加写计数
    pub(super) fn inc_write_count(&mut self) {
        self.write_count += 1;
    }

    /// 增加物理读计数
    pub(super) fn inc_physical_read_count(&mut self) {
        self.physical_read_count += 1;
    }

    /// 增加物理写计数
    pub(super) fn inc_physical_write_count(&mut self) {
        self.physical_write_count += 1;
    }

    // ===== 缓存管理接口 =====

    /// 写回一个对象的全部缓存槽
    ///
    /// # 参数
    ///
    /// * `obj` - 对象标识
    /// * `discard` - 写回后是否释放槽
    pub fn flush_object(&mut self, obj: ObjectId, discard: bool) -> Result<()> {
        self.cache.flush_object(obj, &mut self.device, discard)
    }

    /// 写回全部脏槽
    ///
    /// # 参数
    ///
    /// * `discard` - 写回后是否释放槽
    pub fn flush_all(&mut self, discard: bool) -> Result<()> {
        self.cache.flush_all(&mut self.device, discard)
    }

    /// 使单个 chunk 的缓存失效（不写回）
    ///
    /// 整块覆盖写之前调用，缓存里的短副本已经过时。
    pub fn invalidate_chunk(&mut self, obj: ObjectId, chunk_id: u32) {
        self.cache.invalidate_chunk(obj, chunk_id);
    }

    /// 使一个对象的全部缓存失效（不写回）
    ///
    /// 对象删除或截断时调用。
    pub fn invalidate_object(&mut self, obj: ObjectId) {
        self.cache.invalidate_object(obj);
    }

    /// 统计脏槽数量
    pub fn count_dirty(&self) -> usize {
        self.cache.count_dirty()
    }

    /// 检查某对象是否有脏缓存
    pub fn is_object_dirty(&self, obj: ObjectId) -> bool {
        self.cache.is_object_dirty(obj)
    }

    /// 获取缓存统计信息
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// 检查是否启用了缓存
    pub fn has_cache(&self) -> bool {
        self.cache.is_enabled()
    }

    // ===== 生命周期 =====

    /// 两层刷新：先把缓存里的脏 chunk 写回，再刷新设备自身的缓冲
    pub fn sync(&mut self) -> Result<()> {
        if self.cache.count_dirty() > 0 {
            self.cache.flush_all(&mut self.device, false)?;
        }
        self.device.flush()
    }

    /// 打开底层设备
    pub fn open(&mut self) -> Result<()> {
        self.device.open()
    }

    /// 关闭底层设备
    ///
    /// 先刷新所有脏缓存，然后调用底层设备的 `close()` 方法。
    /// flush 失败时错误上抛、不关闭设备，脏数据仍在缓存里可重试。
    pub fn close(&mut self) -> Result<()> {
        self.sync()?;
        self.device.close()
    }
}

impl<D: ChunkDevice> core::fmt::Debug for ChunkDev<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChunkDev")
            .field("chunk_size", &self.device.chunk_size())
            .field("cache", &self.cache)
            .field("read_count", &self.read_count)
            .field("write_count", &self.write_count)
            .field("physical_read_count", &self.physical_read_count)
            .field("physical_write_count", &self.physical_write_count)
            .finish()
    }
}
