//! 短操作块缓存模块
//!
//! 这个模块提供了完整的短操作缓存实现，对应 yaffs 的 short op cache 功能。
//!
//! # 主要组件
//!
//! - [`CacheSlot`] - 单个缓存槽，包含一个 chunk 的数据和元数据
//! - [`ChunkCache`] - 缓存管理器，固定槽数组 + 线性扫描 LRU 淘汰
//! - [`SlotFlags`] - 缓存槽状态标志
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 设计原理
//!
//! 每设备只有一小组（~10 个）缓存槽，所以不需要任何聪明的索引结构：
//!
//! 1. **固定槽数组**：挂载时一次性分配，卸载时随所有权释放，
//!    槽缓冲区整个生命周期内不再重新分配
//! 2. **线性扫描**：查找、选淘汰对象都是 O(n_slots) 的同步扫描，
//!    容量这么小时比哈希/树索引更快也更简单，且扫描顺序确定，
//!    便于对淘汰决策写出确定性的测试
//! 3. **严格 LRU**：单调递增的 `use_counter` 作为新旧序，不用时钟
//! 4. **脏槽即唯一副本**：脏槽在写回前是该 chunk 数据的唯一有效
//!    拷贝，flush 失败时槽保持脏，绝不静默丢弃
//!
//! # 与 yaffs 的对应关系
//!
//! | yaffs C                          | yaffs_core                            |
//! |----------------------------------|---------------------------------------|
//! | `struct yaffs_cache`             | [`CacheSlot`]                         |
//! | `struct yaffs_cache_manager`     | [`ChunkCache`]                        |
//! | `yaffs_find_chunk_cache()`       | [`ChunkCache::find()`]                |
//! | `yaffs_grab_chunk_cache()`       | [`ChunkCache::allocate()`]            |
//! | `yaffs_use_cache()`              | [`ChunkCache::mark_used()`]           |
//! | `yaffs_flush_single_cache()`     | [`ChunkCache::flush_one()`]           |
//! | `yaffs_flush_file_cache()`       | [`ChunkCache::flush_object()`]        |
//! | `yaffs_flush_whole_cache()`      | [`ChunkCache::flush_all()`]           |
//! | `yaffs_invalidate_chunk_cache()` | [`ChunkCache::invalidate_chunk()`]    |
//! | `yaffs_invalidate_file_cache()`  | [`ChunkCache::invalidate_object()`]   |
//! | `yaffs_count_dirty_caches()`     | [`ChunkCache::count_dirty()`]         |
//! | `yaffs_obj_cache_dirty()`        | [`ChunkCache::is_object_dirty()`]     |
//! | `yaffs_cache_init()`             | [`ChunkCache::new()`]                 |
//! | `yaffs_cache_deinit()`           | *(Drop，所有权保证不会二次释放)*       |
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use yaffs_core::cache::ChunkCache;
//! use yaffs_core::ObjectId;
//!
//! // 创建缓存（10 个槽，每槽 2048 字节）
//! let mut cache = ChunkCache::new(10, 2048)?;
//!
//! let obj = ObjectId(257);
//! let id = match cache.find(obj, 3) {
//!     Some(id) => id,
//!     None => {
//!         // 未命中：抓一个槽（必要时淘汰 LRU 槽并写回脏数据）
//!         let id = cache.allocate(&mut writer)?.expect("cache available");
//!         cache.bind(id, obj, 3);
//!         // 调用方自行装入数据 ...
//!         id
//!     }
//! };
//! cache.mark_used(id, true); // 写访问，槽变脏
//!
//! // 对象删除时丢弃其全部缓存，不写回
//! cache.invalidate_object(obj);
//! ```
//!
//! # 内存分配要求
//!
//! 本模块依赖 `alloc` crate，需要用户提供全局分配器。
//! 槽缓冲区用 `try_reserve` 分配，失败报告为初始化错误而不是 panic。

mod chunk_cache;
mod slot;

pub use chunk_cache::{CacheStats, ChunkCache};
pub use slot::{CacheSlot, SlotFlags, SlotId};
