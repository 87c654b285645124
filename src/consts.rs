//! yaffs 短操作块缓存常量定义
//!
//! 这个模块包含了缓存层用到的所有常量定义，包括：
//! - chunk 尺寸相关常量
//! - 缓存容量相关常量
//! - LRU 计数器相关常量

//=============================================================================
// chunk 尺寸
//=============================================================================

/// 默认 chunk 数据大小（2048 字节，典型 2KiB 页 NAND）
pub const DEFAULT_CHUNK_DATA_SIZE: usize = 2048;

/// 最小 chunk 数据大小（512 字节，小页 NAND）
pub const MIN_CHUNK_DATA_SIZE: usize = 512;

/// 最大 chunk 数据大小（16384 字节）
pub const MAX_CHUNK_DATA_SIZE: usize = 16384;

//=============================================================================
// 缓存容量
//=============================================================================

/// 每设备短操作缓存槽数量上限
///
/// 缓存故意做得很小：槽数量保持在几十以内，线性扫描比
/// 索引结构更简单也更快，配置值超过上限时会被钳制。
pub const MAX_SHORT_OP_CACHES: usize = 20;

/// 默认短操作缓存槽数量
pub const DEFAULT_SHORT_OP_CACHES: usize = 10;

//=============================================================================
// LRU 计数器
//=============================================================================

/// `use_counter` 重整阈值
///
/// 递增计数器越过该值后，在下一次标记使用前将所有槽的
/// `last_use` 按相对新旧次序重新编号，防止计数器溢出。
pub const CACHE_USE_RESET_THRESHOLD: u32 = 100_000_000;
