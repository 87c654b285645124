//! yaffs_core: Pure Rust 实现的 yaffs 短操作块缓存（short op cache）
//!
//! yaffs 是面向 NAND flash 的文件系统。在没有上层页缓存的环境里，
//! 大量读写是短小的顺序操作（例如逐段扫描/写入一个 jpeg 文件），
//! 每设备一小组（~10 个）chunk 缓存槽就能带来巨大的性能收益，
//! 同时代码保持 dumb-as-a-rock 的简单。本 crate 提供：
//!
//! - **零 unsafe 代码**
//! - **Rust 惯用风格**的 API（所有权管理缓冲区生命周期，`Option` 表达空槽）
//! - **完整的类型安全**
//!
//! # 示例
//!
//! ```rust,ignore
//! use yaffs_core::{ChunkDevice, ChunkDev, ObjectId, Result};
//!
//! // 实现 ChunkDevice trait
//! struct MyNand {
//!     // ...
//! }
//!
//! impl ChunkDevice for MyNand {
//!     // 实现必要的方法
//!     // ...
//! }
//!
//! fn main() -> Result<()> {
//!     let nand = MyNand::new();
//!     let mut dev = ChunkDev::with_default_cache(nand)?;
//!
//!     // 短读：命中缓存时不触碰 flash
//!     let mut buf = [0u8; 64];
//!     dev.read_bytes(ObjectId(257), 1, 128, &mut buf)?;
//!
//!     // 所有脏 chunk 写回 flash
//!     dev.sync()?;
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`types`] - 标识类型定义
//! - [`cache`] - 短操作块缓存（slot 分配、LRU 淘汰、flush、失效）
//! - [`chunk`] - chunk 设备抽象和缓存式 chunk I/O

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 标识类型定义
pub mod types;

/// 短操作块缓存
pub mod cache;

/// chunk 设备抽象
pub mod chunk;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 标识类型
pub use types::ObjectId;

// 缓存
pub use cache::{CacheSlot, CacheStats, ChunkCache, SlotFlags, SlotId};

// chunk 设备
pub use chunk::{CachedChunk, ChunkDev, ChunkDevice, ChunkWriter, DeviceLock, NoLock};
