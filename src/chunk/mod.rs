//! chunk 设备抽象
//!
//! 提供 chunk 设备接口和经过短操作缓存的 chunk 级 I/O。
//! chunk/device.rs 定义协作者 trait（写穿/读取 chunk）和设备绑定
//! `ChunkDev`：一个设备实例配一个缓存管理器，并把写回转发给底层设备

//! chunk/io.rs 提供字节级短读短写，读写都先走缓存，未命中时抓槽并从
//! 设备装入；缓存不可用（槽全被锁定或容量为 0）时退化为直接 I/O，
//! 整块覆盖写则先使缓存失效再直接写穿

//! chunk/handle.rs 提供对某个缓存 chunk 的 RAII 引用，持有期间槽被
//! 锁定，保证多步操作中途不会被淘汰

mod device;
mod handle;
mod io;
mod lock;

pub use device::{ChunkDev, ChunkDevice, ChunkWriter};
pub use handle::CachedChunk;
pub use lock::{DeviceLock, NoLock};
