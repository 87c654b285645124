//! chunk 设备串行化接口
//!
//! 缓存管理器自身不做互斥：槽扫描都是小容量上的同步操作，
//! 锁的粒度应该在设备层。设计上假定对单个设备缓存的所有访问
//! （读写路径、flush、失效）由调用方先持有设备锁再进入，
//! 槽上的 `locked` 标志只保护单个多步操作不被并发分配复用。

use crate::error::Result;

/// 设备级串行化 trait
///
/// [`ChunkDev`] 不含内部锁，多线程环境在外层用它把对一个设备的
/// 缓存操作串成一条线。嵌入式环境通常拿 RTOS 的互斥信号量实现；
/// 单线程环境用 [`NoLock`] 即可。
///
/// [`ChunkDev`]: crate::chunk::ChunkDev
pub trait DeviceLock: Send {
    /// 取得设备独占访问权
    ///
    /// # 错误
    ///
    /// 获取失败（信号量被毁、持有者 panic 等）返回 `Busy`，
    /// 调用方不得进入缓存操作。
    fn acquire(&self) -> Result<()>;

    /// 交还设备独占访问权
    fn release(&self) -> Result<()>;

    /// 在持锁状态下执行一段设备操作
    ///
    /// 取锁、执行、还锁。还锁失败的错误会盖过闭包的正常返回，
    /// 因为锁状态已经不可信。
    fn scoped<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.acquire()?;
        let out = f();
        self.release()?;
        Ok(out)
    }
}

/// 单线程环境的空实现
///
/// 取锁、还锁都是直接成功，零开销。
pub struct NoLock;

impl DeviceLock for NoLock {
    #[inline]
    fn acquire(&self) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn release(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "std")]
mod std_locks {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use std::sync::{Mutex, RwLock};

    impl DeviceLock for Mutex<()> {
        fn acquire(&self) -> Result<()> {
            // 中毒视为锁已不可信
            self.lock()
                .map(|guard| drop(guard))
                .map_err(|_| Error::new(ErrorKind::Busy, "device mutex poisoned"))
        }

        fn release(&self) -> Result<()> {
            // guard 在 acquire 里就被放掉了，这个实现只提供
            // "曾经排过队" 的串行化语义，适合做占位
            Ok(())
        }
    }

    impl DeviceLock for RwLock<()> {
        fn acquire(&self) -> Result<()> {
            self.write()
                .map(|guard| drop(guard))
                .map_err(|_| Error::new(ErrorKind::Busy, "device rwlock poisoned"))
        }

        fn release(&self) -> Result<()> {
            Ok(())
        }
    }
}
