//! 标识类型定义
//!
//! 缓存层只把对象和 chunk 当作可比较的键使用，不解释其内部含义。
//!
//! ## 设计原则
//!
//! 1. **非持有引用** - 缓存槽记录对象标识，但不维持对象存活；
//!    对象删除/截断时由上层调用失效接口清除关联
//! 2. **newtype 封装** - 避免裸整数互相混淆

use core::fmt;

/// 对象标识
///
/// 对应 yaffs 的 `struct yaffs_obj *` 回指。缓存槽用它与上层请求
/// 做相等比较，属于非持有的身份引用：对象生命周期由对象树层管理，
/// 对象失效时通过 [`ChunkCache::invalidate_object`] 清除缓存关联。
///
/// [`ChunkCache::invalidate_object`]: crate::cache::ChunkCache::invalidate_object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}
