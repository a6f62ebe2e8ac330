//! VFS 运行时操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `vfs` crate（避免循环依赖）。
//! `vfs` 的测试代码为自己的包装类型实现 `VfsOps`，再转发到这里。

use core::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// 对象种类数量（SuperBlock、Inode、Dentry、File）
pub const OBJECT_KINDS: usize = 4;

/// Mock 的 VFS 运行时操作
///
/// - 时钟每读取一次前进一秒，便于断言时间戳被刷新
/// - 每类对象的分配上限可在测试中调整，0 表示不限制
pub struct MockVfsOps {
    clock: AtomicI64,
    limits: [AtomicUsize; OBJECT_KINDS],
}

impl MockVfsOps {
    pub const fn new() -> Self {
        Self {
            clock: AtomicI64::new(1),
            limits: [
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
            ],
        }
    }

    /// 读取并推进时钟（秒）
    pub fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// 当前时钟值，不推进
    pub fn now(&self) -> i64 {
        self.clock.load(Ordering::Relaxed)
    }

    pub fn limit(&self, kind: usize) -> usize {
        self.limits[kind].load(Ordering::Relaxed)
    }

    pub fn set_limit(&self, kind: usize, limit: usize) {
        self.limits[kind].store(limit, Ordering::Relaxed);
    }
}

impl Default for MockVfsOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_VFS_OPS: MockVfsOps = MockVfsOps::new();
