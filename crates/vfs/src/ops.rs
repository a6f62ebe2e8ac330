//! VFS 运行时操作 trait 定义和注册
//!
//! VFS 层需要的外部依赖（时钟、对象配额）通过 [`VfsOps`] 抽象，
//! 由内核在启动时注册，测试中由 mock 实现注册。

use core::sync::atomic::{AtomicUsize, Ordering};
use uapi::time::TimeSpec;

use crate::ObjectKind;

/// VFS 运行时操作
pub trait VfsOps: Send + Sync {
    /// 获取当前时间
    fn timespec_now(&self) -> TimeSpec;

    /// 某类对象同时存活的上限，0 表示不限制
    fn max_objects(&self, _kind: ObjectKind) -> usize {
        0
    }
}

static VFS_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static VFS_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册 VFS 操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_vfs_ops(ops: &'static dyn VfsOps) {
    let ptr = ops as *const dyn VfsOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn VfsOps, (usize, usize)>(ptr) };
    VFS_OPS_VTABLE.store(vtable, Ordering::Release);
    VFS_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的 VFS 操作实现
///
/// # Panics
/// 如果尚未调用 [`register_vfs_ops`] 注册实现，则 panic
#[inline]
pub fn vfs_ops() -> &'static dyn VfsOps {
    let data = VFS_OPS_DATA.load(Ordering::Acquire);
    let vtable = VFS_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("vfs: VfsOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn VfsOps>((data, vtable)) }
}

/// 当前时间的简写
#[inline]
pub(crate) fn now() -> TimeSpec {
    vfs_ops().timespec_now()
}
