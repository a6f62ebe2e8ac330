//! 同步原语
//!
//! 为 VFS 等内核模块提供锁原语：
//!
//! - [`SpinLock`] - 关中断的互斥自旋锁，用于保护单个对象的字段
//! - [`RwLock`] - 读写自旋锁，用于读多写少的全局表
//! - [`IntrGuard`] - 中断保护器
//!
//! # 架构依赖
//!
//! 中断开关由使用方通过 [`ArchOps`] 提供，使用任何自旋锁之前必须先调用
//! [`register_arch_ops`]。

#![no_std]

mod intr_guard;
mod rwlock;
mod spin_lock;

pub use intr_guard::IntrGuard;
pub use rwlock::{RawRwSpinLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use spin_lock::{RawSpinLock, RawSpinLockGuard, SpinLock, SpinLockGuard};

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作
///
/// 由内核（或测试桩）实现并注册，提供本地中断控制。
pub trait ArchOps: Send + Sync {
    /// 读取当前中断状态并关闭中断
    ///
    /// # Safety
    /// 返回值必须原样交给 [`ArchOps::restore_interrupts`]
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// `flags` 必须来自 [`ArchOps::read_and_disable_interrupts`]
    unsafe fn restore_interrupts(&self, flags: usize);

    /// 中断使能位掩码
    fn interrupt_enable_mask(&self) -> usize;

    /// 当前 CPU 编号
    fn cpu_id(&self) -> usize;
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在其它 CPU 启动前调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: trait object 指针由 (data, vtable) 两个字组成
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 获取已注册的架构操作
///
/// # Panics
/// 尚未调用 [`register_arch_ops`] 时 panic
#[inline]
pub(crate) fn arch_ops() -> &'static dyn ArchOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("sync: ArchOps not registered");
    }
    // SAFETY: 两个字均由 register_arch_ops 写入，指向 'static 对象
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) }
}
