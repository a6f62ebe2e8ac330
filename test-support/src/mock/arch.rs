//! 架构相关操作的 Mock 实现
//!
//! 宿主机上没有真正的中断，这里只记录“中断是否开启”以及关中断的次数。

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 中断使能位
pub const MOCK_INTR_ENABLE: usize = 0x2;

/// Mock 架构操作
pub struct MockArchOps {
    pub interrupt_state: AtomicBool,
    pub disable_count: AtomicUsize,
    pub cpu_id: AtomicUsize,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            interrupt_state: AtomicBool::new(true),
            disable_count: AtomicUsize::new(0),
            cpu_id: AtomicUsize::new(0),
        }
    }

    /// # Safety
    /// 与真实实现保持一致的签名，Mock 本身没有前置条件
    pub unsafe fn read_and_disable_interrupts(&self) -> usize {
        self.disable_count.fetch_add(1, Ordering::Relaxed);
        if self.interrupt_state.swap(false, Ordering::SeqCst) {
            MOCK_INTR_ENABLE
        } else {
            0
        }
    }

    /// # Safety
    /// 与真实实现保持一致的签名，Mock 本身没有前置条件
    pub unsafe fn restore_interrupts(&self, flags: usize) {
        self.interrupt_state
            .store(flags & MOCK_INTR_ENABLE != 0, Ordering::SeqCst);
    }

    pub fn interrupt_enable_mask(&self) -> usize {
        MOCK_INTR_ENABLE
    }

    pub fn cpu_id(&self) -> usize {
        self.cpu_id.load(Ordering::Relaxed)
    }
}

impl Default for MockArchOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
