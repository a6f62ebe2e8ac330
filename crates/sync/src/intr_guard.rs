//! 中断保护器
//!
//! 关中断只能排除本 CPU 上中断处理程序的并发；跨 CPU 的互斥仍由自旋锁完成。

use crate::arch_ops;

/// 作用域内关闭本地中断，离开作用域时恢复进入前的状态。
///
/// 嵌套使用时必须按获取的逆序释放，否则外层会提前打开中断。
pub struct IntrGuard {
    saved: usize,
}

impl IntrGuard {
    /// 关闭本地中断并记录之前的状态
    pub fn new() -> Self {
        // SAFETY: saved 只会在 drop 中原样恢复
        let saved = unsafe { arch_ops().read_and_disable_interrupts() };
        Self { saved }
    }

    /// 进入临界区之前中断是否处于开启状态
    pub fn was_enabled(&self) -> bool {
        self.saved & arch_ops().interrupt_enable_mask() != 0
    }
}

impl Default for IntrGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IntrGuard {
    fn drop(&mut self) {
        // SAFETY: saved 来自 read_and_disable_interrupts
        unsafe { arch_ops().restore_interrupts(self.saved) };
    }
}
