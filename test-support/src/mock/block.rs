//! 块设备的 Mock 实现
//!
//! 内存中的 RamDisk，读写以块为单位，越界或被注入故障时返回 false
//! （与驱动层 `read_block`/`write_block` 的返回约定一致）。

use alloc::vec;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::hint;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 内存块设备
pub struct RamDisk {
    block_size: usize,
    total_blocks: usize,
    busy: AtomicBool,
    data: UnsafeCell<Vec<u8>>,
    /// 为 true 时所有读操作失败
    pub fail_reads: AtomicBool,
    /// 成功读取的块数
    pub reads: AtomicUsize,
    /// 成功写入的块数
    pub writes: AtomicUsize,
}

// SAFETY: data 只在持有 busy 时访问
unsafe impl Sync for RamDisk {}
unsafe impl Send for RamDisk {}

impl RamDisk {
    pub fn new(block_size: usize, total_blocks: usize) -> Self {
        Self {
            block_size,
            total_blocks,
            busy: AtomicBool::new(false),
            data: UnsafeCell::new(vec![0; block_size * total_blocks]),
            fail_reads: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    fn with_data<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        while self
            .busy
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
        // SAFETY: 已独占 busy
        let out = f(unsafe { &mut *self.data.get() });
        self.busy.store(false, Ordering::Release);
        out
    }

    pub fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool {
        if self.fail_reads.load(Ordering::Relaxed)
            || block_id >= self.total_blocks
            || buf.len() < self.block_size
        {
            return false;
        }
        let start = block_id * self.block_size;
        let len = self.block_size;
        self.with_data(|data| buf[..len].copy_from_slice(&data[start..start + len]));
        self.reads.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn write_block(&self, block_id: usize, buf: &[u8]) -> bool {
        if block_id >= self.total_blocks || buf.len() < self.block_size {
            return false;
        }
        let start = block_id * self.block_size;
        let len = self.block_size;
        self.with_data(|data| data[start..start + len].copy_from_slice(&buf[..len]));
        self.writes.fetch_add(1, Ordering::Relaxed);
        true
    }
}
