//! 原子引用计数
//!
//! 计数归零后可以通过 [`RefCount::try_kill`] 置为 DEAD，之后任何递增都会失败，
//! 从而避免“归零后被回收的对象又被重新引用”。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::FsError;

const DEAD: usize = usize::MAX;

pub(crate) struct RefCount(AtomicUsize);

impl RefCount {
    pub(crate) const fn new(count: usize) -> Self {
        Self(AtomicUsize::new(count))
    }

    /// 当前计数，已回收的对象返回 0
    pub(crate) fn get(&self) -> usize {
        match self.0.load(Ordering::Acquire) {
            DEAD => 0,
            n => n,
        }
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.0.load(Ordering::Acquire) == DEAD
    }

    /// 加一，返回新值；对象已回收时返回 `NotFound`
    pub(crate) fn inc(&self) -> Result<usize, FsError> {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            if cur == DEAD {
                return Err(FsError::NotFound);
            }
            match self
                .0
                .compare_exchange_weak(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Ok(cur + 1),
                Err(actual) => cur = actual,
            }
        }
    }

    /// 减一，返回新值；计数已为 0 时拒绝并保持不变
    pub(crate) fn dec(&self) -> Result<usize, FsError> {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            if cur == 0 || cur == DEAD {
                return Err(FsError::InvalidArgument);
            }
            match self
                .0
                .compare_exchange_weak(cur, cur - 1, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Ok(cur - 1),
                Err(actual) => cur = actual,
            }
        }
    }

    /// 计数仍为 0 时标记为 DEAD，成功者负责回收
    pub(crate) fn try_kill(&self) -> bool {
        self.0
            .compare_exchange(0, DEAD, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl core::fmt::Debug for RefCount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_dead() {
            f.write_str("DEAD")
        } else {
            write!(f, "{}", self.get())
        }
    }
}
