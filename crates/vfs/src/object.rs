//! 核心对象的分配记账
//!
//! 超级块、inode、dentry 和打开文件在构造时各自领取一个 [`ObjectSlot`]，
//! 对象析构时归还。每类对象的上限由 [`VfsOps::max_objects`](crate::VfsOps::max_objects)
//! 提供，超过上限时构造失败并返回 [`FsError::AllocFailed`]。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{FsError, vfs_ops};

/// 核心对象种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// 超级块
    SuperBlock = 0,
    /// 索引节点
    Inode = 1,
    /// 目录项
    Dentry = 2,
    /// 打开文件
    File = 3,
}

static LIVE: [AtomicUsize; 4] = [
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
];

/// 已领取的对象配额，析构时归还
#[derive(Debug)]
pub(crate) struct ObjectSlot {
    kind: ObjectKind,
}

/// 领取一个配额
pub(crate) fn acquire(kind: ObjectKind) -> Result<ObjectSlot, FsError> {
    let limit = vfs_ops().max_objects(kind);
    let live = &LIVE[kind as usize];
    let mut cur = live.load(Ordering::Relaxed);
    loop {
        if limit != 0 && cur >= limit {
            log::warn!("vfs: {:?} limit {} reached", kind, limit);
            return Err(FsError::AllocFailed);
        }
        match live.compare_exchange_weak(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return Ok(ObjectSlot { kind }),
            Err(actual) => cur = actual,
        }
    }
}

impl Drop for ObjectSlot {
    fn drop(&mut self) {
        LIVE[self.kind as usize].fetch_sub(1, Ordering::AcqRel);
    }
}

/// 各类对象的存活数量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectStats {
    /// 超级块
    pub super_blocks: usize,
    /// inode
    pub inodes: usize,
    /// dentry
    pub dentries: usize,
    /// 打开文件
    pub files: usize,
}

/// 读取当前存活对象数量
pub fn object_stats() -> ObjectStats {
    let load = |kind: ObjectKind| LIVE[kind as usize].load(Ordering::Acquire);
    ObjectStats {
        super_blocks: load(ObjectKind::SuperBlock),
        inodes: load(ObjectKind::Inode),
        dentries: load(ObjectKind::Dentry),
        files: load(ObjectKind::File),
    }
}
