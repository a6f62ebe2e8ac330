//! Inode 层
//!
//! 每个 inode 是一个文件或目录的内存元数据，带原子引用计数，挂在所属超级块的
//! inode 缓存中。目录上的命名空间操作（create、rm、mkdir、rmdir、rename）
//! 通过父目录 inode 的 [`InodeOps`] 分发，调用时总是持有父目录 inode 的锁，
//! 锁的持有由 [`InodeGuard`] 参数体现。

use alloc::sync::{Arc, Weak};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use log::{debug, warn};
use sync::{SpinLock, SpinLockGuard};
use uapi::time::TimeSpec;

use crate::object::{self, ObjectKind, ObjectSlot};
use crate::refcount::RefCount;
use crate::{Dentry, FileOps, FsError, SuperBlock};

/// inode 号
pub type InodeNo = usize;

/// 文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    /// 普通文件
    File,
    /// 目录
    Directory,
}

/// 受 inode 锁保护的可变元数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InodeState {
    /// 访问时间
    pub atime: TimeSpec,
    /// 修改时间
    pub mtime: TimeSpec,
    /// 创建时间
    pub ctime: TimeSpec,
    /// 文件大小（字节）
    pub size: usize,
    /// 占用块数
    pub blocks: usize,
    /// 末块已用字节数（整块时为 0）
    pub bytes: usize,
}

impl InodeState {
    /// 三个时间戳都设为 `now` 的空状态
    pub fn with_time(now: TimeSpec) -> Self {
        Self {
            atime: now,
            mtime: now,
            ctime: now,
            ..Self::default()
        }
    }

    /// 设置大小并同步块数和末块字节数
    pub fn set_size(&mut self, size: usize, block_size: usize) {
        self.size = size;
        if block_size == 0 {
            self.blocks = 0;
            self.bytes = size;
        } else {
            self.blocks = size.div_ceil(block_size);
            self.bytes = size % block_size;
        }
    }
}

/// 文件元数据快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeMetadata {
    /// inode 号
    pub ino: InodeNo,
    /// 文件类型
    pub inode_type: InodeType,
    /// 所属文件系统的类型标签
    pub fs_tag: u32,
    /// 大小
    pub size: usize,
    /// 块数
    pub blocks: usize,
    /// 末块字节数
    pub bytes: usize,
    /// 访问时间
    pub atime: TimeSpec,
    /// 修改时间
    pub mtime: TimeSpec,
    /// 创建时间
    pub ctime: TimeSpec,
}

/// 目录 inode 的命名空间操作
///
/// 每个方法都在持有父目录 inode 锁的情况下调用，`dir` 即该锁的守卫。
/// 驱动只负责后备存储的变化，dentry 树由 VFS 在调用成功之后更新。
pub trait InodeOps: Send + Sync {
    /// 在目录中查找名字，返回 inode 号；不存在返回 `NotFound`
    fn lookup(&self, dir: &InodeGuard<'_>, name: &str) -> Result<InodeNo, FsError>;

    /// 为尚未实例化的 `dentry` 创建普通文件
    fn create(&self, _dir: &mut InodeGuard<'_>, _dentry: &Dentry) -> Result<InodeNo, FsError> {
        Err(FsError::NotSupported)
    }

    /// 删除 `dentry` 指向的普通文件的目录项
    fn rm(&self, _dir: &mut InodeGuard<'_>, _dentry: &Dentry) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 为尚未实例化的 `dentry` 创建目录
    fn mkdir(&self, _dir: &mut InodeGuard<'_>, _dentry: &Dentry) -> Result<InodeNo, FsError> {
        Err(FsError::NotSupported)
    }

    /// 删除空目录 `dentry`
    fn rmdir(&self, _dir: &mut InodeGuard<'_>, _dentry: &Dentry) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }

    /// 将 `dentry` 移动为 `new_dir` 下的 `new_name`
    ///
    /// 同目录内改名时 `new_dir` 为 `None`。
    fn rename(
        &self,
        _old_dir: &mut InodeGuard<'_>,
        _dentry: &Dentry,
        _new_dir: Option<&mut InodeGuard<'_>>,
        _new_name: &str,
    ) -> Result<(), FsError> {
        Err(FsError::NotSupported)
    }
}

/// 索引节点
pub struct Inode {
    _slot: ObjectSlot,
    state: SpinLock<InodeState>,
    pub(crate) count: RefCount,
    sb: Weak<SuperBlock>,
    ino: InodeNo,
    itype: InodeType,
    pending_delete: AtomicBool,
    ops: Arc<dyn InodeOps>,
    fops: Arc<dyn FileOps>,
}

impl Inode {
    /// 由驱动的 `alloc_inode` 调用，新 inode 引用计数为 1
    pub fn new(
        sb: &Arc<SuperBlock>,
        ino: InodeNo,
        itype: InodeType,
        state: InodeState,
        ops: Arc<dyn InodeOps>,
        fops: Arc<dyn FileOps>,
    ) -> Result<Arc<Self>, FsError> {
        Ok(Arc::new(Self {
            _slot: object::acquire(ObjectKind::Inode)?,
            state: SpinLock::new(state),
            count: RefCount::new(1),
            sb: Arc::downgrade(sb),
            ino,
            itype,
            pending_delete: AtomicBool::new(false),
            ops,
            fops,
        }))
    }

    /// inode 号
    pub fn ino(&self) -> InodeNo {
        self.ino
    }

    /// 文件类型
    pub fn itype(&self) -> InodeType {
        self.itype
    }

    /// 是否为目录
    pub fn is_dir(&self) -> bool {
        self.itype == InodeType::Directory
    }

    /// 当前引用计数
    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// 所属超级块；超级块已被回收时返回 `NoDevice`
    pub fn super_block(&self) -> Result<Arc<SuperBlock>, FsError> {
        self.sb.upgrade().ok_or(FsError::NoDevice)
    }

    /// 是否已被删除，等待最后一个引用释放
    pub fn is_pending_delete(&self) -> bool {
        self.pending_delete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_pending_delete(&self) {
        self.pending_delete.store(true, Ordering::Release);
    }

    /// 加锁访问可变元数据
    pub fn lock(&self) -> InodeGuard<'_> {
        InodeGuard {
            inode: self,
            state: self.state.lock(),
        }
    }

    pub(crate) fn ops(&self) -> &Arc<dyn InodeOps> {
        &self.ops
    }

    /// 文件操作表
    pub fn fops(&self) -> &Arc<dyn FileOps> {
        &self.fops
    }

    /// 元数据快照
    pub fn metadata(&self) -> InodeMetadata {
        let fs_tag = self.sb.upgrade().map(|sb| sb.fs_tag()).unwrap_or(0);
        let state = self.state.lock();
        InodeMetadata {
            ino: self.ino,
            inode_type: self.itype,
            fs_tag,
            size: state.size,
            blocks: state.blocks,
            bytes: state.bytes,
            atime: state.atime,
            mtime: state.mtime,
            ctime: state.ctime,
        }
    }
}

impl core::fmt::Debug for Inode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Inode")
            .field("ino", &self.ino)
            .field("itype", &self.itype)
            .field("count", &self.count)
            .finish()
    }
}

/// inode 锁守卫
///
/// 解引用为 [`InodeState`]，同时可以取回被锁住的 inode。
pub struct InodeGuard<'a> {
    inode: &'a Inode,
    state: SpinLockGuard<'a, InodeState>,
}

impl<'a> InodeGuard<'a> {
    /// 被锁住的 inode
    pub fn inode(&self) -> &'a Inode {
        self.inode
    }
}

impl Deref for InodeGuard<'_> {
    type Target = InodeState;

    fn deref(&self) -> &InodeState {
        &self.state
    }
}

impl DerefMut for InodeGuard<'_> {
    fn deref_mut(&mut self) -> &mut InodeState {
        &mut self.state
    }
}

/// 获取 `ino` 对应的 inode，引用计数加一
///
/// 先查超级块的 inode 缓存；未命中时调用驱动的 `alloc_inode`，新 inode
/// 计数为 1 并加入缓存。若并发地已有同号 inode 进入缓存，新分配的那个被销毁，
/// 返回缓存中的实例。
pub fn get_inode(sb: &Arc<SuperBlock>, ino: InodeNo) -> Result<Arc<Inode>, FsError> {
    if let Some(inode) = sb.cached_inode(ino)? {
        return Ok(inode);
    }
    debug!("vfs: inode cache miss, ino={}", ino);
    let fresh = sb.ops().alloc_inode(sb, ino)?;
    let inserted = sb.insert_inode(&fresh).inspect_err(|_| {
        if let Err(e) = sb.ops().destroy_inode(&fresh) {
            warn!("vfs: destroy_inode({}) failed: {:?}", ino, e);
        }
    })?;
    match inserted {
        None => Ok(fresh),
        Some(existing) => {
            if let Err(e) = sb.ops().destroy_inode(&fresh) {
                warn!("vfs: destroy_inode({}) failed: {:?}", ino, e);
            }
            Ok(existing)
        }
    }
}

/// 释放一个 inode 引用
///
/// 计数归零时从缓存摘除，再按是否带删除标记调用驱动的 `delete_inode` 或 `destroy_inode`。
/// 对计数已为 0 的 inode 调用会被拒绝并返回 `InvalidArgument`。
pub fn put_inode(inode: &Arc<Inode>) -> Result<(), FsError> {
    let Some(sb) = inode.sb.upgrade() else {
        inode.count.dec()?;
        return Ok(());
    };
    let reclaim = sb.with_inodes(|map| -> Result<bool, FsError> {
        if inode.count.dec()? > 0 || !inode.count.try_kill() {
            return Ok(false);
        }
        if map
            .get(&inode.ino)
            .is_some_and(|cached| Arc::ptr_eq(cached, inode))
        {
            map.remove(&inode.ino);
        }
        Ok(true)
    });
    let reclaim = reclaim.inspect_err(|_| {
        warn!("vfs: put_inode on unreferenced inode {}", inode.ino);
    })?;
    if !reclaim {
        return Ok(());
    }
    if inode.is_pending_delete() {
        debug!("vfs: deleting inode {}", inode.ino);
        sb.ops().delete_inode(inode)
    } else {
        sb.ops().destroy_inode(inode)
    }
}
