//! 超级块
//!
//! 一个超级块代表一个已挂载的文件系统实例：后备块设备、几何参数、根 dentry、
//! inode 缓存以及驱动提供的 [`SuperBlockOps`]。超级块比它分配的每个 inode 活得更久，
//! inode 只持有指向它的 `Weak`。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, warn};
use sync::SpinLock;

use crate::object::{self, ObjectKind, ObjectSlot};
use crate::{BlockDevice, Dentry, DentryOps, FsError, Inode, InodeNo, get_inode, put_inode};

/// 超级块几何参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuperBlockInfo {
    /// inode 总数
    pub inode_count: u32,
    /// 块总数
    pub block_count: u32,
    /// 块大小（字节）
    pub block_size: u32,
    /// 单个文件的最大字节数
    pub max_file: u32,
}

/// 文件系统级操作，由驱动在 `read_super` 时绑定
pub trait SuperBlockOps: Send + Sync {
    /// 为 `ino` 构造内存 inode（从后备存储读取元数据）
    ///
    /// 资源耗尽返回 `AllocFailed`，后备存储读取失败返回 `IoError`。
    fn alloc_inode(&self, sb: &Arc<SuperBlock>, ino: InodeNo) -> Result<Arc<Inode>, FsError>;

    /// 释放内存中的 inode，不触碰后备存储
    fn destroy_inode(&self, _inode: &Inode) -> Result<(), FsError> {
        Ok(())
    }

    /// 删除 inode 及其后备存储
    fn delete_inode(&self, inode: &Inode) -> Result<(), FsError>;

    /// 回写超级块
    fn write_super(&self, _sb: &SuperBlock) -> Result<(), FsError> {
        Ok(())
    }

    /// 同步整个文件系统
    fn sync_fs(&self, _sb: &SuperBlock) -> Result<(), FsError> {
        Ok(())
    }

    /// 该文件系统的 dentry 操作
    fn dentry_ops(&self) -> Option<Arc<dyn DentryOps>> {
        None
    }
}

/// 超级块
pub struct SuperBlock {
    _slot: ObjectSlot,
    bdev: Option<Arc<dyn BlockDevice>>,
    fs_tag: u32,
    info: SuperBlockInfo,
    root_ino: InodeNo,
    root: SpinLock<Option<Arc<Dentry>>>,
    ops: Arc<dyn SuperBlockOps>,
    inodes: SpinLock<BTreeMap<InodeNo, Arc<Inode>>>,
    /// 跨目录 rename 的串行化锁
    pub(crate) rename_lock: SpinLock<()>,
}

impl SuperBlock {
    /// 由驱动的 `read_super` 调用
    pub fn new(
        bdev: Option<Arc<dyn BlockDevice>>,
        fs_tag: u32,
        info: SuperBlockInfo,
        root_ino: InodeNo,
        ops: Arc<dyn SuperBlockOps>,
    ) -> Result<Arc<Self>, FsError> {
        Ok(Arc::new(Self {
            _slot: object::acquire(ObjectKind::SuperBlock)?,
            bdev,
            fs_tag,
            info,
            root_ino,
            root: SpinLock::new(None),
            ops,
            inodes: SpinLock::new(BTreeMap::new()),
            rename_lock: SpinLock::new(()),
        }))
    }

    /// 后备块设备
    pub fn block_device(&self) -> Option<&Arc<dyn BlockDevice>> {
        self.bdev.as_ref()
    }

    /// 文件系统类型标签
    pub fn fs_tag(&self) -> u32 {
        self.fs_tag
    }

    /// 几何参数
    pub fn info(&self) -> SuperBlockInfo {
        self.info
    }

    /// 根 inode 号
    pub fn root_ino(&self) -> InodeNo {
        self.root_ino
    }

    /// 根 dentry（不增加引用计数）
    pub fn root_dentry(&self) -> Option<Arc<Dentry>> {
        self.root.lock().clone()
    }

    /// 缓存中的 inode 数量
    pub fn cached_inodes(&self) -> usize {
        self.inodes.lock().len()
    }

    pub(crate) fn ops(&self) -> &Arc<dyn SuperBlockOps> {
        &self.ops
    }

    /// 回写超级块并同步文件系统
    pub fn sync(&self) -> Result<(), FsError> {
        self.ops.write_super(self)?;
        self.ops.sync_fs(self)
    }

    /// 命中缓存时返回加过引用的 inode
    pub(crate) fn cached_inode(&self, ino: InodeNo) -> Result<Option<Arc<Inode>>, FsError> {
        let inodes = self.inodes.lock();
        match inodes.get(&ino) {
            Some(inode) => {
                inode.count.inc()?;
                Ok(Some(inode.clone()))
            }
            None => Ok(None),
        }
    }

    /// 把新分配的 inode 放入缓存；若已有同号 inode 则返回缓存中的那个（已加引用）
    pub(crate) fn insert_inode(&self, inode: &Arc<Inode>) -> Result<Option<Arc<Inode>>, FsError> {
        let mut inodes = self.inodes.lock();
        if let Some(existing) = inodes.get(&inode.ino()) {
            existing.count.inc()?;
            return Ok(Some(existing.clone()));
        }
        inodes.insert(inode.ino(), inode.clone());
        Ok(None)
    }

    /// 持有 inode 表锁执行 `f`
    pub(crate) fn with_inodes<R>(&self, f: impl FnOnce(&mut BTreeMap<InodeNo, Arc<Inode>>) -> R) -> R {
        let mut inodes = self.inodes.lock();
        f(&mut *inodes)
    }

    /// inode 缓存中所有引用计数之和
    pub(crate) fn inode_refs(&self) -> usize {
        self.inodes.lock().values().map(|i| i.count()).sum()
    }

    /// 物化根 inode 并建立根 dentry（计数 1，属于挂载关系）
    pub(crate) fn make_root(self: &Arc<Self>) -> Result<Arc<Dentry>, FsError> {
        let inode = get_inode(self, self.root_ino)?;
        if !inode.is_dir() {
            if let Err(e) = put_inode(&inode) {
                warn!("vfs: put_inode({}) failed: {:?}", inode.ino(), e);
            }
            return Err(FsError::NotDirectory);
        }
        let root = match Dentry::alloc_root(self, inode.clone()) {
            Ok(root) => root,
            Err(e) => {
                if let Err(pe) = put_inode(&inode) {
                    warn!("vfs: put_inode({}) failed: {:?}", inode.ino(), pe);
                }
                return Err(e);
            }
        };
        *self.root.lock() = Some(root.clone());
        Ok(root)
    }

    /// 拆除整棵 dentry 树并回收剩余 inode
    ///
    /// 调用者需保证除根 dentry 的挂载引用外没有其他引用。
    pub(crate) fn shutdown(&self) {
        let root = self.root.lock().take();
        if let Some(root) = root {
            root.prune();
            root.mark_deleted();
            if let Err(e) = root.release() {
                warn!("vfs: releasing root dentry failed: {:?}", e);
            }
        }
        let leftover: Vec<Arc<Inode>> = self.with_inodes(|map| {
            let drained: Vec<Arc<Inode>> = map.values().cloned().collect();
            map.clear();
            drained
        });
        for inode in leftover {
            warn!("vfs: inode {} still cached at shutdown (count {})", inode.ino(), inode.count());
            if let Err(e) = self.ops.destroy_inode(&inode) {
                warn!("vfs: destroy_inode({}) failed: {:?}", inode.ino(), e);
            }
        }
        debug!("vfs: superblock {:#x} shut down", self.fs_tag);
    }
}

impl core::fmt::Debug for SuperBlock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SuperBlock")
            .field("fs_tag", &self.fs_tag)
            .field("info", &self.info)
            .field("root_ino", &self.root_ino)
            .finish()
    }
}
