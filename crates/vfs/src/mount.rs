//! 挂载表
//!
//! 每条 [`VfsMount`] 记录把一个超级块的根 dentry 嫁接到父命名空间中的挂载点 dentry 上，
//! 并指向父挂载，形成与嵌套挂载一致的挂载树。第一个没有挂载点的挂载成为命名空间根。
//!
//! 发布顺序：挂载点 dentry 的挂载标志在所有链接字段就绪之后才置位；
//! 查找一侧先固定挂载根再复查标志，卸载一侧先撤下标志再检查引用计数。

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use lazy_static::lazy_static;
use log::{info, warn};
use sync::RwLock;

use crate::{BlockDevice, Dentry, FileSystemType, FsError, SuperBlock};

/// 一次挂载关系
pub struct VfsMount {
    id: usize,
    devname: String,
    fs_type: Arc<FileSystemType>,
    sb: Arc<SuperBlock>,
    root: Arc<Dentry>,
    mountpoint: Option<Arc<Dentry>>,
    parent: Option<Weak<VfsMount>>,
    unmounting: AtomicBool,
}

impl VfsMount {
    /// 挂载编号
    pub fn id(&self) -> usize {
        self.id
    }

    /// 设备名
    pub fn devname(&self) -> &str {
        &self.devname
    }

    /// 文件系统类型
    pub fn fs_type(&self) -> &Arc<FileSystemType> {
        &self.fs_type
    }

    /// 被挂载的超级块
    pub fn super_block(&self) -> &Arc<SuperBlock> {
        &self.sb
    }

    /// 被挂载文件系统的根 dentry
    pub fn root(&self) -> &Arc<Dentry> {
        &self.root
    }

    /// 挂载点（根挂载没有）
    pub fn mountpoint(&self) -> Option<&Arc<Dentry>> {
        self.mountpoint.as_ref()
    }

    /// 父挂载
    pub fn parent(&self) -> Option<Arc<VfsMount>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn is_unmounting(&self) -> bool {
        self.unmounting.load(Ordering::SeqCst)
    }

    /// 挂载范围内是否还有外部引用
    fn busy(&self) -> bool {
        // 根 dentry 的 1 个计数属于挂载关系本身
        if self.root.count() > 1 {
            return true;
        }
        let mut positive = 0usize;
        let mut stack = alloc::vec![self.root.clone()];
        while let Some(d) = stack.pop() {
            if !d.is_negative() {
                positive += 1;
            }
            for child in d.children() {
                if child.count() > 0 {
                    return true;
                }
                stack.push(child);
            }
        }
        // 每个在树上的 dentry 恰好持有一个 inode 引用，多出的引用来自树外
        self.sb.inode_refs() > positive
    }
}

impl core::fmt::Debug for VfsMount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VfsMount")
            .field("id", &self.id)
            .field("devname", &self.devname)
            .field("fs_type", &self.fs_type.name())
            .finish()
    }
}

/// 全局挂载表
pub struct MountTable {
    mounts: RwLock<Vec<Arc<VfsMount>>>,
    root: RwLock<Option<Arc<VfsMount>>>,
    next_id: AtomicUsize,
}

impl MountTable {
    fn new() -> Self {
        Self {
            mounts: RwLock::new(Vec::new()),
            root: RwLock::new(None),
            next_id: AtomicUsize::new(1),
        }
    }

    /// 挂载文件系统
    ///
    /// `mountpoint` 为 `None` 时是根挂载；第一个根挂载成为命名空间根。
    pub fn mount(
        &self,
        fs_type: &Arc<FileSystemType>,
        devname: &str,
        bdev: Option<Arc<dyn BlockDevice>>,
        mountpoint: Option<&Arc<Dentry>>,
    ) -> Result<Arc<VfsMount>, FsError> {
        if let Some(mp) = mountpoint {
            if mp.has_mount() {
                return Err(FsError::AlreadyMounted);
            }
            if !mp.inode()?.is_dir() {
                return Err(FsError::NotDirectory);
            }
        }

        let sb = fs_type.read_super(bdev).map_err(|e| {
            warn!("vfs: read_super of '{}' failed: {:?}", fs_type.name(), e);
            FsError::ReadSuperFailed
        })?;
        let root = match sb.make_root() {
            Ok(root) => root,
            Err(e) => {
                sb.shutdown();
                return Err(e);
            }
        };

        let pinned = match mountpoint.map(|mp| mp.get()).transpose() {
            Ok(pinned) => pinned,
            Err(e) => {
                sb.shutdown();
                return Err(e);
            }
        };
        let parent = pinned
            .as_ref()
            .and_then(|mp| mp.super_block().ok())
            .and_then(|psb| self.find_by_sb(&psb))
            .map(|m| Arc::downgrade(&m));

        let mnt = Arc::new(VfsMount {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            devname: String::from(devname),
            fs_type: fs_type.clone(),
            sb: sb.clone(),
            root,
            mountpoint: pinned.clone(),
            parent,
            unmounting: AtomicBool::new(false),
        });

        if let Some(mp) = &pinned {
            if let Err(e) = mp.claim_mount(&mnt) {
                if let Err(re) = mp.release() {
                    warn!("vfs: releasing mountpoint failed: {:?}", re);
                }
                drop(mnt);
                sb.shutdown();
                return Err(e);
            }
        }

        self.mounts.write().push(mnt.clone());
        fs_type.add_super(sb);
        match &pinned {
            Some(mp) => {
                mp.set_mounted(true);
                info!("vfs: mounted {} ({}) at {}", devname, fs_type.name(), mp.full_path());
            }
            None => {
                let mut root = self.root.write();
                if root.is_none() {
                    *root = Some(mnt.clone());
                    info!("vfs: mounted {} ({}) as namespace root", devname, fs_type.name());
                } else {
                    info!("vfs: mounted {} ({}) detached", devname, fs_type.name());
                }
            }
        }
        Ok(mnt)
    }

    /// 卸载
    ///
    /// 命名空间根或正在卸载的挂载返回 `Busy`，不在表中返回 `NotFound`，
    /// 挂载范围内仍有引用时返回 `Busy` 且保持挂载。
    pub fn umount(&self, mnt: &Arc<VfsMount>) -> Result<(), FsError> {
        if self
            .root
            .read()
            .as_ref()
            .is_some_and(|r| Arc::ptr_eq(r, mnt))
        {
            return Err(FsError::Busy);
        }
        if mnt.unmounting.swap(true, Ordering::SeqCst) {
            return Err(FsError::Busy);
        }
        if !self.mounts.read().iter().any(|m| Arc::ptr_eq(m, mnt)) {
            mnt.unmounting.store(false, Ordering::SeqCst);
            return Err(FsError::NotFound);
        }

        if let Some(mp) = &mnt.mountpoint {
            mp.set_mounted(false);
        }
        let restore = || {
            if let Some(mp) = &mnt.mountpoint {
                mp.set_mounted(true);
            }
            mnt.unmounting.store(false, Ordering::SeqCst);
        };
        if mnt.busy() {
            restore();
            return Err(FsError::Busy);
        }
        if let Err(e) = mnt.sb.sync() {
            warn!("vfs: sync of {} failed: {:?}", mnt.devname, e);
            restore();
            return Err(e);
        }

        mnt.sb.shutdown();
        self.mounts.write().retain(|m| !Arc::ptr_eq(m, mnt));
        mnt.fs_type.remove_super(&mnt.sb);
        if let Some(mp) = &mnt.mountpoint {
            mp.clear_mount();
            if let Err(e) = mp.release() {
                warn!("vfs: releasing mountpoint failed: {:?}", e);
            }
        }
        info!("vfs: unmounted {} ({})", mnt.devname, mnt.fs_type.name());
        Ok(())
    }

    /// 以 `root` 为根的挂载
    pub fn find_by_root(&self, root: &Dentry) -> Option<Arc<VfsMount>> {
        self.mounts
            .read()
            .iter()
            .find(|m| core::ptr::eq(Arc::as_ptr(&m.root), root))
            .cloned()
    }

    /// 挂载了 `sb` 的挂载
    pub fn find_by_sb(&self, sb: &Arc<SuperBlock>) -> Option<Arc<VfsMount>> {
        self.mounts
            .read()
            .iter()
            .find(|m| Arc::ptr_eq(&m.sb, sb))
            .cloned()
    }

    /// 所有挂载（按挂载顺序）
    pub fn list_mounts(&self) -> Vec<Arc<VfsMount>> {
        self.mounts.read().clone()
    }

    /// 命名空间根挂载
    pub fn root_mount(&self) -> Option<Arc<VfsMount>> {
        self.root.read().clone()
    }
}

lazy_static! {
    /// 全局挂载表
    pub static ref MOUNT_TABLE: MountTable = MountTable::new();
}

/// 命名空间根 dentry（已加引用）
pub fn get_root_dentry() -> Result<Arc<Dentry>, FsError> {
    let root = MOUNT_TABLE.root_mount().ok_or(FsError::NotFound)?;
    root.root.get()
}
