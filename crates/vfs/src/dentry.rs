//! 目录项（Dentry）
//!
//! Dentry 组成路径解析缓存树：父节点以 `Arc` 持有子节点，子节点以 `Weak` 指回父节点。
//! 每个 dentry 有自己的锁和原子引用计数。
//!
//! 生命周期约定：
//!
//! - 计数表示正在使用它的持有者（查找路径上的临时引用、打开文件、挂载关系、调用者）。
//! - 计数归零但仍挂在树上的 dentry 留在缓存中，只有 [`Dentry::prune`] 或卸载才会回收。
//! - 已从树上摘除（`DELETED`）的 dentry 在计数归零时立即回收，并释放其 inode 引用。
//! - 对计数为 0 的 dentry 调用 [`Dentry::release`] 会被拒绝，返回 `InvalidArgument`。
//!
//! 加锁顺序：父节点先于子节点；同时锁两个父节点时祖先在前。

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{debug, warn};
use sync::{IntrGuard, SpinLock};

use crate::object::{self, ObjectKind, ObjectSlot};
use crate::refcount::RefCount;
use crate::{FileName, FsError, Inode, MOUNT_TABLE, SuperBlock, VfsMount, put_inode};

bitflags::bitflags! {
    /// Dentry 状态位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DentryStatus: u32 {
        /// 某个超级块的根
        const ROOT = 1 << 0;
        /// 已从树上摘除
        const DELETED = 1 << 1;
    }
}

/// Dentry 操作，由文件系统通过 [`SuperBlockOps::dentry_ops`](crate::SuperBlockOps::dentry_ops) 提供
pub trait DentryOps: Send + Sync {
    /// dentry 被回收前调用
    fn del(&self, dentry: &Dentry) -> Result<(), FsError>;
}

struct DentryInner {
    name: FileName,
    status: DentryStatus,
    parent: Option<Weak<Dentry>>,
    children: Vec<Arc<Dentry>>,
    inode: Option<Arc<Inode>>,
}

/// 目录项
pub struct Dentry {
    _slot: ObjectSlot,
    count: RefCount,
    inner: SpinLock<DentryInner>,
    mounted: AtomicBool,
    mount: SpinLock<Weak<VfsMount>>,
    sb: Weak<SuperBlock>,
    ops: Option<Arc<dyn DentryOps>>,
}

impl Dentry {
    fn build(
        sb: &Arc<SuperBlock>,
        name: FileName,
        status: DentryStatus,
        inode: Option<Arc<Inode>>,
    ) -> Result<Arc<Self>, FsError> {
        Ok(Arc::new(Self {
            _slot: object::acquire(ObjectKind::Dentry)?,
            count: RefCount::new(1),
            inner: SpinLock::new(DentryInner {
                name,
                status,
                parent: None,
                children: Vec::new(),
                inode,
            }),
            mounted: AtomicBool::new(false),
            mount: SpinLock::new(Weak::new()),
            sb: Arc::downgrade(sb),
            ops: sb.ops().dentry_ops(),
        }))
    }

    /// 分配一个未实例化的 dentry，计数为 1
    pub(crate) fn alloc(sb: &Arc<SuperBlock>, name: FileName) -> Result<Arc<Self>, FsError> {
        Self::build(sb, name, DentryStatus::empty(), None)
    }

    /// 分配超级块的根 dentry，计数为 1，没有父节点
    pub(crate) fn alloc_root(sb: &Arc<SuperBlock>, inode: Arc<Inode>) -> Result<Arc<Self>, FsError> {
        Self::build(sb, FileName::root(), DentryStatus::ROOT, Some(inode))
    }

    /// 名字
    pub fn name(&self) -> FileName {
        self.inner.lock().name
    }

    /// 状态位
    pub fn status(&self) -> DentryStatus {
        self.inner.lock().status
    }

    /// 当前引用计数
    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// 是否尚未绑定 inode
    pub fn is_negative(&self) -> bool {
        self.inner.lock().inode.is_none()
    }

    /// 绑定的 inode；未绑定时返回 `NotFound`
    pub fn inode(&self) -> Result<Arc<Inode>, FsError> {
        self.inner.lock().inode.clone().ok_or(FsError::NotFound)
    }

    /// 所属超级块
    pub fn super_block(&self) -> Result<Arc<SuperBlock>, FsError> {
        self.sb.upgrade().ok_or(FsError::NoDevice)
    }

    /// 父节点（不增加引用计数）
    pub fn parent(&self) -> Option<Arc<Dentry>> {
        self.inner.lock().parent.as_ref().and_then(Weak::upgrade)
    }

    /// 子节点快照（不增加引用计数）
    pub fn children(&self) -> Vec<Arc<Dentry>> {
        self.inner.lock().children.clone()
    }

    /// 是否有文件系统挂载在此
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// 挂载在此的 vfsmount
    pub fn mounted_vfsmount(&self) -> Option<Arc<VfsMount>> {
        self.mount.lock().upgrade()
    }

    /// 已发布或正在建立的挂载
    pub(crate) fn has_mount(&self) -> bool {
        self.is_mounted() || self.mounted_vfsmount().is_some()
    }

    /// 增加一个引用，返回持有该引用的句柄
    pub fn get(self: &Arc<Self>) -> Result<Arc<Self>, FsError> {
        self.count.inc()?;
        Ok(self.clone())
    }

    /// 释放一个引用
    ///
    /// 计数已为 0 时返回 `InvalidArgument` 且不做任何改变。已摘除的 dentry
    /// 计数归零时立即回收；仍在树上的留在缓存中。
    pub fn release(self: &Arc<Self>) -> Result<(), FsError> {
        let left = self.count.dec().inspect_err(|_| {
            warn!("vfs: release of unreferenced dentry '{}'", self.name());
        })?;
        if left == 0 && self.status().contains(DentryStatus::DELETED) && self.count.try_kill() {
            self.finalize();
        }
        Ok(())
    }

    /// 在子节点中按名字查找，命中时返回已加引用的子节点
    pub(crate) fn find_child(&self, name: &str) -> Option<Arc<Dentry>> {
        let inner = self.inner.lock();
        let child = inner
            .children
            .iter()
            .find(|c| c.inner.lock().name == *name)?;
        // 子节点只会在持有本锁时被回收，此处加引用不会失败
        child.count.inc().ok()?;
        Some(child.clone())
    }

    /// 将 `child` 挂到本节点下
    pub(crate) fn link_child(self: &Arc<Self>, child: &Arc<Dentry>) -> Result<(), FsError> {
        let mut inner = self.inner.lock();
        if inner.status.contains(DentryStatus::DELETED) {
            return Err(FsError::NotFound);
        }
        let name = child.inner.lock().name;
        if inner.children.iter().any(|c| c.inner.lock().name == name) {
            return Err(FsError::AlreadyExists);
        }
        child.inner.lock().parent = Some(Arc::downgrade(self));
        inner.children.push(child.clone());
        debug!("vfs: linked '{}' under '{}'", name, inner.name);
        Ok(())
    }

    /// 把 `child` 从本节点下摘除并标记为已删除
    pub(crate) fn unlink_child(&self, child: &Arc<Dentry>) {
        let mut inner = self.inner.lock();
        inner.children.retain(|c| !Arc::ptr_eq(c, child));
        let mut ci = child.inner.lock();
        ci.parent = None;
        ci.status |= DentryStatus::DELETED;
        debug!("vfs: unlinked '{}' from '{}'", ci.name, inner.name);
    }

    /// 绑定 inode（消耗调用者持有的 inode 引用）
    pub(crate) fn instantiate(&self, inode: Arc<Inode>) {
        self.inner.lock().inode = Some(inode);
    }

    pub(crate) fn mark_deleted(&self) {
        self.inner.lock().status |= DentryStatus::DELETED;
    }

    /// 丢弃一个尚未挂到树上的 dentry
    pub(crate) fn discard(self: &Arc<Self>) {
        self.mark_deleted();
        if let Err(e) = self.release() {
            warn!("vfs: discarding dentry failed: {:?}", e);
        }
    }

    /// 本节点是否为 `other` 的真祖先（只在同一棵树内判断）
    pub fn is_ancestor_of(&self, other: &Dentry) -> bool {
        let mut cur = other.parent();
        while let Some(d) = cur {
            if core::ptr::eq(Arc::as_ptr(&d), self) {
                return true;
            }
            cur = d.parent();
        }
        false
    }

    /// 移动到 `new_parent` 下并改名为 `new_name`
    pub(crate) fn move_to(
        self: &Arc<Self>,
        new_parent: &Arc<Dentry>,
        new_name: FileName,
    ) -> Result<(), FsError> {
        let old_parent = self.parent().ok_or(FsError::NotFound)?;
        let conflict = |children: &[Arc<Dentry>]| {
            children
                .iter()
                .any(|c| !Arc::ptr_eq(c, self) && c.inner.lock().name == new_name)
        };

        if Arc::ptr_eq(&old_parent, new_parent) {
            let parent = old_parent.inner.lock();
            if conflict(&parent.children) {
                return Err(FsError::AlreadyExists);
            }
            self.inner.lock().name = new_name;
            return Ok(());
        }

        // 两把父锁按祖先优先的顺序获取，守卫的释放顺序由外层的 IntrGuard 兜底
        let _irq = IntrGuard::new();
        let new_first = new_parent.is_ancestor_of(&old_parent);
        let mut old_inner;
        let mut new_inner;
        if new_first {
            new_inner = new_parent.inner.lock();
            old_inner = old_parent.inner.lock();
        } else {
            old_inner = old_parent.inner.lock();
            new_inner = new_parent.inner.lock();
        }
        if new_inner.status.contains(DentryStatus::DELETED) {
            return Err(FsError::NotFound);
        }
        if conflict(&new_inner.children) {
            return Err(FsError::AlreadyExists);
        }
        old_inner.children.retain(|c| !Arc::ptr_eq(c, self));
        {
            let mut inner = self.inner.lock();
            inner.name = new_name;
            inner.parent = Some(Arc::downgrade(new_parent));
        }
        new_inner.children.push(self.clone());
        Ok(())
    }

    /// 回收子树中计数为 0 的节点（深度优先，先子后父）
    ///
    /// 被引用或作为挂载点的节点及其祖先保留。返回回收的数量。
    pub fn prune(&self) -> usize {
        let mut evicted = 0;
        for child in self.children() {
            evicted += child.prune();
            if self.try_evict_child(&child) {
                evicted += 1;
            }
        }
        evicted
    }

    fn try_evict_child(&self, child: &Arc<Dentry>) -> bool {
        let mut inner = self.inner.lock();
        let Some(pos) = inner.children.iter().position(|c| Arc::ptr_eq(c, child)) else {
            return false;
        };
        {
            let mut ci = child.inner.lock();
            if !ci.children.is_empty() || child.has_mount() || !child.count.try_kill() {
                return false;
            }
            ci.parent = None;
            ci.status |= DentryStatus::DELETED;
        }
        inner.children.remove(pos);
        drop(inner);
        child.finalize();
        true
    }

    /// 计数已被置为 DEAD 后调用：通知驱动、释放 inode 引用、遗弃残留子节点
    fn finalize(&self) {
        if let Some(ops) = &self.ops {
            if let Err(e) = ops.del(self) {
                warn!("vfs: dentry del failed: {:?}", e);
            }
        }
        let (name, inode, orphans) = {
            let mut inner = self.inner.lock();
            (
                inner.name,
                inner.inode.take(),
                core::mem::take(&mut inner.children),
            )
        };
        for orphan in orphans {
            {
                let mut oi = orphan.inner.lock();
                oi.parent = None;
                oi.status |= DentryStatus::DELETED;
            }
            if orphan.count.try_kill() {
                orphan.finalize();
            }
        }
        if let Some(inode) = inode {
            if let Err(e) = put_inode(&inode) {
                warn!("vfs: put_inode({}) failed: {:?}", inode.ino(), e);
            }
        }
        debug!("vfs: reclaimed dentry '{}'", name);
    }

    /// 预占挂载点：检查未删除且未被挂载，记录 vfsmount，但尚不发布挂载标志
    pub(crate) fn claim_mount(&self, mnt: &Arc<VfsMount>) -> Result<(), FsError> {
        let inner = self.inner.lock();
        if inner.status.contains(DentryStatus::DELETED) {
            return Err(FsError::NotFound);
        }
        let mut slot = self.mount.lock();
        if self.is_mounted() || slot.upgrade().is_some() {
            return Err(FsError::AlreadyMounted);
        }
        *slot = Arc::downgrade(mnt);
        Ok(())
    }

    pub(crate) fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::SeqCst);
    }

    pub(crate) fn clear_mount(&self) {
        self.set_mounted(false);
        *self.mount.lock() = Weak::new();
    }

    /// 从命名空间根开始的绝对路径，跨越挂载点向上
    pub fn full_path(self: &Arc<Self>) -> String {
        let mut names: Vec<FileName> = Vec::new();
        let mut cur = self.clone();
        loop {
            let (name, parent) = {
                let inner = cur.inner.lock();
                (inner.name, inner.parent.as_ref().and_then(Weak::upgrade))
            };
            match parent {
                Some(parent) => {
                    names.push(name);
                    cur = parent;
                }
                None => match MOUNT_TABLE
                    .find_by_root(&cur)
                    .and_then(|m| m.mountpoint().cloned())
                {
                    Some(mountpoint) => cur = mountpoint,
                    None => break,
                },
            }
        }
        if names.is_empty() {
            return String::from("/");
        }
        let mut path = String::new();
        for name in names.iter().rev() {
            path.push('/');
            path.push_str(name.as_str());
        }
        path
    }
}

impl core::fmt::Debug for Dentry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Dentry")
            .field("name", &inner.name)
            .field("count", &self.count)
            .field("status", &inner.status)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}
