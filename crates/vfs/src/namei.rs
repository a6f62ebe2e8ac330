//! 命名空间操作
//!
//! create、mkdir、rm、rmdir、rename 都通过父目录 inode 的 [`InodeOps`](crate::InodeOps)
//! 分发。调用驱动时持有父目录 inode 的锁；驱动成功之后才更新 dentry 树。
//! 已被删除的目录在取得它的 inode 锁之后被拒绝，驱动不会看到它。
//!
//! rmdir 先锁父目录再锁被删目录。跨目录 rename 先取超级块的 rename 锁，
//! 再取两个父目录 inode 的锁：有祖先关系时祖先在前，否则按地址升序。

use alloc::sync::Arc;
use log::{debug, warn};
use sync::IntrGuard;

use crate::path::lookup_child_locked;
use crate::{
    Dentry, DentryStatus, FileName, FsError, Inode, InodeGuard, InodeNo, get_inode, split_path,
    vfs_lookup,
};
use crate::ops::now;

fn dir_inode(dir: &Dentry) -> Result<Arc<Inode>, FsError> {
    let inode = dir.inode()?;
    if !inode.is_dir() {
        return Err(FsError::NotDirectory);
    }
    Ok(inode)
}

/// 目录已从树上摘除时返回 `NotFound`
///
/// 调用者需持有 `dir` 的 inode 锁：rmdir 在同一把锁内打上删除标记。
fn ensure_live(dir: &Dentry) -> Result<(), FsError> {
    if dir.status().contains(DentryStatus::DELETED) {
        return Err(FsError::NotFound);
    }
    Ok(())
}

/// 持锁查找，不存在时返回 `None`
fn find_existing(dir: &Arc<Dentry>, guard: &InodeGuard<'_>, name: &str) -> Result<Option<Arc<Dentry>>, FsError> {
    match lookup_child_locked(dir, guard, name) {
        Ok(d) => Ok(Some(d)),
        Err(FsError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

fn touch_dir(guard: &mut InodeGuard<'_>) {
    let t = now();
    guard.mtime = t;
    guard.ctime = t;
}

type MakeFn = fn(&Inode, &mut InodeGuard<'_>, &Dentry) -> Result<InodeNo, FsError>;

fn make_node(dir: &Arc<Dentry>, name: &str, make: MakeFn) -> Result<Arc<Dentry>, FsError> {
    let fname = FileName::new(name)?;
    let inode = dir_inode(dir)?;
    let sb = dir.super_block()?;
    let mut guard = inode.lock();
    ensure_live(dir)?;

    if let Some(existing) = find_existing(dir, &guard, name)? {
        existing.release()?;
        return Err(FsError::AlreadyExists);
    }

    let dentry = Dentry::alloc(&sb, fname)?;
    let ino = match make(&inode, &mut guard, &dentry) {
        Ok(ino) => ino,
        Err(e) => {
            dentry.discard();
            return Err(e);
        }
    };
    let child = match get_inode(&sb, ino) {
        Ok(child) => child,
        Err(e) => {
            warn!("vfs: '{}' created as ino {} but could not be loaded: {:?}", name, ino, e);
            dentry.discard();
            return Err(e);
        }
    };
    dentry.instantiate(child);
    if let Err(e) = dir.link_child(&dentry) {
        dentry.discard();
        return Err(e);
    }
    touch_dir(&mut guard);
    debug!("vfs: created '{}' (ino {})", name, ino);
    Ok(dentry)
}

/// 在 `dir` 下创建普通文件，返回带一个引用的新 dentry
pub fn create(dir: &Arc<Dentry>, name: &str) -> Result<Arc<Dentry>, FsError> {
    make_node(dir, name, |inode, guard, dentry| inode.ops().create(guard, dentry))
}

/// 在 `dir` 下创建目录，返回带一个引用的新 dentry
pub fn mkdir(dir: &Arc<Dentry>, name: &str) -> Result<Arc<Dentry>, FsError> {
    make_node(dir, name, |inode, guard, dentry| inode.ops().mkdir(guard, dentry))
}

fn remove_node(dir: &Arc<Dentry>, name: &str, want_dir: bool) -> Result<(), FsError> {
    let inode = dir_inode(dir)?;
    let mut guard = inode.lock();
    ensure_live(dir)?;
    let victim = lookup_child_locked(dir, &guard, name)?;

    let outcome = (|| {
        let target = victim.inode()?;
        match (want_dir, target.is_dir()) {
            (false, true) => return Err(FsError::IsDirectory),
            (true, false) => return Err(FsError::NotDirectory),
            _ => {}
        }
        if want_dir {
            if victim.has_mount() {
                return Err(FsError::Busy);
            }
            // 持有被删目录的锁直到摘除，期间无法在它下面创建
            let _victim_guard = target.lock();
            victim.prune();
            if !victim.children().is_empty() {
                return Err(FsError::DirectoryNotEmpty);
            }
            inode.ops().rmdir(&mut guard, &victim)?;
            target.mark_pending_delete();
            dir.unlink_child(&victim);
        } else {
            inode.ops().rm(&mut guard, &victim)?;
            target.mark_pending_delete();
            dir.unlink_child(&victim);
        }
        touch_dir(&mut guard);
        Ok(())
    })();

    drop(guard);
    victim.release()?;
    if outcome.is_ok() {
        debug!("vfs: removed '{}'", name);
    }
    outcome
}

/// 删除 `dir` 下的普通文件
///
/// inode 被标记为待删除，最后一个引用释放时由驱动回收存储。
pub fn rm(dir: &Arc<Dentry>, name: &str) -> Result<(), FsError> {
    remove_node(dir, name, false)
}

/// 删除 `dir` 下的空目录；挂载点返回 `Busy`
pub fn rmdir(dir: &Arc<Dentry>, name: &str) -> Result<(), FsError> {
    remove_node(dir, name, true)
}

/// 把 `old_dir/old_name` 改名为 `new_dir/new_name`
///
/// 跨超级块返回 `CrossDevice`，目标已存在返回 `AlreadyExists`，
/// 挂载点返回 `Busy`，把目录移进自己的子树返回 `InvalidArgument`。
pub fn rename(
    old_dir: &Arc<Dentry>,
    old_name: &str,
    new_dir: &Arc<Dentry>,
    new_name: &str,
) -> Result<(), FsError> {
    FileName::new(old_name)?;
    let new_fname = FileName::new(new_name)?;
    let sb = old_dir.super_block()?;
    if !Arc::ptr_eq(&sb, &new_dir.super_block()?) {
        return Err(FsError::CrossDevice);
    }
    let old_inode = dir_inode(old_dir)?;
    let new_inode = dir_inode(new_dir)?;
    let same_dir = Arc::ptr_eq(&old_inode, &new_inode);

    // 两把 inode 锁的释放顺序由外层的 IntrGuard 兜底
    let _irq = IntrGuard::new();
    let _rename = (!same_dir).then(|| sb.rename_lock.lock());
    // 祖先关系只会被 rename 改变，持有 rename 锁时是稳定的
    let old_first = if new_dir.is_ancestor_of(old_dir) {
        false
    } else if old_dir.is_ancestor_of(new_dir) {
        true
    } else {
        Arc::as_ptr(&old_inode) < Arc::as_ptr(&new_inode)
    };
    let mut first = if old_first || same_dir {
        old_inode.lock()
    } else {
        new_inode.lock()
    };
    let mut second = if same_dir {
        None
    } else if old_first {
        Some(new_inode.lock())
    } else {
        Some(old_inode.lock())
    };
    let (old_guard, new_guard): (&mut InodeGuard<'_>, Option<&mut InodeGuard<'_>>) =
        match second.as_mut() {
            None => (&mut first, None),
            Some(s) if old_first => (&mut first, Some(s)),
            Some(s) => (s, Some(&mut first)),
        };

    ensure_live(old_dir)?;
    ensure_live(new_dir)?;
    let victim = lookup_child_locked(old_dir, old_guard, old_name)?;
    let outcome = (|| {
        if same_dir && old_name == new_name {
            return Ok(());
        }
        if victim.has_mount() {
            return Err(FsError::Busy);
        }
        let target_guard: &InodeGuard<'_> = match new_guard.as_deref() {
            Some(g) => g,
            None => old_guard,
        };
        if let Some(existing) = find_existing(new_dir, target_guard, new_name)? {
            let same = Arc::ptr_eq(&existing, &victim);
            existing.release()?;
            return if same { Ok(()) } else { Err(FsError::AlreadyExists) };
        }
        if victim.inode()?.is_dir()
            && (Arc::ptr_eq(&victim, new_dir) || victim.is_ancestor_of(new_dir))
        {
            return Err(FsError::InvalidArgument);
        }

        let mut new_guard = new_guard;
        old_inode
            .ops()
            .rename(old_guard, &victim, new_guard.as_deref_mut(), new_name)?;
        victim.move_to(new_dir, new_fname)?;
        touch_dir(old_guard);
        if let Some(g) = new_guard {
            touch_dir(g);
        }
        Ok(())
    })();

    victim.release()?;
    if outcome.is_ok() {
        debug!("vfs: renamed '{}' -> '{}'", old_name, new_name);
    }
    outcome
}

/// 按绝对路径创建普通文件
pub fn vfs_create(path: &str) -> Result<Arc<Dentry>, FsError> {
    let (dir, name) = split_path(path)?;
    let parent = vfs_lookup(&dir)?;
    let result = create(&parent, &name);
    parent.release()?;
    result
}

/// 按绝对路径创建目录
pub fn vfs_mkdir(path: &str) -> Result<Arc<Dentry>, FsError> {
    let (dir, name) = split_path(path)?;
    let parent = vfs_lookup(&dir)?;
    let result = mkdir(&parent, &name);
    parent.release()?;
    result
}

/// 按绝对路径删除普通文件
pub fn vfs_rm(path: &str) -> Result<(), FsError> {
    let (dir, name) = split_path(path)?;
    let parent = vfs_lookup(&dir)?;
    let result = rm(&parent, &name);
    parent.release()?;
    result
}

/// 按绝对路径删除空目录
pub fn vfs_rmdir(path: &str) -> Result<(), FsError> {
    let (dir, name) = split_path(path)?;
    let parent = vfs_lookup(&dir)?;
    let result = rmdir(&parent, &name);
    parent.release()?;
    result
}

/// 按绝对路径改名
pub fn vfs_rename(old_path: &str, new_path: &str) -> Result<(), FsError> {
    let (old_dir, old_name) = split_path(old_path)?;
    let (new_dir, new_name) = split_path(new_path)?;
    let old_parent = vfs_lookup(&old_dir)?;
    let new_parent = match vfs_lookup(&new_dir) {
        Ok(p) => p,
        Err(e) => {
            old_parent.release()?;
            return Err(e);
        }
    };
    let result = rename(&old_parent, &old_name, &new_parent, &new_name);
    old_parent.release()?;
    new_parent.release()?;
    result
}
