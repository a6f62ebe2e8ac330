//! 路径解析引擎
//!
//! 该模块把已经切分好的路径分量序列解析为 Dentry。
//!
//! 支持的语义：
//!
//! - 空分量和 `.` 跳过；`..` 回到父目录，命名空间根的父目录是它自己
//! - 文件系统根上的 `..` 经由挂载点回到上层文件系统
//! - 进入被挂载的目录时跨入挂载的根 dentry（挂载遮蔽原目录内容）
//! - 路径上进入的每个 dentry 都临时加引用，结束时统一释放，结果另带一个引用；
//!   失败时所有计数恢复原状
//!
//! 字符串形式的路径先经 [`parse_path`] 切分，只接受绝对路径，相对路径由调用者
//! 通过 [`vfs_lookup_from`] 自行指定起点。

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, warn};

use crate::config::{MAX_FILE_NAME, MAX_PATH};
use crate::{
    Dentry, FileName, FsError, Inode, InodeGuard, MOUNT_TABLE, get_inode, get_root_dentry,
    put_inode,
};

/// 路径组件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathComponent {
    /// 根目录 "/"
    Root,
    /// 当前目录 "."
    Current,
    /// 父目录 ".."
    Parent,
    /// 正常的文件名
    Normal(String),
}

/// 将路径字符串解析为组件列表
pub fn parse_path(path: &str) -> Vec<PathComponent> {
    let mut components = Vec::new();

    if path.starts_with('/') {
        components.push(PathComponent::Root);
    }

    for part in path.split('/').filter(|s| !s.is_empty()) {
        let component = match part {
            "." => PathComponent::Current,
            ".." => PathComponent::Parent,
            name => PathComponent::Normal(String::from(name)),
        };
        components.push(component);
    }

    components
}

/// 规范化路径（处理 ".." 和 "."）
pub fn normalize_path(path: &str) -> String {
    let mut stack: Vec<String> = Vec::new();
    let mut is_absolute = false;

    for component in parse_path(path) {
        match component {
            PathComponent::Root => is_absolute = true,
            PathComponent::Current => {}
            PathComponent::Parent => {
                if is_absolute {
                    // 绝对路径不能越过根目录
                    stack.pop();
                } else if stack.last().is_some_and(|last| last != "..") {
                    stack.pop();
                } else {
                    stack.push(String::from(".."));
                }
            }
            PathComponent::Normal(name) => stack.push(name),
        }
    }

    match (stack.is_empty(), is_absolute) {
        (true, true) => String::from("/"),
        (true, false) => String::from("."),
        (false, true) => String::from("/") + &stack.join("/"),
        (false, false) => stack.join("/"),
    }
}

/// 将路径分割为目录部分和文件名部分
pub fn split_path(path: &str) -> Result<(String, String), FsError> {
    // 以斜杠结尾说明是目录而非文件
    if path.ends_with('/') && path.len() > 1 {
        return Err(FsError::InvalidArgument);
    }

    let normalized = normalize_path(path);

    match normalized.rfind('/') {
        Some(pos) => {
            let dir = if pos == 0 {
                String::from("/")
            } else {
                String::from(&normalized[..pos])
            };
            let filename = String::from(&normalized[pos + 1..]);
            if filename.is_empty() {
                return Err(FsError::InvalidArgument);
            }
            Ok((dir, filename))
        }
        None => Ok((String::from("."), normalized)),
    }
}

/// 检查分量和整体长度
fn check_bounds<S: AsRef<str>>(components: &[S]) -> Result<(), FsError> {
    let mut total = 0usize;
    for c in components {
        let c = c.as_ref();
        if c.len() > MAX_FILE_NAME {
            return Err(FsError::NameTooLong);
        }
        total += c.len() + 1;
    }
    if total > MAX_PATH {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

/// 从 `start` 开始逐个解析路径分量
///
/// 成功时返回的 dentry 带一个引用，由调用者 [`Dentry::release`]。
pub fn lookup<S: AsRef<str>>(start: &Arc<Dentry>, components: &[S]) -> Result<Arc<Dentry>, FsError> {
    check_bounds(components)?;

    let mut pins: Vec<Arc<Dentry>> = Vec::new();
    let walked = walk(start, components, &mut pins);
    let result = match walked {
        Ok(()) => pins.last().ok_or(FsError::NotFound).and_then(|d| d.get()),
        Err(e) => Err(e),
    };
    for pin in pins {
        if let Err(e) = pin.release() {
            warn!("vfs: dropping lookup pin failed: {:?}", e);
        }
    }
    result
}

fn walk<S: AsRef<str>>(
    start: &Arc<Dentry>,
    components: &[S],
    pins: &mut Vec<Arc<Dentry>>,
) -> Result<(), FsError> {
    let mut cur = start.get()?;
    pins.push(cur.clone());
    cur = follow_mounts(cur, pins)?;

    for component in components {
        match component.as_ref() {
            "" | "." => continue,
            ".." => {
                cur = follow_dotdot(&cur)?;
                pins.push(cur.clone());
            }
            name => {
                let inode = cur.inode()?;
                if !inode.is_dir() {
                    return Err(FsError::NotDirectory);
                }
                cur = lookup_child(&cur, &inode, name)?;
                pins.push(cur.clone());
            }
        }
        cur = follow_mounts(cur, pins)?;
    }
    Ok(())
}

/// 若 `dentry` 是挂载点，跨入挂载的根（可能连续多层）
fn follow_mounts(mut dentry: Arc<Dentry>, pins: &mut Vec<Arc<Dentry>>) -> Result<Arc<Dentry>, FsError> {
    while dentry.is_mounted() {
        let Some(mnt) = dentry.mounted_vfsmount() else {
            break;
        };
        let root = mnt.root().get()?;
        // 先固定再复查：与卸载的“先撤标志再查计数”配对
        if !dentry.is_mounted() || mnt.is_unmounting() {
            root.release()?;
            break;
        }
        pins.push(root.clone());
        dentry = root;
    }
    Ok(dentry)
}

/// `..`：树内回到父节点，文件系统根经由挂载点向上，命名空间根停在原地
fn follow_dotdot(cur: &Arc<Dentry>) -> Result<Arc<Dentry>, FsError> {
    let mut d = cur.clone();
    loop {
        if let Some(parent) = d.parent() {
            return parent.get();
        }
        match MOUNT_TABLE
            .find_by_root(&d)
            .and_then(|m| m.mountpoint().cloned())
        {
            Some(mountpoint) => d = mountpoint,
            None => return d.get(),
        }
    }
}

/// 查找 `dir` 下的 `name`，未缓存时加父目录 inode 锁后交给驱动
pub(crate) fn lookup_child(dir: &Arc<Dentry>, inode: &Inode, name: &str) -> Result<Arc<Dentry>, FsError> {
    if let Some(child) = dir.find_child(name) {
        return Ok(child);
    }
    let guard = inode.lock();
    lookup_child_locked(dir, &guard, name)
}

/// 持有父目录 inode 锁时查找或物化子节点，返回的 dentry 带一个引用
///
/// 驱动查找失败时不改变树；之后的任何失败都会回滚已经取得的引用。
pub(crate) fn lookup_child_locked(
    dir: &Arc<Dentry>,
    guard: &InodeGuard<'_>,
    name: &str,
) -> Result<Arc<Dentry>, FsError> {
    if let Some(child) = dir.find_child(name) {
        return Ok(child);
    }
    let fname = FileName::new(name)?;
    let sb = dir.super_block()?;
    let ino = guard.inode().ops().lookup(guard, name)?;
    debug!("vfs: dentry cache miss '{}' -> ino {}", name, ino);

    let inode = get_inode(&sb, ino)?;
    let dentry = match Dentry::alloc(&sb, fname) {
        Ok(d) => d,
        Err(e) => {
            if let Err(pe) = put_inode(&inode) {
                warn!("vfs: put_inode({}) failed: {:?}", ino, pe);
            }
            return Err(e);
        }
    };
    dentry.instantiate(inode);
    if let Err(e) = dir.link_child(&dentry) {
        dentry.discard();
        return Err(e);
    }
    Ok(dentry)
}

/// 解析绝对路径
pub fn vfs_lookup(path: &str) -> Result<Arc<Dentry>, FsError> {
    if path.len() > MAX_PATH {
        return Err(FsError::NameTooLong);
    }
    let components = parse_path(path);
    if components.first() != Some(&PathComponent::Root) {
        return Err(FsError::InvalidArgument);
    }
    let root = get_root_dentry()?;
    let result = walk_components(&root, &components);
    root.release()?;
    result
}

/// 从指定的 base dentry 开始解析路径（开头的 `/` 被忽略）
pub fn vfs_lookup_from(base: &Arc<Dentry>, path: &str) -> Result<Arc<Dentry>, FsError> {
    if path.len() > MAX_PATH {
        return Err(FsError::NameTooLong);
    }
    walk_components(base, &parse_path(path))
}

fn walk_components(base: &Arc<Dentry>, components: &[PathComponent]) -> Result<Arc<Dentry>, FsError> {
    let names: Vec<&str> = components
        .iter()
        .filter_map(|c| match c {
            PathComponent::Root => None,
            PathComponent::Current => Some("."),
            PathComponent::Parent => Some(".."),
            PathComponent::Normal(name) => Some(name.as_str()),
        })
        .collect();
    lookup(base, &names)
}
