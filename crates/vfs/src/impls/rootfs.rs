//! 内存根文件系统
//!
//! 所有节点保存在一张以 inode 号为键的表中，目录节点记录名字到 inode 号的映射，
//! 普通文件节点保存内容。内存 inode 被销毁时把元数据写回节点，删除时移除节点。
//! 目录的大小是其中的条目数。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::SpinLock;

use crate::config::ROOTFS_T;
use crate::ops::now;
use crate::{
    BlockDevice, Dentry, FileOps, FsError, Inode, InodeGuard, InodeNo, InodeOps, InodeState,
    InodeType, SuperBlock, SuperBlockInfo, SuperBlockOps,
};

/// 根目录的 inode 号
pub const ROOTFS_ROOT_INO: InodeNo = 1;

const ROOTFS_BLOCK_SIZE: u32 = 4096;
const ROOTFS_MAX_FILE: u32 = 1 << 20;

struct RootNode {
    itype: InodeType,
    state: InodeState,
    entries: BTreeMap<String, InodeNo>,
    data: Vec<u8>,
}

impl RootNode {
    fn new(itype: InodeType) -> Self {
        Self {
            itype,
            state: InodeState::with_time(now()),
            entries: BTreeMap::new(),
            data: Vec::new(),
        }
    }
}

struct RootFsData {
    nodes: SpinLock<BTreeMap<InodeNo, RootNode>>,
    next_ino: AtomicUsize,
}

impl RootFsData {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOTFS_ROOT_INO, RootNode::new(InodeType::Directory));
        Self {
            nodes: SpinLock::new(nodes),
            next_ino: AtomicUsize::new(ROOTFS_ROOT_INO + 1),
        }
    }

    fn add_entry(&self, dir: &mut InodeGuard<'_>, name: &str, itype: InodeType) -> Result<InodeNo, FsError> {
        let mut nodes = self.nodes.lock();
        let parent = nodes.get(&dir.inode().ino()).ok_or(FsError::NotFound)?;
        if parent.entries.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        nodes.insert(ino, RootNode::new(itype));
        let parent = nodes.get_mut(&dir.inode().ino()).ok_or(FsError::NotFound)?;
        parent.entries.insert(String::from(name), ino);
        dir.size = parent.entries.len();
        Ok(ino)
    }

    fn remove_entry(&self, dir: &mut InodeGuard<'_>, name: &str, want_dir: bool) -> Result<(), FsError> {
        let mut nodes = self.nodes.lock();
        let parent = nodes.get(&dir.inode().ino()).ok_or(FsError::NotFound)?;
        let ino = *parent.entries.get(name).ok_or(FsError::NotFound)?;
        let node = nodes.get(&ino).ok_or(FsError::NotFound)?;
        if want_dir && !node.entries.is_empty() {
            return Err(FsError::DirectoryNotEmpty);
        }
        let parent = nodes.get_mut(&dir.inode().ino()).ok_or(FsError::NotFound)?;
        parent.entries.remove(name);
        dir.size = parent.entries.len();
        Ok(())
    }
}

struct RootSuperOps {
    data: Arc<RootFsData>,
    dir_ops: Arc<RootDirOps>,
    file_ops: Arc<RootFileOps>,
}

impl SuperBlockOps for RootSuperOps {
    fn alloc_inode(&self, sb: &Arc<SuperBlock>, ino: InodeNo) -> Result<Arc<Inode>, FsError> {
        let (itype, state) = {
            let nodes = self.data.nodes.lock();
            let node = nodes.get(&ino).ok_or(FsError::NotFound)?;
            (node.itype, node.state)
        };
        Inode::new(
            sb,
            ino,
            itype,
            state,
            self.dir_ops.clone(),
            self.file_ops.clone(),
        )
    }

    fn destroy_inode(&self, inode: &Inode) -> Result<(), FsError> {
        let state = *inode.lock();
        if let Some(node) = self.data.nodes.lock().get_mut(&inode.ino()) {
            node.state = state;
        }
        Ok(())
    }

    fn delete_inode(&self, inode: &Inode) -> Result<(), FsError> {
        self.data
            .nodes
            .lock()
            .remove(&inode.ino())
            .map(|_| ())
            .ok_or(FsError::NotFound)
    }
}

struct RootDirOps {
    data: Arc<RootFsData>,
}

impl InodeOps for RootDirOps {
    fn lookup(&self, dir: &InodeGuard<'_>, name: &str) -> Result<InodeNo, FsError> {
        let nodes = self.data.nodes.lock();
        let node = nodes.get(&dir.inode().ino()).ok_or(FsError::NotFound)?;
        node.entries.get(name).copied().ok_or(FsError::NotFound)
    }

    fn create(&self, dir: &mut InodeGuard<'_>, dentry: &Dentry) -> Result<InodeNo, FsError> {
        self.data.add_entry(dir, dentry.name().as_str(), InodeType::File)
    }

    fn rm(&self, dir: &mut InodeGuard<'_>, dentry: &Dentry) -> Result<(), FsError> {
        self.data.remove_entry(dir, dentry.name().as_str(), false)
    }

    fn mkdir(&self, dir: &mut InodeGuard<'_>, dentry: &Dentry) -> Result<InodeNo, FsError> {
        self.data.add_entry(dir, dentry.name().as_str(), InodeType::Directory)
    }

    fn rmdir(&self, dir: &mut InodeGuard<'_>, dentry: &Dentry) -> Result<(), FsError> {
        self.data.remove_entry(dir, dentry.name().as_str(), true)
    }

    fn rename(
        &self,
        old_dir: &mut InodeGuard<'_>,
        dentry: &Dentry,
        new_dir: Option<&mut InodeGuard<'_>>,
        new_name: &str,
    ) -> Result<(), FsError> {
        let old_name = dentry.name();
        let old_ino = old_dir.inode().ino();
        let new_ino = new_dir.as_ref().map_or(old_ino, |g| g.inode().ino());
        let mut nodes = self.data.nodes.lock();
        if nodes
            .get(&new_ino)
            .ok_or(FsError::NotFound)?
            .entries
            .contains_key(new_name)
        {
            return Err(FsError::AlreadyExists);
        }
        let src = nodes.get_mut(&old_ino).ok_or(FsError::NotFound)?;
        let ino = src
            .entries
            .remove(old_name.as_str())
            .ok_or(FsError::NotFound)?;
        old_dir.size = src.entries.len();
        let dst = nodes.get_mut(&new_ino).ok_or(FsError::NotFound)?;
        dst.entries.insert(String::from(new_name), ino);
        match new_dir {
            Some(g) => g.size = dst.entries.len(),
            None => old_dir.size = dst.entries.len(),
        }
        Ok(())
    }
}

struct RootFileOps {
    data: Arc<RootFsData>,
}

impl FileOps for RootFileOps {
    fn read(&self, inode: &Inode, offset: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let nodes = self.data.nodes.lock();
        let node = nodes.get(&inode.ino()).ok_or(FsError::NotFound)?;
        if offset >= node.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(node.data.len() - offset);
        buf[..n].copy_from_slice(&node.data[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, inode: &Inode, offset: usize, buf: &[u8]) -> Result<usize, FsError> {
        let mut nodes = self.data.nodes.lock();
        let node = nodes.get_mut(&inode.ino()).ok_or(FsError::NotFound)?;
        let end = offset + buf.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }
}

/// rootfs 的 `read_super`：每次调用构造一个独立的空文件系统，不使用块设备
pub fn rootfs_read_super(_bdev: Option<Arc<dyn BlockDevice>>) -> Result<Arc<SuperBlock>, FsError> {
    let data = Arc::new(RootFsData::new());
    let ops = RootSuperOps {
        dir_ops: Arc::new(RootDirOps { data: data.clone() }),
        file_ops: Arc::new(RootFileOps { data: data.clone() }),
        data,
    };
    let info = SuperBlockInfo {
        inode_count: 0,
        block_count: 0,
        block_size: ROOTFS_BLOCK_SIZE,
        max_file: ROOTFS_MAX_FILE,
    };
    SuperBlock::new(None, ROOTFS_T, info, ROOTFS_ROOT_INO, Arc::new(ops))
}
