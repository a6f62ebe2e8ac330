//! 测试用的平坦文件系统
//!
//! 只有一个根目录，不支持子目录。块 0 存放几何参数：
//! `magic(u32) | inode_count(u32) | block_size(u32) | fail_sync(u8)`，小端；
//! inode `n` 的内容存放在块 `n`。`fail_sync` 非 0 时 `sync_fs` 返回 `IoError`。
//!
//! 名为 `broken` 的条目查找时返回 `IoError`，名为 `locked` 的文件打开时返回 `PermissionDenied`。

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use test_support::mock::block::RamDisk;
use vfs::config::SFS_T;
use vfs::{
    BlockDevice, Dentry, File, FileOps, FileSystemType, FsError, Inode, InodeGuard, InodeNo,
    InodeOps, InodeState, InodeType, SuperBlock, SuperBlockInfo, SuperBlockOps, get_filesystem,
    register_filesystem,
};

pub const SFS_MAGIC: u32 = 0x5346_5321;
pub const SFS_ROOT_INO: InodeNo = 1;

/// `sync_fs` 调用次数
pub static SYNC_CALLS: AtomicUsize = AtomicUsize::new(0);

/// 把 `RamDisk` 适配为 `BlockDevice`
pub struct Disk(pub Arc<RamDisk>);

impl BlockDevice for Disk {
    fn block_size(&self) -> usize {
        self.0.block_size()
    }

    fn total_blocks(&self) -> usize {
        self.0.total_blocks()
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), FsError> {
        self.0
            .read_block(block_id, buf)
            .then_some(())
            .ok_or(FsError::IoError)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), FsError> {
        self.0
            .write_block(block_id, buf)
            .then_some(())
            .ok_or(FsError::IoError)
    }
}

/// 创建并格式化一块磁盘
pub fn format(block_size: usize, blocks: usize) -> Arc<RamDisk> {
    let disk = Arc::new(RamDisk::new(block_size, blocks));
    let mut sb = vec![0u8; block_size];
    sb[0..4].copy_from_slice(&SFS_MAGIC.to_le_bytes());
    sb[4..8].copy_from_slice(&(blocks as u32).to_le_bytes());
    sb[8..12].copy_from_slice(&(block_size as u32).to_le_bytes());
    assert!(disk.write_block(0, &sb));
    disk
}

/// 格式化一块 `sync_fs` 总是失败的磁盘
pub fn format_failing_sync(block_size: usize, blocks: usize) -> Arc<RamDisk> {
    let disk = format(block_size, blocks);
    let mut sb = vec![0u8; block_size];
    assert!(disk.read_block(0, &mut sb));
    sb[12] = 1;
    assert!(disk.write_block(0, &sb));
    disk
}

/// 包装成 `read_super` 需要的块设备句柄
pub fn device(disk: &Arc<RamDisk>) -> Option<Arc<dyn BlockDevice>> {
    Some(Arc::new(Disk(disk.clone())))
}

pub fn register() {
    if get_filesystem(SFS_T).is_err() {
        let _ = register_filesystem(FileSystemType::new("sfs", SFS_T, read_super));
    }
}

pub fn fs_type() -> Arc<FileSystemType> {
    register();
    get_filesystem(SFS_T).unwrap()
}

struct SfsNode {
    itype: InodeType,
    state: InodeState,
}

struct Sfs {
    dev: Arc<dyn BlockDevice>,
    block_size: usize,
    inode_count: usize,
    fail_sync: AtomicBool,
    entries: Mutex<BTreeMap<String, InodeNo>>,
    nodes: Mutex<BTreeMap<InodeNo, SfsNode>>,
}

impl Sfs {
    fn free_ino(&self) -> Result<InodeNo, FsError> {
        let nodes = self.nodes.lock().unwrap();
        (SFS_ROOT_INO + 1..self.inode_count)
            .find(|ino| !nodes.contains_key(ino))
            .ok_or(FsError::NoSpace)
    }
}

struct SfsSuper(Arc<Sfs>);
struct SfsDir(Arc<Sfs>);
struct SfsFile(Arc<Sfs>);

impl SuperBlockOps for SfsSuper {
    fn alloc_inode(&self, sb: &Arc<SuperBlock>, ino: InodeNo) -> Result<Arc<Inode>, FsError> {
        // 物化 inode 需要读盘，读失败时如实上报
        let mut buf = vec![0u8; self.0.block_size];
        self.0.dev.read_block(0, &mut buf)?;
        let (itype, state) = {
            let nodes = self.0.nodes.lock().unwrap();
            let node = nodes.get(&ino).ok_or(FsError::NotFound)?;
            (node.itype, node.state)
        };
        Inode::new(
            sb,
            ino,
            itype,
            state,
            Arc::new(SfsDir(self.0.clone())),
            Arc::new(SfsFile(self.0.clone())),
        )
    }

    fn destroy_inode(&self, inode: &Inode) -> Result<(), FsError> {
        let state = *inode.lock();
        if let Some(node) = self.0.nodes.lock().unwrap().get_mut(&inode.ino()) {
            node.state = state;
        }
        Ok(())
    }

    fn delete_inode(&self, inode: &Inode) -> Result<(), FsError> {
        self.0.nodes.lock().unwrap().remove(&inode.ino());
        let zero = vec![0u8; self.0.block_size];
        self.0.dev.write_block(inode.ino(), &zero)
    }

    fn sync_fs(&self, _sb: &SuperBlock) -> Result<(), FsError> {
        SYNC_CALLS.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_sync.load(Ordering::SeqCst) {
            return Err(FsError::IoError);
        }
        Ok(())
    }
}

impl InodeOps for SfsDir {
    fn lookup(&self, _dir: &InodeGuard<'_>, name: &str) -> Result<InodeNo, FsError> {
        if name == "broken" {
            return Err(FsError::IoError);
        }
        self.0
            .entries
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .ok_or(FsError::NotFound)
    }

    fn create(&self, dir: &mut InodeGuard<'_>, dentry: &Dentry) -> Result<InodeNo, FsError> {
        let ino = self.0.free_ino()?;
        let name = dentry.name().to_string();
        let mut entries = self.0.entries.lock().unwrap();
        if entries.contains_key(&name) {
            return Err(FsError::AlreadyExists);
        }
        self.0.nodes.lock().unwrap().insert(
            ino,
            SfsNode {
                itype: InodeType::File,
                state: InodeState::default(),
            },
        );
        entries.insert(name, ino);
        dir.size = entries.len();
        Ok(ino)
    }

    fn rm(&self, dir: &mut InodeGuard<'_>, dentry: &Dentry) -> Result<(), FsError> {
        let mut entries = self.0.entries.lock().unwrap();
        entries
            .remove(dentry.name().as_str())
            .ok_or(FsError::NotFound)?;
        dir.size = entries.len();
        Ok(())
    }

    fn rename(
        &self,
        _old_dir: &mut InodeGuard<'_>,
        dentry: &Dentry,
        new_dir: Option<&mut InodeGuard<'_>>,
        new_name: &str,
    ) -> Result<(), FsError> {
        if new_dir.is_some() {
            return Err(FsError::NotSupported);
        }
        let mut entries = self.0.entries.lock().unwrap();
        if entries.contains_key(new_name) {
            return Err(FsError::AlreadyExists);
        }
        let ino = entries
            .remove(dentry.name().as_str())
            .ok_or(FsError::NotFound)?;
        entries.insert(new_name.to_string(), ino);
        Ok(())
    }
}

impl FileOps for SfsFile {
    fn open(&self, _inode: &Inode, file: &File) -> Result<(), FsError> {
        if file.dentry().name() == *"locked" {
            return Err(FsError::PermissionDenied);
        }
        Ok(())
    }

    fn read(&self, inode: &Inode, offset: usize, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut block = vec![0u8; self.0.block_size];
        self.0.dev.read_block(inode.ino(), &mut block)?;
        let n = buf.len().min(self.0.block_size.saturating_sub(offset));
        buf[..n].copy_from_slice(&block[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, inode: &Inode, offset: usize, buf: &[u8]) -> Result<usize, FsError> {
        let mut block = vec![0u8; self.0.block_size];
        self.0.dev.read_block(inode.ino(), &mut block)?;
        block[offset..offset + buf.len()].copy_from_slice(buf);
        self.0.dev.write_block(inode.ino(), &block)?;
        Ok(buf.len())
    }
}

fn read_super(bdev: Option<Arc<dyn BlockDevice>>) -> Result<Arc<SuperBlock>, FsError> {
    let dev = bdev.ok_or(FsError::NoDevice)?;
    let mut buf = vec![0u8; dev.block_size()];
    dev.read_block(0, &mut buf)?;
    let word = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
    if word(0) != SFS_MAGIC {
        return Err(FsError::InvalidArgument);
    }
    let inode_count = word(4) as usize;
    let block_size = word(8) as usize;

    let mut nodes = BTreeMap::new();
    nodes.insert(
        SFS_ROOT_INO,
        SfsNode {
            itype: InodeType::Directory,
            state: InodeState::default(),
        },
    );
    let sfs = Arc::new(Sfs {
        dev: dev.clone(),
        block_size,
        inode_count,
        fail_sync: AtomicBool::new(buf[12] != 0),
        entries: Mutex::new(BTreeMap::new()),
        nodes: Mutex::new(nodes),
    });
    let info = SuperBlockInfo {
        inode_count: inode_count as u32,
        block_count: dev.total_blocks() as u32,
        block_size: block_size as u32,
        max_file: block_size as u32,
    };
    SuperBlock::new(Some(dev), SFS_T, info, SFS_ROOT_INO, Arc::new(SfsSuper(sfs)))
}
