//! 打开文件
//!
//! [`File`] 是绑定到 dentry 的打开句柄，持有 dentry 的一个引用直到最后一次关闭，
//! 并维护读写偏移。偏移只在持有句柄自身的锁时修改。
//!
//! 与 [`Inode`] 的区别：
//!
//! - `File` 是“有状态”的（偏移、打开标志），实现 `read/write/lseek` 语义
//! - [`FileOps`] 是无状态的随机访问接口，以显式 offset 读写 inode 的内容
//!
//! 加锁顺序：文件锁先于 inode 锁。

use alloc::string::String;
use alloc::sync::Arc;
use log::debug;
use sync::SpinLock;
use uapi::fcntl::{OpenFlags, SeekWhence};

use crate::config::MAX_PATH;
use crate::object::{self, ObjectKind, ObjectSlot};
use crate::ops::now;
use crate::refcount::RefCount;
use crate::{Dentry, FsError, Inode, InodeMetadata, vfs_create, vfs_lookup};

/// 文件操作，由驱动在分配 inode 时绑定
pub trait FileOps: Send + Sync {
    /// 打开时调用，可以拒绝（如 `PermissionDenied`、`IoError`）
    fn open(&self, _inode: &Inode, _file: &File) -> Result<(), FsError> {
        Ok(())
    }

    /// 从 `offset` 读取最多 `buf.len()` 字节
    ///
    /// VFS 已经把 `buf` 截断到文件末尾之内。
    fn read(&self, inode: &Inode, offset: usize, buf: &mut [u8]) -> Result<usize, FsError>;

    /// 在 `offset` 写入 `buf`，返回写入的字节数
    ///
    /// 调用时 VFS 持有该 inode 的锁，驱动不能再对它加锁。
    fn write(&self, inode: &Inode, offset: usize, buf: &[u8]) -> Result<usize, FsError>;

    /// 每次关闭或显式 flush 时调用
    fn flush(&self, _file: &File) -> Result<(), FsError> {
        Ok(())
    }

    /// 最后一次关闭时调用
    fn close(&self, _inode: &Inode, _file: &File) -> Result<(), FsError> {
        Ok(())
    }
}

struct FileState {
    pos: usize,
    closed: bool,
}

/// 打开的文件
pub struct File {
    _slot: ObjectSlot,
    count: RefCount,
    state: SpinLock<FileState>,
    path: String,
    dentry: Arc<Dentry>,
    inode: Arc<Inode>,
    flags: OpenFlags,
    ops: Arc<dyn FileOps>,
}

impl File {
    /// 打开 `dentry`，新句柄计数为 1
    ///
    /// 以写方式打开目录返回 `IsDirectory`，对普通文件带 `O_DIRECTORY` 返回 `NotDirectory`。
    /// `O_APPEND` 时初始偏移为文件大小。
    pub fn open(dentry: &Arc<Dentry>, flags: OpenFlags) -> Result<Arc<File>, FsError> {
        let inode = dentry.inode()?;
        if inode.is_dir() && flags.writable() {
            return Err(FsError::IsDirectory);
        }
        if flags.contains(OpenFlags::O_DIRECTORY) && !inode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        let path = dentry.full_path();
        if path.len() > MAX_PATH {
            return Err(FsError::NameTooLong);
        }

        let slot = object::acquire(ObjectKind::File)?;
        let pinned = dentry.get()?;
        let file = Arc::new(File {
            _slot: slot,
            count: RefCount::new(1),
            state: SpinLock::new(FileState {
                pos: 0,
                closed: false,
            }),
            path,
            dentry: pinned,
            ops: inode.fops().clone(),
            inode,
            flags,
        });

        if let Err(e) = file.ops.open(&file.inode, &file) {
            file.state.lock().closed = true;
            file.dentry.release()?;
            return Err(e);
        }
        if flags.contains(OpenFlags::O_APPEND) {
            let size = file.inode.lock().size;
            file.state.lock().pos = size;
        }
        debug!("vfs: opened {} ({:?})", file.path, flags);
        Ok(file)
    }

    /// 打开时的绝对路径
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 所属 dentry
    pub fn dentry(&self) -> &Arc<Dentry> {
        &self.dentry
    }

    /// 所属 inode
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    /// 打开标志
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// 当前引用计数
    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// 是否已经关闭
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// 当前偏移
    pub fn offset(&self) -> usize {
        self.state.lock().pos
    }

    /// 元数据
    pub fn metadata(&self) -> InodeMetadata {
        self.inode.metadata()
    }

    /// 从当前偏移读取，文件末尾处返回短读
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, FsError> {
        if self.inode.is_dir() {
            return Err(FsError::IsDirectory);
        }
        if !self.flags.readable() {
            return Err(FsError::PermissionDenied);
        }
        let mut state = self.state.lock();
        if state.closed {
            return Err(FsError::BadFileDescriptor);
        }
        let size = self.inode.lock().size;
        if state.pos >= size || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(size - state.pos);
        let n = self.ops.read(&self.inode, state.pos, &mut buf[..len])?;
        state.pos += n;
        self.inode.lock().atime = now();
        Ok(n)
    }

    /// 在当前偏移（`O_APPEND` 时为文件末尾）写入
    ///
    /// 超过超级块的最大文件大小返回 `NoSpace`。
    pub fn write(&self, buf: &[u8]) -> Result<usize, FsError> {
        if self.inode.is_dir() {
            return Err(FsError::IsDirectory);
        }
        if !self.flags.writable() {
            return Err(FsError::PermissionDenied);
        }
        let info = self.inode.super_block()?.info();
        let mut state = self.state.lock();
        if state.closed {
            return Err(FsError::BadFileDescriptor);
        }
        // 取偏移、写入、更新大小都在同一把 inode 锁内，并发追加不会落在同一偏移
        let mut inode = self.inode.lock();
        let offset = if self.flags.contains(OpenFlags::O_APPEND) {
            inode.size
        } else {
            state.pos
        };
        let end = offset.checked_add(buf.len()).ok_or(FsError::NoSpace)?;
        if info.max_file != 0 && end > info.max_file as usize {
            return Err(FsError::NoSpace);
        }
        let n = self.ops.write(&self.inode, offset, buf)?;
        if offset + n > inode.size {
            inode.set_size(offset + n, info.block_size as usize);
        }
        let t = now();
        inode.mtime = t;
        inode.ctime = t;
        drop(inode);
        state.pos = offset + n;
        Ok(n)
    }

    /// 调整偏移，结果为负时返回 `InvalidArgument`
    pub fn lseek(&self, offset: isize, whence: SeekWhence) -> Result<usize, FsError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(FsError::BadFileDescriptor);
        }
        let base = match whence {
            SeekWhence::Set => 0,
            SeekWhence::Cur => state.pos,
            SeekWhence::End => self.inode.lock().size,
        };
        let pos = base
            .checked_add_signed(offset)
            .ok_or(FsError::InvalidArgument)?;
        state.pos = pos;
        Ok(pos)
    }

    /// 调用驱动的 flush
    pub fn flush(&self) -> Result<(), FsError> {
        if self.is_closed() {
            return Err(FsError::BadFileDescriptor);
        }
        self.ops.flush(self)
    }

    /// 复制句柄（共享偏移），引用计数加一
    pub fn get(self: &Arc<Self>) -> Result<Arc<Self>, FsError> {
        if self.is_closed() {
            return Err(FsError::BadFileDescriptor);
        }
        self.count.inc().map_err(|_| FsError::BadFileDescriptor)?;
        Ok(self.clone())
    }

    /// 关闭一个引用
    ///
    /// 每次都会 flush；最后一个引用关闭时调用驱动的 `close` 并释放 dentry。
    /// 对已经关闭的句柄返回 `BadFileDescriptor`。
    pub fn close(self: &Arc<Self>) -> Result<(), FsError> {
        if self.is_closed() {
            return Err(FsError::BadFileDescriptor);
        }
        let flushed = self.ops.flush(self);
        let left = self
            .count
            .dec()
            .map_err(|_| FsError::BadFileDescriptor)?;
        if left > 0 {
            return flushed;
        }
        self.state.lock().closed = true;
        self.count.try_kill();
        let closed = self.ops.close(&self.inode, self);
        self.dentry.release()?;
        debug!("vfs: closed {}", self.path);
        flushed.and(closed)
    }
}

impl core::fmt::Debug for File {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("count", &self.count)
            .finish()
    }
}

/// 按绝对路径打开文件，支持 `O_CREAT` 与 `O_EXCL`
pub fn vfs_open(path: &str, flags: OpenFlags) -> Result<Arc<File>, FsError> {
    let dentry = match vfs_lookup(path) {
        Ok(dentry) => {
            if flags.contains(OpenFlags::O_CREAT | OpenFlags::O_EXCL) {
                dentry.release()?;
                return Err(FsError::AlreadyExists);
            }
            dentry
        }
        Err(FsError::NotFound) if flags.contains(OpenFlags::O_CREAT) => match vfs_create(path) {
            Ok(dentry) => dentry,
            // 并发创建：非独占打开时改为打开已有文件
            Err(FsError::AlreadyExists) if !flags.contains(OpenFlags::O_EXCL) => vfs_lookup(path)?,
            Err(e) => return Err(e),
        },
        Err(e) => return Err(e),
    };
    let file = File::open(&dentry, flags);
    dentry.release()?;
    file
}
