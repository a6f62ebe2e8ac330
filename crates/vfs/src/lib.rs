//! 内核虚拟文件系统层
//!
//! 此 crate 提供统一的文件系统对象模型，以及在其上运行的算法：
//!
//! - [`FileSystemType`] - 文件系统类型注册表
//! - [`SuperBlock`] - 已挂载的文件系统实例与 inode 缓存
//! - [`Inode`] - 索引节点及其命名空间操作
//! - [`Dentry`] - 路径解析缓存树
//! - [`VfsMount`] / [`MOUNT_TABLE`] - 挂载表
//! - [`File`] - 打开文件
//! - 路径解析引擎
//!
//! 对象之间的拥有关系用 `Arc` 表示，反向引用（子到父、inode 到超级块、dentry 到挂载）
//! 用 `Weak`；VFS 语义上的引用计数是每个对象上显式的原子计数。

#![no_std]

extern crate alloc;

pub mod config;
pub mod error;
pub mod ops;

mod block_dev;
mod dentry;
mod file;
mod file_system;
pub mod impls;
mod init;
mod inode;
mod mount;
mod name;
mod namei;
mod object;
mod path;
mod refcount;
mod super_block;

// Re-export ops
pub use ops::{VfsOps, register_vfs_ops, vfs_ops};

// Re-export error
pub use error::FsError;

// Re-export object
pub use object::{ObjectKind, ObjectStats, object_stats};

// Re-export block_dev
pub use block_dev::BlockDevice;

// Re-export name
pub use name::FileName;

// Re-export file_system
pub use file_system::{
    FileSystemType, ReadSuperFn, filesystems, get_filesystem, get_filesystem_by_name,
    register_filesystem,
};

// Re-export super_block
pub use super_block::{SuperBlock, SuperBlockInfo, SuperBlockOps};

// Re-export inode
pub use inode::{
    Inode, InodeGuard, InodeMetadata, InodeNo, InodeOps, InodeState, InodeType, get_inode,
    put_inode,
};

// Re-export dentry
pub use dentry::{Dentry, DentryOps, DentryStatus};

// Re-export mount
pub use mount::{MOUNT_TABLE, MountTable, VfsMount, get_root_dentry};

// Re-export path
pub use path::{
    PathComponent, lookup, normalize_path, parse_path, split_path, vfs_lookup, vfs_lookup_from,
};

// Re-export namei
pub use namei::{create, mkdir, rename, rm, rmdir, vfs_create, vfs_mkdir, vfs_rename, vfs_rm, vfs_rmdir};

// Re-export file
pub use file::{File, FileOps, vfs_open};

// Re-export init
pub use init::vfs_init;

// Re-export uapi types for convenience
pub use uapi::fcntl::{OpenFlags, SeekWhence};
pub use uapi::time::TimeSpec;
