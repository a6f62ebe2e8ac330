//! VFS 初始化

use alloc::sync::Arc;
use log::info;

use crate::config::ROOTFS_T;
use crate::impls::rootfs_read_super;
use crate::{
    FileSystemType, FsError, MOUNT_TABLE, VfsMount, get_filesystem, register_filesystem,
};

/// 注册内置 rootfs 并把它挂载为命名空间根
///
/// 调用前必须已经注册 [`VfsOps`](crate::VfsOps)。重复调用返回已有的根挂载。
pub fn vfs_init() -> Result<Arc<VfsMount>, FsError> {
    let rootfs = match get_filesystem(ROOTFS_T) {
        Ok(fs) => fs,
        Err(_) => register_filesystem(FileSystemType::new("rootfs", ROOTFS_T, rootfs_read_super))?,
    };
    if let Some(root) = MOUNT_TABLE.root_mount() {
        return Ok(root);
    }
    let root = MOUNT_TABLE.mount(&rootfs, "rootfs", None, None)?;
    info!("vfs: initialized");
    Ok(root)
}
