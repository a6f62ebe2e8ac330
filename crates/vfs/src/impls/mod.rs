//! 内置文件系统实现

mod rootfs;

pub use rootfs::{ROOTFS_ROOT_INO, rootfs_read_super};
