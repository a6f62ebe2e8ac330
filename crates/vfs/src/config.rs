//! 编译期常量

/// 单个路径分量的最大字节数
pub const MAX_FILE_NAME: usize = 128;

/// 路径（分量加分隔符）的最大字节数
pub const MAX_PATH: usize = 1024;

/// 内置根文件系统的类型标签
pub const ROOTFS_T: u32 = 0xA0;

/// 简单平坦文件系统的类型标签
pub const SFS_T: u32 = 0xAA;
