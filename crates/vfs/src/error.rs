//! VFS 错误类型
//!
//! 定义了与 POSIX 兼容的文件系统错误码，可通过 [`FsError::to_errno()`] 转换为系统调用错误码。

/// VFS 错误类型
///
/// 各错误码对应标准 POSIX errno 值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    // 文件/目录相关
    /// 文件不存在 (-ENOENT)
    NotFound,
    /// 文件已存在 (-EEXIST)
    AlreadyExists,
    /// 不是目录 (-ENOTDIR)
    NotDirectory,
    /// 是目录 (-EISDIR)
    IsDirectory,
    /// 目录非空 (-ENOTEMPTY)
    DirectoryNotEmpty,

    // 权限相关
    /// 权限被拒绝 (-EACCES)
    PermissionDenied,

    // 文件描述符相关
    /// 文件已关闭 (-EBADF)
    BadFileDescriptor,

    // 参数相关
    /// 无效参数 (-EINVAL)
    InvalidArgument,
    /// 文件名或路径过长 (-ENAMETOOLONG)
    NameTooLong,

    // 文件系统相关
    /// 设备空间不足 (-ENOSPC)
    NoSpace,
    /// I/O 错误 (-EIO)
    IoError,
    /// 设备不存在 (-ENODEV)
    NoDevice,
    /// 跨文件系统操作 (-EXDEV)
    CrossDevice,
    /// 文件系统类型重复注册 (-EEXIST)
    DuplicateType,
    /// 挂载点已被占用 (-EBUSY)
    AlreadyMounted,
    /// 对象仍被引用 (-EBUSY)
    Busy,
    /// 对象分配失败 (-ENOMEM)
    AllocFailed,
    /// 驱动无法构造超级块 (-EINVAL)
    ReadSuperFailed,

    // 其他
    /// 操作不支持 (-ENOTSUP)
    NotSupported,
}

impl FsError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            FsError::NotFound => -2,
            FsError::IoError => -5,
            FsError::BadFileDescriptor => -9,
            FsError::AllocFailed => -12,
            FsError::PermissionDenied => -13,
            FsError::Busy | FsError::AlreadyMounted => -16,
            FsError::AlreadyExists | FsError::DuplicateType => -17,
            FsError::CrossDevice => -18,
            FsError::NoDevice => -19,
            FsError::NotDirectory => -20,
            FsError::IsDirectory => -21,
            FsError::InvalidArgument | FsError::ReadSuperFailed => -22,
            FsError::NoSpace => -28,
            FsError::NameTooLong => -36,
            FsError::DirectoryNotEmpty => -39,
            FsError::NotSupported => -95,
        }
    }
}
