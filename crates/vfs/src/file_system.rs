//! 文件系统类型注册表
//!
//! 每个文件系统类型由唯一的名字和唯一的数值标签标识，携带构造超级块的
//! `read_super` 回调，以及当前挂载在该类型下的超级块列表。注册只在启动时发生，
//! 不提供注销。

use alloc::sync::Arc;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use sync::{RwLock, SpinLock};

use crate::{BlockDevice, FsError, SuperBlock};

/// 从块设备构造超级块的回调
pub type ReadSuperFn = fn(Option<Arc<dyn BlockDevice>>) -> Result<Arc<SuperBlock>, FsError>;

/// 文件系统类型
pub struct FileSystemType {
    name: &'static str,
    tag: u32,
    read_super: ReadSuperFn,
    supers: SpinLock<Vec<Arc<SuperBlock>>>,
}

impl FileSystemType {
    /// 创建一个尚未注册的文件系统类型
    pub fn new(name: &'static str, tag: u32, read_super: ReadSuperFn) -> Self {
        Self {
            name,
            tag,
            read_super,
            supers: SpinLock::new(Vec::new()),
        }
    }

    /// 类型名
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 类型标签
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// 当前挂载在该类型下的超级块（按挂载顺序）
    pub fn super_blocks(&self) -> Vec<Arc<SuperBlock>> {
        self.supers.lock().clone()
    }

    pub(crate) fn read_super(
        &self,
        bdev: Option<Arc<dyn BlockDevice>>,
    ) -> Result<Arc<SuperBlock>, FsError> {
        (self.read_super)(bdev)
    }

    pub(crate) fn add_super(&self, sb: Arc<SuperBlock>) {
        self.supers.lock().push(sb);
    }

    pub(crate) fn remove_super(&self, sb: &Arc<SuperBlock>) {
        self.supers.lock().retain(|s| !Arc::ptr_eq(s, sb));
    }
}

impl core::fmt::Debug for FileSystemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileSystemType")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .finish()
    }
}

lazy_static! {
    static ref FILE_SYSTEMS: RwLock<Vec<Arc<FileSystemType>>> = RwLock::new(Vec::new());
}

/// 注册文件系统类型
///
/// 名字或标签与已注册类型重复时返回 [`FsError::DuplicateType`]。
pub fn register_filesystem(fs: FileSystemType) -> Result<Arc<FileSystemType>, FsError> {
    let mut table = FILE_SYSTEMS.write();
    if table
        .iter()
        .any(|t| t.name == fs.name || t.tag == fs.tag)
    {
        log::warn!("vfs: filesystem type '{}' ({:#x}) already registered", fs.name, fs.tag);
        return Err(FsError::DuplicateType);
    }
    let fs = Arc::new(fs);
    table.push(fs.clone());
    log::info!("vfs: registered filesystem type '{}' ({:#x})", fs.name, fs.tag);
    Ok(fs)
}

/// 按标签查找文件系统类型
pub fn get_filesystem(tag: u32) -> Result<Arc<FileSystemType>, FsError> {
    FILE_SYSTEMS
        .read()
        .iter()
        .find(|t| t.tag == tag)
        .cloned()
        .ok_or(FsError::NotFound)
}

/// 按名字查找文件系统类型
pub fn get_filesystem_by_name(name: &str) -> Result<Arc<FileSystemType>, FsError> {
    FILE_SYSTEMS
        .read()
        .iter()
        .find(|t| t.name == name)
        .cloned()
        .ok_or(FsError::NotFound)
}

/// 已注册类型的快照
pub fn filesystems() -> Vec<Arc<FileSystemType>> {
    FILE_SYSTEMS.read().clone()
}
