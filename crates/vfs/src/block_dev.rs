//! 块设备接口
//!
//! VFS 核心不解释块内容，只把设备句柄原样交给 `read_super` 并保存在超级块上。

use crate::FsError;

/// 以块为单位读写的设备
pub trait BlockDevice: Send + Sync {
    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 设备总块数
    fn total_blocks(&self) -> usize;

    /// 读取一个块到 `buf`（`buf` 至少一个块大小）
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), FsError>;

    /// 将 `buf` 写入一个块
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), FsError>;
}
