//! 定长文件名缓冲区

use core::fmt;

use crate::FsError;
use crate::config::MAX_FILE_NAME;

/// 单个路径分量，最长 [`MAX_FILE_NAME`] 字节
#[derive(Clone, Copy)]
pub struct FileName {
    buf: [u8; MAX_FILE_NAME],
    len: usize,
}

impl FileName {
    /// 校验并复制名字
    ///
    /// 超长返回 `NameTooLong`；空串、`.`、`..` 以及含 `/` 或 NUL 的名字返回 `InvalidArgument`。
    pub fn new(name: &str) -> Result<Self, FsError> {
        if name.len() > MAX_FILE_NAME {
            return Err(FsError::NameTooLong);
        }
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(FsError::InvalidArgument);
        }
        let mut buf = [0u8; MAX_FILE_NAME];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self {
            buf,
            len: name.len(),
        })
    }

    /// 树根使用的名字 "/"
    pub(crate) fn root() -> Self {
        let mut buf = [0u8; MAX_FILE_NAME];
        buf[0] = b'/';
        Self { buf, len: 1 }
    }

    /// 名字内容
    pub fn as_str(&self) -> &str {
        // SAFETY: buf[..len] 只会由合法的 &str 复制而来
        unsafe { core::str::from_utf8_unchecked(&self.buf[..self.len]) }
    }

    /// 字节长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空（只有未初始化的名字才会为空）
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PartialEq for FileName {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for FileName {}

impl PartialEq<str> for FileName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl fmt::Debug for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
