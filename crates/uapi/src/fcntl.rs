//! 文件打开标志与偏移方式

bitflags::bitflags! {
    /// open(2) 标志（取值与 Linux 一致）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const O_RDONLY    = 0o0;
        const O_WRONLY    = 0o1;
        const O_RDWR      = 0o2;
        /// 访问模式掩码
        const O_ACCMODE   = 0o3;
        const O_CREAT     = 0o100;
        const O_EXCL      = 0o200;
        const O_TRUNC     = 0o1000;
        const O_APPEND    = 0o2000;
        const O_DIRECTORY = 0o200000;
    }
}

impl OpenFlags {
    fn access_mode(&self) -> u32 {
        self.bits() & Self::O_ACCMODE.bits()
    }

    /// 是否允许读
    pub fn readable(&self) -> bool {
        matches!(self.access_mode(), 0o0 | 0o2)
    }

    /// 是否允许写
    pub fn writable(&self) -> bool {
        matches!(self.access_mode(), 0o1 | 0o2)
    }
}

/// lseek(2) 的基准位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SeekWhence {
    Set = 0,
    Cur = 1,
    End = 2,
}

impl TryFrom<usize> for SeekWhence {
    type Error = ();

    fn try_from(value: usize) -> Result<Self, ()> {
        match value {
            0 => Ok(SeekWhence::Set),
            1 => Ok(SeekWhence::Cur),
            2 => Ok(SeekWhence::End),
            _ => Err(()),
        }
    }
}
