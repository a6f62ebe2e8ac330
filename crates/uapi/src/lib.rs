//! 与用户空间共用的定义
//!
//! 打开标志、偏移方式和时间戳等在内核与用户空间之间保持一致的类型。

#![no_std]
#![allow(missing_docs)]

pub mod fcntl;
pub mod time;
