//! 测试支持 crate
//!
//! 提供宿主机测试用的 Mock 实现。这里不依赖任何被测 crate，
//! 被测 crate 的测试代码负责把这些 Mock 接到各自的 trait 上。

#![no_std]

extern crate alloc;

pub mod mock;
