#![allow(dead_code)]

pub mod sfs;

use std::sync::{Arc, Once};

use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::vfs::MOCK_VFS_OPS;
use vfs::config::ROOTFS_T;
use vfs::{Dentry, MOUNT_TABLE, ObjectKind, TimeSpec, VfsMount, VfsOps, get_filesystem};

static INIT: Once = Once::new();

struct HostArch;

impl sync::ArchOps for HostArch {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        unsafe { MOCK_ARCH_OPS.read_and_disable_interrupts() }
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        unsafe { MOCK_ARCH_OPS.restore_interrupts(flags) }
    }

    fn interrupt_enable_mask(&self) -> usize {
        MOCK_ARCH_OPS.interrupt_enable_mask()
    }

    fn cpu_id(&self) -> usize {
        MOCK_ARCH_OPS.cpu_id()
    }
}

struct HostVfs;

impl VfsOps for HostVfs {
    fn timespec_now(&self) -> TimeSpec {
        TimeSpec::new(MOCK_VFS_OPS.tick(), 0)
    }

    fn max_objects(&self, kind: ObjectKind) -> usize {
        MOCK_VFS_OPS.limit(kind as usize)
    }
}

static HOST_ARCH: HostArch = HostArch;
static HOST_VFS: HostVfs = HostVfs;

/// 注册运行时操作并初始化 VFS（整个测试进程只做一次）
pub fn setup() {
    INIT.call_once(|| {
        unsafe {
            sync::register_arch_ops(&HOST_ARCH);
            vfs::register_vfs_ops(&HOST_VFS);
        }
        vfs::vfs_init().expect("vfs_init failed");
        sfs::register();
    });
}

/// 一个与命名空间隔离的 rootfs 实例，测试之间互不干扰
pub fn fresh_rootfs() -> Arc<VfsMount> {
    setup();
    let rootfs = get_filesystem(ROOTFS_T).unwrap();
    MOUNT_TABLE.mount(&rootfs, "scratch", None, None).unwrap()
}

/// 按名字在 `root` 下逐级查找（返回带引用的 dentry）
pub fn walk(root: &Arc<Dentry>, path: &[&str]) -> Arc<Dentry> {
    vfs::lookup(root, path).unwrap_or_else(|e| panic!("lookup {:?} failed: {:?}", path, e))
}

/// 检查整棵树的父子关系一致、兄弟名字不重复
pub fn check_tree(d: &Arc<Dentry>) {
    let children = d.children();
    let mut names: Vec<String> = children.iter().map(|c| c.name().to_string()).collect();
    names.sort();
    let before = names.len();
    names.dedup();
    assert_eq!(before, names.len(), "duplicate child under {:?}", d);
    for child in &children {
        let parent = child.parent().expect("linked child without parent");
        assert!(Arc::ptr_eq(&parent, d), "child {:?} points to another parent", child);
        check_tree(child);
    }
}

/// 在树中（包括 `d` 自身）计数大于 0 的 dentry 数量
pub fn pinned_in_tree(d: &Arc<Dentry>) -> usize {
    let own = usize::from(d.count() > 0);
    own + d.children().iter().map(pinned_in_tree).sum::<usize>()
}
