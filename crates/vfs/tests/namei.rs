mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use common::sfs;
use vfs::config::ROOTFS_T;
use vfs::{
    DentryStatus, File, FsError, MOUNT_TABLE, OpenFlags, create, get_filesystem, lookup, mkdir,
    rename, rm, rmdir,
};

#[test]
fn test_create_and_mkdir_conflicts() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let a = mkdir(root, "a").unwrap();
    assert_eq!(create(root, "a").unwrap_err(), FsError::AlreadyExists);
    assert_eq!(mkdir(root, "a").unwrap_err(), FsError::AlreadyExists);
    assert_eq!(create(root, "x/y").unwrap_err(), FsError::InvalidArgument);
    assert_eq!(create(root, "..").unwrap_err(), FsError::InvalidArgument);

    let f = create(&a, "f").unwrap();
    assert_eq!(create(&f, "g").unwrap_err(), FsError::NotDirectory);
    assert_eq!(mkdir(&f, "g").unwrap_err(), FsError::NotDirectory);

    // 失败不留下任何节点
    assert_eq!(root.children().len(), 1);
    assert_eq!(a.children().len(), 1);
    assert_eq!(a.inode().unwrap().metadata().size, 1);
    assert_eq!(a.count(), 1);
    assert_eq!(f.count(), 1);
    common::check_tree(root);

    f.release().unwrap();
    a.release().unwrap();
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_create_touches_parent() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let before = root.inode().unwrap().metadata();
    let f = create(root, "f").unwrap();
    let after = root.inode().unwrap().metadata();
    assert!(after.mtime > before.mtime);
    assert!(after.ctime > before.ctime);
    assert_eq!(after.size, before.size + 1);
    f.release().unwrap();
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_remove_type_checks() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let d = mkdir(root, "d").unwrap();
    let f = create(root, "f").unwrap();

    assert_eq!(rm(root, "d").unwrap_err(), FsError::IsDirectory);
    assert_eq!(rmdir(root, "f").unwrap_err(), FsError::NotDirectory);
    assert_eq!(rm(root, "missing").unwrap_err(), FsError::NotFound);
    assert_eq!(rmdir(&f, "x").unwrap_err(), FsError::NotDirectory);
    assert_eq!(d.count(), 1);
    assert_eq!(f.count(), 1);

    f.release().unwrap();
    d.release().unwrap();
    rm(root, "f").unwrap();
    rmdir(root, "d").unwrap();
    assert!(root.children().is_empty());
    assert_eq!(root.inode().unwrap().metadata().size, 0);
    assert_eq!(lookup(root, &["f"]).unwrap_err(), FsError::NotFound);
    assert_eq!(lookup(root, &["d"]).unwrap_err(), FsError::NotFound);
    assert!(d.status().contains(DentryStatus::DELETED));
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_rmdir_non_empty() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let d = mkdir(root, "d").unwrap();
    create(&d, "inner").unwrap().release().unwrap();
    d.release().unwrap();

    // 缓存中的空闲子节点会被回收，但驱动仍然看到目录非空
    assert_eq!(rmdir(root, "d").unwrap_err(), FsError::DirectoryNotEmpty);
    let pinned = lookup(root, &["d", "inner"]).unwrap();
    assert_eq!(rmdir(root, "d").unwrap_err(), FsError::DirectoryNotEmpty);
    pinned.release().unwrap();

    rm(&d, "inner").unwrap();
    rmdir(root, "d").unwrap();
    assert!(root.children().is_empty());
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_rmdir_mountpoint_busy() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let m = mkdir(root, "m").unwrap();
    let rootfs = get_filesystem(ROOTFS_T).unwrap();
    let inner = MOUNT_TABLE.mount(&rootfs, "inner", None, Some(&m)).unwrap();

    assert_eq!(rmdir(root, "m").unwrap_err(), FsError::Busy);
    assert_eq!(rename(root, "m", root, "m2").unwrap_err(), FsError::Busy);
    assert!(m.is_mounted());

    MOUNT_TABLE.umount(&inner).unwrap();
    m.release().unwrap();
    rmdir(root, "m").unwrap();
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_unlink_while_open() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let f = create(root, "f").unwrap();
    let file = File::open(&f, OpenFlags::O_RDWR).unwrap();
    assert_eq!(file.write(b"still here").unwrap(), 10);
    let inode = f.inode().unwrap();

    rm(root, "f").unwrap();
    assert_eq!(lookup(root, &["f"]).unwrap_err(), FsError::NotFound);
    assert!(inode.is_pending_delete());
    assert!(f.status().contains(DentryStatus::DELETED));
    assert!(f.parent().is_none());

    // 打开的句柄仍然可用
    file.lseek(0, vfs::SeekWhence::Set).unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(file.read(&mut buf).unwrap(), 10);
    assert_eq!(&buf[..10], b"still here");

    // 同名文件可以重新创建，得到新的 inode
    let g = create(root, "f").unwrap();
    assert_ne!(g.inode().unwrap().ino(), inode.ino());
    g.release().unwrap();

    f.release().unwrap();
    assert_eq!(f.count(), 1);
    file.close().unwrap();
    assert_eq!(f.count(), 0);
    assert_eq!(f.inode().unwrap_err(), FsError::NotFound);
    assert_eq!(inode.count(), 0);
    assert_eq!(mnt.super_block().cached_inodes(), 2);
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_rename_same_dir() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let a = create(root, "a").unwrap();
    rename(root, "a", root, "b").unwrap();
    assert_eq!(a.name(), *"b");
    assert_eq!(lookup(root, &["a"]).unwrap_err(), FsError::NotFound);
    let b = lookup(root, &["b"]).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    b.release().unwrap();

    // 同名改名什么都不做，但源必须存在
    rename(root, "b", root, "b").unwrap();
    assert_eq!(a.name(), *"b");
    assert_eq!(rename(root, "ghost", root, "ghost").unwrap_err(), FsError::NotFound);
    assert_eq!(root.children().len(), 1);

    let c = create(root, "c").unwrap();
    assert_eq!(rename(root, "b", root, "c").unwrap_err(), FsError::AlreadyExists);
    assert_eq!(a.name(), *"b");
    assert_eq!(rename(root, "nope", root, "d").unwrap_err(), FsError::NotFound);

    c.release().unwrap();
    a.release().unwrap();
    common::check_tree(root);
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_ops_on_removed_directory() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let d1 = mkdir(root, "d1").unwrap();
    let d2 = mkdir(root, "d2").unwrap();
    create(&d1, "x").unwrap().release().unwrap();
    rmdir(root, "d2").unwrap();
    assert!(d2.status().contains(DentryStatus::DELETED));

    // 已删除的目录在调用驱动之前就被拒绝
    assert_eq!(create(&d2, "y").unwrap_err(), FsError::NotFound);
    assert_eq!(mkdir(&d2, "y").unwrap_err(), FsError::NotFound);
    assert_eq!(rm(&d2, "y").unwrap_err(), FsError::NotFound);
    assert_eq!(rmdir(&d2, "y").unwrap_err(), FsError::NotFound);
    assert_eq!(d2.inode().unwrap().metadata().size, 0);
    assert!(d2.children().is_empty());

    assert_eq!(rename(&d1, "x", &d2, "x").unwrap_err(), FsError::NotFound);
    assert_eq!(rename(&d2, "x", &d1, "z").unwrap_err(), FsError::NotFound);
    assert_eq!(d1.inode().unwrap().metadata().size, 1);

    // 丢掉缓存后从驱动重新查找，文件仍在原处
    assert_eq!(d1.prune(), 1);
    let x = lookup(root, &["d1", "x"]).unwrap();
    assert_eq!(x.full_path(), "/d1/x");
    x.release().unwrap();

    d2.release().unwrap();
    d1.release().unwrap();
    common::check_tree(root);
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_concurrent_rmdir_and_create() {
    let mnt = common::fresh_rootfs();
    let done = Arc::new(AtomicBool::new(false));

    let creator = {
        let mnt = mnt.clone();
        let done = done.clone();
        thread::spawn(move || {
            let root = mnt.root();
            while !done.load(Ordering::Acquire) {
                let v = match lookup(root, &["v"]) {
                    Ok(v) => v,
                    Err(FsError::NotFound) => continue,
                    Err(e) => panic!("lookup v failed: {:?}", e),
                };
                match create(&v, "c") {
                    Ok(c) => {
                        // c 在驱动中存在时 v 不可能被删除
                        assert!(!v.status().contains(DentryStatus::DELETED));
                        assert!(Arc::ptr_eq(&c.parent().unwrap(), &v));
                        c.release().unwrap();
                        rm(&v, "c").unwrap();
                    }
                    Err(FsError::NotFound) => {}
                    Err(e) => panic!("create under v failed: {:?}", e),
                }
                v.release().unwrap();
            }
        })
    };

    let root = mnt.root();
    for _ in 0..200 {
        let v = mkdir(root, "v").unwrap();
        loop {
            match rmdir(root, "v") {
                Ok(()) => break,
                Err(FsError::DirectoryNotEmpty) => thread::yield_now(),
                Err(e) => panic!("rmdir v failed: {:?}", e),
            }
        }
        assert!(v.status().contains(DentryStatus::DELETED));
        assert!(v.children().is_empty());
        v.release().unwrap();
    }
    done.store(true, Ordering::Release);
    creator.join().unwrap();

    root.prune();
    assert!(root.children().is_empty());
    assert_eq!(root.inode().unwrap().metadata().size, 0);
    assert_eq!(mnt.super_block().cached_inodes(), 1);
    common::check_tree(root);
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_rename_cross_dir() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let d1 = mkdir(root, "d1").unwrap();
    let d2 = mkdir(root, "d2").unwrap();
    let x = create(&d1, "x").unwrap();
    let sub = mkdir(&d1, "sub").unwrap();

    rename(&d1, "x", &d2, "y").unwrap();
    assert!(Arc::ptr_eq(&x.parent().unwrap(), &d2));
    assert_eq!(x.full_path(), "/d2/y");
    rename(&d1, "sub", &d2, "sub").unwrap();
    assert_eq!(sub.full_path(), "/d2/sub");
    assert!(d1.children().is_empty());
    assert_eq!(d1.inode().unwrap().metadata().size, 0);
    assert_eq!(d2.inode().unwrap().metadata().size, 2);

    let y = lookup(root, &["d2", "y"]).unwrap();
    assert!(Arc::ptr_eq(&x, &y));
    y.release().unwrap();

    let z = create(&d1, "z").unwrap();
    assert_eq!(rename(&d1, "z", &d2, "y").unwrap_err(), FsError::AlreadyExists);
    assert!(Arc::ptr_eq(&z.parent().unwrap(), &d1));

    common::check_tree(root);
    for d in [z, sub, x, d2, d1] {
        d.release().unwrap();
    }
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_rename_into_own_subtree() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let a = mkdir(root, "a").unwrap();
    let b = mkdir(&a, "b").unwrap();

    assert_eq!(rename(root, "a", &b, "a2").unwrap_err(), FsError::InvalidArgument);
    assert_eq!(rename(root, "a", &a, "a2").unwrap_err(), FsError::InvalidArgument);
    assert!(Arc::ptr_eq(&a.parent().unwrap(), root));

    // 反方向（把子目录移到祖先下）是允许的
    rename(&a, "b", root, "b").unwrap();
    assert!(Arc::ptr_eq(&b.parent().unwrap(), root));
    common::check_tree(root);

    b.release().unwrap();
    a.release().unwrap();
    MOUNT_TABLE.umount(&mnt).unwrap();
}

#[test]
fn test_rename_cross_device() {
    let one = common::fresh_rootfs();
    let two = common::fresh_rootfs();
    create(one.root(), "f").unwrap().release().unwrap();
    assert_eq!(
        rename(one.root(), "f", two.root(), "f").unwrap_err(),
        FsError::CrossDevice
    );
    let f = lookup(one.root(), &["f"]).unwrap();
    f.release().unwrap();
    MOUNT_TABLE.umount(&one).unwrap();
    MOUNT_TABLE.umount(&two).unwrap();
}

#[test]
fn test_sfs_namespace_ops() {
    let scratch = common::fresh_rootfs();
    let m = mkdir(scratch.root(), "m").unwrap();
    let disk = sfs::format(512, 4);
    let mnt = MOUNT_TABLE
        .mount(&sfs::fs_type(), "ram0", sfs::device(&disk), Some(&m))
        .unwrap();
    let root = mnt.root();

    assert_eq!(mkdir(root, "d").unwrap_err(), FsError::NotSupported);
    assert!(root.children().is_empty());

    create(root, "a").unwrap().release().unwrap();
    create(root, "b").unwrap().release().unwrap();
    // inode 2、3 用完之后没有空闲 inode
    assert_eq!(create(root, "c").unwrap_err(), FsError::NoSpace);
    rename(root, "a", root, "c").unwrap();
    let c = lookup(root, &["c"]).unwrap();
    assert_eq!(c.full_path(), "/m/c");
    c.release().unwrap();
    rm(root, "b").unwrap();
    create(root, "d").unwrap().release().unwrap();
    common::check_tree(root);

    MOUNT_TABLE.umount(&mnt).unwrap();
    m.release().unwrap();
    MOUNT_TABLE.umount(&scratch).unwrap();
}

#[test]
fn test_concurrent_cross_renames() {
    let mnt = common::fresh_rootfs();
    let root = mnt.root();
    let a = mkdir(root, "A").unwrap();
    let b = mkdir(root, "B").unwrap();
    create(&a, "f").unwrap().release().unwrap();
    mkdir(&b, "g").unwrap().release().unwrap();

    let spawn = |from: Arc<vfs::Dentry>, to: Arc<vfs::Dentry>| {
        thread::spawn(move || {
            for _ in 0..200 {
                for name in ["f", "g"] {
                    match rename(&from, name, &to, name) {
                        Ok(()) | Err(FsError::NotFound) => {}
                        Err(e) => panic!("rename {} failed: {:?}", name, e),
                    }
                }
            }
        })
    };
    let t1 = spawn(a.clone(), b.clone());
    let t2 = spawn(b.clone(), a.clone());
    t1.join().unwrap();
    t2.join().unwrap();

    for name in ["f", "g"] {
        let in_a = lookup(&a, &[name]).map(|d| d.release().unwrap()).is_ok();
        let in_b = lookup(&b, &[name]).map(|d| d.release().unwrap()).is_ok();
        assert!(in_a ^ in_b, "{} must live in exactly one directory", name);
    }
    common::check_tree(root);
    let sizes = a.inode().unwrap().metadata().size + b.inode().unwrap().metadata().size;
    assert_eq!(sizes, 2);

    a.release().unwrap();
    b.release().unwrap();
    MOUNT_TABLE.umount(&mnt).unwrap();
}
