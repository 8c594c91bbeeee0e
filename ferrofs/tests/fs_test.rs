//! End-to-end tests of the system-call surface.

mod common;

use std::sync::Arc;

use common::{check_image, mount_fresh};
use ferrofs::{CharDevice, FsError, InodeKind, OpenFlags, System};
use ferrofs_types::{BLOCK_SIZE, DIR_ENTRY_SIZE, MAX_FILE};

const RW: OpenFlags = OpenFlags::READ_WRITE;
const RO: OpenFlags = OpenFlags::READ_ONLY;
const WO: OpenFlags = OpenFlags::WRITE_ONLY;

fn creat() -> OpenFlags {
    OpenFlags::CREATE | RW
}

#[test]
fn create_write_close_read_back() {
    let (disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    let fd = proc.open(b"/a", creat()).unwrap();
    assert_eq!(proc.write(fd, b"hello").unwrap(), 5);
    proc.close(fd).unwrap();

    let fd = proc.open(b"/a", RO).unwrap();
    let mut buf = [0; 8];
    assert_eq!(proc.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf[..5], b"hello");
    // A second read is at end of file.
    assert_eq!(proc.read(fd, &mut buf).unwrap(), 0);
    proc.close(fd).unwrap();

    proc.exit();
    check_image(&disk.snapshot());
}

#[test]
fn directories_reject_writable_opens() {
    let (disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    proc.mkdir(b"/d").unwrap();
    assert_eq!(proc.open(b"/d", RW), Err(FsError::IsADirectory));
    assert_eq!(proc.open(b"/d", WO), Err(FsError::IsADirectory));

    let fd = proc.open(b"/d", RO).unwrap();
    let st = proc.fstat(fd).unwrap();
    assert_eq!(st.kind, InodeKind::Dir);
    assert!(st.size >= 2 * DIR_ENTRY_SIZE as u64);
    proc.close(fd).unwrap();

    proc.exit();
    check_image(&disk.snapshot());
}

#[test]
fn link_then_unlink_preserves_content() {
    let (disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    let fd = proc.open(b"/x", creat()).unwrap();
    proc.write(fd, b"payload").unwrap();
    proc.close(fd).unwrap();

    proc.link(b"/x", b"/y").unwrap();

    // Both names resolve to the same inode with two links.
    let fdx = proc.open(b"/x", RO).unwrap();
    let fdy = proc.open(b"/y", RO).unwrap();
    let stx = proc.fstat(fdx).unwrap();
    let sty = proc.fstat(fdy).unwrap();
    assert_eq!(stx.ino, sty.ino);
    assert_eq!(stx.nlink, 2);
    proc.close(fdx).unwrap();
    proc.close(fdy).unwrap();

    proc.unlink(b"/x").unwrap();
    assert_eq!(proc.open(b"/x", RO), Err(FsError::NotFound));

    let fd = proc.open(b"/y", RO).unwrap();
    assert_eq!(proc.fstat(fd).unwrap().nlink, 1);
    let mut buf = [0; 16];
    assert_eq!(proc.read(fd, &mut buf).unwrap(), 7);
    assert_eq!(&buf[..7], b"payload");
    proc.close(fd).unwrap();

    proc.exit();
    check_image(&disk.snapshot());
}

#[test]
fn linking_a_directory_fails() {
    let (_disk, sys) = mount_fresh();
    let mut proc = sys.spawn();
    proc.mkdir(b"/d").unwrap();
    assert_eq!(proc.link(b"/d", b"/e"), Err(FsError::IsADirectory));
}

#[test]
fn non_empty_directories_cannot_be_unlinked() {
    let (disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    proc.mkdir(b"/d").unwrap();
    let fd = proc.open(b"/d/f", creat()).unwrap();
    proc.close(fd).unwrap();

    assert_eq!(proc.unlink(b"/d"), Err(FsError::DirectoryNotEmpty));
    proc.unlink(b"/d/f").unwrap();
    proc.unlink(b"/d").unwrap();
    assert_eq!(proc.open(b"/d", RO), Err(FsError::NotFound));

    proc.exit();
    check_image(&disk.snapshot());
}

#[test]
fn dot_entries_cannot_be_unlinked() {
    let (_disk, sys) = mount_fresh();
    let mut proc = sys.spawn();
    proc.mkdir(b"/d").unwrap();
    assert_eq!(proc.unlink(b"/d/."), Err(FsError::DotDirectory));
    assert_eq!(proc.unlink(b"/d/.."), Err(FsError::DotDirectory));
}

#[test]
fn maximum_size_file_round_trips() {
    let (disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    // One write of the maximum file size exercises the chunked
    // multi-transaction write path and the whole addressing scheme.
    let data: Vec<u8> = (0..MAX_FILE * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
    let fd = proc.open(b"/big", creat()).unwrap();
    assert_eq!(proc.write(fd, &data).unwrap(), data.len());
    assert_eq!(proc.fstat(fd).unwrap().size, data.len() as u64);

    // One byte past the addressing scheme must fail cleanly.
    assert_eq!(proc.write(fd, b"!"), Err(FsError::FileTooLarge));
    assert_eq!(proc.fstat(fd).unwrap().size, data.len() as u64);
    proc.close(fd).unwrap();

    let fd = proc.open(b"/big", RO).unwrap();
    let mut back = vec![0; data.len() + 1];
    assert_eq!(proc.read(fd, &mut back).unwrap(), data.len());
    assert_eq!(&back[..data.len()], &data[..]);
    proc.close(fd).unwrap();

    proc.unlink(b"/big").unwrap();
    proc.exit();
    check_image(&disk.snapshot());
}

#[test]
fn unlinked_open_files_live_until_close() {
    let (disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    let fd = proc.open(b"/tmp", creat()).unwrap();
    proc.write(fd, b"scratch").unwrap();
    proc.unlink(b"/tmp").unwrap();

    // The name is gone but the open file still works.
    assert_eq!(proc.open(b"/tmp", RO), Err(FsError::NotFound));
    assert_eq!(proc.fstat(fd).unwrap().nlink, 0);

    proc.close(fd).unwrap();
    proc.exit();

    // Closing dropped the last reference; the inode and its blocks
    // are free again.
    let check = check_image(&disk.snapshot());
    assert_eq!(check.resolve("/tmp"), None);
}

#[test]
fn dup_shares_one_offset() {
    let (_disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    let fd = proc.open(b"/f", creat()).unwrap();
    proc.write(fd, b"abcdef").unwrap();
    proc.close(fd).unwrap();

    let fd = proc.open(b"/f", RO).unwrap();
    let fd2 = proc.dup(fd).unwrap();

    let mut buf = [0; 3];
    assert_eq!(proc.read(fd, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"abc");
    assert_eq!(proc.read(fd2, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"def");

    proc.close(fd).unwrap();
    proc.close(fd2).unwrap();
}

#[test]
fn descriptor_table_is_bounded() {
    let (_disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    let fd = proc.open(b"/f", creat()).unwrap();
    let mut fds = vec![fd];
    loop {
        match proc.dup(fd) {
            Ok(fd) => fds.push(fd),
            Err(err) => {
                assert_eq!(err, FsError::TooManyOpenFiles);
                break;
            }
        }
    }
    assert_eq!(fds.len(), ferrofs::param::NOFILE);
    for fd in fds {
        proc.close(fd).unwrap();
    }
}

#[test]
fn descriptor_errors_are_recoverable() {
    let (_disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    let bogus = {
        let fd = proc.open(b"/f", creat()).unwrap();
        proc.close(fd).unwrap();
        fd
    };
    let mut buf = [0; 4];
    assert_eq!(proc.read(bogus, &mut buf), Err(FsError::BadFileDescriptor));
    assert_eq!(proc.write(bogus, b"x"), Err(FsError::BadFileDescriptor));
    assert_eq!(proc.close(bogus), Err(FsError::BadFileDescriptor));

    let fd = proc.open(b"/f", RO).unwrap();
    assert_eq!(proc.write(fd, b"x"), Err(FsError::NotWritable));
    proc.close(fd).unwrap();

    let fd = proc.open(b"/f", WO).unwrap();
    assert_eq!(proc.read(fd, &mut buf), Err(FsError::NotReadable));
    proc.close(fd).unwrap();

    assert_eq!(proc.unlink(b"/missing"), Err(FsError::NotFound));
    assert_eq!(proc.open(b"/missing/deep", creat()), Err(FsError::NotFound));
    assert_eq!(proc.open(b"/f/x", RO), Err(FsError::NotADirectory));

    let long = vec![b'a'; ferrofs::param::MAX_PATH + 1];
    assert_eq!(proc.open(&long, RO), Err(FsError::PathTooLong));
}

#[test]
fn chdir_resolves_relative_paths() {
    let (disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    proc.mkdir(b"/a").unwrap();
    proc.mkdir(b"/a/b").unwrap();
    proc.chdir(b"/a/b").unwrap();

    let fd = proc.open(b"f", creat()).unwrap();
    proc.write(fd, b"rel").unwrap();
    proc.close(fd).unwrap();

    // Visible under the absolute name, and via dot-dot.
    let fd = proc.open(b"/a/b/f", RO).unwrap();
    proc.close(fd).unwrap();
    let fd = proc.open(b"../b/f", RO).unwrap();
    proc.close(fd).unwrap();

    proc.chdir(b"..").unwrap();
    let fd = proc.open(b"b/f", RO).unwrap();
    proc.close(fd).unwrap();

    assert_eq!(proc.chdir(b"b/f"), Err(FsError::NotADirectory));

    proc.exit();
    check_image(&disk.snapshot());
}

#[test]
fn overlong_names_resolve_as_their_truncation() {
    let (_disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    // 16-byte name, stored truncated to 14 bytes.
    let fd = proc.open(b"/abcdefghijklmnop", creat()).unwrap();
    proc.close(fd).unwrap();

    let fd = proc.open(b"/abcdefghijklmn", RO).unwrap();
    proc.close(fd).unwrap();
    let fd = proc.open(b"/abcdefghijklmnXY", RO).unwrap();
    proc.close(fd).unwrap();
    assert_eq!(proc.open(b"/abcdefghijklm", RO), Err(FsError::NotFound));
}

#[test]
fn reading_a_directory_yields_raw_entries() {
    let (_disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    let fd = proc.open(b"/", RO).unwrap();
    let mut buf = [0; DIR_ENTRY_SIZE];
    assert_eq!(proc.read(fd, &mut buf).unwrap(), DIR_ENTRY_SIZE);
    // ino 1, name "."
    assert_eq!(buf[0], 1);
    assert_eq!(&buf[2..4], b".\0");
    proc.close(fd).unwrap();
}

#[test]
fn pipes_move_bytes_across_processes() {
    let (_disk, sys) = mount_fresh();
    let mut parent = sys.spawn();
    let (rfd, wfd) = parent.pipe().unwrap();

    // Much more than the pipe buffer, so the writer blocks and waits
    // for the reader.
    let data: Vec<u8> = (0..40_000).map(|i| (i % 251) as u8).collect();

    let mut child = parent.fork();
    parent.close(wfd).unwrap();

    let sent = data.clone();
    let writer = std::thread::spawn(move || {
        child.close(rfd).unwrap();
        assert_eq!(child.write(wfd, &sent).unwrap(), sent.len());
        child.exit();
    });

    let mut collected = Vec::new();
    let mut buf = [0; 333];
    loop {
        let n = parent.read(rfd, &mut buf).unwrap();
        if n == 0 {
            break; // EOF once the write end is fully closed
        }
        collected.extend_from_slice(&buf[..n]);
    }
    writer.join().unwrap();
    assert_eq!(collected, data);
    parent.close(rfd).unwrap();

    // Writing with no reader left is an error.
    let (rfd2, wfd2) = parent.pipe().unwrap();
    parent.close(rfd2).unwrap();
    assert_eq!(parent.write(wfd2, b"x"), Err(FsError::BrokenPipe));
    parent.close(wfd2).unwrap();
}

struct EchoDevice {
    log: std::sync::Mutex<Vec<u8>>,
}

impl CharDevice for EchoDevice {
    fn read(&self, dst: &mut [u8]) -> Result<usize, FsError> {
        let n = usize::min(dst.len(), 4);
        dst[..n].copy_from_slice(&b"echo"[..n]);
        Ok(n)
    }

    fn write(&self, src: &[u8]) -> Result<usize, FsError> {
        self.log.lock().unwrap().extend_from_slice(src);
        Ok(src.len())
    }
}

#[test]
fn device_nodes_dispatch_to_their_driver() {
    let (disk, sys) = mount_fresh();
    let device = Arc::new(EchoDevice {
        log: std::sync::Mutex::new(Vec::new()),
    });
    sys.register_device(3, Arc::clone(&device) as Arc<dyn CharDevice>);

    let mut proc = sys.spawn();
    proc.mknod(b"/console", 3, 0).unwrap();

    let fd = proc.open(b"/console", RW).unwrap();
    assert_eq!(proc.fstat(fd).unwrap().kind, InodeKind::Device);
    assert_eq!(proc.write(fd, b"hi there").unwrap(), 8);
    assert_eq!(&*device.log.lock().unwrap(), b"hi there");

    let mut buf = [0; 8];
    assert_eq!(proc.read(fd, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"echo");
    proc.close(fd).unwrap();

    // A device node with no registered driver cannot be opened.
    proc.mknod(b"/nodev", 7, 0).unwrap();
    assert_eq!(proc.open(b"/nodev", RW), Err(FsError::NoDevice));

    proc.exit();
    check_image(&disk.snapshot());
}

#[test]
fn open_file_budget_is_system_wide() {
    let (_disk, sys) = mount_fresh();
    let mut procs: Vec<_> = (0..12).map(|_| sys.spawn()).collect();

    let mut opened = 0;
    let mut full = false;
    'outer: for proc in &mut procs {
        let fd = proc.open(b"/f", creat()).unwrap();
        proc.close(fd).unwrap();
        for _ in 0..ferrofs::param::NOFILE {
            match proc.open(b"/f", RO) {
                Ok(_) => opened += 1,
                Err(FsError::TooManyFiles) => {
                    full = true;
                    break 'outer;
                }
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
    }
    assert!(full, "system accepted {opened} files, expected NFILE cap");
    assert!(opened >= ferrofs::param::NFILE - 1);
}

#[test]
fn inode_table_does_not_leak_references() {
    let (disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    // Far more name lookups and opens than NINODE slots: any leaked
    // reference would exhaust the table and panic.
    proc.mkdir(b"/dir").unwrap();
    for i in 0..200 {
        let name = format!("/dir/f{i}");
        let fd = proc.open(name.as_bytes(), creat()).unwrap();
        proc.write(fd, name.as_bytes()).unwrap();
        proc.close(fd).unwrap();
        if i % 2 == 0 {
            proc.unlink(name.as_bytes()).unwrap();
        }
    }

    proc.exit();
    check_image(&disk.snapshot());
}

#[test]
fn create_is_exclusive_about_kinds() {
    let (_disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    proc.mkdir(b"/d").unwrap();
    assert_eq!(proc.mkdir(b"/d"), Err(FsError::AlreadyExists));
    assert_eq!(proc.open(b"/d", creat()), Err(FsError::AlreadyExists));

    let fd = proc.open(b"/f", creat()).unwrap();
    proc.write(fd, b"keep").unwrap();
    proc.close(fd).unwrap();

    // Re-creating an existing file opens it without truncating.
    let fd = proc.open(b"/f", creat()).unwrap();
    assert_eq!(proc.fstat(fd).unwrap().size, 4);
    proc.close(fd).unwrap();

    // O_TRUNC does truncate.
    let fd = proc.open(b"/f", RW | OpenFlags::TRUNC).unwrap();
    assert_eq!(proc.fstat(fd).unwrap().size, 0);
    proc.close(fd).unwrap();
}

#[test]
fn fstat_matches_raw_image_state() {
    let (disk, sys) = mount_fresh();
    let mut proc = sys.spawn();

    let fd = proc.open(b"/stats", creat()).unwrap();
    proc.write(fd, &[7; 1000]).unwrap();
    let st = proc.fstat(fd).unwrap();
    proc.close(fd).unwrap();
    proc.exit();

    let check = check_image(&disk.snapshot());
    let ino = check.resolve("/stats").unwrap();
    assert_eq!(ino, st.ino.value());
    let on_disk = &check.inodes[&ino];
    assert_eq!(on_disk.size, 1000);
    assert_eq!(on_disk.nlink, 1);
    assert_eq!(on_disk.kind(), Some(InodeKind::File));
}
