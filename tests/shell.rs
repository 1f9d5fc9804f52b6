use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod common;

use common::RamDisk;
use fatimg::shell::{Flow, Shell};
use fatimg::BlockDevice;
use fatimg::Error;
use fatimg::Result;

/// A RAM disk whose writes start failing on demand.
#[derive(Debug, Default)]
struct FlakyDisk {
    disk: RamDisk,
    full: AtomicBool,
}

impl BlockDevice for FlakyDisk {
    fn exists(&self) -> bool {
        self.disk.exists()
    }

    fn len(&self) -> Result<u64> {
        self.disk.len()
    }

    fn reset(&self, len: u64) -> Result<()> {
        self.disk.reset(len)
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.disk.read_at(offset, buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.full.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("disk full")));
        }
        self.disk.write_at(offset, buf)
    }
}

/// Runs each line and returns what went to stdout and stderr.
fn run<D: BlockDevice>(shell: &mut Shell<D>, lines: &[&str]) -> (String, String) {
    let mut out = Vec::new();
    let mut err = Vec::new();
    for line in lines {
        shell.execute(line, &mut out, &mut err).unwrap();
    }
    (String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
}

#[test]
fn test_unformatted() {
    let mut shell = Shell::new(Arc::new(RamDisk::new()));
    assert!(shell.engine().is_none());
    assert_eq!(shell.prompt(), ">");

    let (out, err) = run(&mut shell, &["ls", "mkdir a"]);
    assert!(out.is_empty());
    assert_eq!(err.lines().count(), 2);
    assert!(err.contains("not formatted"));

    let (out, err) = run(&mut shell, &["format 1MB", "mkdir a", "cd a"]);
    assert_eq!(out, "OK\nOK\nOK\n");
    assert!(err.is_empty());
    assert_eq!(shell.prompt(), "/a>");
}

#[test]
fn test_open_existing() {
    let disk = RamDisk::new();
    let shell = Shell::open(Arc::new(disk.clone())).unwrap();
    assert!(shell.engine().is_none());

    let mut shell = Shell::new(Arc::new(disk.clone()));
    run(&mut shell, &["format 64KB", "mkdir keep"]);

    let shell = Shell::open(Arc::new(disk)).unwrap();
    let fs = shell.engine().unwrap();
    assert_eq!(fs.ls(None).unwrap()[0].name, "keep");

    assert!(Shell::open(Arc::new(RamDisk::with_bytes(vec![1; 128]))).is_err());
}

#[test]
fn test_usage_and_unknown() {
    let mut shell = Shell::new(Arc::new(RamDisk::new()));
    let (out, err) = run(&mut shell, &["format", "cp a", "frobnicate", "", "   ", "# note"]);
    assert!(out.is_empty());
    assert_eq!(
        err,
        "Usage: format <size><unit>\nUsage: cp <src> <dest>\nUnknown command: frobnicate\n"
    );

    let (out, _) = run(&mut shell, &["help"]);
    assert!(out.lines().any(|l| l == "incp <host-src> <dest>"));

    let mut out = Vec::new();
    let mut err = Vec::new();
    assert_eq!(shell.execute("exit", &mut out, &mut err).unwrap(), Flow::Exit);
}

#[test]
fn test_listing_and_content() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("note.txt");
    std::fs::write(&src, b"hello world").unwrap();
    let dst = tmp.path().join("back.txt");

    let mut shell = Shell::new(Arc::new(RamDisk::new()));
    let (out, err) = run(
        &mut shell,
        &[
            "format 1MB",
            "ls",
            "mkdir docs",
            &format!("incp {} docs", src.display()),
            "ls docs",
            "cat docs/note.txt",
            "info /docs/note.txt",
            &format!("outcp /docs/note.txt {}", dst.display()),
            "cd docs",
            "pwd",
        ],
    );
    assert!(err.is_empty(), "{}", err);
    assert_eq!(
        out,
        "OK\nDirectory is empty\nOK\nOK\nF note.txt (11 bytes)\nhello world\nnote.txt 1\nOK\nOK\n/docs\n"
    );
    assert_eq!(std::fs::read(&dst).unwrap(), b"hello world");
}

#[test]
fn test_corrupted_gating() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("data.bin");
    std::fs::write(&src, vec![7u8; 5000]).unwrap();

    let mut shell = Shell::new(Arc::new(RamDisk::new()));
    let (_, err) = run(
        &mut shell,
        &["format 1MB", &format!("incp {} /", src.display()), "bug data.bin"],
    );
    assert!(err.is_empty(), "{}", err);
    assert!(shell.engine().unwrap().is_corrupted());

    let (out, err) = run(&mut shell, &["mkdir x", "cat data.bin", "check", "ls"]);
    assert_eq!(err.lines().count(), 2);
    assert!(err.lines().all(|l| l.starts_with("File system is corrupted")));
    assert!(out.contains("Corrupted: /data.bin"));
    assert!(out.contains("F data.bin (5000 bytes)"));

    let (out, err) = run(&mut shell, &["format 1MB", "mkdir x", "check"]);
    assert!(err.is_empty(), "{}", err);
    assert_eq!(out, "OK\nOK\nFilesystem is not corrupted\n");
}

#[test]
fn test_load_script() {
    let tmp = tempfile::tempdir().unwrap();
    let src = tmp.path().join("data.bin");
    std::fs::write(&src, vec![1u8; 100]).unwrap();
    let script = tmp.path().join("setup.txt");
    std::fs::write(
        &script,
        format!(
            "# build a small tree\n\nformat 1MB\nmkdir docs\nincp {} /docs\nmkdir docs\nload {}\nexit\nmkdir after\n",
            src.display(),
            script.display()
        ),
    )
    .unwrap();

    let mut shell = Shell::new(Arc::new(RamDisk::new()));
    let (out, err) = run(&mut shell, &[&format!("load {}", script.display())]);
    log!("script output: {:?} / {:?}", out, err);
    assert_eq!(out, "OK\nOK\nOK\n");
    assert_eq!(err, "Already exists: docs\nScripts cannot load other scripts\n");

    // exit inside the script does not end the session
    let fs = shell.engine().unwrap();
    let names: Vec<String> = fs.ls(None).unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["docs"]);
    assert_eq!(fs.ls(Some("docs")).unwrap().len(), 1);

    let (out, _) = run(&mut shell, &["mkdir later"]);
    assert_eq!(out, "OK\n");

    let (_, err) = run(&mut shell, &["load /definitely/missing/script"]);
    assert!(err.starts_with("/definitely/missing/script"));
}

#[test]
fn test_directory_listing() {
    let mut shell = Shell::new(Arc::new(RamDisk::new()));
    let (out, err) = run(&mut shell, &["format 1MB", "mkdir a", "ls", "rmdir a", "ls"]);
    assert!(err.is_empty(), "{}", err);
    assert_eq!(out, "OK\nOK\nD a\nOK\nDirectory is empty\n");
}

#[test]
fn test_failed_format_drops_engine() {
    let disk = Arc::new(FlakyDisk::default());
    let mut shell = Shell::new(Arc::clone(&disk));
    run(&mut shell, &["format 1MB", "mkdir keep"]);

    // a bad size never reaches the device
    let (_, err) = run(&mut shell, &["format 1XB"]);
    assert!(err.starts_with("Invalid size"));
    assert!(shell.engine().is_some());

    disk.full.store(true, Ordering::SeqCst);
    let (out, err) = run(&mut shell, &["format 1MB"]);
    assert!(out.is_empty());
    assert!(err.starts_with("Cannot create file system"), "{}", err);
    assert!(shell.engine().is_none());

    let (_, err) = run(&mut shell, &["ls"]);
    assert!(err.contains("not formatted"));

    disk.full.store(false, Ordering::SeqCst);
    let (out, _) = run(&mut shell, &["format 1MB", "ls"]);
    assert_eq!(out, "OK\nDirectory is empty\n");
}
