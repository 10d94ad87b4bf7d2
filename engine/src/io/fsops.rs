//! Filesystem primitives shared by the transaction layer and handlers.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Write `contents` via a sibling temp file and rename, creating parents.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let tmp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(&tmp_path, meta.permissions())
            .with_context(|| format!("copy permissions onto {}", tmp_path.display()))?;
    }
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Read a file that must be valid UTF-8.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    String::from_utf8(bytes).with_context(|| format!("{} is not valid UTF-8 text", path.display()))
}

/// Read a file for display, replacing invalid sequences.
pub fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Recursively copy `src` into `dst` (which must not exist yet).
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<u64> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("walk {}", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("strip prefix {}", src.display()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("create directory {}", target.display()))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("copy {} -> {}", entry.path().display(), target.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src).with_context(|| format!("read link {}", src.display()))?;
    std::os::unix::fs::symlink(&target, dst)
        .with_context(|| format!("create link {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).with_context(|| format!("copy {} -> {}", src.display(), dst.display()))?;
    Ok(())
}

/// Remove a file, symlink or directory tree. Missing paths are not an error.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("stat {}", path.display())),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("remove directory {}", path.display()))
    } else {
        fs::remove_file(path).with_context(|| format!("remove file {}", path.display()))
    }
}

/// Heuristic: a NUL byte in the first 8 KiB marks a file as binary.
pub fn is_probably_binary(path: &Path) -> bool {
    use std::io::Read;

    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let mut head = Vec::with_capacity(8192);
    if file.take(8192).read_to_end(&mut head).is_err() {
        return false;
    }
    head.contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("a/b/c.txt");
        write_atomic(&path, b"hello").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "hello");
        let leftovers: Vec<_> = fs::read_dir(temp.path().join("a/b"))
            .expect("read dir")
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_keeps_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("run.sh");
        fs::write(&path, "#!/bin/sh\n").expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        write_atomic(&path, b"#!/bin/sh\necho hi\n").expect("write");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn read_text_refuses_invalid_utf8() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("latin1.txt");
        fs::write(&path, b"caf\xe9\n").expect("write");
        let err = read_text(&path).expect_err("invalid utf-8");
        assert!(format!("{err:#}").contains("not valid UTF-8"));
        assert_eq!(read_text_lossy(&path).expect("lossy"), "caf\u{fffd}\n");
    }

    #[test]
    fn copy_dir_all_copies_nested_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).expect("mkdir");
        fs::write(src.join("top.txt"), "1").expect("write");
        fs::write(src.join("nested/inner.txt"), "2").expect("write");
        let copied = copy_dir_all(&src, &temp.path().join("dst")).expect("copy");
        assert_eq!(copied, 2);
        assert_eq!(
            fs::read_to_string(temp.path().join("dst/nested/inner.txt")).expect("read"),
            "2"
        );
    }

    #[test]
    fn remove_path_ignores_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        remove_path(&temp.path().join("nope")).expect("remove");
    }

    #[test]
    fn detects_binary_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = temp.path().join("a.bin");
        fs::write(&bin, [0x7f, 0x00, 0x01]).expect("write");
        let txt = temp.path().join("a.txt");
        fs::write(&txt, "plain").expect("write");
        assert!(is_probably_binary(&bin));
        assert!(!is_probably_binary(&txt));
    }
}
