use std::{
    fs,
    path::{Component, Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("{} is not a readable zip archive", path.display())]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("extract {entry:?}")]
    Io {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("entry {entry:?} escapes the destination directory")]
    PathTraversal { entry: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub files_written: usize,
    pub bytes_written: u64,
}

/// Maps an archive entry name to a path relative to the destination.
///
/// `None` means the entry would land outside it: absolute paths, drive
/// prefixes and `..` segments are all refused. Backslashes count as
/// separators so that archives built on Windows are judged the same way.
fn normalize_entry_path(name: &str) -> Option<PathBuf> {
    let unified = name.replace('\\', "/");
    if unified.starts_with('/') {
        return None;
    }
    let mut out = PathBuf::new();
    for c in Path::new(&unified).components() {
        match c {
            Component::CurDir => {}
            Component::Normal(seg) => out.push(seg),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Unpacks every file entry of `zip_path` into `dest_dir`.
///
/// Directory entries are skipped; parent directories of files are created as
/// needed. Existing files are truncated and overwritten. Extraction stops at
/// the first failing entry, so files written before it stay on disk.
pub fn extract(zip_path: &Path, dest_dir: &Path) -> Result<ExtractReport, ExtractError> {
    let io_at = |entry: &str| {
        let entry = entry.to_string();
        move |source| ExtractError::Io { entry, source }
    };
    let archive_name = zip_path.display().to_string();

    fs::create_dir_all(dest_dir).map_err(io_at(&dest_dir.display().to_string()))?;
    let f = fs::File::open(zip_path).map_err(io_at(&archive_name))?;
    let corrupt = |source| ExtractError::CorruptArchive {
        path: zip_path.to_path_buf(),
        source,
    };
    let mut archive = zip::ZipArchive::new(f).map_err(corrupt)?;

    let mut report = ExtractReport::default();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(corrupt)?;
        let name = file.name().to_string();
        if file.is_dir() {
            continue;
        }
        let rel = normalize_entry_path(&name)
            .ok_or_else(|| ExtractError::PathTraversal { entry: name.clone() })?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        let out_path = dest_dir.join(&rel);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_at(&name))?;
        }
        let mut out = fs::File::create(&out_path).map_err(io_at(&name))?;
        let n = std::io::copy(&mut file, &mut out).map_err(io_at(&name))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                let mode = (mode & 0o777) | 0o600;
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))
                    .map_err(io_at(&name))?;
            }
        }

        report.files_written += 1;
        report.bytes_written = report.bytes_written.saturating_add(n);
    }

    tracing::debug!(
        archive = %zip_path.display(),
        dest = %dest_dir.display(),
        files = report.files_written,
        bytes = report.bytes_written,
        "archive extracted"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Entry, files_under, zip_bytes};

    fn write_zip(dir: &Path, entries: &[Entry<'_>]) -> PathBuf {
        let p = dir.join("archive.zip");
        fs::write(&p, zip_bytes(entries)).unwrap();
        p
    }

    #[test]
    fn extracts_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        let zip = write_zip(
            tmp.path(),
            &[
                Entry::Dir("jdk/"),
                Entry::Dir("jdk/bin/"),
                Entry::File("jdk/bin/java", b"#!/bin/sh\n"),
                Entry::File("jdk/release", b"JAVA_VERSION=17"),
                Entry::File("README", b"hi"),
            ],
        );
        let out = tmp.path().join("out");

        let report = extract(&zip, &out).unwrap();

        assert_eq!(report.files_written, 3);
        assert_eq!(report.bytes_written, 10 + 15 + 2);
        assert_eq!(files_under(&out), ["README", "jdk/bin/java", "jdk/release"]);
        assert_eq!(fs::read(out.join("jdk/release")).unwrap(), b"JAVA_VERSION=17");
    }

    #[test]
    fn directory_only_archive_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let zip = write_zip(tmp.path(), &[Entry::Dir("a/"), Entry::Dir("a/b/")]);
        let out = tmp.path().join("out");

        let report = extract(&zip, &out).unwrap();

        assert_eq!(report, ExtractReport::default());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn parent_segments_are_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let zip = write_zip(
            tmp.path(),
            &[Entry::File("ok.txt", b"ok"), Entry::File("../evil.txt", b"x")],
        );
        let out = tmp.path().join("out");

        let err = extract(&zip, &out).unwrap_err();

        match err {
            ExtractError::PathTraversal { entry } => assert_eq!(entry, "../evil.txt"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!tmp.path().join("evil.txt").exists());
        assert!(out.join("ok.txt").exists());
    }

    #[test]
    fn entry_paths_are_normalized() {
        assert_eq!(normalize_entry_path("a/./b.txt"), Some(PathBuf::from("a/b.txt")));
        assert_eq!(normalize_entry_path("/etc/passwd"), None);
        assert_eq!(normalize_entry_path("a/../../b"), None);
        assert_eq!(normalize_entry_path("..\\b"), None);
        assert_eq!(normalize_entry_path("./"), Some(PathBuf::new()));
    }

    #[test]
    fn garbage_is_a_corrupt_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let zip = tmp.path().join("bad.zip");
        fs::write(&zip, b"this is not a zip file at all").unwrap();

        let err = extract(&zip, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::CorruptArchive { .. }), "{err:?}");
    }

    #[test]
    fn missing_archive_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = extract(&tmp.path().join("nope.zip"), &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }), "{err:?}");
    }

    #[test]
    fn existing_files_are_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("a.txt"), b"previous contents, longer").unwrap();
        let zip = write_zip(tmp.path(), &[Entry::File("a.txt", b"new")]);

        extract(&zip, &out).unwrap();

        assert_eq!(fs::read(out.join("a.txt")).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_survives() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let zip = write_zip(tmp.path(), &[Entry::Executable("bin/java", b"elf")]);
        let out = tmp.path().join("out");

        extract(&zip, &out).unwrap();

        let mode = fs::metadata(out.join("bin/java")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
