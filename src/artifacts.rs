// src/artifacts.rs
//
// Filesystem-as-channel helpers. The broadcast slot and the evidence
// directory are the only shared mutable resources in the system; the
// detector process is the sole writer to both, so correctness rests on
// atomic-replace writes here and integrity-validated reads on the
// consumer side.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const JPEG_SOI: [u8; 2] = [0xff, 0xd8];
const JPEG_EOI: [u8; 2] = [0xff, 0xd9];

/// Publish `bytes` at `path` atomically: write a sibling temp file, then
/// rename over the target. Readers and directory listings never observe a
/// partially written artifact.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("publishing {}", path.display()))?;
    Ok(())
}

/// Structural integrity check: the file must begin with the JPEG SOI marker
/// and end with the EOI marker. Catches truncated writes from a crashed
/// writer without decoding anything.
pub fn is_valid_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..2] == JPEG_SOI && bytes[bytes.len() - 2..] == JPEG_EOI
}

/// Most recently modified `.jpg` under `dir`, if any.
pub fn newest_jpeg(dir: &Path) -> Option<(PathBuf, SystemTime)> {
    let entries = fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("jpg"))
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let mtime = e.metadata().ok()?.modified().ok()?;
            Some((e.path(), mtime))
        })
        .max_by_key(|(_, mtime)| *mtime)
}

/// Delete every `.jpg` under `dir`, ignoring files that disappear first.
pub fn clear_jpegs(dir: &Path) -> Result<()> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_jpg = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("jpg"))
            .unwrap_or(false);
        if is_jpg {
            let _ = fs::remove_file(&path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("latest.jpg");
        write_atomic(&target, b"\xff\xd8payload\xff\xd9").unwrap();
        assert!(target.exists());
        assert!(!dir.path().join("latest.tmp").exists());
        assert_eq!(fs::read(&target).unwrap(), b"\xff\xd8payload\xff\xd9");
    }

    #[test]
    fn test_jpeg_marker_validation() {
        assert!(is_valid_jpeg(b"\xff\xd8data\xff\xd9"));
        assert!(!is_valid_jpeg(b"\xff\xd8truncated"));
        assert!(!is_valid_jpeg(b"nonsense"));
        assert!(!is_valid_jpeg(b""));
    }

    #[test]
    fn test_newest_jpeg_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::write(dir.path().join("b.jpg"), b"b").unwrap();
        fs::write(dir.path().join("note.txt"), b"keep").unwrap();

        let (newest, _) = newest_jpeg(dir.path()).unwrap();
        assert_eq!(newest.file_name().unwrap(), "b.jpg");

        clear_jpegs(dir.path()).unwrap();
        assert!(newest_jpeg(dir.path()).is_none());
        assert!(dir.path().join("note.txt").exists());
    }

    #[test]
    fn test_missing_dir_is_harmless() {
        let ghost = Path::new("/nonexistent/monitor/frames");
        assert!(newest_jpeg(ghost).is_none());
        assert!(clear_jpegs(ghost).is_ok());
    }
}
