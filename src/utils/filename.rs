//! Deterministic artifact naming and temporary-file helpers

use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Suffix for in-flight network transfers
pub const DOWNLOAD_SUFFIX: &str = ".download";

/// Suffix for files staged before replacing an existing one
pub const STAGING_SUFFIX: &str = ".new";

/// Base name shared by every artifact of one video: `YYYYMMDD_<id>`
pub fn artifact_base_name(published_at: &DateTime<Utc>, video_id: &str) -> String {
    format!("{}_{}", published_at.format("%Y%m%d"), video_id)
}

/// Full artifact filename with extension
pub fn artifact_filename(published_at: &DateTime<Utc>, video_id: &str, extension: &str) -> String {
    let ext = extension.trim_start_matches('.');
    format!("{}.{}", artifact_base_name(published_at, video_id), ext)
}

/// Sibling path with `suffix` appended to the full file name
/// (`ffmpeg.exe` -> `ffmpeg.exe.new`)
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(OsString::new);
    name.push(suffix);
    path.with_file_name(name)
}

/// Remove a file if it exists; a missing file is not an error
pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Move `staged` over `dest`, replacing whatever is there
pub fn replace_file(staged: &Path, dest: &Path) -> std::io::Result<()> {
    // rename() does not overwrite on every platform
    #[cfg(windows)]
    remove_if_exists(dest)?;
    std::fs::rename(staged, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn published() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 7, 4, 18, 30, 0).unwrap()
    }

    #[test]
    fn test_artifact_names_are_deterministic() {
        let first = artifact_filename(&published(), "dQw4w9WgXcQ", "mp4");
        let second = artifact_filename(&published(), "dQw4w9WgXcQ", ".mp4");
        assert_eq!(first, "20230704_dQw4w9WgXcQ.mp4");
        assert_eq!(first, second);
        assert_eq!(artifact_base_name(&published(), "abc"), "20230704_abc");
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix(Path::new("/tools/ffmpeg.exe"), STAGING_SUFFIX),
            PathBuf::from("/tools/ffmpeg.exe.new")
        );
        assert_eq!(
            with_suffix(Path::new("yt-dlp"), DOWNLOAD_SUFFIX),
            PathBuf::from("yt-dlp.download")
        );
    }

    #[test]
    fn test_replace_file_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("tool.exe");
        let staged = with_suffix(&dest, STAGING_SUFFIX);
        std::fs::write(&dest, b"old").unwrap();
        std::fs::write(&staged, b"new").unwrap();

        replace_file(&staged, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        assert!(!staged.exists());
    }

    #[test]
    fn test_remove_if_exists_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove_if_exists(&dir.path().join("missing")).is_ok());
    }
}
