//! Path validation applied before any file operation touches the disk.
//!
//! Every rule yields its own [`PathValidationError`] variant so callers and
//! tests can tell a traversal rejection from an extension rejection. All
//! rules run before any I/O; a path that fails here never reaches the
//! engine's retry loop.
use std::collections::HashSet;
use std::path::{Component, Path};

use once_cell::sync::Lazy;
use thiserror::Error;

/// Longest accepted path, matching the reference platform limit.
pub const MAX_PATH_LEN: usize = 260;

/// What the path is expected to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    /// A file target; the extension whitelist applies.
    File,
    /// A directory target; no extension check.
    Directory,
}

/// A path rejected before any I/O was attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathValidationError {
    /// Empty or whitespace-only path.
    #[error("path is empty")]
    Empty,
    /// Leading or trailing whitespace.
    #[error("path has leading or trailing whitespace: {0:?}")]
    SurroundingWhitespace(String),
    /// A `..` segment, raw or percent-encoded.
    #[error("path contains a traversal segment: {0:?}")]
    Traversal(String),
    /// The path's root volume does not exist or is not ready.
    #[error("path root is not mounted: {0:?}")]
    UnmountedRoot(String),
    /// Longer than [`MAX_PATH_LEN`].
    #[error("path length {len} exceeds the {max} character limit")]
    TooLong {
        /// Actual length in characters.
        len: usize,
        /// The platform limit.
        max: usize,
    },
    /// The file name is on the platform's reserved-name list.
    #[error("file name is reserved: {0:?}")]
    ReservedName(String),
    /// Extension not on the whitelist.
    #[error("file extension is not allowed: {0:?}")]
    DisallowedExtension(String),
}

static RESERVED_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ]
    .into_iter()
    .collect()
});

static ALLOWED_EXTENSIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // text
        "txt", "md", "log", "csv", "json", "xml", "yaml", "yml", "toml", "ini", "cfg", "conf",
        // images
        "png", "jpg", "jpeg", "bmp", "gif", "webp", "tga", "dds", "svg", "hdr", "exr",
        // audio
        "wav", "mp3", "ogg", "flac", "aiff", "aif", "mid", "midi",
        // video
        "mp4", "mov", "avi", "mkv", "webm",
        // archives
        "zip", "tar", "gz", "7z",
        // data and project files
        "bin", "dat", "cache", "bak", "tmp", "proj",
    ]
    .into_iter()
    .collect()
});

/// Validate a path for the given role.
///
/// Rules, in order: non-empty, no surrounding whitespace, length limit, no
/// traversal segments (raw or percent-encoded), mounted root, no reserved
/// file name, and for files a whitelisted extension. A file without any
/// extension passes the extension rule; there is nothing to recognize.
pub fn validate_path(path: &Path, role: PathRole) -> Result<(), PathValidationError> {
    let raw = path.to_string_lossy();

    if raw.trim().is_empty() {
        return Err(PathValidationError::Empty);
    }
    if raw != raw.trim() {
        return Err(PathValidationError::SurroundingWhitespace(raw.into_owned()));
    }
    if raw.chars().count() > MAX_PATH_LEN {
        return Err(PathValidationError::TooLong {
            len: raw.chars().count(),
            max: MAX_PATH_LEN,
        });
    }

    let lowered = raw.to_ascii_lowercase();
    if lowered.contains("%2e%2e") || lowered.contains("%2e.") || lowered.contains(".%2e") {
        return Err(PathValidationError::Traversal(raw.into_owned()));
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(PathValidationError::Traversal(raw.into_owned()));
        }
    }

    if path.is_absolute() {
        let root: std::path::PathBuf = path
            .components()
            .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
            .collect();
        if !root.as_os_str().is_empty() && !root.exists() {
            return Err(PathValidationError::UnmountedRoot(
                root.to_string_lossy().into_owned(),
            ));
        }
    }

    if let Some(stem) = path.file_stem().map(|s| s.to_string_lossy()) {
        if RESERVED_NAMES.contains(stem.to_ascii_uppercase().as_str()) {
            return Err(PathValidationError::ReservedName(stem.into_owned()));
        }
    }

    if role == PathRole::File
        && let Some(ext) = path.extension().map(|e| e.to_string_lossy())
    {
        let lowered = ext.to_ascii_lowercase();
        if !ALLOWED_EXTENSIONS.contains(lowered.as_str()) {
            return Err(PathValidationError::DisallowedExtension(ext.into_owned()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use test_case::test_case;

    fn tmp(name: &str) -> PathBuf {
        std::env::temp_dir().join(name)
    }

    #[test]
    fn test_accepts_plain_file() {
        assert!(validate_path(&tmp("notes.txt"), PathRole::File).is_ok());
    }

    #[test]
    fn test_rejects_empty_and_whitespace() {
        assert_eq!(
            validate_path(Path::new(""), PathRole::File),
            Err(PathValidationError::Empty)
        );
        assert_eq!(
            validate_path(Path::new("   "), PathRole::File),
            Err(PathValidationError::Empty)
        );
        assert!(matches!(
            validate_path(Path::new(" a.txt"), PathRole::File),
            Err(PathValidationError::SurroundingWhitespace(_))
        ));
        assert!(matches!(
            validate_path(Path::new("a.txt "), PathRole::File),
            Err(PathValidationError::SurroundingWhitespace(_))
        ));
    }

    #[test_case("../etc/passwd.txt"; "raw parent segment")]
    #[test_case("a/../b.txt"; "inner parent segment")]
    #[test_case("a/%2e%2e/b.txt"; "percent encoded")]
    #[test_case("a/%2E%2E/b.txt"; "percent encoded upper")]
    fn test_rejects_traversal(path: &str) {
        assert!(matches!(
            validate_path(Path::new(path), PathRole::File),
            Err(PathValidationError::Traversal(_))
        ));
    }

    #[test]
    fn test_dotted_names_are_not_traversal() {
        assert!(validate_path(&tmp("a..b.txt"), PathRole::File).is_ok());
    }

    #[test]
    fn test_path_length_boundary() {
        // Exactly at the limit passes, one over fails.
        let dir = "/tmp/";
        let name_len = MAX_PATH_LEN - dir.len() - 4;
        let at_limit = format!("{}{}.txt", dir, "a".repeat(name_len));
        assert_eq!(at_limit.len(), MAX_PATH_LEN);
        assert!(validate_path(Path::new(&at_limit), PathRole::File).is_ok());

        let over = format!("{}{}.txt", dir, "a".repeat(name_len + 1));
        assert!(matches!(
            validate_path(Path::new(&over), PathRole::File),
            Err(PathValidationError::TooLong { .. })
        ));
    }

    #[test_case("CON"; "console")]
    #[test_case("con"; "lowercase console")]
    #[test_case("COM3"; "serial")]
    #[test_case("LPT9"; "printer")]
    fn test_rejects_reserved_names(stem: &str) {
        let path = tmp(&format!("{}.txt", stem));
        assert!(matches!(
            validate_path(&path, PathRole::File),
            Err(PathValidationError::ReservedName(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_extension() {
        assert!(matches!(
            validate_path(&tmp("payload.exe"), PathRole::File),
            Err(PathValidationError::DisallowedExtension(_))
        ));
    }

    #[test]
    fn test_directory_role_skips_extension_check() {
        assert!(validate_path(&tmp("strange.exe"), PathRole::Directory).is_ok());
    }

    #[test]
    fn test_extensionless_file_passes() {
        assert!(validate_path(&tmp("LICENSE"), PathRole::File).is_ok());
    }
}
