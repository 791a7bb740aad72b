use std::fs;
use std::path::{Path, PathBuf};

/// Extensions accepted as wallpapers (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Outcome of checking a wallpaper folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderStatus {
    Valid { images: usize },
    Missing,
    NotADirectory,
    TooFewImages { found: usize, needed: usize },
}

impl FolderStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Valid { images } => format!("{} images", images),
            Self::Missing => "folder does not exist".to_string(),
            Self::NotADirectory => "path is not a directory".to_string(),
            Self::TooFewImages { found, needed } => {
                format!("only {} image(s) for {} monitor(s)", found, needed)
            }
        }
    }
}

/// List the eligible images directly inside `dir`, sorted by file name.
///
/// Subdirectories are not entered. A missing or unreadable directory yields
/// an empty list; callers check existence separately.
pub fn scan(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("Cannot read {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut images: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_valid_extension(path))
        .collect();

    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    images.dedup();

    log::debug!("Scanned {}: {} image(s)", dir.display(), images.len());
    images
}

/// Check that `dir` can feed `monitor_count` monitors
pub fn validate_folder(dir: &Path, monitor_count: usize) -> FolderStatus {
    if !dir.exists() {
        return FolderStatus::Missing;
    }
    if !dir.is_dir() {
        return FolderStatus::NotADirectory;
    }

    let found = scan(dir).len();
    let needed = monitor_count.max(1);
    if found < needed {
        FolderStatus::TooFewImages { found, needed }
    } else {
        FolderStatus::Valid { images: found }
    }
}

/// File name used as the seen-set key
pub fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn has_valid_extension(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return IMAGE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext_str));
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| image_name(p)).collect()
    }

    #[test]
    fn test_has_valid_extension() {
        assert!(has_valid_extension(Path::new("test.jpg")));
        assert!(has_valid_extension(Path::new("test.JPEG")));
        assert!(has_valid_extension(Path::new("test.Png")));
        assert!(has_valid_extension(Path::new("test.bmp")));
        assert!(!has_valid_extension(Path::new("test.gif")));
        assert!(!has_valid_extension(Path::new("test.txt")));
        assert!(!has_valid_extension(Path::new("jpg")));
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["d.png", "B.JPG", "a.jpeg", "c.bmp", "notes.txt", "anim.gif"] {
            touch(dir.path(), name);
        }
        fs::create_dir(dir.path().join("sub.jpg")).unwrap();
        touch(&dir.path().join("sub.jpg"), "nested.jpg");

        let catalog = scan(dir.path());
        assert_eq!(names(&catalog), vec!["B.JPG", "a.jpeg", "c.bmp", "d.png"]);
    }

    #[test]
    fn test_scan_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["z.jpg", "m.png", "a.bmp"] {
            touch(dir.path(), name);
        }

        assert_eq!(scan(dir.path()), scan(dir.path()));
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_validate_folder() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.jpg");
        touch(dir.path(), "b.jpg");

        assert_eq!(
            validate_folder(dir.path(), 2),
            FolderStatus::Valid { images: 2 }
        );
        assert_eq!(
            validate_folder(dir.path(), 3),
            FolderStatus::TooFewImages {
                found: 2,
                needed: 3
            }
        );
        assert_eq!(
            validate_folder(&dir.path().join("missing"), 1),
            FolderStatus::Missing
        );
        assert_eq!(
            validate_folder(&dir.path().join("a.jpg"), 1),
            FolderStatus::NotADirectory
        );
    }

    #[test]
    fn test_empty_folder_is_invalid_even_without_monitors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!validate_folder(dir.path(), 0).is_valid());
    }
}
