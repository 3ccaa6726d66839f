//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Read a file to string, with nice error messages.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Write a string to a file, creating parent directories if needed.
///
/// The file is written to a temporary sibling first and renamed into place,
/// so concurrent readers never observe a half-written artifact.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))?;
    std::io::Write::write_all(&mut tmp, contents.as_bytes())
        .with_context(|| format!("failed to write file: {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to write file: {}", path.display()))?;
    Ok(())
}

/// Write a string only when the on-disk contents differ.
///
/// Returns true if the file was (re)written.
pub fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    if let Ok(existing) = fs::read_to_string(path) {
        if existing == contents {
            return Ok(false);
        }
    }
    write_string(path, contents)?;
    Ok(true)
}

/// Return `path` if it names an existing file.
pub fn existent_file(path: PathBuf) -> Option<PathBuf> {
    if path.is_file() {
        Some(path)
    } else {
        None
    }
}

/// Find files matching glob patterns relative to a base directory.
pub fn glob_files(base: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut results = Vec::new();

    for pattern in patterns {
        let full_pattern = base.join(pattern);
        let pattern_str = full_pattern.to_string_lossy();

        for entry in
            glob(&pattern_str).with_context(|| format!("invalid glob pattern: {}", pattern))?
        {
            match entry {
                Ok(path) if path.is_file() => results.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!("glob error: {}", e),
            }
        }
    }

    results.sort();
    results.dedup();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_string_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c.txt");
        write_string(&path, "hello").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn test_write_if_changed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stub.c");
        assert!(write_if_changed(&path, "void f() {}\n").unwrap());
        assert!(!write_if_changed(&path, "void f() {}\n").unwrap());
        assert!(write_if_changed(&path, "void g() {}\n").unwrap());
    }

    #[test]
    fn test_existent_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("present.lsdump");
        assert!(existent_file(path.clone()).is_none());
        fs::write(&path, "{}").unwrap();
        assert_eq!(existent_file(path.clone()), Some(path));
        assert!(existent_file(tmp.path().to_path_buf()).is_none());
    }

    #[test]
    fn test_glob_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.sdump"), "{}").unwrap();
        fs::write(tmp.path().join("b.sdump"), "{}").unwrap();
        fs::write(tmp.path().join("c.txt"), "").unwrap();

        let found = glob_files(tmp.path(), &["*.sdump".to_string()]).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("a.sdump"));
    }
}
