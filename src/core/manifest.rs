//! Modules.toml manifest parsing.
//!
//! The manifest declares every library as a `[[library]]` table. Paths
//! inside a declaration are relative to the manifest's directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::core::errors::ConfigError;
use crate::core::library::LibraryConfig;
use crate::util::diagnostic::suggestions;

/// Manifest file name.
pub const MANIFEST_NAME: &str = "Modules.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestFile {
    library: Vec<LibraryConfig>,
}

/// A parsed manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    root: PathBuf,
    libraries: Vec<LibraryConfig>,
}

impl Manifest {
    /// Load a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::parse(&contents, root)
            .with_context(|| format!("failed to parse manifest: {}", path.display()))
    }

    /// Parse manifest contents rooted at `root`.
    pub fn parse(contents: &str, root: impl Into<PathBuf>) -> Result<Self> {
        let file: ManifestFile = toml::from_str(contents)?;

        let mut seen = HashSet::new();
        for lib in &file.library {
            if !seen.insert(lib.name.as_str()) {
                return Err(ConfigError::new(
                    &lib.name,
                    "name",
                    &lib.name,
                    "declared more than once",
                )
                .into());
            }
        }

        Ok(Manifest {
            root: root.into(),
            libraries: file.library,
        })
    }

    /// Directory the manifest lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a declaration-relative path.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn libraries(&self) -> &[LibraryConfig] {
        &self.libraries
    }

    pub fn library(&self, name: &str) -> Option<&LibraryConfig> {
        self.libraries.iter().find(|l| l.name == name)
    }

    /// Look a library up, failing with a hint when it is unknown.
    pub fn require(&self, name: &str) -> Result<&LibraryConfig> {
        match self.library(name) {
            Some(lib) => Ok(lib),
            None => bail!(
                "module `{}` not found in {}\n{}",
                name,
                MANIFEST_NAME,
                suggestions::MODULE_NOT_FOUND
            ),
        }
    }
}

/// Find the manifest by walking up from `start`.
pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(MANIFEST_NAME))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[[library]]
name = "libfoo"
srcs = ["foo.c"]

[library.stubs]
symbol_file = "libfoo.map.txt"
versions = ["29"]

[[library]]
name = "libbar"
kind = "static"
static_libs = ["libfoo"]
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(MANIFEST, "/src").unwrap();
        assert_eq!(manifest.libraries().len(), 2);

        let foo = manifest.library("libfoo").unwrap();
        assert_eq!(foo.stubs.versions, vec!["29"]);
        assert_eq!(
            manifest.resolve_path(foo.stubs.symbol_file.as_ref().unwrap()),
            PathBuf::from("/src/libfoo.map.txt")
        );
        assert!(manifest.require("libmissing").is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Manifest::parse(
            "[[library]]\nname = \"libfoo\"\n[[library]]\nname = \"libfoo\"\n",
            ".",
        )
        .unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn test_find_manifest_walks_up() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_NAME), "").unwrap();
        let nested = tmp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_manifest(&nested), Some(tmp.path().join(MANIFEST_NAME)));
        let manifest = Manifest::load(&tmp.path().join(MANIFEST_NAME)).unwrap();
        assert!(manifest.libraries().is_empty());
    }
}
