//! Global context for abiwright operations.
//!
//! Ties together the working directory, the located `Modules.toml`, and the
//! layered configuration (global, then project).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::core::manifest::{find_manifest, Manifest, MANIFEST_NAME};
use crate::util::config::{global_config_path, load_config, project_config_path, Config};
use crate::util::diagnostic::suggestions;

/// Global context containing the manifest, configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    manifest_path: PathBuf,
    manifest: Manifest,
    config: Config,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Locate and load the manifest, searching upward from the current
    /// directory unless `manifest_path` is given.
    pub fn new(manifest_path: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::with_cwd(cwd, manifest_path)
    }

    /// Like `new`, but starting from `cwd`.
    pub fn with_cwd(cwd: PathBuf, manifest_path: Option<&Path>) -> Result<Self> {
        let manifest_path = match manifest_path {
            Some(path) => cwd.join(path),
            None => match find_manifest(&cwd) {
                Some(path) => path,
                None => bail!(
                    "could not find `{}` in `{}` or any parent directory\n{}",
                    MANIFEST_NAME,
                    cwd.display(),
                    suggestions::NO_MANIFEST
                ),
            },
        };

        let manifest = Manifest::load(&manifest_path)?;
        let config = load_config(
            global_config_path().as_deref(),
            &project_config_path(manifest.root()),
        );
        tracing::debug!(
            "loaded {} with {} librar(ies)",
            manifest_path.display(),
            manifest.libraries().len()
        );

        Ok(GlobalContext {
            cwd,
            manifest_path,
            manifest,
            config,
            color: true,
        })
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory the manifest lives in.
    pub fn root(&self) -> &Path {
        self.manifest.root()
    }

    /// Build output directory, resolved against the manifest root.
    pub fn out_dir(&self) -> PathBuf {
        self.manifest.resolve_path(&self.config.build.out_dir())
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_finds_manifest_upward() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(MANIFEST_NAME),
            "[[library]]\nname = \"libfoo\"\n",
        )
        .unwrap();
        let nested = tmp.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = GlobalContext::with_cwd(nested, None).unwrap();
        assert_eq!(ctx.root(), tmp.path());
        assert!(ctx.manifest().library("libfoo").is_some());
        assert_eq!(ctx.out_dir(), tmp.path().join("out"));
    }

    #[test]
    fn test_project_config_applies() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_NAME), "").unwrap();
        std::fs::create_dir_all(tmp.path().join(".abiwright")).unwrap();
        std::fs::write(
            tmp.path().join(".abiwright/config.toml"),
            "[build]\nout_dir = \"build\"\n",
        )
        .unwrap();

        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf(), None).unwrap();
        assert_eq!(ctx.out_dir(), tmp.path().join("build"));
    }

    #[test]
    fn test_missing_manifest() {
        let tmp = TempDir::new().unwrap();
        let err = GlobalContext::with_cwd(tmp.path().to_path_buf(), None).unwrap_err();
        assert!(err.to_string().contains("Modules.toml"));
    }
}
