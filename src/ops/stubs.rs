//! Implementation of `abiwright stubs`.

use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::builder::expansion::expand;
use crate::builder::link::{link_variant, LinkContext};
use crate::builder::macros::{StubVersionsCache, VersioningMacroRegistry};
use crate::builder::stubgen::StubFiles;
use crate::core::manifest::Manifest;
use crate::util::config::PlatformConfig;

/// Options for the stubs operation.
#[derive(Debug, Clone, Default)]
pub struct StubsOptions {
    pub module: String,

    /// Stub version: a declared version, `latest`, or empty for the
    /// unversioned stub of LLNDK and vendor public libraries
    pub version: String,

    /// Output directory (default: the variant's directory under `out_dir`)
    pub out: Option<PathBuf>,
}

/// What `stubs` wrote.
#[derive(Debug, Clone, Serialize)]
pub struct StubsResult {
    pub module: String,
    pub variant: String,
    pub files: StubFiles,
    pub symbols: Vec<String>,
    pub ldflags: Vec<String>,
}

/// Generate the stub source and version script of one stub variant.
pub fn generate_stubs(
    manifest: &Manifest,
    platform: &PlatformConfig,
    out_dir: &std::path::Path,
    opts: &StubsOptions,
) -> Result<StubsResult> {
    let lib = manifest.require(&opts.module)?;
    let graph = expand(
        lib,
        platform,
        &VersioningMacroRegistry::new(),
        &StubVersionsCache::new(),
    )?;

    let Some(variant) = graph.resolve(&opts.version) else {
        let declared: Vec<String> = graph
            .stubs()
            .map(|v| v.version_str().to_string())
            .collect();
        bail!(
            "module `{}` has no stub version `{}` (declared: {})",
            lib.name,
            opts.version,
            if declared.is_empty() {
                "none".to_string()
            } else {
                declared.join(", ")
            }
        );
    };
    if !variant.kind.is_stub() {
        bail!(
            "`{}` of module `{}` is not a stub variant",
            variant.name(),
            lib.name
        );
    }

    let ctx = LinkContext {
        root: manifest.root(),
        out_dir,
        platform,
    };
    let linked = link_variant(lib, variant, ctx, &Default::default())?;
    let Some(surface) = &linked.stub_surface else {
        bail!("module `{}` has no symbol file for `{}`", lib.name, variant.name());
    };

    let dir = match &opts.out {
        Some(dir) => dir.clone(),
        None => variant.out_dir(out_dir),
    };
    let files = surface.write(&dir, linked.version_script.is_some())?;
    tracing::info!(
        "{}: wrote {} with {} symbol(s)",
        lib.name,
        files.source.display(),
        surface.symbols.len()
    );

    Ok(StubsResult {
        module: lib.name.clone(),
        variant: variant.name(),
        files,
        symbols: surface.symbols.clone(),
        ldflags: linked.ldflags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::{manifest_dir, TWO_LIBRARY_MANIFEST};

    fn opts(module: &str, version: &str) -> StubsOptions {
        StubsOptions {
            module: module.to_string(),
            version: version.to_string(),
            out: None,
        }
    }

    #[test]
    fn test_generates_declared_version() {
        let (tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
        let out = tmp.path().join("out");
        let result =
            generate_stubs(&manifest, &PlatformConfig::default(), &out, &opts("libfoo", "30"))
                .unwrap();

        assert_eq!(result.variant, "stub_30");
        assert_eq!(result.files.source, out.join("libfoo/stub_30/stub.c"));
        assert!(result.symbols.contains(&"foo_new".to_string()));
        assert!(!result.symbols.contains(&"foo_stream".to_string()));
        let script = std::fs::read_to_string(result.files.version_script.unwrap()).unwrap();
        assert!(script.starts_with("LIBFOO {"));
    }

    #[test]
    fn test_latest_alias() {
        let (tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
        let out = tmp.path().join("custom");
        let mut options = opts("libfoo", "latest");
        options.out = Some(out.clone());
        let result =
            generate_stubs(&manifest, &PlatformConfig::default(), &tmp.path().join("out"), &options)
                .unwrap();
        assert_eq!(result.variant, "stub_current");
        assert!(out.join("stub.c").is_file());
        assert!(result.symbols.contains(&"foo_stream".to_string()));
    }

    #[test]
    fn test_unknown_version() {
        let (tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
        let err = generate_stubs(
            &manifest,
            &PlatformConfig::default(),
            tmp.path(),
            &opts("libfoo", "28"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("declared: 29, 30, current"));
    }

    #[test]
    fn test_implementation_is_not_a_stub() {
        let (tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
        let err = generate_stubs(
            &manifest,
            &PlatformConfig::default(),
            tmp.path(),
            &opts("libfoo", ""),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a stub variant"));
    }
}
