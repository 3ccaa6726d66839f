//! Implementation of `abiwright update-refs`.
//!
//! Relinks a library's ABI dump and copies it over the reference the
//! same-version (or an opt-in) check compares against.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::builder::sabi::{current_reference_version, ref_dump_dir, AbiClassification, AbiTool};
use crate::core::manifest::Manifest;
use crate::ops::abi_check::link_abi_dump;
use crate::ops::expand::Expansion;
use crate::ops::link::LinkOutcome;
use crate::util::config::Config;
use crate::util::fs::ensure_dir;

/// Options for the update-refs operation.
#[derive(Debug, Clone, Default)]
pub struct UpdateRefsOptions {
    /// Library, by module name or output name (`libfoo`, `libfoo.vendor`)
    pub library: String,

    /// Opt-in reference directory to update instead of the versioned tree
    pub ref_dump_dir: Option<PathBuf>,

    /// Product the references are regenerated for
    pub products: Option<String>,
}

/// A reference dump that was written.
#[derive(Debug, Clone, Serialize)]
pub struct UpdatedRef {
    pub module: String,
    pub source: PathBuf,
    pub reference: PathBuf,
}

/// Where the reference for `file_name` lives.
pub fn reference_path(
    classification: &AbiClassification,
    file_name: &str,
    config: &Config,
    root: &Path,
    opt_in_dir: Option<&Path>,
) -> PathBuf {
    let base = match opt_in_dir {
        Some(dir) => root.join(dir),
        None => ref_dump_dir(&root.join(&config.abi.dump_root), classification.class)
            .join(current_reference_version(&config.platform, classification.vndk))
            .join(&config.platform.binder_bitness),
    };
    base.join(config.platform.arch_dir_name())
        .join("source-based")
        .join(format!("{}.lsdump", file_name))
}

/// Regenerate the reference dumps of one library.
pub fn update_refs(
    tool: &dyn AbiTool,
    manifest: &Manifest,
    config: &Config,
    expansion: &Expansion,
    linked: &LinkOutcome,
    out_dir: &Path,
    opts: &UpdateRefsOptions,
) -> Result<Vec<UpdatedRef>> {
    let Some(lib) = manifest
        .library(&opts.library)
        .or_else(|| {
            manifest
                .libraries()
                .iter()
                .find(|l| l.lib_name() == opts.library)
        })
    else {
        manifest.require(&opts.library)?;
        bail!("module `{}` not found", opts.library);
    };

    if let (Some(requested), Some(configured)) = (&opts.products, &config.platform.device_product) {
        if requested != configured {
            tracing::warn!(
                "updating references for `{}`, but the configured product is `{}`",
                requested,
                configured
            );
        }
    }

    let Some(module) = linked.module(&lib.name) else {
        bail!("module `{}` failed to link; fix its errors first", lib.name);
    };

    let root = manifest.root();
    let classification = AbiClassification::of(lib);
    let mut updated = Vec::new();
    for variant in &module.variants {
        let Some(dump) = &variant.abi_dump else {
            continue;
        };
        link_abi_dump(tool, lib, variant, dump, expansion, root, out_dir, config)?;

        let file_name = variant
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let reference = reference_path(
            &classification,
            &file_name,
            config,
            root,
            opts.ref_dump_dir.as_deref(),
        );
        if let Some(parent) = reference.parent() {
            ensure_dir(parent)?;
        }
        std::fs::copy(dump, &reference).with_context(|| {
            format!(
                "failed to copy {} to {}",
                dump.display(),
                reference.display()
            )
        })?;
        tracing::info!("{}: updated {}", lib.name, reference.display());

        updated.push(UpdatedRef {
            module: lib.name.clone(),
            source: dump.clone(),
            reference,
        });
    }

    if updated.is_empty() {
        bail!("module `{}` has no ABI-checked variants", lib.name);
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::sabi::BuiltinAbiTool;
    use crate::ops::abi_check::{abi_check, fragment_dir, AbiCheckOptions};
    use crate::ops::expand::{expand_manifest, ExpandOptions};
    use crate::ops::link::link_all;
    use crate::test_support::fixtures::{
        manifest_dir, sample_dump, write_fragment, write_reference_dump, TWO_LIBRARY_MANIFEST,
    };

    #[test]
    fn test_update_then_check_passes() {
        let (tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
        let config = Config::default();
        let out = tmp.path().join("out");
        write_fragment(&fragment_dir(&out, "libfoo", "static"), "foo", &sample_dump());

        let mut stale = sample_dump();
        stale.functions.clear();
        let stale_dir = tmp
            .path()
            .join(&config.abi.dump_root)
            .join("ndk")
            .join(config.platform.sdk_version.to_string())
            .join("64");
        write_reference_dump(&stale_dir, &config.platform, "libfoo.so", &stale);

        let expansion = expand_manifest(&manifest, &config.platform, &ExpandOptions::default());
        let linked = link_all(&manifest, &expansion, &out, &config.platform).unwrap();

        let updated = update_refs(
            &BuiltinAbiTool,
            &manifest,
            &config,
            &expansion,
            &linked,
            &out,
            &UpdateRefsOptions {
                library: "libfoo".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(
            updated[0].reference,
            stale_dir.join("arm64/source-based/libfoo.so.lsdump")
        );

        let report = abi_check(
            &BuiltinAbiTool,
            &manifest,
            &config,
            &expansion,
            &linked,
            &out,
            &AbiCheckOptions::default(),
        )
        .unwrap();
        assert!(report.passed());
        assert_eq!(report.dumps[0].diffs.len(), 1);
    }

    #[test]
    fn test_opt_in_directory() {
        let (tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
        let config = Config::default();
        let out = tmp.path().join("out");
        let expansion = expand_manifest(&manifest, &config.platform, &ExpandOptions::default());
        let linked = link_all(&manifest, &expansion, &out, &config.platform).unwrap();

        let updated = update_refs(
            &BuiltinAbiTool,
            &manifest,
            &config,
            &expansion,
            &linked,
            &out,
            &UpdateRefsOptions {
                library: "libfoo".to_string(),
                ref_dump_dir: Some(PathBuf::from("refs")),
                products: Some("generic_arm64".to_string()),
            },
        )
        .unwrap();
        assert_eq!(
            updated[0].reference,
            tmp.path().join("refs/arm64/source-based/libfoo.so.lsdump")
        );
        assert!(updated[0].reference.is_file());
    }

    #[test]
    fn test_library_without_abi_check() {
        let (tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
        let config = Config::default();
        let out = tmp.path().join("out");
        let expansion = expand_manifest(&manifest, &config.platform, &ExpandOptions::default());
        let linked = link_all(&manifest, &expansion, &out, &config.platform).unwrap();

        let err = update_refs(
            &BuiltinAbiTool,
            &manifest,
            &config,
            &expansion,
            &linked,
            &out,
            &UpdateRefsOptions {
                library: "libapp".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("no ABI-checked variants"));
    }
}
