//! Stub surface generation.
//!
//! A stub is a shared object with one trivial definition per exported
//! symbol. Dependents link against it instead of the real implementation,
//! and its version script pins which symbols are visible at run time.

pub mod symbol_file;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::core::api_level::ApiLevel;
use crate::core::errors::{ModuleError, SymbolFileError};
use crate::core::library::LibraryConfig;
use crate::core::variant::{Variant, VariantKind};
use crate::util::config::PlatformConfig;
use crate::util::fs::write_if_changed;

pub use symbol_file::{Symbol, SymbolFile, Tags, VersionNode};

/// File name of the generated stub source inside a variant directory.
pub const STUB_SOURCE_NAME: &str = "stub.c";

/// File name of the generated version script inside a variant directory.
pub const VERSION_SCRIPT_NAME: &str = "stub.map";

/// Flags added when compiling generated stub sources.
const STUB_CFLAGS: &[&str] = &[
    "-Wno-incompatible-library-redeclaration",
    "-Wno-incomplete-setjmp-declaration",
    "-Wno-builtin-requires-header",
    "-Wno-invalid-noreturn",
    "-Wall",
    "-Werror",
    "-fno-unwind-tables",
];

/// Which symbols of a map file a stub exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StubFilter {
    pub arch: String,
    pub api: ApiLevel,
    /// Include `# apex` symbols
    pub apex: bool,
    /// Include `# systemapi` symbols
    pub systemapi: bool,
    /// Include `# llndk` symbols
    pub llndk: bool,
    /// Include untagged public symbols
    pub ndk: bool,
}

impl StubFilter {
    /// Unrestricted filter at `api`.
    pub fn new(arch: impl Into<String>, api: ApiLevel) -> Self {
        StubFilter {
            arch: arch.into(),
            api,
            apex: false,
            systemapi: false,
            llndk: false,
            ndk: true,
        }
    }

    /// Command-line spelling of the mode flags, for logs and fingerprints.
    pub fn stub_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.apex {
            flags.push("--apex");
        }
        if self.systemapi {
            flags.push("--systemapi");
        }
        if self.llndk {
            flags.push("--llndk");
        }
        if !self.ndk {
            flags.push("--no-ndk");
        }
        flags
    }

    fn omits_version(
        &self,
        version: &VersionNode,
        platform: &PlatformConfig,
    ) -> Result<bool, SymbolFileError> {
        if version.is_private() || version.tags.has("platform-only") {
            return Ok(true);
        }
        // LLNDK symbols carry their own versions
        if self.llndk {
            return Ok(false);
        }
        Ok(!self.in_arch(&version.tags) || !self.in_api(&version.tags, None, version.line, platform)?)
    }

    fn omits_symbol(
        &self,
        version: &VersionNode,
        symbol: &Symbol,
        platform: &PlatformConfig,
    ) -> Result<bool, SymbolFileError> {
        let has = |tag: &str| symbol.tags.has(tag) || version.tags.has(tag);
        let mode_tagged = symbol.tags.has_mode_tags() || version.tags.has_mode_tags();

        let selected = (self.llndk && has("llndk"))
            || (self.apex && has("apex"))
            || (self.systemapi && has("systemapi"));
        if !selected && (mode_tagged || !self.ndk) {
            return Ok(true);
        }

        if symbol.tags.has("future") && !self.api.is_future() {
            return Ok(true);
        }

        Ok(!self.in_arch(&symbol.tags)
            || !self.in_api(&symbol.tags, Some(&version.tags), symbol.line, platform)?)
    }

    fn in_arch(&self, tags: &Tags) -> bool {
        let arches = tags.arches();
        arches.is_empty() || arches.contains(&self.arch.as_str())
    }

    fn in_api(
        &self,
        tags: &Tags,
        inherited: Option<&Tags>,
        line: usize,
        platform: &PlatformConfig,
    ) -> Result<bool, SymbolFileError> {
        let raw = tags
            .introduced(&self.arch)
            .or_else(|| inherited.and_then(|t| t.introduced(&self.arch)));
        let Some(raw) = raw else {
            return Ok(true);
        };
        let introduced = ApiLevel::from_user(raw, platform).map_err(|e| SymbolFileError::Syntax {
            path: PathBuf::new(),
            line,
            message: e.to_string(),
        })?;
        Ok(introduced <= self.api)
    }
}

/// Pick the stub filter for a stub variant; `None` for non-stub variants.
pub fn stub_filter_for(
    lib: &LibraryConfig,
    variant: &Variant,
    platform: &PlatformConfig,
) -> Option<StubFilter> {
    let arch = platform.arch.clone();
    match variant.kind {
        VariantKind::Stub => {
            let api = variant.version.clone().unwrap_or_else(ApiLevel::future);
            let mut filter = StubFilter::new(arch, api);
            if lib.not_in_platform {
                filter.apex = true;
            } else {
                filter.systemapi = true;
            }
            filter.ndk = lib.ndk;
            Some(filter)
        }
        VariantKind::LlndkStub => {
            let api = match &variant.version {
                Some(version) => version.clone(),
                None => llndk_api_level(platform),
            };
            let mut filter = StubFilter::new(arch, api);
            filter.llndk = true;
            Some(filter)
        }
        VariantKind::VendorPublicStub => Some(StubFilter::new(arch, ApiLevel::future())),
        VariantKind::Static | VariantKind::Shared => None,
    }
}

/// API level LLNDK stubs are generated at.
///
/// An in-development VNDK codename is used as-is; anything else means
/// the future level.
fn llndk_api_level(platform: &PlatformConfig) -> ApiLevel {
    platform
        .vndk_version
        .as_deref()
        .filter(|v| platform.active_codenames.iter().any(|c| c == v))
        .and_then(|v| ApiLevel::from_user(v, platform).ok())
        .unwrap_or_else(ApiLevel::future)
}

/// Generated stub source and version script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StubSurface {
    pub source: String,
    pub version_script: String,
    /// Exposed symbols in file order
    pub symbols: Vec<String>,
}

/// Paths written by `StubSurface::write`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StubFiles {
    pub source: PathBuf,
    /// `None` for unversioned stubs
    pub version_script: Option<PathBuf>,
}

impl StubSurface {
    /// Write the surface into `dir`, leaving unchanged files untouched.
    pub fn write(&self, dir: &Path, versioned: bool) -> Result<StubFiles> {
        let source = dir.join(STUB_SOURCE_NAME);
        if write_if_changed(&source, &self.source)? {
            tracing::debug!("wrote {}", source.display());
        }

        let version_script = if versioned {
            let path = dir.join(VERSION_SCRIPT_NAME);
            write_if_changed(&path, &self.version_script)?;
            Some(path)
        } else {
            None
        };

        Ok(StubFiles {
            source,
            version_script,
        })
    }
}

/// Narrow a symbol file down to the surface `filter` selects.
pub fn generate(
    file: &SymbolFile,
    filter: &StubFilter,
    platform: &PlatformConfig,
) -> Result<StubSurface, SymbolFileError> {
    let with_path = |e: SymbolFileError| match e {
        SymbolFileError::Syntax { line, message, .. } => SymbolFileError::Syntax {
            path: file.path.clone(),
            line,
            message,
        },
        other => other,
    };

    let mut source = String::new();
    let mut version_script = String::new();
    let mut symbols = Vec::new();
    let mut emitted: Vec<&str> = Vec::new();

    for version in &file.versions {
        if filter.omits_version(version, platform).map_err(with_path)? {
            continue;
        }

        let mut kept = Vec::new();
        for symbol in &version.symbols {
            if !filter.omits_symbol(version, symbol, platform).map_err(with_path)? {
                kept.push(symbol);
            }
        }
        if kept.is_empty() {
            continue;
        }

        let _ = writeln!(version_script, "{} {{", version.name);
        let _ = writeln!(version_script, "    global:");
        for symbol in &kept {
            let _ = writeln!(version_script, "        {};", symbol.name);

            let weak = if symbol.is_weak() {
                "__attribute__((weak)) "
            } else {
                ""
            };
            if symbol.is_variable() {
                let _ = writeln!(source, "{}int {} = 0;", weak, symbol.name);
            } else {
                let _ = writeln!(source, "{}void {}() {{}}", weak, symbol.name);
            }
            symbols.push(symbol.name.clone());
        }

        match version.base.as_deref().filter(|b| emitted.contains(b)) {
            Some(base) => {
                let _ = writeln!(version_script, "}} {};", base);
            }
            None => {
                let _ = writeln!(version_script, "}};");
            }
        }
        emitted.push(&version.name);
    }

    Ok(StubSurface {
        source,
        version_script,
        symbols,
    })
}

/// Build the stub surface of one variant, reading its symbol file from
/// under `root`.
pub fn surface_for_variant(
    lib: &LibraryConfig,
    variant: &Variant,
    root: &Path,
    platform: &PlatformConfig,
) -> Result<Option<StubSurface>, ModuleError> {
    let Some(filter) = stub_filter_for(lib, variant, platform) else {
        return Ok(None);
    };
    let Some(symbol_file) = lib.stub_symbol_file(variant.kind) else {
        return Ok(None);
    };

    let module_err = |source| ModuleError::SymbolFile {
        module: lib.name.clone(),
        source,
    };
    let file = SymbolFile::load(&root.join(symbol_file)).map_err(module_err)?;

    tracing::debug!(
        "{}: generating {} stub at {} {:?}",
        lib.name,
        variant.name(),
        filter.api,
        filter.stub_flags()
    );
    generate(&file, &filter, platform).map(Some).map_err(module_err)
}

/// Local compile flags for a stub variant.
///
/// Force-included headers would clash with the trivial definitions, so
/// every `-include <file>` is dropped, whether spelled as one argument or
/// two. The stub warning suppressions are appended.
pub fn stub_compile_flags(flags: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(flags.len() + STUB_CFLAGS.len());
    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        if flag == "-include" {
            iter.next();
            continue;
        }
        if flag.starts_with("-include ") {
            continue;
        }
        out.push(flag.clone());
    }
    out.extend(STUB_CFLAGS.iter().map(|f| f.to_string()));
    out
}
