//! Variants - the concrete build targets derived from one library.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::api_level::ApiLevel;
use crate::core::library::VariantDeps;

/// The closed set of variant kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    /// Static archive
    Static,
    /// Shared object built from the real implementation
    Shared,
    /// Placeholder shared object exposing one API level's symbols
    Stub,
    /// Vendor-facing stub of an LLNDK library
    LlndkStub,
    /// Core-facing stub of a vendor public library
    VendorPublicStub,
}

impl VariantKind {
    /// Whether this variant is a placeholder built from a symbol file.
    pub fn is_stub(&self) -> bool {
        matches!(
            self,
            VariantKind::Stub | VariantKind::LlndkStub | VariantKind::VendorPublicStub
        )
    }

    /// Whether this variant links to a shared object.
    pub fn is_shared(&self) -> bool {
        !matches!(self, VariantKind::Static)
    }

    fn prefix(&self) -> &'static str {
        match self {
            VariantKind::Static => "static",
            VariantKind::Shared => "shared",
            VariantKind::Stub => "stub",
            VariantKind::LlndkStub => "llndk",
            VariantKind::VendorPublicStub => "vendor_public",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One concrete build target.
#[derive(Debug, Clone, Serialize)]
pub struct Variant {
    /// Owning module
    pub module: String,
    pub kind: VariantKind,
    /// Stub API level; `None` for the static, implementation and unversioned stub variants
    pub version: Option<ApiLevel>,
    /// Highest declared stub version
    pub is_latest: bool,
    pub installable: bool,
    /// Not reachable through the module's own name
    pub hidden: bool,
    /// Prebuilt linkage that exists only so names line up
    pub disabled: bool,
    /// Sources compiled for this variant (empty when objects are reused)
    pub srcs: Vec<String>,
    pub cflags: Vec<String>,
    pub deps: VariantDeps,
    pub apex_available: Vec<String>,
}

impl Variant {
    pub fn new(module: impl Into<String>, kind: VariantKind) -> Self {
        Variant {
            module: module.into(),
            kind,
            version: None,
            is_latest: false,
            installable: false,
            hidden: false,
            disabled: false,
            srcs: Vec::new(),
            cflags: Vec::new(),
            deps: VariantDeps::default(),
            apex_available: Vec::new(),
        }
    }

    /// Variation name, unique within the module (`static`, `shared`, `stub_29`, ...).
    pub fn name(&self) -> String {
        match &self.version {
            Some(version) => format!("{}_{}", self.kind.prefix(), version),
            None => self.kind.prefix().to_string(),
        }
    }

    /// Version string as shown to users (`""` for unversioned variants).
    pub fn version_str(&self) -> &str {
        self.version.as_ref().map(|v| v.as_str()).unwrap_or("")
    }

    /// Whether this is the real shared implementation.
    pub fn is_implementation(&self) -> bool {
        self.kind == VariantKind::Shared
    }

    /// Directory holding this variant's outputs.
    pub fn out_dir(&self, out_root: &Path) -> PathBuf {
        out_root.join(&self.module).join(self.name())
    }

    /// Output file name for a library named `lib_name`.
    pub fn output_file_name(&self, lib_name: &str) -> String {
        match self.kind {
            VariantKind::Static => format!("{}.a", self.module),
            _ => format!("{}.so", lib_name),
        }
    }

    /// Full path of the linked output.
    pub fn output_path(&self, out_root: &Path, lib_name: &str) -> PathBuf {
        self.out_dir(out_root).join(self.output_file_name(lib_name))
    }

    /// Path of the linked ABI dump.
    pub fn abi_dump_path(&self, out_root: &Path, lib_name: &str) -> PathBuf {
        self.out_dir(out_root)
            .join(format!("{}.lsdump", self.output_file_name(lib_name)))
    }
}
