//! Library declarations - one logical library per `[[library]]` table.
//!
//! A `LibraryConfig` is read once from the manifest and never mutated
//! afterwards. Everything the expansion and link passes need to know about
//! a variant is derived from it on demand.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::api_level::add_current_version_if_not_present;
use crate::core::errors::ConfigError;
use crate::core::exporter::{first_unique, ExportProps};
use crate::core::variant::VariantKind;
use crate::util::diagnostic::suggestions;

/// Suffix every symbol map file must carry.
pub const SYMBOL_FILE_SUFFIX: &str = ".map.txt";

/// Which linkages a declaration can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    /// Static and shared
    #[default]
    #[serde(alias = "both")]
    Library,
    /// Static only
    Static,
    /// Shared only
    Shared,
    /// Headers only, nothing linkable
    #[serde(alias = "header")]
    Headers,
}

/// The image a library is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    #[default]
    #[serde(alias = "system", alias = "platform")]
    Core,
    Vendor,
    Product,
}

impl Partition {
    /// Whether modules in this partition see the platform through VNDK/LLNDK.
    pub fn uses_vndk(&self) -> bool {
        matches!(self, Partition::Vendor | Partition::Product)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Core => "core",
            Partition::Vendor => "vendor",
            Partition::Product => "product",
        }
    }
}

/// Properties that apply to only the static or only the shared variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkageProps {
    pub enabled: Option<bool>,
    pub srcs: Vec<String>,
    pub cflags: Vec<String>,
    pub whole_static_libs: Vec<String>,
    pub static_libs: Vec<String>,
    pub shared_libs: Vec<String>,
    /// `None` inherits the base list; `Some(vec![])` links no system libraries.
    pub system_shared_libs: Option<Vec<String>>,
    pub export_shared_lib_headers: Vec<String>,
    pub export_static_lib_headers: Vec<String>,
    pub apex_available: Vec<String>,
    pub installable: Option<bool>,
}

impl LinkageProps {
    /// Whether two stanzas would compile identical objects.
    ///
    /// `system_shared_libs` compares `None` and `Some(vec![])` as different.
    pub fn same_objects_as(&self, other: &LinkageProps) -> bool {
        self.srcs == other.srcs
            && self.cflags == other.cflags
            && self.whole_static_libs == other.whole_static_libs
            && self.static_libs == other.static_libs
            && self.shared_libs == other.shared_libs
            && self.system_shared_libs == other.system_shared_libs
    }
}

/// `stubs { ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StubsProps {
    /// Symbol map describing the stub surface
    pub symbol_file: Option<PathBuf>,
    /// API levels to generate stubs for; `current` is always added
    pub versions: Vec<String>,
    /// Whether the implementation must be installed when a stub client is
    pub implementation_installable: Option<bool>,
}

/// `llndk { ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlndkProps {
    pub symbol_file: Option<PathBuf>,
    pub override_export_include_dirs: Option<Vec<PathBuf>>,
    pub export_headers_as_system: bool,
    /// Generate the stub without a version script
    pub unversioned: bool,
}

/// `vendor_public_library { ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorPublicProps {
    pub symbol_file: Option<PathBuf>,
    pub override_export_include_dirs: Option<Vec<PathBuf>>,
}

/// `header_abi_checker { ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderAbiCheckerProps {
    pub enabled: Option<bool>,
    pub check_all_apis: Option<bool>,
    /// Extra flags for the diff tool, after the policy flags
    pub diff_flags: Vec<String>,
    /// Unversioned opt-in reference dump directories
    pub ref_dump_dirs: Vec<PathBuf>,
    /// Symbol file for dump filtering, overriding the stub symbol file
    pub symbol_file: Option<PathBuf>,
    /// Version nodes (glob patterns) to drop from the dump
    pub exclude_symbol_versions: Vec<String>,
    /// Symbol tags to drop from the dump
    pub exclude_symbol_tags: Vec<String>,
}

impl HeaderAbiCheckerProps {
    /// Append-merge `other` on top of `self`.
    ///
    /// Lists are concatenated; scalar values set in `other` replace ours.
    pub fn append(&mut self, other: &HeaderAbiCheckerProps) {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.check_all_apis.is_some() {
            self.check_all_apis = other.check_all_apis;
        }
        if other.symbol_file.is_some() {
            self.symbol_file = other.symbol_file.clone();
        }
        self.diff_flags.extend(other.diff_flags.iter().cloned());
        self.ref_dump_dirs.extend(other.ref_dump_dirs.iter().cloned());
        self.exclude_symbol_versions
            .extend(other.exclude_symbol_versions.iter().cloned());
        self.exclude_symbol_tags
            .extend(other.exclude_symbol_tags.iter().cloned());
    }
}

/// `target.vendor { ... }` / `target.product { ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionProps {
    pub suffix: Option<String>,
    /// Replaces `export_include_dirs` entirely when set
    pub override_export_include_dirs: Option<Vec<PathBuf>>,
    pub header_abi_checker: HeaderAbiCheckerProps,
    pub exclude_static_libs: Vec<String>,
    pub exclude_shared_libs: Vec<String>,
    pub exclude_header_libs: Vec<String>,
}

/// `target.platform { ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformTargetProps {
    pub header_abi_checker: HeaderAbiCheckerProps,
}

/// `target { ... }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetProps {
    pub vendor: PartitionProps,
    pub product: PartitionProps,
    pub platform: PlatformTargetProps,
}

/// Dependency lists of one variant, after linkage merge and partition excludes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariantDeps {
    pub whole_static_libs: Vec<String>,
    pub static_libs: Vec<String>,
    pub shared_libs: Vec<String>,
    pub header_libs: Vec<String>,
    pub system_shared_libs: Option<Vec<String>>,
}

impl VariantDeps {
    /// Every module named by these lists, pins stripped.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.whole_static_libs
            .iter()
            .chain(&self.static_libs)
            .chain(&self.shared_libs)
            .chain(&self.header_libs)
            .map(|d| split_version_pin(d).0)
    }

    pub fn is_empty(&self) -> bool {
        self.whole_static_libs.is_empty()
            && self.static_libs.is_empty()
            && self.shared_libs.is_empty()
            && self.header_libs.is_empty()
    }
}

/// Split `libfoo#29` into (`libfoo`, Some(`29`)).
pub fn split_version_pin(dep: &str) -> (&str, Option<&str>) {
    match dep.split_once('#') {
        Some((name, version)) => (name, Some(version)),
        None => (dep, None),
    }
}

/// A logical library declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Module name
    pub name: String,
    pub kind: LibraryKind,
    pub partition: Partition,
    /// Pass-through prebuilt: both linkages always exist, the unused one disabled
    pub prebuilt: bool,

    /// Output name override
    pub stem: Option<String>,
    /// Output name suffix
    pub suffix: Option<String>,

    pub srcs: Vec<String>,
    pub cflags: Vec<String>,
    pub export_include_dirs: Vec<PathBuf>,
    pub export_system_include_dirs: Vec<PathBuf>,

    pub whole_static_libs: Vec<String>,
    pub static_libs: Vec<String>,
    pub shared_libs: Vec<String>,
    pub header_libs: Vec<String>,
    pub system_shared_libs: Option<Vec<String>>,
    pub export_shared_lib_headers: Vec<String>,
    pub export_static_lib_headers: Vec<String>,
    pub export_header_lib_headers: Vec<String>,
    pub apex_available: Vec<String>,

    /// Part of the NDK
    pub ndk: bool,
    /// Part of the VNDK (only meaningful in vendor/product)
    pub vndk: bool,
    /// Extends a VNDK library
    pub vndk_ext: bool,
    /// Excluded from the base platform image (APEX-only)
    pub not_in_platform: bool,

    #[serde(rename = "static")]
    pub static_props: LinkageProps,
    #[serde(rename = "shared")]
    pub shared_props: LinkageProps,

    pub stubs: StubsProps,
    pub llndk: LlndkProps,
    pub vendor_public_library: VendorPublicProps,
    pub header_abi_checker: HeaderAbiCheckerProps,
    pub target: TargetProps,
}

impl LibraryConfig {
    /// Create a minimal library declaration.
    pub fn new(name: impl Into<String>) -> Self {
        LibraryConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: LibraryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    pub fn with_stubs(mut self, symbol_file: impl Into<PathBuf>, versions: &[&str]) -> Self {
        self.stubs.symbol_file = Some(symbol_file.into());
        self.stubs.versions = versions.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Whether a static variant is produced.
    pub fn build_static(&self) -> bool {
        matches!(self.kind, LibraryKind::Library | LibraryKind::Static)
            && self.static_props.enabled.unwrap_or(true)
            && !self.is_llndk()
    }

    /// Whether a shared variant is produced.
    pub fn build_shared(&self) -> bool {
        matches!(self.kind, LibraryKind::Library | LibraryKind::Shared)
            && self.shared_props.enabled.unwrap_or(true)
    }

    /// Whether this declaration has LLNDK stubs at all.
    pub fn has_llndk_stubs(&self) -> bool {
        self.llndk.symbol_file.is_some()
    }

    /// Whether this is the vendor-side view of an LLNDK library.
    pub fn is_llndk(&self) -> bool {
        self.has_llndk_stubs() && self.partition.uses_vndk()
    }

    /// Whether this is the platform implementation of an LLNDK library.
    pub fn is_llndk_public(&self) -> bool {
        self.has_llndk_stubs() && !self.partition.uses_vndk()
    }

    /// Whether this is the core-side view of a vendor public library.
    pub fn is_vendor_public_library(&self) -> bool {
        self.vendor_public_library.symbol_file.is_some() && !self.partition.uses_vndk()
    }

    /// Whether the ABI surface is VNDK-versioned.
    pub fn is_vndk(&self) -> bool {
        self.vndk && self.partition.uses_vndk()
    }

    /// Whether `stubs` asks for any stub variants.
    ///
    /// A symbol file alone is enough: it yields a stub at the future level.
    pub fn has_stubs_variants(&self) -> bool {
        self.stubs.symbol_file.is_some() || !self.stubs.versions.is_empty()
    }

    /// Raw stub versions to expand, before normalization.
    pub fn stubs_versions(&self) -> Vec<String> {
        if self.is_llndk() || self.is_vendor_public_library() {
            return vec![crate::core::api_level::FUTURE_API_LEVEL_NAME.to_string()];
        }
        if !self.has_stubs_variants() {
            return Vec::new();
        }
        add_current_version_if_not_present(self.stubs.versions.clone())
    }

    /// Kind of the stub variants this declaration produces.
    pub fn stub_kind(&self) -> VariantKind {
        if self.is_llndk() {
            VariantKind::LlndkStub
        } else if self.is_vendor_public_library() {
            VariantKind::VendorPublicStub
        } else {
            VariantKind::Stub
        }
    }

    /// Symbol file feeding stubs of the given kind.
    pub fn stub_symbol_file(&self, kind: VariantKind) -> Option<&PathBuf> {
        match kind {
            VariantKind::LlndkStub => self.llndk.symbol_file.as_ref(),
            VariantKind::VendorPublicStub => self.vendor_public_library.symbol_file.as_ref(),
            VariantKind::Stub => self.stubs.symbol_file.as_ref(),
            VariantKind::Static | VariantKind::Shared => None,
        }
    }

    /// Whether the implementation must be installed alongside its stubs.
    pub fn is_stubs_implementation_required(&self) -> bool {
        self.stubs.implementation_installable.unwrap_or(true)
    }

    fn partition_props(&self) -> Option<&PartitionProps> {
        match self.partition {
            Partition::Core => None,
            Partition::Vendor => Some(&self.target.vendor),
            Partition::Product => Some(&self.target.product),
        }
    }

    /// Output name without extension: stem (or module name) plus suffix.
    pub fn lib_name(&self) -> String {
        let name = self.stem.as_deref().unwrap_or(&self.name);
        let suffix = self
            .partition_props()
            .and_then(|p| p.suffix.as_deref())
            .filter(|s| !s.is_empty())
            .or(self.suffix.as_deref())
            .unwrap_or("");
        format!("{}{}", name, suffix)
    }

    /// Header ABI checker properties merged with the partition stanza.
    pub fn header_abi_checker_props(&self) -> HeaderAbiCheckerProps {
        let mut props = self.header_abi_checker.clone();
        let partition = match self.partition {
            Partition::Core => &self.target.platform.header_abi_checker,
            Partition::Vendor => &self.target.vendor.header_abi_checker,
            Partition::Product => &self.target.product.header_abi_checker,
        };
        props.append(partition);
        props
    }

    /// Whether a linked ABI dump is produced and checked.
    pub fn abi_check_enabled(&self) -> bool {
        self.header_abi_checker_props().enabled.unwrap_or(
            self.ndk || self.is_vndk() || self.has_llndk_stubs() || self.has_stubs_variants(),
        )
    }

    /// Symbol file used to filter the linked ABI dump.
    pub fn symbol_file_for_abi_check(&self) -> Option<PathBuf> {
        if let Some(file) = self.header_abi_checker_props().symbol_file {
            return Some(file);
        }
        if self.is_llndk() {
            return self.llndk.symbol_file.clone();
        }
        if self.has_stubs_variants() {
            return self.stubs.symbol_file.clone();
        }
        None
    }

    /// Flag exporter inputs for a variant of the given kind.
    ///
    /// LLNDK and vendor public stubs may swap the include list for their own,
    /// and LLNDK stubs may re-export everything as system includes.
    pub fn export_props(&self, kind: VariantKind) -> ExportProps {
        let mut include_dirs = self.export_include_dirs.clone();
        let mut system_include_dirs = self.export_system_include_dirs.clone();

        match kind {
            VariantKind::LlndkStub => {
                if let Some(dirs) = &self.llndk.override_export_include_dirs {
                    include_dirs = dirs.clone();
                }
                if self.llndk.export_headers_as_system {
                    system_include_dirs.append(&mut include_dirs);
                }
            }
            VariantKind::VendorPublicStub => {
                if let Some(dirs) = &self.vendor_public_library.override_export_include_dirs {
                    include_dirs = dirs.clone();
                }
            }
            _ => {}
        }

        ExportProps {
            include_dirs,
            system_include_dirs,
            vendor_override: self.target.vendor.override_export_include_dirs.clone(),
            product_override: self.target.product.override_export_include_dirs.clone(),
        }
    }

    /// Per-linkage properties for a variant kind.
    pub fn linkage_props(&self, kind: VariantKind) -> &LinkageProps {
        match kind {
            VariantKind::Static => &self.static_props,
            _ => &self.shared_props,
        }
    }

    /// Effective sources: base plus linkage-specific.
    pub fn variant_srcs(&self, kind: VariantKind) -> Vec<String> {
        let mut srcs = self.srcs.clone();
        srcs.extend(self.linkage_props(kind).srcs.iter().cloned());
        srcs
    }

    /// Effective local cflags: base plus linkage-specific.
    pub fn variant_cflags(&self, kind: VariantKind) -> Vec<String> {
        let mut cflags = self.cflags.clone();
        cflags.extend(self.linkage_props(kind).cflags.iter().cloned());
        cflags
    }

    /// Effective dependencies: base plus linkage lists, minus partition excludes.
    pub fn variant_deps(&self, kind: VariantKind) -> VariantDeps {
        let linkage = self.linkage_props(kind);
        let excludes = self.partition_props();

        let merge = |base: &[String], extra: &[String], exclude: Option<&[String]>| {
            base.iter()
                .chain(extra)
                .filter(|d| {
                    let name = split_version_pin(d).0;
                    !exclude.is_some_and(|ex| ex.iter().any(|e| e == name))
                })
                .cloned()
                .collect::<Vec<_>>()
        };

        VariantDeps {
            whole_static_libs: merge(&self.whole_static_libs, &linkage.whole_static_libs, None),
            static_libs: merge(
                &self.static_libs,
                &linkage.static_libs,
                excludes.map(|p| p.exclude_static_libs.as_slice()),
            ),
            shared_libs: merge(
                &self.shared_libs,
                &linkage.shared_libs,
                excludes.map(|p| p.exclude_shared_libs.as_slice()),
            ),
            header_libs: merge(
                &self.header_libs,
                &[],
                excludes.map(|p| p.exclude_header_libs.as_slice()),
            ),
            system_shared_libs: linkage
                .system_shared_libs
                .clone()
                .or_else(|| self.system_shared_libs.clone()),
        }
    }

    /// Modules whose exported flags this variant re-exports.
    pub fn reexported_deps(&self, kind: VariantKind) -> Vec<String> {
        let linkage = self.linkage_props(kind);
        let deps: Vec<String> = self
            .export_shared_lib_headers
            .iter()
            .chain(&linkage.export_shared_lib_headers)
            .chain(&self.export_static_lib_headers)
            .chain(&linkage.export_static_lib_headers)
            .chain(&self.export_header_lib_headers)
            .map(|d| split_version_pin(d).0.to_string())
            .collect();
        first_unique(deps)
    }

    /// APEXes a variant may be placed in.
    pub fn apex_available(&self, kind: VariantKind) -> Vec<String> {
        let linkage = &self.linkage_props(kind).apex_available;
        if linkage.is_empty() {
            self.apex_available.clone()
        } else {
            linkage.clone()
        }
    }

    /// Check the declaration for errors that do not need the platform config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::new(
                "<unnamed>",
                "name",
                "",
                "every library needs a name",
            ));
        }

        let symbol_files = [
            ("stubs.symbol_file", self.stubs.symbol_file.as_ref()),
            ("llndk.symbol_file", self.llndk.symbol_file.as_ref()),
            (
                "vendor_public_library.symbol_file",
                self.vendor_public_library.symbol_file.as_ref(),
            ),
        ];
        for (property, file) in symbol_files {
            if let Some(file) = file {
                if !file.to_string_lossy().ends_with(SYMBOL_FILE_SUFFIX) {
                    return Err(ConfigError::new(
                        &self.name,
                        property,
                        file.display().to_string(),
                        format!("symbol file must end in `{}`", SYMBOL_FILE_SUFFIX),
                    )
                    .with_help(suggestions::SYMBOL_FILE_SUFFIX));
                }
            }
        }

        if !self.stubs.versions.is_empty() && self.stubs.symbol_file.is_none() {
            return Err(ConfigError::new(
                &self.name,
                "stubs.symbol_file",
                "",
                "`stubs.versions` is set but no symbol file describes the stub surface",
            ));
        }

        Ok(())
    }
}
