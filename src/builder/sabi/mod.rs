//! Source ABI checking.
//!
//! Every ABI-checked shared implementation gets one linked dump, which is
//! then compared against up to three kinds of reference:
//! - the current release's reference (same-version)
//! - the previous release's reference (cross-version, not for VNDK)
//! - each directory in `header_abi_checker.ref_dump_dirs` (opt-in)
//!
//! A reference that does not exist means there is nothing to check.

pub mod diff;
pub mod dump;

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::core::library::LibraryConfig;
use crate::util::config::{AbiConfig, PlatformConfig};
use crate::util::diagnostic::AbiIncompatibleError;
use crate::util::fs::existent_file;

pub use diff::{AbiTool, BuiltinAbiTool, DiffOptions, DiffOutcome, DiffReport};
pub use dump::{AbiDump, LinkDumpRequest};

/// Reference dump directory a surface is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AbiClass {
    Ndk,
    Vndk,
    Platform,
}

impl AbiClass {
    pub fn dir_name(&self) -> &'static str {
        match self {
            AbiClass::Ndk => "ndk",
            AbiClass::Vndk => "vndk",
            AbiClass::Platform => "platform",
        }
    }
}

impl fmt::Display for AbiClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// How a library's ABI surface is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AbiClassification {
    pub class: AbiClass,
    pub ndk: bool,
    pub vndk: bool,
    pub llndk_public: bool,
    pub vndk_ext: bool,
}

impl AbiClassification {
    pub fn of(lib: &LibraryConfig) -> Self {
        let ndk = lib.ndk;
        let vndk = lib.is_vndk();
        let class = if ndk {
            AbiClass::Ndk
        } else if vndk {
            AbiClass::Vndk
        } else {
            AbiClass::Platform
        };
        AbiClassification {
            class,
            ndk,
            vndk,
            llndk_public: lib.is_llndk_public(),
            vndk_ext: lib.vndk_ext && vndk,
        }
    }

    /// NDK and LLNDK surfaces treat forward-declared types as distinct.
    pub fn considers_opaque_types(&self) -> bool {
        self.ndk || self.llndk_public
    }
}

/// `<dump_root>/<class>`
pub fn ref_dump_dir(dump_root: &Path, class: AbiClass) -> PathBuf {
    dump_root.join(class.dir_name())
}

/// Existing reference dump for `file_name` under `dir`, if any.
///
/// `dir` is a versioned bitness directory or an opt-in directory; the leaf
/// layout is `<arch>/source-based/<file>.lsdump` in both cases.
pub fn ref_dump_file(dir: &Path, platform: &PlatformConfig, file_name: &str) -> Option<PathBuf> {
    existent_file(
        dir.join(platform.arch_dir_name())
            .join("source-based")
            .join(format!("{}.lsdump", file_name)),
    )
}

/// Release the same-version check compares against.
pub fn current_reference_version(platform: &PlatformConfig, vndk: bool) -> String {
    if vndk {
        if let Some(version) = &platform.vndk_version {
            return version.clone();
        }
        return platform.sdk_version_string();
    }
    if platform.sdk_final {
        platform.sdk_version_string()
    } else {
        "current".to_string()
    }
}

/// Release the cross-version check compares against.
///
/// Normally the release before the platform SDK version. Before
/// finalization the SDK version can be bumped ahead of its reference
/// dumps; while `<dir>/<sdk>` does not exist yet the bump is assumed and
/// one more release is skipped. This depends on how releases are cut, so
/// it is a policy of the release configuration rather than an invariant.
pub fn previous_reference_version(platform: &PlatformConfig, dump_dir: &Path) -> i32 {
    let sdk = platform.sdk_version;
    if platform.sdk_final {
        return sdk - 1;
    }
    if dump_dir.join(platform.sdk_version_string()).is_dir() {
        sdk - 1
    } else {
        sdk - 2
    }
}

/// Which comparison a diff performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DiffPolicy {
    SameVersion { version: String },
    CrossVersion { previous: i32 },
    OptIn { index: usize, dir: PathBuf },
}

impl fmt::Display for DiffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffPolicy::SameVersion { version } => write!(f, "same-version ({})", version),
            DiffPolicy::CrossVersion { previous } => write!(f, "cross-version ({})", previous),
            DiffPolicy::OptIn { index, dir } => {
                write!(f, "opt-in #{} ({})", index, dir.display())
            }
        }
    }
}

/// One planned diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbiDiffRequest {
    pub policy: DiffPolicy,
    pub reference: PathBuf,
    /// Output name extension: empty, the previous version, or `opt<i>`
    pub name_ext: String,
    pub flags: Vec<String>,
    pub remediation: String,
}

/// Checker flags shared by every policy.
fn diff_flags(
    lib: &LibraryConfig,
    abi: &AbiConfig,
    classification: &AbiClassification,
    target_version: &str,
    allow_extensions: bool,
) -> Vec<String> {
    let props = lib.header_abi_checker_props();
    let mut flags = vec!["-target-version".to_string(), target_version.to_string()];
    if props.check_all_apis.unwrap_or(abi.check_all_apis) {
        flags.push("-check-all-apis".to_string());
    } else {
        flags.push("-allow-unreferenced-changes".to_string());
        flags.push("-allow-unreferenced-elf-symbol-changes".to_string());
    }
    if classification.considers_opaque_types() {
        flags.push("-consider-opaque-types-different".to_string());
    }
    if allow_extensions {
        flags.push("-allow-extensions".to_string());
    }
    flags.extend(props.diff_flags);
    flags
}

fn lib_name_of(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

/// Plan every applicable diff for one linked dump.
///
/// `file_name` is the shared object's file name; `root` resolves relative
/// dump roots and opt-in directories.
pub fn plan_diffs(
    lib: &LibraryConfig,
    file_name: &str,
    platform: &PlatformConfig,
    abi: &AbiConfig,
    root: &Path,
) -> Vec<AbiDiffRequest> {
    let classification = AbiClassification::of(lib);
    let dump_dir = ref_dump_dir(&root.join(&abi.dump_root), classification.class);
    let lib_name = lib_name_of(file_name);
    let mut requests = Vec::new();

    if !classification.vndk {
        let previous = previous_reference_version(platform, &dump_dir);
        let versioned = dump_dir
            .join(previous.to_string())
            .join(&platform.binder_bitness);
        if let Some(reference) = ref_dump_file(&versioned, platform, file_name) {
            requests.push(AbiDiffRequest {
                policy: DiffPolicy::CrossVersion { previous },
                reference,
                name_ext: previous.to_string(),
                flags: diff_flags(
                    lib,
                    abi,
                    &classification,
                    &(previous + 1).to_string(),
                    true,
                ),
                remediation: format!(
                    "error: Please resolve the ABI difference between your source code and version {}. \
                     If the change is intended, regenerate the reference with: \
                     abiwright update-refs -l {} --ref-dump-dir {}",
                    previous,
                    lib_name,
                    versioned.display()
                ),
            });
        }
    }

    let current = current_reference_version(platform, classification.vndk);
    let versioned = dump_dir.join(&current).join(&platform.binder_bitness);
    if let Some(reference) = ref_dump_file(&versioned, platform, file_name) {
        requests.push(AbiDiffRequest {
            policy: DiffPolicy::SameVersion { version: current },
            reference,
            name_ext: String::new(),
            flags: diff_flags(lib, abi, &classification, "current", classification.vndk_ext),
            remediation: format!(
                "error: Please update ABI references with: abiwright update-refs -l {}",
                lib_name
            ),
        });
    }

    for (index, dir) in lib.header_abi_checker_props().ref_dump_dirs.iter().enumerate() {
        let dir = root.join(dir);
        let Some(reference) = ref_dump_file(&dir, platform, file_name) else {
            continue;
        };
        let mut remediation = format!(
            "error: Please update ABI references with: abiwright update-refs -l {} --ref-dump-dir {}",
            lib_name,
            dir.display()
        );
        if let Some(product) = &platform.device_product {
            remediation.push_str(&format!(" --products {}", product));
        }
        requests.push(AbiDiffRequest {
            policy: DiffPolicy::OptIn { index, dir },
            reference,
            name_ext: format!("opt{}", index),
            flags: diff_flags(lib, abi, &classification, "current", false),
            remediation,
        });
    }

    requests
}

/// Outcome of one executed diff.
#[derive(Debug, Clone, Serialize)]
pub struct AbiDiffResult {
    pub library: String,
    pub policy: DiffPolicy,
    pub reference: PathBuf,
    pub outcome: DiffOutcome,
    pub findings: Vec<String>,
    pub remediation: String,
    pub passed: bool,
}

impl AbiDiffResult {
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// User-facing error for a failing diff.
    pub fn to_error(&self) -> AbiIncompatibleError {
        AbiIncompatibleError {
            library: self.library.clone(),
            reference: format!("{} reference {}", self.policy, self.reference.display()),
            findings: self.findings.clone(),
            remediation: self.remediation.clone(),
        }
    }
}

/// Run one planned diff against the linked dump.
pub fn run_diff(
    tool: &dyn AbiTool,
    library: &str,
    dump: &Path,
    request: &AbiDiffRequest,
) -> Result<AbiDiffResult> {
    let options = DiffOptions::from_flags(&request.flags)?;
    let report = tool.diff(dump, &request.reference, &options)?;
    let passed = report.passes(&options);
    tracing::debug!(
        "{}: {} -> {:?} ({} finding(s))",
        library,
        request.policy,
        report.outcome,
        report.findings.len()
    );
    Ok(AbiDiffResult {
        library: library.to_string(),
        policy: request.policy.clone(),
        reference: request.reference.clone(),
        outcome: report.outcome,
        findings: report.findings,
        remediation: request.remediation.clone(),
        passed,
    })
}
