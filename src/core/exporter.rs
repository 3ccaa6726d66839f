//! Flag exporter - the public interface a library hands to its dependents.
//!
//! A `FlagExporter` accumulates include directories, system include
//! directories, raw flags, extra dependency files and generated headers,
//! both the library's own and those re-exported from its dependencies.
//! `finalize` consumes it and publishes an immutable `ExportedFlags`.

use std::collections::HashSet;
use std::hash::Hash;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::errors::ExportError;
use crate::core::library::Partition;

/// Exported include settings of one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportProps {
    pub include_dirs: Vec<PathBuf>,
    pub system_include_dirs: Vec<PathBuf>,
    /// Replaces `include_dirs` for vendor variants when set
    pub vendor_override: Option<Vec<PathBuf>>,
    /// Replaces `include_dirs` for product variants when set
    pub product_override: Option<Vec<PathBuf>>,
}

/// A preprocessor define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Define {
    /// Simple flag: -DFOO
    Flag(String),
    /// Key-value: -DFOO=bar
    KeyValue { name: String, value: String },
}

impl Define {
    /// Create a key-value define.
    pub fn key_value(name: impl Into<String>, value: impl ToString) -> Self {
        Define::KeyValue {
            name: name.into(),
            value: value.to_string(),
        }
    }

    /// Get the define name.
    pub fn name(&self) -> &str {
        match self {
            Define::Flag(n) => n,
            Define::KeyValue { name, .. } => name,
        }
    }

    /// Convert to compiler flag format.
    pub fn to_flag(&self) -> String {
        match self {
            Define::Flag(name) => format!("-D{}", name),
            Define::KeyValue { name, value } => format!("-D{}={}", name, value),
        }
    }
}

/// Mutable accumulator owned by one variant while it is being linked.
#[derive(Debug, Clone)]
pub struct FlagExporter {
    props: ExportProps,
    partition: Partition,
    dirs: Vec<PathBuf>,
    system_dirs: Vec<PathBuf>,
    flags: Vec<String>,
    deps: Vec<PathBuf>,
    headers: Vec<PathBuf>,
}

impl FlagExporter {
    pub fn new(props: ExportProps, partition: Partition) -> Self {
        FlagExporter {
            props,
            partition,
            dirs: Vec::new(),
            system_dirs: Vec::new(),
            flags: Vec::new(),
            deps: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Effective public include directories.
    ///
    /// A vendor or product override replaces the base list instead of
    /// extending it.
    pub fn exported_includes(&self) -> Vec<PathBuf> {
        let partition_override = match self.partition {
            Partition::Vendor => self.props.vendor_override.as_ref(),
            Partition::Product => self.props.product_override.as_ref(),
            Partition::Core => None,
        };
        partition_override
            .unwrap_or(&self.props.include_dirs)
            .clone()
    }

    /// Export the library's own include directories.
    pub fn export_includes(&mut self) {
        let includes = self.exported_includes();
        self.dirs.extend(includes);
        self.system_dirs
            .extend(self.props.system_include_dirs.iter().cloned());
    }

    /// Export the library's own include directories, all as system includes.
    pub fn export_includes_as_system(&mut self) {
        let includes = self.exported_includes();
        self.system_dirs.extend(includes);
        self.system_dirs
            .extend(self.props.system_include_dirs.iter().cloned());
    }

    pub fn reexport_dirs(&mut self, dirs: impl IntoIterator<Item = PathBuf>) {
        self.dirs.extend(dirs);
    }

    pub fn reexport_system_dirs(&mut self, dirs: impl IntoIterator<Item = PathBuf>) {
        self.system_dirs.extend(dirs);
    }

    /// Re-export raw flags.
    ///
    /// Include paths must go through `reexport_dirs`/`reexport_system_dirs`;
    /// passing `-I` or `-isystem` here is rejected and nothing is appended.
    pub fn reexport_flags<I, S>(&mut self, flags: I) -> Result<(), ExportError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let flags: Vec<String> = flags.into_iter().map(Into::into).collect();
        if let Some(flag) = flags
            .iter()
            .find(|f| f.starts_with("-I") || f.starts_with("-isystem"))
        {
            return Err(ExportError::IncludeFlag { flag: flag.clone() });
        }
        self.flags.extend(flags);
        Ok(())
    }

    pub fn reexport_deps(&mut self, deps: impl IntoIterator<Item = PathBuf>) {
        self.deps.extend(deps);
    }

    pub fn add_exported_generated_headers(&mut self, headers: impl IntoIterator<Item = PathBuf>) {
        self.headers.extend(headers);
    }

    /// Re-export everything a dependency published.
    pub fn reexport_all(&mut self, dep: &ExportedFlags) -> Result<(), ExportError> {
        self.reexport_dirs(dep.include_dirs.iter().cloned());
        self.reexport_system_dirs(dep.system_include_dirs.iter().cloned());
        self.reexport_flags(dep.flags.iter().cloned())?;
        self.reexport_deps(dep.deps.iter().cloned());
        self.add_exported_generated_headers(dep.generated_headers.iter().cloned());
        Ok(())
    }

    /// Publish the read-only snapshot. Only directory lists are
    /// deduplicated; flags may legitimately repeat (`-Xclang a -Xclang b`).
    pub fn finalize(self) -> ExportedFlags {
        ExportedFlags {
            include_dirs: first_unique(self.dirs),
            system_include_dirs: first_unique(self.system_dirs),
            flags: self.flags,
            deps: self.deps,
            generated_headers: self.headers,
        }
    }
}

/// What dependents of a variant see. Immutable once published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportedFlags {
    include_dirs: Vec<PathBuf>,
    system_include_dirs: Vec<PathBuf>,
    flags: Vec<String>,
    deps: Vec<PathBuf>,
    generated_headers: Vec<PathBuf>,
}

impl ExportedFlags {
    pub fn include_dirs(&self) -> &[PathBuf] {
        &self.include_dirs
    }

    pub fn system_include_dirs(&self) -> &[PathBuf] {
        &self.system_include_dirs
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn deps(&self) -> &[PathBuf] {
        &self.deps
    }

    pub fn generated_headers(&self) -> &[PathBuf] {
        &self.generated_headers
    }

    /// Compiler arguments a dependent adds: `-I`, then `-isystem`, then raw
    /// flags. `-isystem` and its directory are separate arguments.
    pub fn to_flags(&self) -> Vec<String> {
        let mut out = Vec::new();
        for dir in &self.include_dirs {
            out.push(format!("-I{}", dir.display()));
        }
        for dir in &self.system_include_dirs {
            out.push("-isystem".to_string());
            out.push(dir.display().to_string());
        }
        out.extend(self.flags.iter().cloned());
        out
    }
}

/// Drop duplicates, keeping each item's first occurrence.
pub fn first_unique<T: Clone + Eq + Hash>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
