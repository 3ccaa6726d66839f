//! ABI diffing and the tool seam.
//!
//! The link and diff steps sit behind `AbiTool` so an external checker can
//! be plugged in; `BuiltinAbiTool` implements both over the JSON dump model.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::builder::sabi::dump::{link_dump, AbiDump, ElfSymbol, LinkDumpRequest, RecordType};
use crate::util::hash::files_identical;

/// Diff leniency, parsed from checker flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffOptions {
    pub target_version: Option<String>,
    pub check_all_apis: bool,
    pub allow_unreferenced_changes: bool,
    pub allow_unreferenced_elf_symbol_changes: bool,
    pub consider_opaque_types_different: bool,
    pub allow_extensions: bool,
    pub allow_adding_removing_weak_symbols: bool,
    /// Report findings but never fail
    pub advice_only: bool,
}

impl DiffOptions {
    /// Parse checker flags; unknown flags are an error.
    pub fn from_flags(flags: &[String]) -> Result<Self> {
        let mut options = DiffOptions::default();
        let mut iter = flags.iter();
        while let Some(flag) = iter.next() {
            match flag.as_str() {
                "-target-version" => match iter.next() {
                    Some(version) => options.target_version = Some(version.clone()),
                    None => bail!("`-target-version` needs a value"),
                },
                "-check-all-apis" => options.check_all_apis = true,
                "-allow-unreferenced-changes" => options.allow_unreferenced_changes = true,
                "-allow-unreferenced-elf-symbol-changes" => {
                    options.allow_unreferenced_elf_symbol_changes = true
                }
                "-consider-opaque-types-different" => {
                    options.consider_opaque_types_different = true
                }
                "-allow-extensions" => options.allow_extensions = true,
                "-allow-adding-removing-weak-symbols" => {
                    options.allow_adding_removing_weak_symbols = true
                }
                "-advice-only" => options.advice_only = true,
                other => bail!("unknown ABI diff flag `{}`", other),
            }
        }
        if options.check_all_apis {
            options.allow_unreferenced_changes = false;
            options.allow_unreferenced_elf_symbol_changes = false;
        }
        Ok(options)
    }
}

/// Overall verdict of one diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOutcome {
    Compatible,
    Extension,
    Incompatible,
}

/// Raw result of comparing two dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    pub outcome: DiffOutcome,
    pub findings: Vec<String>,
}

impl DiffReport {
    pub fn compatible() -> Self {
        DiffReport {
            outcome: DiffOutcome::Compatible,
            findings: Vec::new(),
        }
    }

    /// Whether the report passes under `options`.
    pub fn passes(&self, options: &DiffOptions) -> bool {
        options.advice_only
            || match self.outcome {
                DiffOutcome::Compatible => true,
                DiffOutcome::Extension => options.allow_extensions,
                DiffOutcome::Incompatible => false,
            }
    }
}

/// Producer of linked dumps and ABI diffs.
pub trait AbiTool: Send + Sync {
    /// Tool name, for logs.
    fn name(&self) -> &str;

    /// Link compiled fragments into one dump at `request.output`.
    fn link_dump(&self, request: &LinkDumpRequest) -> Result<()>;

    /// Compare `current` against `reference`.
    fn diff(&self, current: &Path, reference: &Path, options: &DiffOptions) -> Result<DiffReport>;
}

/// In-process implementation over JSON dumps.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinAbiTool;

impl AbiTool for BuiltinAbiTool {
    fn name(&self) -> &str {
        "builtin"
    }

    fn link_dump(&self, request: &LinkDumpRequest) -> Result<()> {
        link_dump(request).map(|_| ())
    }

    fn diff(&self, current: &Path, reference: &Path, options: &DiffOptions) -> Result<DiffReport> {
        if files_identical(current, reference)? {
            return Ok(DiffReport::compatible());
        }
        let current = AbiDump::load(current)?;
        let reference = AbiDump::load(reference)?;
        Ok(diff_dumps(&reference, &current, options))
    }
}

/// Pick the tool named in the configuration.
pub fn tool_by_name(name: &str) -> Result<Box<dyn AbiTool>> {
    match name {
        "builtin" | "" => Ok(Box::new(BuiltinAbiTool)),
        other => bail!("unknown ABI tool `{}` (only `builtin` is available)", other),
    }
}

#[derive(Default)]
struct Findings {
    incompatible: Vec<String>,
    extensions: Vec<String>,
}

impl Findings {
    fn into_report(self) -> DiffReport {
        let outcome = if !self.incompatible.is_empty() {
            DiffOutcome::Incompatible
        } else if !self.extensions.is_empty() {
            DiffOutcome::Extension
        } else {
            DiffOutcome::Compatible
        };
        let mut findings = self.incompatible;
        findings.extend(self.extensions);
        DiffReport { outcome, findings }
    }
}

/// Compare two dumps. `old` is the reference.
pub fn diff_dumps(old: &AbiDump, new: &AbiDump, options: &DiffOptions) -> DiffReport {
    let mut findings = Findings::default();

    diff_decls(
        "function",
        &by_name(&old.functions, |f| &f.name),
        &by_name(&new.functions, |f| &f.name),
        &mut findings,
    );
    diff_decls(
        "variable",
        &by_name(&old.global_vars, |v| &v.name),
        &by_name(&new.global_vars, |v| &v.name),
        &mut findings,
    );
    diff_records(old, new, options, &mut findings);

    let declared: BTreeSet<&str> = old
        .functions
        .iter()
        .map(|f| f.name.as_str())
        .chain(old.global_vars.iter().map(|v| v.name.as_str()))
        .chain(new.functions.iter().map(|f| f.name.as_str()))
        .chain(new.global_vars.iter().map(|v| v.name.as_str()))
        .collect();
    diff_elf_symbols(&old.elf_functions, &new.elf_functions, &declared, options, &mut findings);
    diff_elf_symbols(&old.elf_objects, &new.elf_objects, &declared, options, &mut findings);

    findings.into_report()
}

fn by_name<'a, T>(items: &'a [T], key: impl Fn(&T) -> &String) -> BTreeMap<&'a str, &'a T> {
    items.iter().map(|item| (key(item).as_str(), item)).collect()
}

fn diff_decls<T: PartialEq>(
    what: &str,
    old: &BTreeMap<&str, &T>,
    new: &BTreeMap<&str, &T>,
    findings: &mut Findings,
) {
    for (name, old_decl) in old {
        match new.get(name) {
            None => findings
                .incompatible
                .push(format!("{} `{}` was removed", what, name)),
            Some(new_decl) if new_decl != old_decl => findings
                .incompatible
                .push(format!("{} `{}` changed its signature", what, name)),
            Some(_) => {}
        }
    }
    for name in new.keys().filter(|n| !old.contains_key(*n)) {
        findings
            .extensions
            .push(format!("{} `{}` was added", what, name));
    }
}

fn record_layout_changed(old: &RecordType, new: &RecordType, options: &DiffOptions) -> bool {
    if old.is_opaque != new.is_opaque {
        return options.consider_opaque_types_different;
    }
    if old.is_opaque {
        return false;
    }
    old.size != new.size || old.fields != new.fields
}

fn diff_records(old: &AbiDump, new: &AbiDump, options: &DiffOptions, findings: &mut Findings) {
    let referenced: BTreeSet<String> = old
        .referenced_types()
        .into_iter()
        .chain(new.referenced_types())
        .collect();
    let tolerated = |name: &str| !referenced.contains(name) && options.allow_unreferenced_changes;

    let old_records = by_name(&old.record_types, |r| &r.name);
    let new_records = by_name(&new.record_types, |r| &r.name);

    for (name, old_record) in &old_records {
        if tolerated(name) {
            continue;
        }
        match new_records.get(name) {
            None => findings
                .incompatible
                .push(format!("record type `{}` was removed", name)),
            Some(new_record) => {
                if record_layout_changed(old_record, new_record, options) {
                    findings
                        .incompatible
                        .push(format!("record type `{}` changed its layout", name));
                }
            }
        }
    }
    for name in new_records.keys().filter(|n| !old_records.contains_key(*n)) {
        if !tolerated(name) {
            findings
                .extensions
                .push(format!("record type `{}` was added", name));
        }
    }
}

fn diff_elf_symbols(
    old: &[ElfSymbol],
    new: &[ElfSymbol],
    declared: &BTreeSet<&str>,
    options: &DiffOptions,
    findings: &mut Findings,
) {
    let old = by_name(old, |s| &s.name);
    let new = by_name(new, |s| &s.name);

    // Symbols with a declaration are reported through the declaration
    let elf_only = |name: &str| !declared.contains(name);
    let tolerated = |symbol: &ElfSymbol| {
        options.allow_unreferenced_elf_symbol_changes
            || (symbol.is_weak() && options.allow_adding_removing_weak_symbols)
    };

    for (name, symbol) in &old {
        if !new.contains_key(name) && elf_only(name) && !tolerated(symbol) {
            findings
                .incompatible
                .push(format!("ELF symbol `{}` was removed", name));
        }
    }
    for (name, symbol) in &new {
        if !old.contains_key(name) && elf_only(name) && !tolerated(symbol) {
            findings
                .extensions
                .push(format!("ELF symbol `{}` was added", name));
        }
    }
}
