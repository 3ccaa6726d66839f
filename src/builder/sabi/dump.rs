//! ABI dump model and the dump link step.
//!
//! Compiling a source file produces a `.sdump` fragment describing the
//! declarations it saw; linking merges a variant's fragments into one
//! `.lsdump`, keeping only what the library actually exports.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::builder::stubgen::SymbolFile;
use crate::util::fs::{read_to_string, write_string};

/// Extension of per-object dump fragments.
pub const FRAGMENT_EXTENSION: &str = "sdump";

/// An ELF symbol exported by the shared object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElfSymbol {
    pub name: String,
    /// `global` or `weak`
    pub binding: String,
}

impl ElfSymbol {
    pub fn is_weak(&self) -> bool {
        self.binding == "weak"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionDecl {
    /// Linker name
    pub name: String,
    pub return_type: String,
    pub parameters: Vec<String>,
    /// Header the declaration came from
    pub source_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalVarDecl {
    pub name: String,
    pub type_name: String,
    pub source_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordField {
    pub name: String,
    pub type_name: String,
    /// Offset in bits
    pub offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordType {
    pub name: String,
    pub size: u64,
    pub fields: Vec<RecordField>,
    /// Only forward-declared in the exported headers
    pub is_opaque: bool,
    pub source_file: String,
}

/// A linked (or fragment) ABI dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbiDump {
    pub elf_functions: Vec<ElfSymbol>,
    pub elf_objects: Vec<ElfSymbol>,
    pub functions: Vec<FunctionDecl>,
    pub global_vars: Vec<GlobalVarDecl>,
    pub record_types: Vec<RecordType>,
}

impl AbiDump {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read_to_string(path)?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse ABI dump: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        write_string(path, &(contents + "\n"))
    }

    /// Append another dump's contents.
    pub fn merge(&mut self, other: AbiDump) {
        self.elf_functions.extend(other.elf_functions);
        self.elf_objects.extend(other.elf_objects);
        self.functions.extend(other.functions);
        self.global_vars.extend(other.global_vars);
        self.record_types.extend(other.record_types);
    }

    /// Sort every list by name and drop repeated names.
    pub fn normalize(&mut self) {
        fn sort_dedup<T>(items: &mut Vec<T>, key: impl Fn(&T) -> &str) {
            items.sort_by(|a, b| key(a).cmp(key(b)));
            items.dedup_by(|a, b| key(a) == key(b));
        }
        sort_dedup(&mut self.elf_functions, |s| &s.name);
        sort_dedup(&mut self.elf_objects, |s| &s.name);
        sort_dedup(&mut self.functions, |f| &f.name);
        sort_dedup(&mut self.global_vars, |v| &v.name);
        sort_dedup(&mut self.record_types, |r| &r.name);
    }

    /// Record types reachable from exported functions and variables.
    pub fn referenced_types(&self) -> BTreeSet<String> {
        let records: BTreeMap<&str, &RecordType> = self
            .record_types
            .iter()
            .map(|r| (r.name.as_str(), r))
            .collect();

        let mut stack: Vec<String> = self
            .functions
            .iter()
            .flat_map(|f| std::iter::once(&f.return_type).chain(&f.parameters))
            .chain(self.global_vars.iter().map(|v| &v.type_name))
            .map(|t| base_type_name(t).to_string())
            .collect();

        let mut seen = BTreeSet::new();
        while let Some(name) = stack.pop() {
            if !records.contains_key(name.as_str()) || !seen.insert(name.clone()) {
                continue;
            }
            if let Some(record) = records.get(name.as_str()) {
                stack.extend(
                    record
                        .fields
                        .iter()
                        .map(|f| base_type_name(&f.type_name).to_string()),
                );
            }
        }
        seen
    }

    fn retain_from_headers(&mut self, include_dirs: &[PathBuf]) {
        let exported = |source: &str| {
            let source = Path::new(source);
            include_dirs.iter().any(|dir| source.starts_with(dir))
        };
        self.functions.retain(|f| exported(&f.source_file));
        self.global_vars.retain(|v| exported(&v.source_file));
        self.record_types.retain(|r| exported(&r.source_file));
    }

    fn retain_symbols(&mut self, allowed: &BTreeSet<String>) {
        self.elf_functions.retain(|s| allowed.contains(&s.name));
        self.elf_objects.retain(|s| allowed.contains(&s.name));
        self.functions.retain(|f| allowed.contains(&f.name));
        self.global_vars.retain(|v| allowed.contains(&v.name));
    }
}

/// Strip qualifiers and indirection: `const struct foo *` is `foo`.
pub fn base_type_name(type_name: &str) -> &str {
    type_name
        .split(|c: char| c == '*' || c == '&' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .find(|t| !matches!(*t, "const" | "volatile" | "struct" | "union" | "enum"))
        .unwrap_or("")
}

/// Inputs of the dump link step.
#[derive(Debug, Clone, Default)]
pub struct LinkDumpRequest {
    /// Compiled `.sdump` fragments
    pub fragments: Vec<PathBuf>,
    /// Exported include directories, own and re-exported
    pub include_dirs: Vec<PathBuf>,
    /// Restricts exported symbols when set
    pub symbol_file: Option<PathBuf>,
    /// Version nodes to drop (glob patterns)
    pub exclude_symbol_versions: Vec<String>,
    /// Symbol tags to drop
    pub exclude_symbol_tags: Vec<String>,
    /// Architecture for arch-tagged symbols
    pub arch: String,
    pub output: PathBuf,
}

/// Symbols a symbol file exports for ABI purposes.
///
/// Unlike stub generation this ignores API levels: the dump describes the
/// whole surface the source tree implements.
pub fn exported_symbols(
    file: &SymbolFile,
    arch: &str,
    exclude_versions: &[String],
    exclude_tags: &[String],
) -> Result<BTreeSet<String>> {
    let patterns = exclude_versions
        .iter()
        .map(|p| Pattern::new(p).with_context(|| format!("invalid version pattern `{}`", p)))
        .collect::<Result<Vec<_>>>()?;

    let symbols = file
        .versions
        .iter()
        .filter(|v| !patterns.iter().any(|p| p.matches(&v.name)))
        .flat_map(|v| v.symbols.iter())
        .filter(|s| !exclude_tags.iter().any(|t| s.tags.has(t)))
        .filter(|s| {
            let arches = s.tags.arches();
            arches.is_empty() || arches.contains(&arch)
        })
        .map(|s| s.name.clone())
        .collect();
    Ok(symbols)
}

/// Merge fragments into one linked dump and write it.
pub fn link_dump(request: &LinkDumpRequest) -> Result<AbiDump> {
    let mut dump = AbiDump::default();
    for fragment in &request.fragments {
        dump.merge(AbiDump::load(fragment)?);
    }

    dump.retain_from_headers(&request.include_dirs);

    if let Some(symbol_file) = &request.symbol_file {
        let file = SymbolFile::load(symbol_file)?;
        let allowed = exported_symbols(
            &file,
            &request.arch,
            &request.exclude_symbol_versions,
            &request.exclude_symbol_tags,
        )?;
        dump.retain_symbols(&allowed);
    }

    dump.normalize();
    dump.save(&request.output)?;
    tracing::debug!(
        "linked {} fragment(s) into {}",
        request.fragments.len(),
        request.output.display()
    );
    Ok(dump)
}
