//! Symbol map file parser.
//!
//! A symbol map is a linker version script annotated with tags:
//!
//! ```text
//! LIBFOO { # introduced=29
//!   global:
//!     foo_open;
//!     foo_flags; # var
//!     foo_debug; # systemapi
//!     foo_new; # introduced=30 arm64
//!   local:
//!     *;
//! };
//!
//! LIBFOO_31 { # introduced=31
//!   global:
//!     foo_stream;
//! } LIBFOO;
//! ```
//!
//! Only the `global:` section matters for stubs; `local:` entries are
//! accepted and ignored.

use std::path::{Path, PathBuf};

use crate::core::errors::SymbolFileError;
use crate::core::library::SYMBOL_FILE_SUFFIX;

/// Architectures a tag can restrict a symbol to.
pub const ARCHES: &[&str] = &["arm", "arm64", "riscv64", "x86", "x86_64"];

/// Tags that restrict a symbol to a non-public surface.
const MODE_TAGS: &[&str] = &["apex", "systemapi", "llndk"];

/// Tags attached to a version node or symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(Vec<String>);

impl Tags {
    /// Parse the text after a `#`.
    pub fn parse(comment: &str) -> Self {
        Tags(comment.split_whitespace().map(str::to_string).collect())
    }

    pub fn has(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether any tag restricts the symbol to apex, systemapi or llndk users.
    pub fn has_mode_tags(&self) -> bool {
        MODE_TAGS.iter().any(|t| self.has(t))
    }

    /// Architecture tags; empty means every architecture.
    pub fn arches(&self) -> Vec<&str> {
        self.iter().filter(|t| ARCHES.contains(t)).collect()
    }

    /// Raw `introduced` level for `arch`.
    ///
    /// `introduced-<arch>=` wins over a plain `introduced=`.
    pub fn introduced(&self, arch: &str) -> Option<&str> {
        let arch_key = format!("introduced-{}=", arch);
        self.iter()
            .find_map(|t| t.strip_prefix(arch_key.as_str()))
            .or_else(|| self.iter().find_map(|t| t.strip_prefix("introduced=")))
    }
}

/// One exported symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub tags: Tags,
    /// 1-based line in the map file
    pub line: usize,
}

impl Symbol {
    pub fn is_variable(&self) -> bool {
        self.tags.has("var")
    }

    pub fn is_weak(&self) -> bool {
        self.tags.has("weak")
    }
}

/// A version node, e.g. `LIBFOO_31 { ... } LIBFOO;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNode {
    pub name: String,
    /// Node this one inherits from
    pub base: Option<String>,
    pub tags: Tags,
    pub symbols: Vec<Symbol>,
    pub line: usize,
}

impl VersionNode {
    /// Private and platform-only nodes never reach a stub.
    pub fn is_private(&self) -> bool {
        self.name.ends_with("_PRIVATE") || self.name.ends_with("_PLATFORM")
    }
}

/// A parsed symbol map file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFile {
    pub path: PathBuf,
    pub versions: Vec<VersionNode>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Global,
    Local,
}

impl SymbolFile {
    /// Read and parse a map file.
    pub fn load(path: &Path) -> Result<Self, SymbolFileError> {
        if !path.to_string_lossy().ends_with(SYMBOL_FILE_SUFFIX) {
            return Err(SymbolFileError::BadSuffix {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| SymbolFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse map file contents; `path` is only used in errors.
    pub fn parse(content: &str, path: &Path) -> Result<Self, SymbolFileError> {
        let syntax = |line: usize, message: String| SymbolFileError::Syntax {
            path: path.to_path_buf(),
            line,
            message,
        };

        let mut versions = Vec::new();
        let mut current: Option<(VersionNode, Section)> = None;

        for (index, raw) in content.lines().enumerate() {
            let line_no = index + 1;
            let (code, comment) = match raw.split_once('#') {
                Some((code, comment)) => (code.trim(), Some(comment)),
                None => (raw.trim(), None),
            };
            if code.is_empty() {
                continue;
            }

            let mut closed = false;
            match current.as_mut() {
                None => {
                    let name = code
                        .strip_suffix('{')
                        .map(str::trim)
                        .filter(|n| is_identifier(n))
                        .ok_or_else(|| {
                            syntax(line_no, format!("expected `NAME {{`, found `{}`", code))
                        })?;
                    let node = VersionNode {
                        name: name.to_string(),
                        base: None,
                        tags: comment.map(Tags::parse).unwrap_or_default(),
                        symbols: Vec::new(),
                        line: line_no,
                    };
                    current = Some((node, Section::Global));
                }
                Some((node, section)) => match code {
                    "global:" => *section = Section::Global,
                    "local:" => *section = Section::Local,
                    _ if code.starts_with('}') => {
                        let rest = code[1..].trim();
                        let base = rest.strip_suffix(';').map(str::trim).ok_or_else(|| {
                            syntax(line_no, "version block must end with `};`".to_string())
                        })?;
                        if !base.is_empty() {
                            if !is_identifier(base) {
                                return Err(syntax(
                                    line_no,
                                    format!("invalid parent version `{}`", base),
                                ));
                            }
                            node.base = Some(base.to_string());
                        }
                        closed = true;
                    }
                    _ => {
                        let name = code.strip_suffix(';').map(str::trim).ok_or_else(|| {
                            syntax(line_no, format!("missing `;` after `{}`", code))
                        })?;
                        if *section == Section::Local {
                            continue;
                        }
                        if !is_symbol_name(name) {
                            return Err(syntax(line_no, format!("invalid symbol name `{}`", name)));
                        }
                        node.symbols.push(Symbol {
                            name: name.to_string(),
                            tags: comment.map(Tags::parse).unwrap_or_default(),
                            line: line_no,
                        });
                    }
                },
            }

            if closed {
                if let Some((node, _)) = current.take() {
                    versions.push(node);
                }
            }
        }

        if let Some((node, _)) = current {
            return Err(syntax(
                node.line,
                format!("version block `{}` is never closed", node.name),
            ));
        }

        Ok(SymbolFile {
            path: path.to_path_buf(),
            versions,
        })
    }

    /// Every global symbol, in file order.
    pub fn symbols(&self) -> impl Iterator<Item = (&VersionNode, &Symbol)> {
        self.versions
            .iter()
            .flat_map(|v| v.symbols.iter().map(move |s| (v, s)))
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_symbol_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures::LIBFOO_MAP;
    use pretty_assertions::assert_eq;

    fn parse(content: &str) -> Result<SymbolFile, SymbolFileError> {
        SymbolFile::parse(content, Path::new("libfoo.map.txt"))
    }

    #[test]
    fn test_parse_versions_and_tags() {
        let file = parse(LIBFOO_MAP).unwrap();
        let names: Vec<_> = file.versions.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["LIBFOO", "LIBFOO_31", "LIBFOO_PRIVATE"]);

        let base = &file.versions[0];
        assert_eq!(base.tags.introduced("arm64"), Some("29"));
        assert!(base.base.is_none());
        assert_eq!(file.versions[1].base.as_deref(), Some("LIBFOO"));
        assert!(file.versions[2].is_private());

        let flags = base.symbols.iter().find(|s| s.name == "foo_flags").unwrap();
        assert!(flags.is_variable());
        let debug = base.symbols.iter().find(|s| s.name == "foo_debug").unwrap();
        assert!(debug.tags.has_mode_tags());
    }

    #[test]
    fn test_local_section_ignored() {
        let file = parse("V1 {\n  global:\n    a;\n  local:\n    *;\n};\n").unwrap();
        assert_eq!(file.symbols().count(), 1);
    }

    #[test]
    fn test_arch_specific_introduced() {
        let tags = Tags::parse(" introduced=29 introduced-arm=30 arm arm64");
        assert_eq!(tags.introduced("arm"), Some("30"));
        assert_eq!(tags.introduced("arm64"), Some("29"));
        assert_eq!(tags.arches(), vec!["arm", "arm64"]);
    }

    #[test]
    fn test_syntax_errors_carry_line() {
        let err = parse("V1 {\n  global:\n    a\n};\n").unwrap_err();
        match err {
            SymbolFileError::Syntax { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }

        let err = parse("V1 {\n  a;\n").unwrap_err();
        assert!(err.to_string().contains("never closed"));

        assert!(parse("not a block\n").is_err());
    }

    #[test]
    fn test_load_rejects_bad_suffix() {
        let err = SymbolFile::load(Path::new("libfoo.txt")).unwrap_err();
        assert!(matches!(err, SymbolFileError::BadSuffix { .. }));
    }
}
