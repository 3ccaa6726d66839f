//! Error types for module processing.
//!
//! Configuration errors abort processing of the offending module only;
//! callers collect them per module and keep going.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// A module property holds a value that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
#[error("module `{module}`: property `{property}`: {reason}")]
#[diagnostic(code(abiwright::config::invalid_property))]
pub struct ConfigError {
    pub module: String,
    /// Dotted property path, e.g. `stubs.versions`
    pub property: String,
    /// The offending value as written
    pub value: String,
    pub reason: String,
    #[help]
    pub help: Option<String>,
}

impl ConfigError {
    pub fn new(
        module: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError {
            module: module.into(),
            property: property.into(),
            value: value.into(),
            reason: reason.into(),
            help: None,
        }
    }

    /// Attach a help line.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(format!(
            "invalid `{}` in module `{}`",
            self.property, self.module
        ))
        .with_context(self.reason.clone());

        if !self.value.is_empty() {
            diag = diag.with_context(format!("value: {}", self.value));
        }
        if let Some(help) = &self.help {
            diag = diag.with_suggestion(help.trim_start_matches("help: ").to_string());
        }
        diag
    }
}

/// Two modules derive the same versioning macro name.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
#[error(
    "module `{module}`: macro name `{macro_name}` for versioning conflicts with macro name from module `{existing}`"
)]
#[diagnostic(
    code(abiwright::config::macro_conflict),
    help("Rename one of the modules so their names differ in more than punctuation")
)]
pub struct MacroConflictError {
    pub macro_name: String,
    /// Module that tried to register the name
    pub module: String,
    /// Module that registered it first
    pub existing: String,
}

impl MacroConflictError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(format!(
            "versioning macro `{}` is claimed by two modules",
            self.macro_name
        ))
        .with_context(format!("`{}` registered it first", self.existing))
        .with_context(format!("`{}` derives the same name", self.module))
        .with_suggestion(suggestions::MACRO_CONFLICT.trim_start_matches("help: "))
    }
}

/// A symbol map file is missing, misnamed, or malformed.
#[derive(Debug, Error)]
pub enum SymbolFileError {
    #[error("symbol file `{}` must end in `.map.txt`", path.display())]
    BadSuffix { path: PathBuf },

    #[error("failed to read symbol file `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Misuse of the flag exporter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error(
        "exporting invalid flag `{flag}`: use reexport_dirs or reexport_system_dirs to export directories"
    )]
    IncludeFlag { flag: String },
}

/// Anything that aborts processing of a single module.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ModuleError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    MacroConflict(#[from] MacroConflictError),

    #[error("module `{module}`: {source}")]
    #[diagnostic(code(abiwright::config::symbol_file))]
    SymbolFile {
        module: String,
        #[source]
        source: SymbolFileError,
    },

    #[error("module `{module}`: {source}")]
    #[diagnostic(code(abiwright::config::export))]
    Export {
        module: String,
        #[source]
        source: ExportError,
    },
}

impl ModuleError {
    /// Name of the module that failed.
    pub fn module(&self) -> &str {
        match self {
            ModuleError::Config(e) => &e.module,
            ModuleError::MacroConflict(e) => &e.module,
            ModuleError::SymbolFile { module, .. } | ModuleError::Export { module, .. } => module,
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ModuleError::Config(e) => e.to_diagnostic(),
            ModuleError::MacroConflict(e) => e.to_diagnostic(),
            ModuleError::SymbolFile { module, source } => {
                let mut diag = Diagnostic::error(format!("bad symbol file in module `{}`", module))
                    .with_context(source.to_string());
                if let SymbolFileError::BadSuffix { path } = source {
                    diag = diag
                        .with_location(path.clone())
                        .with_suggestion(suggestions::SYMBOL_FILE_SUFFIX.trim_start_matches("help: "));
                }
                diag
            }
            ModuleError::Export { module, source } => {
                Diagnostic::error(format!("module `{}` exports an include path as a raw flag", module))
                    .with_context(source.to_string())
            }
        }
    }
}
