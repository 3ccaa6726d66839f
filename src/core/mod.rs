//! Core data structures for abiwright.
//!
//! This module contains the foundational types used throughout abiwright:
//! - API levels and stub version lists
//! - Library declarations and the manifest that holds them
//! - Variants derived from a declaration
//! - The flag exporter that publishes a variant's interface

pub mod api_level;
pub mod errors;
pub mod exporter;
pub mod library;
pub mod manifest;
pub mod variant;

pub use api_level::{ApiLevel, ApiLevelError};
pub use errors::{ConfigError, ExportError, MacroConflictError, ModuleError, SymbolFileError};
pub use exporter::{ExportedFlags, FlagExporter};
pub use library::{LibraryConfig, Partition};
pub use manifest::{find_manifest, Manifest, MANIFEST_NAME};
pub use variant::{Variant, VariantKind};
