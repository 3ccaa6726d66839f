//! abiwright - variant expansion, stub generation and ABI checking for
//! native libraries
//!
//! This crate provides the core library functionality for abiwright,
//! including variant expansion, stub surface generation, cross-module
//! linking and ABI dump diffing.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities for abiwright unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides symbol maps, manifests and ABI dumps
/// shared across the unit tests.
#[cfg(test)]
pub mod test_support;

pub use core::{
    api_level::ApiLevel, library::LibraryConfig, manifest::Manifest, variant::Variant,
    variant::VariantKind,
};

pub use builder::expansion::VariantGraph;
pub use util::context::GlobalContext;
