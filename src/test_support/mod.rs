//! Test utilities for abiwright unit tests.
//!
//! Fixtures cover the shapes most tests need: a small symbol map, a
//! two-library manifest on disk, and ABI dumps laid out the way the
//! dump link and diff steps expect to find them.
//!
//! # Example
//!
//! ```rust,ignore
//! use abiwright::test_support::{manifest_dir, TWO_LIBRARY_MANIFEST};
//!
//! #[test]
//! fn test_example() {
//!     let (tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
//!     assert!(manifest.library("libfoo").is_some());
//!     // `tmp` keeps the directory alive for the rest of the test
//! }
//! ```

pub mod fixtures;

// Re-export fixtures for convenience
pub use fixtures::*;

/// Owned strings from string literals.
pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::variant::VariantKind;

    #[test]
    fn test_manifest_dir_writes_symbol_map() {
        let (tmp, manifest) = manifest_dir(TWO_LIBRARY_MANIFEST);
        assert_eq!(manifest.root(), tmp.path());
        assert!(tmp.path().join("libfoo.map.txt").is_file());
        assert_eq!(manifest.libraries().len(), 2);
    }

    #[test]
    fn test_reference_dump_layout() {
        let tmp = tempfile::TempDir::new().unwrap();
        let platform = crate::util::config::PlatformConfig::default();
        let path = write_reference_dump(tmp.path(), &platform, "libfoo.so", &sample_dump());
        assert_eq!(path, tmp.path().join("arm64/source-based/libfoo.so.lsdump"));
    }

    #[test]
    fn test_stub_variant_name() {
        let variant = stub_variant(
            "libfoo",
            VariantKind::Stub,
            Some(crate::core::api_level::ApiLevel::final_level(29)),
        );
        assert_eq!(variant.name(), "stub_29");
        assert_eq!(strings(&["a"]), vec!["a".to_string()]);
    }
}
