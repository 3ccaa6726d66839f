//! Versioning macros and the shared state expansion writes to.
//!
//! Building against `libfoo` stub version 29 defines `__LIBFOO_API__=29`
//! so headers can hide newer APIs. Two modules deriving the same macro
//! would silently shadow each other, so every stub-bearing module claims
//! its macro in a registry that lives for the whole run.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use crate::core::api_level::ApiLevel;
use crate::core::errors::MacroConflictError;

/// Canonical versioning macro name for a module.
///
/// Runs of characters other than ASCII letters, digits and `_` become a
/// single `_`; the result is upper-cased and wrapped as `__NAME_API__`.
pub fn versioning_macro_name(module: &str) -> String {
    let mut sanitized = String::with_capacity(module.len());
    let mut in_run = false;
    for c in module.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            sanitized.push(c.to_ascii_uppercase());
            in_run = false;
        } else if !in_run {
            sanitized.push('_');
            in_run = true;
        }
    }
    format!("__{}_API__", sanitized)
}

/// Process-wide mapping from macro name to the module that owns it.
#[derive(Debug, Default)]
pub struct VersioningMacroRegistry {
    owners: Mutex<HashMap<String, String>>,
}

impl VersioningMacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the versioning macro for `module`.
    ///
    /// Registering the same module again is a no-op; a different module
    /// deriving the same name is a conflict.
    pub fn register(&self, module: &str) -> Result<String, MacroConflictError> {
        let macro_name = versioning_macro_name(module);
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);

        match owners.get(&macro_name) {
            Some(existing) if existing != module => Err(MacroConflictError {
                macro_name,
                module: module.to_string(),
                existing: existing.clone(),
            }),
            Some(_) => Ok(macro_name),
            None => {
                tracing::debug!("{} claims versioning macro {}", module, macro_name);
                owners.insert(macro_name.clone(), module.to_string());
                Ok(macro_name)
            }
        }
    }

    /// Module that owns a macro, if any.
    pub fn owner(&self, macro_name: &str) -> Option<String> {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(macro_name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every registration.
    pub fn reset(&self) {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Normalized stub versions of every module expanded so far.
///
/// Lets a module that pins `libfoo#29` check the pin before (or while)
/// `libfoo` itself finishes expanding.
#[derive(Debug, Default)]
pub struct StubVersionsCache {
    versions: RwLock<HashMap<String, Vec<ApiLevel>>>,
}

impl StubVersionsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, module: &str, versions: Vec<ApiLevel>) {
        self.versions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.to_string(), versions);
    }

    /// Stub versions of `module`; empty if it has none.
    pub fn get(&self, module: &str) -> Vec<ApiLevel> {
        self.versions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module)
            .cloned()
            .unwrap_or_default()
    }

    /// Highest stub version of `module`.
    pub fn latest(&self, module: &str) -> Option<ApiLevel> {
        self.get(module).pop()
    }

    pub fn reset(&self) {
        self.versions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_macro_name() {
        assert_eq!(versioning_macro_name("libfoo"), "__LIBFOO_API__");
        assert_eq!(versioning_macro_name("libc++"), "__LIBC__API__");
        assert_eq!(versioning_macro_name("lib.foo-bar"), "__LIB_FOO_BAR_API__");
        assert_eq!(versioning_macro_name("lib--foo"), "__LIB_FOO_API__");
    }

    #[test]
    fn test_register_same_module_twice() {
        let registry = VersioningMacroRegistry::new();
        assert_eq!(registry.register("libfoo").unwrap(), "__LIBFOO_API__");
        assert_eq!(registry.register("libfoo").unwrap(), "__LIBFOO_API__");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_conflict() {
        let registry = VersioningMacroRegistry::new();
        registry.register("lib-foo").unwrap();
        let err = registry.register("lib.foo").unwrap_err();
        assert_eq!(err.existing, "lib-foo");
        assert_eq!(err.module, "lib.foo");
        assert_eq!(registry.owner("__LIB_FOO_API__").as_deref(), Some("lib-foo"));
    }

    #[test]
    fn test_reset() {
        let registry = VersioningMacroRegistry::new();
        registry.register("lib-foo").unwrap();
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.register("lib.foo").is_ok());
    }

    #[test]
    fn test_concurrent_registration_has_one_owner() {
        let registry = Arc::new(VersioningMacroRegistry::new());
        let handles: Vec<_> = ["lib-foo", "lib.foo", "lib_foo", "lib+foo"]
            .into_iter()
            .map(|name| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register(name).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn test_stub_versions_cache() {
        let cache = StubVersionsCache::new();
        assert!(cache.get("libfoo").is_empty());

        cache.insert("libfoo", vec![ApiLevel::final_level(29), ApiLevel::future()]);
        assert_eq!(cache.get("libfoo").len(), 2);
        assert!(cache.latest("libfoo").unwrap().is_future());

        cache.reset();
        assert!(cache.latest("libfoo").is_none());
    }

    proptest! {
        #[test]
        fn prop_macro_name_is_stable(name in "[a-zA-Z0-9_.+-]{1,24}") {
            let first = versioning_macro_name(&name);
            prop_assert_eq!(&first, &versioning_macro_name(&name));
            prop_assert!(first.starts_with("__") && first.ends_with("_API__"));
            prop_assert!(first.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'));
        }

        #[test]
        fn prop_distinct_names_with_same_macro_conflict(a in "lib[a-z]{1,8}", sep in "[.+-]") {
            let b = a.replacen("lib", &format!("lib{}", sep), 1);
            let c = a.replacen("lib", "lib_", 1);
            let registry = VersioningMacroRegistry::new();
            prop_assert!(registry.register(&b).is_ok());
            prop_assert!(registry.register(&c).is_err());
        }
    }
}
