//! Test fixtures for common test scenarios.
//!
//! Pre-built symbol maps, manifests and ABI dumps shared by the unit
//! tests of the expansion, stub, link and ABI layers.

use std::path::{Path, PathBuf};

use proptest::prelude::*;
use tempfile::TempDir;

use crate::builder::sabi::dump::{
    AbiDump, ElfSymbol, FunctionDecl, RecordField, RecordType, FRAGMENT_EXTENSION,
};
use crate::core::api_level::ApiLevel;
use crate::core::library::{LibraryConfig, LinkageProps};
use crate::core::manifest::{Manifest, MANIFEST_NAME};
use crate::core::variant::{Variant, VariantKind};
use crate::util::config::PlatformConfig;

/// Symbol map of `libfoo`.
///
/// - `LIBFOO` (29): `foo_open`, weak `foo_close`, variable `foo_flags`,
///   systemapi-only `foo_debug`, and `foo_new` from 30 on arm64 only
/// - `LIBFOO_31` (31): `foo_stream`
/// - `LIBFOO_PRIVATE`: `foo_internal`, never in a stub
pub const LIBFOO_MAP: &str = "\
LIBFOO { # introduced=29
  global:
    foo_open;
    foo_close; # weak
    foo_flags; # var
    foo_debug; # systemapi
    foo_new; # introduced=30 arm64
  local:
    *;
};

LIBFOO_31 { # introduced=31
  global:
    foo_stream;
} LIBFOO;

LIBFOO_PRIVATE {
  global:
    foo_internal;
} LIBFOO;
";

/// `libfoo` with NDK stubs at 29 and 30, and `libapp` linking against
/// the 29 stub and re-exporting its headers.
pub const TWO_LIBRARY_MANIFEST: &str = r#"
[[library]]
name = "libfoo"
srcs = ["foo.c"]
ndk = true
export_include_dirs = ["include"]

[library.stubs]
symbol_file = "libfoo.map.txt"
versions = ["29", "30"]

[[library]]
name = "libapp"
srcs = ["app.c"]
shared_libs = ["libfoo#29"]
export_shared_lib_headers = ["libfoo"]
"#;

/// Write `contents` as the manifest of a fresh directory, next to
/// `libfoo.map.txt`.
pub fn manifest_dir(contents: &str) -> (TempDir, Manifest) {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("libfoo.map.txt"), LIBFOO_MAP).unwrap();
    let path = tmp.path().join(MANIFEST_NAME);
    std::fs::write(&path, contents).unwrap();
    let manifest = Manifest::load(&path).unwrap();
    (tmp, manifest)
}

/// A library with stubs at `versions`, read from `<name>.map.txt`.
pub fn library_with_stubs(name: &str, versions: &[&str]) -> LibraryConfig {
    LibraryConfig::new(name).with_stubs(format!("{}.map.txt", name), versions)
}

/// A bare variant of `module`.
pub fn stub_variant(module: &str, kind: VariantKind, version: Option<ApiLevel>) -> Variant {
    let mut variant = Variant::new(module, kind);
    variant.version = version;
    variant
}

fn function(name: &str, return_type: &str, parameters: &[&str]) -> FunctionDecl {
    FunctionDecl {
        name: name.to_string(),
        return_type: return_type.to_string(),
        parameters: parameters.iter().map(|p| p.to_string()).collect(),
        source_file: "include/foo.h".to_string(),
    }
}

fn record(name: &str, size: u64, fields: &[(&str, &str)], source_file: &str) -> RecordType {
    RecordType {
        name: name.to_string(),
        size,
        fields: fields
            .iter()
            .enumerate()
            .map(|(i, (name, type_name))| RecordField {
                name: name.to_string(),
                type_name: type_name.to_string(),
                offset: i as u64 * 64,
            })
            .collect(),
        is_opaque: false,
        source_file: source_file.to_string(),
    }
}

/// ABI dump of a small `libfoo`.
///
/// `foo_ctx` and `foo_opts` are reachable from the exported functions;
/// `foo_private` is not.
pub fn sample_dump() -> AbiDump {
    AbiDump {
        elf_functions: ["foo_open", "foo_close"]
            .iter()
            .map(|name| ElfSymbol {
                name: name.to_string(),
                binding: "global".to_string(),
            })
            .collect(),
        elf_objects: Vec::new(),
        functions: vec![
            function("foo_open", "struct foo_ctx *", &["const char *"]),
            function("foo_close", "void", &["struct foo_ctx *"]),
        ],
        global_vars: Vec::new(),
        record_types: vec![
            record("foo_ctx", 64, &[("opts", "struct foo_opts")], "include/foo.h"),
            record("foo_opts", 32, &[], "include/foo.h"),
            record("foo_private", 32, &[], "src/private.h"),
        ],
    }
}

/// Save `dump` as `<dir>/<name>.sdump`.
pub fn write_fragment(dir: &Path, name: &str, dump: &AbiDump) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{}.{}", name, FRAGMENT_EXTENSION));
    dump.save(&path).unwrap();
    path
}

/// Save `dump` where a reference directory keeps the dump of `file_name`.
pub fn write_reference_dump(
    dir: &Path,
    platform: &PlatformConfig,
    file_name: &str,
    dump: &AbiDump,
) -> PathBuf {
    let path = dir
        .join(platform.arch_dir_name())
        .join("source-based")
        .join(format!("{}.lsdump", file_name));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    dump.save(&path).unwrap();
    path
}

fn linkage_props(
    srcs: Vec<&str>,
    cflags: Vec<&str>,
    system_shared_libs: Option<Vec<&str>>,
) -> LinkageProps {
    let owned = |items: Vec<&str>| items.into_iter().map(str::to_string).collect::<Vec<_>>();
    LinkageProps {
        srcs: owned(srcs),
        cflags: owned(cflags),
        system_shared_libs: system_shared_libs.map(owned),
        ..LinkageProps::default()
    }
}

/// Static and shared stanzas, and whether they compile the same objects.
///
/// Half the cases mirror the static stanza into the shared one.
pub fn linkage_props_strategy() -> impl Strategy<Value = (LinkageProps, LinkageProps, bool)> {
    let srcs = || prop::collection::vec(prop::sample::select(vec!["a.c", "b.c"]), 0..3);
    let cflags = || prop::collection::vec(prop::sample::select(vec!["-DA", "-DB", "-O2"]), 0..3);
    let system = || prop::option::of(prop::collection::vec(Just("libc"), 0..2));

    (
        (srcs(), cflags(), system()),
        (srcs(), cflags(), system()),
        any::<bool>(),
    )
        .prop_map(|(a, b, mirror)| {
            let static_props = linkage_props(a.0, a.1, a.2);
            let shared_props = if mirror {
                static_props.clone()
            } else {
                linkage_props(b.0, b.1, b.2)
            };
            let same = static_props.srcs == shared_props.srcs
                && static_props.cflags == shared_props.cflags
                && static_props.system_shared_libs == shared_props.system_shared_libs;
            (static_props, shared_props, same)
        })
}
