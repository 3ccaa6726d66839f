//! Variant build pipeline.
//!
//! Expansion turns a library declaration into its variant graph, stub
//! generation and linking finalize each variant, and `sabi` links and
//! diffs ABI dumps for the shared implementations.

pub mod expansion;
pub mod link;
pub mod macros;
pub mod sabi;
pub mod stubgen;

pub use expansion::{expand, DepTag, VariantGraph};
pub use link::{link_variant, LinkContext, LinkedVariant};
pub use macros::{versioning_macro_name, StubVersionsCache, VersioningMacroRegistry};
pub use sabi::{AbiTool, BuiltinAbiTool};
pub use stubgen::{StubFilter, StubSurface};
