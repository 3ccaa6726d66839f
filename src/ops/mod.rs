//! High-level operations.
//!
//! This module contains the implementation of abiwright commands.

pub mod abi_check;
pub mod expand;
pub mod link;
pub mod stubs;
pub mod update_refs;

pub use abi_check::{abi_check, AbiCheckOptions, AbiCheckReport};
pub use expand::{expand_manifest, ExpandOptions, Expansion};
pub use link::{link_all, link_order, LinkOutcome, LinkedModule};
pub use stubs::{generate_stubs, StubsOptions, StubsResult};
pub use update_refs::{update_refs, UpdateRefsOptions, UpdatedRef};
