//! The sm83 linker (spec.md §4.7): merges assembled object files, places
//! their sections into a configured memory map, resolves relocations, and
//! writes the final ROM image.
//!
//! [`main`](../../smold/index.html) is a thin CLI shell over
//! [`link::link`]; integration tests and other tools can drive the
//! linker directly through this library instead.

pub mod cfg;
pub mod error;
pub mod link;
pub mod symfile;
pub mod tags;

pub use error::LinkError;
pub use link::{link, LinkResult};
