#![forbid(unsafe_code)]
//! Public API facade.
//!
//! Re-exports the reader engine from `cfb-core` through a stable external
//! interface; downstream consumers depend on this crate.

pub use cfb_core::*;
