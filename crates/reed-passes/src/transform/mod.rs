//! Optimizing transform passes.

pub mod dce;
pub mod fold;
