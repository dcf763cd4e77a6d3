//! Core trait definitions.
//!
//! - `Reusable`: the reset/clear contract pooled objects implement

pub mod reusable;

pub use reusable::Reusable;
