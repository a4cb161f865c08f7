//! Core value types shared across the engine.

pub mod fixed;

pub use fixed::{FixedParseError, FixedPrice};
