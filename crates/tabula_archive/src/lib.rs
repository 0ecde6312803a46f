#![doc = include_str!("../README.md")]

// -----------------------------------------------------------------------------
// Modules

pub mod flat;
pub mod proto;
