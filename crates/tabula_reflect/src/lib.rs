#![doc = include_str!("../README.md")]

// -----------------------------------------------------------------------------
// Extern Self

// Allows `tabula_reflect::` paths to resolve inside this crate, so the
// macros in `macros.rs` can be exercised by doc tests and unit tests alike.
extern crate self as tabula_reflect;

// -----------------------------------------------------------------------------
// Modules

mod atom;
mod error;
mod serial;

pub mod archive;
pub mod impls;
pub mod info;
pub mod own;
pub mod registry;

mod macros;

// -----------------------------------------------------------------------------
// Top-Level exports

pub use atom::Atom;
pub use error::{Error, Result};
pub use serial::{Described, FieldSerializer, Serial, ValueSerializer};

#[cfg(feature = "auto_register")]
pub use inventory;
