#![doc = include_str!("../README.md")]

pub use tabula_archive as archive;
pub use tabula_reflect as reflect;
