//! The tag/length/value wire format.
//!
//! Every field is emitted as a varint tag, `(identifier << 3) |
//! wire_type`, followed by its payload: zigzag varints for signed
//! integers, plain varints for unsigned integers and booleans, fixed
//! little-endian words for floats, and varint-length-prefixed blocks for
//! strings, sequences, maps, embedded objects and references. Sequences
//! are a single block holding a varint element count and bare elements;
//! each map pair is its own block with the key and value tagged 1 and 2.
//!
//! Identifiers are the schema contract: readers skip tags they do not
//! know and default fields they never see, so producers and consumers can
//! evolve independently as long as identifiers are never reused. A type
//! with any unidentified field anywhere in its reachable graph is
//! rejected before a single byte is written.
//!
//! References are flattened to embedded copies; aliasing does not survive
//! this format. A zero-length reference body is indistinguishable from a
//! null reference, so a present pointee whose every field is at its
//! default reads back as absent. Use the offset-table format when
//! identity or default-valued pointees matter.

mod reader;
mod wire;
mod writer;

pub use reader::ProtoReader;
pub use writer::ProtoWriter;

use std::io::{Read, Write};

use tabula_reflect::{Described, Result};

/// Serializes `obj` as a self-contained byte vector.
pub fn to_vec<T: Described>(obj: &T) -> Result<Vec<u8>> {
    let mut writer = ProtoWriter::new(Vec::new());
    writer.write_root(obj)?;
    writer.finish()
}

/// Reconstructs a `T` from bytes produced by [`to_vec`] or
/// [`ProtoWriter`].
pub fn from_slice<T: Described + Default>(bytes: &[u8]) -> Result<T> {
    ProtoReader::new(bytes.to_vec()).read_root()
}

/// Serializes `obj` into `stream`.
pub fn write<T: Described, W: Write>(stream: W, obj: &T) -> Result<()> {
    let mut writer = ProtoWriter::new(stream);
    writer.write_root(obj)?;
    writer.finish()?;
    Ok(())
}

/// Reconstructs a `T` from the remaining bytes of `stream`.
pub fn read<T: Described + Default>(stream: impl Read) -> Result<T> {
    ProtoReader::from_reader(stream)?.read_root()
}
