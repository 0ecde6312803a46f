//! The offset-table wire format.
//!
//! A buffer opens with a `u32` forward offset to the root table. Every
//! table starts with a signed `i32` offset to its vtable (`[vt_size:
//! u16][table_size: u16][slot: u16 per field]`), followed by its field
//! slots. Scalars sit inline at naturally aligned slots; strings,
//! sequences, maps, embedded objects and references occupy 4-byte slots
//! holding forward offsets to separately written content. A zero slot, or
//! a field past the end of the vtable, reads back as the field's default.
//!
//! Tables with identical layouts share a single vtable, and each distinct
//! referenced object is written once and aliased by offset afterwards, so
//! shared references survive a round trip as shared.
//!
//! The whole buffer is assembled in memory back to front and flushed to
//! the stream in one write; seeking is never required of the stream.

mod buffer;
mod reader;
mod vtable;
mod writer;

pub use reader::FlatReader;
pub use writer::FlatWriter;

use std::io::{Read, Write};

use tabula_reflect::{Described, Result};

/// Serializes `obj` as a self-contained buffer.
pub fn to_vec<T: Described>(obj: &T) -> Result<Vec<u8>> {
    let mut writer = FlatWriter::new(Vec::new());
    writer.write_root(obj)?;
    writer.finish()
}

/// Reconstructs a `T` from a buffer produced by [`to_vec`] or
/// [`FlatWriter`].
pub fn from_slice<T: Described + Default>(bytes: &[u8]) -> Result<T> {
    FlatReader::new(bytes.to_vec()).read_root()
}

/// Serializes `obj` into `stream`.
pub fn write<T: Described, W: Write>(stream: W, obj: &T) -> Result<()> {
    let mut writer = FlatWriter::new(stream);
    writer.write_root(obj)?;
    writer.finish()?;
    Ok(())
}

/// Reconstructs a `T` from the remaining bytes of `stream`.
pub fn read<T: Described + Default>(stream: impl Read) -> Result<T> {
    FlatReader::from_reader(stream)?.read_root()
}
