//! The abstract archive protocol every wire format implements.
//!
//! The write side is two-phase per value: a *size* query (a pure function
//! of the value that must exactly predict byte cost, with no side effects)
//! followed by a *write* that emits exactly the sized cost. This ordering
//! is what lets the table codec compute a table's total size before
//! assembling the table and its vtable. The read side is single-phase and
//! self-advancing: every read consumes exactly the bytes its declared
//! width or length implies and leaves the cursor at the next field.
//!
//! Container shapes are decoupled from codec logic through the cursor
//! traits ([`ArrayReader`]/[`ArrayAppender`], [`MapReader`]/
//! [`MapInserter`]): the typed impls in [`crate::impls`] know their
//! containers, the archives only ever see the cursors.
//!
//! The `Registry` suffix marks allocation capability. A plain
//! [`InArchive`] can only passively consume bytes; reconstructing any
//! reference field (or a container transitively holding one) needs an
//! [`InArchiveRegistry`]. The erased dispatch layer is typed against the
//! registry interfaces, and [`Descriptor::allocates`] lets a passive
//! consumer reject an allocation-needing graph up front.

use core::any::Any;
use std::sync::Arc;

use crate::info::Descriptor;
use crate::{Atom, FieldSerializer, Result};

// -----------------------------------------------------------------------------
// Write side

/// Primitive write-side operations: size queries plus emission.
///
/// Size queries take `&self`: they must not mutate session state. For
/// table formats the returned size is the cost *within a table slot*
/// (4 bytes for anything stored by forward offset), not the total cost of
/// the referenced content.
pub trait OutArchive {
    /// Slot cost of a fixed-width integer. `atom` carries both the width
    /// and the signedness, which variable-length encodings need.
    fn size_integer(&self, value: i64, atom: Atom) -> u64;
    /// Slot cost of a 32-bit float.
    fn size_float32(&self, value: f32) -> u64;
    /// Slot cost of a 64-bit float.
    fn size_float64(&self, value: f64) -> u64;
    /// Slot cost of a boolean.
    fn size_bool(&self, value: bool) -> u64;
    /// Slot cost of a string of `char_count` characters of `char_size`
    /// bytes each; `bytes` is the raw character data.
    fn size_string(&self, bytes: &[u8], char_count: u64, char_size: u8) -> u64;

    /// Writes a fixed-width integer. Unsigned values transit bit-cast
    /// through `i64`; `atom` tells the codec how to encode them.
    fn write_integer(&mut self, value: i64, atom: Atom) -> Result<()>;
    /// Writes a 32-bit float.
    fn write_float32(&mut self, value: f32) -> Result<()>;
    /// Writes a 64-bit float.
    fn write_float64(&mut self, value: f64) -> Result<()>;
    /// Writes a boolean.
    fn write_bool(&mut self, value: bool) -> Result<()>;
    /// Writes a raw byte block, optionally length-prefixed.
    fn write_byte_array(&mut self, bytes: &[u8], write_size: bool) -> Result<()>;
    /// Writes string data as `char_count` characters of `char_size` bytes.
    fn write_string(&mut self, bytes: &[u8], char_count: u64, char_size: u8) -> Result<()>;
}

/// Composite write-side operations. Everything that recurses into nested
/// descriptors or resolves references lives here.
pub trait OutArchiveRegistry: OutArchive {
    /// Cost of an object embedded by value.
    fn size_object(&self, desc: &'static Descriptor, obj: &dyn Any) -> Result<u64>;
    /// Cost of a sequence.
    fn size_array(&self, ary: &dyn ArrayReader) -> Result<u64>;
    /// Cost of a key/value container.
    fn size_map(&self, map: &dyn MapReader) -> Result<u64>;
    /// Cost of an object reference. `None` is a null reference.
    fn size_reference(&self, desc: &'static Descriptor, source: Option<RefSource<'_>>)
    -> Result<u64>;

    /// Writes an object embedded by value, recursing into its descriptor.
    fn write_object(&mut self, desc: &'static Descriptor, obj: &dyn Any) -> Result<()>;
    /// Writes a sequence through its cursor.
    fn write_array(&mut self, ary: &dyn ArrayReader) -> Result<()>;
    /// Writes a key/value container through its cursor. Iteration order is
    /// the source container's natural order.
    fn write_map(&mut self, map: &dyn MapReader) -> Result<()>;
    /// Writes an object reference, resolving the pointee through the
    /// session's identity bookkeeping. `None` is a null reference.
    fn write_reference(
        &mut self,
        desc: &'static Descriptor,
        source: Option<RefSource<'_>>,
    ) -> Result<()>;
}

// -----------------------------------------------------------------------------
// Read side

/// Primitive read-side operations. Each call consumes exactly the bytes
/// its width or length implies.
pub trait InArchive {
    /// Reads a fixed-width integer; unsigned values come back bit-cast in
    /// the `i64`.
    fn read_integer(&mut self, atom: Atom) -> Result<i64>;
    /// Reads a 32-bit float.
    fn read_float32(&mut self) -> Result<f32>;
    /// Reads a 64-bit float.
    fn read_float64(&mut self) -> Result<f64>;
    /// Reads a boolean.
    fn read_bool(&mut self) -> Result<bool>;
    /// Fills `buf` with exactly `buf.len()` raw bytes.
    fn read_byte_array(&mut self, buf: &mut [u8]) -> Result<()>;
    /// Reads string data. `ncb` bounds the read for length-delimited
    /// codecs; codecs with stored lengths ignore it.
    fn read_string(&mut self, char_size: u8, ncb: u64) -> Result<Vec<u8>>;
    /// Skips `ncb` bytes.
    fn skip(&mut self, ncb: u64) -> Result<()>;
    /// Total bytes consumed so far.
    fn count(&self) -> u64;
}

/// Composite read-side operations, including everything that allocates.
pub trait InArchiveRegistry: InArchive {
    /// Reconstructs an embedded object in place.
    fn read_object(&mut self, desc: &'static Descriptor, obj: &mut dyn Any, ncb: u64)
    -> Result<()>;
    /// Reconstructs a sequence through its cursor.
    fn read_array(&mut self, ary: &mut dyn ArrayAppender) -> Result<()>;
    /// Reconstructs key/value pairs through the inserter. Duplicate keys
    /// overwrite.
    fn read_map(&mut self, map: &mut dyn MapInserter) -> Result<()>;

    /// Resolves a reference with exclusive ownership: a fresh allocation
    /// per read, solely owned by the caller. `None` is a null reference.
    fn read_reference_unique(
        &mut self,
        desc: &'static Descriptor,
        create: fn() -> Box<dyn Any>,
    ) -> Result<Option<Box<dyn Any>>>;

    /// Resolves a reference with shared ownership: at most one allocation
    /// per distinct source reference; later references to the same source
    /// resolve to the same live instance. The returned `Arc` is the
    /// keep-alive handle.
    fn read_reference_shared(
        &mut self,
        desc: &'static Descriptor,
        create: fn() -> Arc<dyn Any + Send + Sync>,
    ) -> Result<Option<Arc<dyn Any + Send + Sync>>>;

    /// Resolves a caller-managed reference: storage comes from
    /// `lifecycle.create`, and the archive never calls `lifecycle.delete`.
    /// Freeing the result is entirely the caller's responsibility.
    fn read_reference_raw(
        &mut self,
        desc: &'static Descriptor,
        lifecycle: &CreateDelete,
    ) -> Result<Option<Box<dyn Any>>>;
}

// -----------------------------------------------------------------------------
// Reference bookkeeping

/// Write-side identity of a referenced pointee. Two references carrying
/// the same `SourceId` point at the same live object and serialize to a
/// single copy under codecs that support identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

impl SourceId {
    /// Identity of the object behind `r`.
    #[inline]
    pub fn of<T>(r: &T) -> Self {
        Self(r as *const T as usize)
    }

    /// Identity derived from an erased value.
    #[inline]
    pub fn of_erased(r: &dyn Any) -> Self {
        Self(r as *const dyn Any as *const u8 as usize)
    }
}

/// A non-null reference source: the pointee plus its identity.
#[derive(Clone, Copy)]
pub struct RefSource<'a> {
    /// The live pointee.
    pub obj: &'a dyn Any,
    /// Its write-session identity.
    pub id: SourceId,
}

impl<'a> RefSource<'a> {
    /// Builds the source for a typed pointee.
    #[inline]
    pub fn of<T: Any>(obj: &'a T) -> Self {
        Self {
            obj,
            id: SourceId::of(obj),
        }
    }
}

/// A caller-supplied allocate/free pair for caller-managed references.
///
/// The reading archive calls `create` to obtain storage for a new
/// instance. It never calls `delete`; the pair carries it so the *caller*
/// can dispose of instances it decides to reclaim.
#[derive(Clone, Copy)]
pub struct CreateDelete {
    /// Allocates default-initialized storage.
    pub create: fn() -> Box<dyn Any>,
    /// Frees storage previously produced by `create`. Unused by archives.
    pub delete: fn(Box<dyn Any>),
}

impl CreateDelete {
    /// The standard pair for a default-constructible type.
    pub fn of<T: Any + Default>() -> Self {
        fn create<T: Any + Default>() -> Box<dyn Any> {
            Box::new(T::default())
        }
        fn delete(storage: Box<dyn Any>) {
            drop(storage);
        }
        Self {
            create: create::<T>,
            delete,
        }
    }
}

// -----------------------------------------------------------------------------
// Cursors

/// Read access to a sequence's elements, independent of the container
/// type. Indexed so codecs can make multiple passes (size, then write).
pub trait ArrayReader {
    /// Serializer for the element shape.
    fn element(&self) -> &'static dyn FieldSerializer;
    /// Element count.
    fn len(&self) -> usize;
    /// The `i`-th element.
    fn get(&self, i: usize) -> &dyn Any;
}

/// Reserve-then-allocate access to a sequence under reconstruction.
pub trait ArrayAppender {
    /// Serializer for the element shape.
    fn element(&self) -> &'static dyn FieldSerializer;
    /// Declares the incoming element count. Fixed-size sequences fail here
    /// if the count does not match their declared length.
    fn reserve(&mut self, n: usize) -> Result<()>;
    /// Allocates the next element slot, default-initialized.
    fn allocate(&mut self) -> Result<&mut dyn Any>;
}

/// Read access to a key/value container's pairs in the container's
/// natural iteration order.
pub trait MapReader {
    /// Serializer for the key shape.
    fn key_serializer(&self) -> &'static dyn FieldSerializer;
    /// Serializer for the value shape.
    fn value_serializer(&self) -> &'static dyn FieldSerializer;
    /// Pair count.
    fn len(&self) -> usize;
    /// The `i`-th key.
    fn key(&self, i: usize) -> &dyn Any;
    /// The `i`-th value.
    fn value(&self, i: usize) -> &dyn Any;
}

/// Insertion access to a key/value container under reconstruction.
///
/// The codec deserializes a key into the staging slot, then calls
/// [`insert`](MapInserter::insert) to commit it and obtain the value slot.
/// Inserting an existing key overwrites its value.
pub trait MapInserter {
    /// Serializer for the key shape.
    fn key_serializer(&self) -> &'static dyn FieldSerializer;
    /// Serializer for the value shape.
    fn value_serializer(&self) -> &'static dyn FieldSerializer;
    /// The key staging slot.
    fn key(&mut self) -> &mut dyn Any;
    /// Commits the staged key; returns the default-initialized value slot.
    fn insert(&mut self) -> Result<&mut dyn Any>;
}

// -----------------------------------------------------------------------------
// Test support

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A write archive that sizes everything at zero and rejects writes.
    /// Only useful for exercising dispatch plumbing in unit tests.
    pub(crate) struct NullSizer;

    impl OutArchive for NullSizer {
        fn size_integer(&self, _: i64, _: Atom) -> u64 {
            0
        }
        fn size_float32(&self, _: f32) -> u64 {
            0
        }
        fn size_float64(&self, _: f64) -> u64 {
            0
        }
        fn size_bool(&self, _: bool) -> u64 {
            0
        }
        fn size_string(&self, _: &[u8], _: u64, _: u8) -> u64 {
            0
        }
        fn write_integer(&mut self, _: i64, _: Atom) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
        fn write_float32(&mut self, _: f32) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
        fn write_float64(&mut self, _: f64) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
        fn write_bool(&mut self, _: bool) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
        fn write_byte_array(&mut self, _: &[u8], _: bool) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
        fn write_string(&mut self, _: &[u8], _: u64, _: u8) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
    }

    impl OutArchiveRegistry for NullSizer {
        fn size_object(&self, _: &'static Descriptor, _: &dyn Any) -> Result<u64> {
            Ok(0)
        }
        fn size_array(&self, _: &dyn ArrayReader) -> Result<u64> {
            Ok(0)
        }
        fn size_map(&self, _: &dyn MapReader) -> Result<u64> {
            Ok(0)
        }
        fn size_reference(
            &self,
            _: &'static Descriptor,
            _: Option<RefSource<'_>>,
        ) -> Result<u64> {
            Ok(0)
        }
        fn write_object(&mut self, _: &'static Descriptor, _: &dyn Any) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
        fn write_array(&mut self, _: &dyn ArrayReader) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
        fn write_map(&mut self, _: &dyn MapReader) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
        fn write_reference(
            &mut self,
            _: &'static Descriptor,
            _: Option<RefSource<'_>>,
        ) -> Result<()> {
            Err(crate::Error::Poisoned)
        }
    }
}
