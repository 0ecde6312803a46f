use core::any::{Any, type_name};
use core::marker::PhantomData;

use crate::archive::{InArchiveRegistry, OutArchiveRegistry};
use crate::info::Descriptor;
use crate::{Atom, Error, Result};

// -----------------------------------------------------------------------------
// Serial

/// The typed serialization capability set.
///
/// Implemented for primitives, strings, sequences, maps, embedded objects
/// and the three reference ownership kinds (see [`crate::own`]). Resolution
/// is entirely type-driven: a type that has no `Serial` impl cannot appear
/// in a descriptor, and the build fails at the point of resolution naming
/// the offending type. In particular, integral types wider than 8 bytes
/// (`i128`, `u128`) and pointer-sized integers are deliberately not
/// implemented.
///
/// The write side is two-phase: [`size`](Serial::size) is a pure function
/// of the value that must exactly predict the byte cost of
/// [`serialize`](Serial::serialize) under the same archive. The read side
/// is single-phase; `deserialize` consumes exactly the bytes its value
/// implies and leaves the archive cursor at the next field.
pub trait Serial: 'static {
    /// The wire shape this type resolves to.
    fn atom() -> Atom
    where
        Self: Sized;

    /// True if the field can be externally described as initialized or
    /// absent. Reference and variable-size container kinds are optional;
    /// embedded scalars, fixed arrays and embedded objects are mandatory.
    #[inline]
    fn is_optional() -> bool
    where
        Self: Sized,
    {
        false
    }

    /// True if reconstructing this type requires allocation capability.
    ///
    /// Allocation need is structural and transitive: a reference atom
    /// always allocates, a container allocates iff its element does, and
    /// an embedded object allocates iff any of its fields does.
    #[inline]
    fn allocates() -> bool
    where
        Self: Sized,
    {
        false
    }

    /// Descriptor of the pointee/embedded object, for [`Atom::Descriptor`]
    /// and [`Atom::Reference`] types.
    #[inline]
    fn object() -> Option<&'static Descriptor>
    where
        Self: Sized,
    {
        None
    }

    /// Element serializer, for [`Atom::Array`] types.
    #[inline]
    fn element() -> Option<&'static dyn FieldSerializer>
    where
        Self: Sized,
    {
        None
    }

    /// Key and value serializers, for [`Atom::Map`] types.
    #[inline]
    fn entries() -> Option<(&'static dyn FieldSerializer, &'static dyn FieldSerializer)>
    where
        Self: Sized,
    {
        None
    }

    /// Exact byte cost of `serialize` under `ar`'s rules. Pure; must have
    /// no side effects on the archive.
    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64>;

    /// Emits the value into the archive.
    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()>;

    /// Reconstructs the value in place from the archive.
    ///
    /// `ncb` is the length of the enclosing wire block where the codec has
    /// one (length-delimited formats); codecs with self-describing lengths
    /// pass 0.
    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, ncb: u64) -> Result<()>;
}

// -----------------------------------------------------------------------------
// Described

/// A type with a field table.
///
/// The descriptor is created on first access, cached for the process
/// lifetime, and shared freely across threads and archives. Usually
/// implemented through [`describe!`](crate::describe).
pub trait Described: 'static {
    /// The per-type field table.
    fn descriptor() -> &'static Descriptor;
}

// -----------------------------------------------------------------------------
// FieldSerializer

/// The erased, object-safe rendition of [`Serial`], stored in field tables
/// and handed to archives.
///
/// One `'static` instance exists per serializable type (see
/// [`ValueSerializer`]); the `&dyn Any` parameters always carry that exact
/// type, and a mismatch surfaces as [`Error::TypeMismatch`].
pub trait FieldSerializer: Send + Sync {
    /// The field's wire shape.
    fn atom(&self) -> Atom;

    /// True if this serializer or any nested serializer requires memory
    /// management during reconstruction.
    fn allocates(&self) -> bool;

    /// True if the field has an optional notion.
    fn is_optional(&self) -> bool;

    /// Exact byte cost of `serialize` for this instance under `ar`.
    fn size(&self, ar: &dyn OutArchiveRegistry, obj: &dyn Any) -> Result<u64>;

    /// Serializes the object into the archive.
    fn serialize(&self, ar: &mut dyn OutArchiveRegistry, obj: &dyn Any) -> Result<()>;

    /// Reconstructs the object from the archive.
    fn deserialize(
        &self,
        ar: &mut dyn InArchiveRegistry,
        obj: &mut dyn Any,
        ncb: u64,
    ) -> Result<()>;

    /// Descriptor of the embedded object or pointee, when
    /// [`atom`](FieldSerializer::atom) is `Descriptor` or `Reference`.
    #[inline]
    fn object(&self) -> Option<&'static Descriptor> {
        None
    }

    /// Element serializer, when the atom is `Array`.
    #[inline]
    fn element(&self) -> Option<&'static dyn FieldSerializer> {
        None
    }

    /// Key and value serializers, when the atom is `Map`.
    #[inline]
    fn entries(&self) -> Option<(&'static dyn FieldSerializer, &'static dyn FieldSerializer)> {
        None
    }
}

// -----------------------------------------------------------------------------
// ValueSerializer

/// Zero-sized bridge from a typed [`Serial`] impl to the erased
/// [`FieldSerializer`] surface.
pub struct ValueSerializer<T: Serial>(PhantomData<fn() -> T>);

impl<T: Serial> ValueSerializer<T> {
    const INSTANCE: Self = Self(PhantomData);

    /// The shared `'static` erased serializer for `T`.
    #[inline]
    pub fn erased() -> &'static dyn FieldSerializer {
        &Self::INSTANCE
    }
}

#[inline]
fn cast<T: Serial>(obj: &dyn Any) -> Result<&T> {
    obj.downcast_ref::<T>()
        .ok_or(Error::TypeMismatch {
            expected: type_name::<T>(),
        })
}

#[inline]
fn cast_mut<T: Serial>(obj: &mut dyn Any) -> Result<&mut T> {
    obj.downcast_mut::<T>()
        .ok_or(Error::TypeMismatch {
            expected: type_name::<T>(),
        })
}

impl<T: Serial> FieldSerializer for ValueSerializer<T> {
    #[inline]
    fn atom(&self) -> Atom {
        T::atom()
    }

    #[inline]
    fn allocates(&self) -> bool {
        T::allocates()
    }

    #[inline]
    fn is_optional(&self) -> bool {
        T::is_optional()
    }

    fn size(&self, ar: &dyn OutArchiveRegistry, obj: &dyn Any) -> Result<u64> {
        cast::<T>(obj)?.size(ar)
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry, obj: &dyn Any) -> Result<()> {
        cast::<T>(obj)?.serialize(ar)
    }

    fn deserialize(
        &self,
        ar: &mut dyn InArchiveRegistry,
        obj: &mut dyn Any,
        ncb: u64,
    ) -> Result<()> {
        cast_mut::<T>(obj)?.deserialize(ar, ncb)
    }

    #[inline]
    fn object(&self) -> Option<&'static Descriptor> {
        T::object()
    }

    #[inline]
    fn element(&self) -> Option<&'static dyn FieldSerializer> {
        T::element()
    }

    #[inline]
    fn entries(&self) -> Option<(&'static dyn FieldSerializer, &'static dyn FieldSerializer)> {
        T::entries()
    }
}
