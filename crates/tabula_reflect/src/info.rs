//! Per-type field metadata.
//!
//! A [`Descriptor`] is created once per type, on first access, and reused
//! for the rest of the process lifetime. It is logically immutable and
//! safe to share across concurrently running archives; [`DescriptorCell`]
//! provides the lazily-initialized static storage, and
//! [`describe!`](crate::describe) generates the boilerplate.

use core::any::{Any, TypeId};
use std::sync::OnceLock;

use crate::{Atom, Error, FieldSerializer, Result};

// -----------------------------------------------------------------------------
// FieldEntry

/// One serializable field of a described type: its declaration-order
/// position, byte offset within the type, optional external identifier,
/// and the erased serializer for its shape.
pub struct FieldEntry {
    name: &'static str,
    ident: Option<u32>,
    offset: usize,
    serializer: &'static dyn FieldSerializer,
    get: fn(&dyn Any) -> Result<&dyn Any>,
    get_mut: fn(&mut dyn Any) -> Result<&mut dyn Any>,
}

impl FieldEntry {
    /// Creates a field entry. Usually generated by
    /// [`field_entry!`](crate::field_entry).
    #[inline]
    pub const fn new(
        name: &'static str,
        ident: Option<u32>,
        offset: usize,
        serializer: &'static dyn FieldSerializer,
        get: fn(&dyn Any) -> Result<&dyn Any>,
        get_mut: fn(&mut dyn Any) -> Result<&mut dyn Any>,
    ) -> Self {
        Self {
            name,
            ident,
            offset,
            serializer,
            get,
            get_mut,
        }
    }

    /// The field name.
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The externally-assigned field identifier, if one was declared.
    /// Mandatory under the TLV codec, unused by the table codec.
    #[inline]
    pub const fn ident(&self) -> Option<u32> {
        self.ident
    }

    /// Byte offset of the field within its type.
    #[inline]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// The erased serializer for the field's shape.
    #[inline]
    pub fn serializer(&self) -> &'static dyn FieldSerializer {
        self.serializer
    }

    /// Borrows the field out of an erased parent object.
    #[inline]
    pub fn get<'a>(&self, parent: &'a dyn Any) -> Result<&'a dyn Any> {
        (self.get)(parent)
    }

    /// Mutably borrows the field out of an erased parent object.
    #[inline]
    pub fn get_mut<'a>(&self, parent: &'a mut dyn Any) -> Result<&'a mut dyn Any> {
        (self.get_mut)(parent)
    }
}

// -----------------------------------------------------------------------------
// Descriptor

/// The ordered field table of one type.
///
/// Field entries appear in declaration order; codecs rely on that order
/// for slot layout and identifier-free formats.
pub struct Descriptor {
    type_name: &'static str,
    ty_id: TypeId,
    fields: Vec<FieldEntry>,
    allocates: bool,
}

impl Descriptor {
    /// Starts building the descriptor for `T`.
    pub fn build<T: 'static>(type_name: &'static str) -> DescriptorBuilder {
        DescriptorBuilder {
            type_name,
            ty_id: TypeId::of::<T>(),
            fields: Vec::new(),
        }
    }

    /// The described type's name.
    #[inline]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The described type's identity.
    #[inline]
    pub const fn ty_id(&self) -> TypeId {
        self.ty_id
    }

    /// The field entries, in declaration order.
    #[inline]
    pub fn fields(&self) -> &[FieldEntry] {
        &self.fields
    }

    /// True if reconstructing this type requires allocation capability,
    /// i.e. if any field, directly or transitively, is a reference.
    #[inline]
    pub const fn allocates(&self) -> bool {
        self.allocates
    }

    /// Confirms the type is reconstructible by a passive consumer, one
    /// without allocation capability. Call before handing the graph to a
    /// reader that only consumes bytes.
    pub fn require_passive(&self) -> Result<()> {
        if self.allocates {
            return Err(Error::AllocationCapability {
                type_name: self.type_name,
            });
        }
        Ok(())
    }

    /// Looks a field up by name.
    pub fn field(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks a field up by external identifier.
    pub fn field_by_ident(&self, ident: u32) -> Option<&FieldEntry> {
        self.fields.iter().find(|f| f.ident == Some(ident))
    }

    /// Every field lacking an external identifier, as
    /// `(atom, byte offset)` pairs. Non-empty means the type cannot be
    /// written by the TLV codec.
    pub fn unidentified(&self) -> Vec<(Atom, usize)> {
        self.fields
            .iter()
            .filter(|f| f.ident.is_none())
            .map(|f| (f.serializer.atom(), f.offset))
            .collect()
    }
}

/// Builder for [`Descriptor`]. Fields must be added in declaration order.
pub struct DescriptorBuilder {
    type_name: &'static str,
    ty_id: TypeId,
    fields: Vec<FieldEntry>,
}

impl DescriptorBuilder {
    /// Appends the next field entry.
    pub fn field(mut self, entry: FieldEntry) -> Self {
        self.fields.push(entry);
        self
    }

    /// Finishes the descriptor, computing the transitive allocation need.
    pub fn finish(self) -> Descriptor {
        let allocates = self.fields.iter().any(|f| f.serializer.allocates());
        Descriptor {
            type_name: self.type_name,
            ty_id: self.ty_id,
            fields: self.fields,
            allocates,
        }
    }
}

// -----------------------------------------------------------------------------
// DescriptorCell

/// Static storage for a lazily-created [`Descriptor`].
///
/// Internally an [`OnceLock`]; safe for concurrent first access from
/// multiple threads, after which reads are contention-free.
///
/// ```
/// use tabula_reflect::info::{Descriptor, DescriptorCell};
///
/// struct Empty;
///
/// fn descriptor() -> &'static Descriptor {
///     static CELL: DescriptorCell = DescriptorCell::new();
///     CELL.get_or_init(|| Descriptor::build::<Empty>("Empty").finish())
/// }
///
/// assert_eq!(descriptor().type_name(), "Empty");
/// assert!(core::ptr::eq(descriptor(), descriptor()));
/// ```
pub struct DescriptorCell(OnceLock<Descriptor>);

impl DescriptorCell {
    /// Creates an empty cell.
    #[inline]
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Returns the stored descriptor, running `f` on first access.
    #[inline]
    pub fn get_or_init(&'static self, f: impl FnOnce() -> Descriptor) -> &'static Descriptor {
        self.0.get_or_init(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValueSerializer;

    #[derive(Default)]
    struct Sample {
        a: u32,
        b: String,
    }

    fn sample_descriptor() -> Descriptor {
        Descriptor::build::<Sample>("Sample")
            .field(FieldEntry::new(
                "a",
                Some(1),
                core::mem::offset_of!(Sample, a),
                ValueSerializer::<u32>::erased(),
                |p| {
                    let p = p
                        .downcast_ref::<Sample>()
                        .ok_or(crate::Error::TypeMismatch { expected: "Sample" })?;
                    Ok(&p.a)
                },
                |p| {
                    let p = p
                        .downcast_mut::<Sample>()
                        .ok_or(crate::Error::TypeMismatch { expected: "Sample" })?;
                    Ok(&mut p.a)
                },
            ))
            .field(FieldEntry::new(
                "b",
                None,
                core::mem::offset_of!(Sample, b),
                ValueSerializer::<String>::erased(),
                |p| {
                    let p = p
                        .downcast_ref::<Sample>()
                        .ok_or(crate::Error::TypeMismatch { expected: "Sample" })?;
                    Ok(&p.b)
                },
                |p| {
                    let p = p
                        .downcast_mut::<Sample>()
                        .ok_or(crate::Error::TypeMismatch { expected: "Sample" })?;
                    Ok(&mut p.b)
                },
            ))
            .finish()
    }

    #[test]
    fn declaration_order_is_preserved() {
        let desc = sample_descriptor();
        let names: Vec<_> = desc.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn unidentified_reports_atom_and_offset() {
        let desc = sample_descriptor();
        let missing = desc.unidentified();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].0, Atom::String);
        assert_eq!(missing[0].1, core::mem::offset_of!(Sample, b));
    }

    #[test]
    fn accessors_reach_the_field() {
        let desc = sample_descriptor();
        let mut value = Sample {
            a: 7,
            b: "x".into(),
        };
        let field = desc.field("a").unwrap();
        let got = field.get(&value).unwrap();
        assert_eq!(got.downcast_ref::<u32>(), Some(&7));

        let got = desc.field("b").unwrap().get_mut(&mut value).unwrap();
        *got.downcast_mut::<String>().unwrap() = "y".into();
        assert_eq!(value.b, "y");
    }

    #[test]
    fn plain_fields_do_not_allocate() {
        assert!(!sample_descriptor().allocates());
        assert!(sample_descriptor().require_passive().is_ok());
    }

    #[test]
    fn reference_fields_demand_an_allocating_reader() {
        use crate::Described;

        #[derive(Default)]
        struct Chain {
            next: Option<Box<Chain>>,
        }
        crate::describe! {
            Chain {
                next => 1,
            }
        }
        assert!(Chain::descriptor().allocates());
        assert!(matches!(
            Chain::descriptor().require_passive(),
            Err(Error::AllocationCapability { type_name: "Chain" })
        ));
    }
}
