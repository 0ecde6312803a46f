use core::any::type_name;
use std::sync::Arc;

use crate::archive::{CreateDelete, InArchiveRegistry, OutArchiveRegistry, RefSource};
use crate::info::Descriptor;
use crate::own::Leaked;
use crate::{Atom, Described, Error, Result, Serial};

// All three reference kinds resolve to the same atom; only the ownership
// mode exercised during reconstruction differs.

/// Exclusive ownership: reading allocates a fresh instance owned solely by
/// the containing structure.
impl<T: Described + Default> Serial for Option<Box<T>> {
    #[inline]
    fn atom() -> Atom {
        Atom::Reference
    }

    #[inline]
    fn is_optional() -> bool {
        true
    }

    #[inline]
    fn allocates() -> bool {
        true
    }

    #[inline]
    fn object() -> Option<&'static Descriptor> {
        Some(T::descriptor())
    }

    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
        ar.size_reference(T::descriptor(), self.as_deref().map(RefSource::of))
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
        ar.write_reference(T::descriptor(), self.as_deref().map(RefSource::of))
    }

    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
        let got = ar.read_reference_unique(T::descriptor(), || Box::new(T::default()))?;
        *self = match got {
            Some(storage) => Some(storage.downcast::<T>().map_err(|_| Error::TypeMismatch {
                expected: type_name::<T>(),
            })?),
            None => None,
        };
        Ok(())
    }
}

/// Shared ownership: the archive allocates at most once per distinct
/// source reference; the `Arc` is the keep-alive handle.
impl<T: Described + Default + Send + Sync> Serial for Option<Arc<T>> {
    #[inline]
    fn atom() -> Atom {
        Atom::Reference
    }

    #[inline]
    fn is_optional() -> bool {
        true
    }

    #[inline]
    fn allocates() -> bool {
        true
    }

    #[inline]
    fn object() -> Option<&'static Descriptor> {
        Some(T::descriptor())
    }

    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
        ar.size_reference(T::descriptor(), self.as_deref().map(RefSource::of))
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
        // Identity is the shared allocation's address: clones of one Arc
        // serialize as a single pointee under identity-aware codecs.
        ar.write_reference(T::descriptor(), self.as_deref().map(RefSource::of))
    }

    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
        let got = ar.read_reference_shared(T::descriptor(), || Arc::new(T::default()))?;
        *self = match got {
            Some(handle) => Some(handle.downcast::<T>().map_err(|_| Error::TypeMismatch {
                expected: type_name::<T>(),
            })?),
            None => None,
        };
        Ok(())
    }
}

/// Caller-managed ownership: storage comes from the caller's
/// [`CreateDelete`] pair and the archive never frees it.
impl<T: Described + Default> Serial for Leaked<T> {
    #[inline]
    fn atom() -> Atom {
        Atom::Reference
    }

    #[inline]
    fn is_optional() -> bool {
        true
    }

    #[inline]
    fn allocates() -> bool {
        true
    }

    #[inline]
    fn object() -> Option<&'static Descriptor> {
        Some(T::descriptor())
    }

    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
        ar.size_reference(T::descriptor(), self.get().map(RefSource::of))
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
        ar.write_reference(T::descriptor(), self.get().map(RefSource::of))
    }

    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
        let lifecycle = CreateDelete::of::<T>();
        let got = ar.read_reference_raw(T::descriptor(), &lifecycle)?;
        *self = match got {
            Some(storage) => {
                Leaked::new(storage.downcast::<T>().map_err(|_| Error::TypeMismatch {
                    expected: type_name::<T>(),
                })?)
            }
            None => Leaked::empty(),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe;

    #[derive(Default)]
    struct Node {
        weight: u32,
    }

    describe! {
        Node {
            weight => 1,
        }
    }

    #[test]
    fn references_allocate() {
        assert_eq!(<Option<Box<Node>> as Serial>::atom(), Atom::Reference);
        assert!(<Option<Box<Node>> as Serial>::allocates());
        assert!(<Option<Arc<Node>> as Serial>::allocates());
        assert!(<Leaked<Node> as Serial>::allocates());
        assert!(<Option<Box<Node>> as Serial>::is_optional());
    }

    #[test]
    fn allocation_need_is_transitive() {
        // A container of references needs allocation; the plain object
        // does not.
        assert!(!<Node as Serial>::allocates());
        assert!(<Vec<Option<Box<Node>>> as Serial>::allocates());
        let _ = Node { weight: 0 }.weight;
    }

    #[test]
    fn pointee_descriptor_is_exposed() {
        let desc = <Option<Box<Node>> as Serial>::object().unwrap();
        assert_eq!(desc.type_name(), "Node");
    }
}
