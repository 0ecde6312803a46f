use core::any::Any;

use crate::archive::{ArrayAppender, ArrayReader, InArchiveRegistry, OutArchiveRegistry};
use crate::{Atom, Error, FieldSerializer, Result, Serial, ValueSerializer};

// -----------------------------------------------------------------------------
// Cursors

/// [`ArrayReader`] over any contiguous slice of serializable elements.
/// Shared by fixed and variable arrays; indexed so codecs can run their
/// size pass and write pass over the same cursor.
pub struct SliceReader<'a, T: Serial> {
    items: &'a [T],
}

impl<'a, T: Serial> SliceReader<'a, T> {
    #[inline]
    pub fn new(items: &'a [T]) -> Self {
        Self { items }
    }
}

impl<T: Serial> ArrayReader for SliceReader<'_, T> {
    #[inline]
    fn element(&self) -> &'static dyn FieldSerializer {
        ValueSerializer::<T>::erased()
    }

    #[inline]
    fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    fn get(&self, i: usize) -> &dyn Any {
        &self.items[i]
    }
}

/// [`ArrayAppender`] growing a `Vec` during reconstruction.
pub struct VecAppender<'a, T: Serial + Default> {
    vec: &'a mut Vec<T>,
}

impl<'a, T: Serial + Default> VecAppender<'a, T> {
    #[inline]
    pub fn new(vec: &'a mut Vec<T>) -> Self {
        Self { vec }
    }
}

impl<T: Serial + Default> ArrayAppender for VecAppender<'_, T> {
    #[inline]
    fn element(&self) -> &'static dyn FieldSerializer {
        ValueSerializer::<T>::erased()
    }

    fn reserve(&mut self, n: usize) -> Result<()> {
        self.vec.reserve(n);
        Ok(())
    }

    fn allocate(&mut self) -> Result<&mut dyn Any> {
        self.vec.push(T::default());
        let last = self.vec.len() - 1;
        Ok(&mut self.vec[last])
    }
}

/// [`ArrayAppender`] filling a fixed-size array slot by slot. The element
/// count on the wire must match the declared length exactly.
pub struct FixedAppender<'a, T: Serial, const N: usize> {
    items: &'a mut [T; N],
    next: usize,
}

impl<'a, T: Serial, const N: usize> FixedAppender<'a, T, N> {
    #[inline]
    pub fn new(items: &'a mut [T; N]) -> Self {
        Self { items, next: 0 }
    }
}

impl<T: Serial, const N: usize> ArrayAppender for FixedAppender<'_, T, N> {
    #[inline]
    fn element(&self) -> &'static dyn FieldSerializer {
        ValueSerializer::<T>::erased()
    }

    fn reserve(&mut self, n: usize) -> Result<()> {
        if n != N {
            return Err(Error::WrongElementCount {
                expected: N,
                actual: n,
            });
        }
        Ok(())
    }

    fn allocate(&mut self) -> Result<&mut dyn Any> {
        if self.next >= N {
            return Err(Error::WrongElementCount {
                expected: N,
                actual: self.next + 1,
            });
        }
        let i = self.next;
        self.next += 1;
        Ok(&mut self.items[i])
    }
}

// -----------------------------------------------------------------------------
// Serial impls

/// Variable-length sequence. Optional (an absent field reads back empty);
/// allocation need follows the element type.
impl<T: Serial + Default> Serial for Vec<T> {
    #[inline]
    fn atom() -> Atom {
        Atom::Array
    }

    #[inline]
    fn is_optional() -> bool {
        true
    }

    #[inline]
    fn allocates() -> bool {
        T::allocates()
    }

    #[inline]
    fn element() -> Option<&'static dyn FieldSerializer> {
        Some(ValueSerializer::<T>::erased())
    }

    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
        ar.size_array(&SliceReader::new(self))
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
        ar.write_array(&SliceReader::new(self))
    }

    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
        self.clear();
        ar.read_array(&mut VecAppender::new(self))
    }
}

/// Fixed-length sequence. Mandatory: there is no absent notion for an
/// embedded array.
impl<T: Serial + Default, const N: usize> Serial for [T; N] {
    #[inline]
    fn atom() -> Atom {
        Atom::Array
    }

    #[inline]
    fn allocates() -> bool {
        T::allocates()
    }

    #[inline]
    fn element() -> Option<&'static dyn FieldSerializer> {
        Some(ValueSerializer::<T>::erased())
    }

    fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
        ar.size_array(&SliceReader::new(self))
    }

    fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
        ar.write_array(&SliceReader::new(self))
    }

    fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
        ar.read_array(&mut FixedAppender::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_resolution() {
        assert_eq!(<Vec<u32> as Serial>::atom(), Atom::Array);
        assert!(<Vec<u32> as Serial>::is_optional());
        assert!(!<Vec<u32> as Serial>::allocates());
        assert_eq!(
            <Vec<String> as Serial>::element().map(|e| e.atom()),
            Some(Atom::String)
        );
    }

    #[test]
    fn fixed_array_is_mandatory() {
        assert!(!<[u8; 4] as Serial>::is_optional());
    }

    #[test]
    fn fixed_appender_rejects_other_lengths() {
        let mut items = [0u8; 3];
        let mut appender = FixedAppender::new(&mut items);
        assert!(matches!(
            appender.reserve(4),
            Err(Error::WrongElementCount {
                expected: 3,
                actual: 4
            })
        ));
        assert!(appender.reserve(3).is_ok());
    }

    #[test]
    fn vec_appender_grows_in_order() {
        let mut vec: Vec<u16> = Vec::new();
        let mut appender = VecAppender::new(&mut vec);
        appender.reserve(2).unwrap();
        for want in [5u16, 9] {
            let slot = appender.allocate().unwrap();
            *slot.downcast_mut::<u16>().unwrap() = want;
        }
        assert_eq!(vec, [5, 9]);
    }
}
