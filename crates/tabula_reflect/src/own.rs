//! Reconstruction ownership modes for reference fields.
//!
//! Every reference-atom field declares who owns the memory a reading
//! archive allocates for it:
//!
//! - **Exclusive** (`Option<Box<T>>`): the archive allocates a fresh
//!   instance and the containing structure becomes its sole owner.
//! - **Shared** (`Option<Arc<T>>`): the archive allocates at most once per
//!   distinct source reference; the `Arc` is the keep-alive handle and the
//!   object lives as long as any holder retains one.
//! - **Caller-managed** ([`Leaked<T>`]): the archive obtains storage
//!   through a caller-supplied [`CreateDelete`](crate::archive::CreateDelete)
//!   pair and never frees it. Lifetime is entirely the caller's problem;
//!   [`Leaked::reclaim`] hands the allocation back as a `Box` when the
//!   caller decides to dispose of it.
//!
//! The `Serial` impls for all three live in [`crate::impls`].

use core::fmt;

// -----------------------------------------------------------------------------
// Leaked

/// A caller-managed reference slot.
///
/// Holds a `'static` borrow of an allocation this module produced with
/// [`Box::leak`]. The serialization framework will allocate into it during
/// reconstruction but never free it: the moral equivalent of a dumb
/// pointer field, without the undefined behavior.
///
/// ```
/// use tabula_reflect::own::Leaked;
///
/// let mut slot = Leaked::new(Box::new(42_u32));
/// assert_eq!(slot.get(), Some(&42));
///
/// // The caller decides when (and whether) the allocation dies.
/// let reclaimed = slot.reclaim().unwrap();
/// assert_eq!(*reclaimed, 42);
/// assert!(slot.get().is_none());
/// ```
pub struct Leaked<T: 'static>(Option<&'static mut T>);

impl<T> Leaked<T> {
    /// An empty (null) slot.
    #[inline]
    pub const fn empty() -> Self {
        Self(None)
    }

    /// Leaks `value` into a filled slot.
    #[inline]
    pub fn new(value: Box<T>) -> Self {
        Self(Some(Box::leak(value)))
    }

    /// True if the slot holds an object.
    #[inline]
    pub const fn is_some(&self) -> bool {
        self.0.is_some()
    }

    /// Borrows the held object.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.0.as_deref()
    }

    /// Mutably borrows the held object.
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.0.as_deref_mut()
    }

    /// Takes the allocation back, emptying the slot.
    ///
    /// This is the only way the held object ever gets freed; dropping the
    /// slot itself leaks the allocation.
    #[expect(
        unsafe_code,
        reason = "re-boxing a uniquely-held Box::leak allocation"
    )]
    pub fn reclaim(&mut self) -> Option<Box<T>> {
        let held = self.0.take()?;
        // Invariant: the reference was produced by `Box::leak` in
        // `Leaked::new`, and taking it out of the slot relinquishes the
        // only copy.
        Some(unsafe { Box::from_raw(held) })
    }
}

impl<T> Default for Leaked<T> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for Leaked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(v) => f.debug_tuple("Leaked").field(v).finish(),
            None => f.write_str("Leaked(null)"),
        }
    }
}

impl<T: PartialEq> PartialEq for Leaked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

#[cfg(test)]
mod tests {
    use super::Leaked;

    #[test]
    fn empty_slot_reads_as_null() {
        let slot: Leaked<String> = Leaked::empty();
        assert!(!slot.is_some());
        assert!(slot.get().is_none());
    }

    #[test]
    fn reclaim_empties_the_slot() {
        let mut slot = Leaked::new(Box::new(String::from("held")));
        assert_eq!(slot.get().map(String::as_str), Some("held"));

        let value = slot.reclaim().unwrap();
        assert_eq!(*value, "held");
        assert!(slot.reclaim().is_none());
    }

    #[test]
    fn mutation_through_the_slot() {
        let mut slot = Leaked::new(Box::new(1_u64));
        *slot.get_mut().unwrap() = 2;
        assert_eq!(slot.reclaim().map(|b| *b), Some(2));
    }
}
