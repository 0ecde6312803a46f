//! Boilerplate generators for [`Described`](crate::Described) types.

/// Builds one [`FieldEntry`](crate::info::FieldEntry) for a named field,
/// inferring the field's serializer from its type.
///
/// `field_entry!(Type, field)` produces an unidentified entry (usable by
/// the table codec only); `field_entry!(Type, field => 3)` assigns the
/// external identifier 3 the TLV codec requires.
#[macro_export]
macro_rules! field_entry {
    ($ty:ty, $field:ident) => {
        $crate::field_entry!(@build $ty, $field, ::core::option::Option::None)
    };
    ($ty:ty, $field:ident => $ident:expr) => {
        $crate::field_entry!(@build $ty, $field, ::core::option::Option::Some($ident))
    };
    (@build $ty:ty, $field:ident, $ident:expr) => {{
        // Routes the field type through inference so the entry picks up
        // the right erased serializer without naming the type twice.
        fn erased<P: ::core::any::Any, F: $crate::Serial>(
            _: fn(&P) -> &F,
        ) -> &'static dyn $crate::FieldSerializer {
            $crate::ValueSerializer::<F>::erased()
        }

        $crate::info::FieldEntry::new(
            ::core::stringify!($field),
            $ident,
            ::core::mem::offset_of!($ty, $field),
            erased::<$ty, _>(|parent: &$ty| &parent.$field),
            |parent| {
                let parent = parent.downcast_ref::<$ty>().ok_or(
                    $crate::Error::TypeMismatch {
                        expected: ::core::stringify!($ty),
                    },
                )?;
                ::core::result::Result::Ok(&parent.$field as &dyn ::core::any::Any)
            },
            |parent| {
                let parent = parent.downcast_mut::<$ty>().ok_or(
                    $crate::Error::TypeMismatch {
                        expected: ::core::stringify!($ty),
                    },
                )?;
                ::core::result::Result::Ok(&mut parent.$field as &mut dyn ::core::any::Any)
            },
        )
    }};
}

/// Implements [`Described`](crate::Described) and
/// [`Serial`](crate::Serial) for an existing struct from a field list.
///
/// Fields appear in declaration order; `field => N` assigns the external
/// identifier the TLV codec requires, a bare `field` leaves it
/// unassigned. Under the `auto_register` feature the descriptor is also
/// submitted to [`TypeRegistry::new`](crate::registry::TypeRegistry::new)
/// collection.
///
/// ```
/// use tabula_reflect::{Described, describe};
///
/// #[derive(Default)]
/// struct Pair {
///     left: i32,
///     right: i32,
/// }
///
/// describe! {
///     Pair {
///         left => 1,
///         right => 2,
///     }
/// }
///
/// assert_eq!(Pair::descriptor().fields().len(), 2);
/// ```
#[macro_export]
macro_rules! describe {
    ($ty:ident { $($field:ident $(=> $ident:literal)?),* $(,)? }) => {
        impl $crate::Described for $ty {
            fn descriptor() -> &'static $crate::info::Descriptor {
                static CELL: $crate::info::DescriptorCell = $crate::info::DescriptorCell::new();
                CELL.get_or_init(|| {
                    $crate::info::Descriptor::build::<$ty>(::core::stringify!($ty))
                        $(.field($crate::field_entry!($ty, $field $(=> $ident)?)))*
                        .finish()
                })
            }
        }

        impl $crate::Serial for $ty {
            #[inline]
            fn atom() -> $crate::Atom {
                $crate::Atom::Descriptor
            }

            #[inline]
            fn allocates() -> bool {
                <$ty as $crate::Described>::descriptor().allocates()
            }

            #[inline]
            fn object() -> ::core::option::Option<&'static $crate::info::Descriptor> {
                ::core::option::Option::Some(<$ty as $crate::Described>::descriptor())
            }

            fn size(
                &self,
                ar: &dyn $crate::archive::OutArchiveRegistry,
            ) -> $crate::Result<u64> {
                ar.size_object(<$ty as $crate::Described>::descriptor(), self)
            }

            fn serialize(
                &self,
                ar: &mut dyn $crate::archive::OutArchiveRegistry,
            ) -> $crate::Result<()> {
                ar.write_object(<$ty as $crate::Described>::descriptor(), self)
            }

            fn deserialize(
                &mut self,
                ar: &mut dyn $crate::archive::InArchiveRegistry,
                ncb: u64,
            ) -> $crate::Result<()> {
                ar.read_object(<$ty as $crate::Described>::descriptor(), self, ncb)
            }
        }

        $crate::__submit_registration!($ty);
    };
}

#[cfg(feature = "auto_register")]
#[doc(hidden)]
#[macro_export]
macro_rules! __submit_registration {
    ($ty:ty) => {
        $crate::inventory::submit! {
            $crate::registry::DescriptorRegistration::of::<$ty>()
        }
    };
}

#[cfg(not(feature = "auto_register"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __submit_registration {
    ($ty:ty) => {};
}

#[cfg(test)]
mod tests {
    use crate::{Atom, Described, Serial, describe};

    #[derive(Default, PartialEq, Debug)]
    struct Inventory {
        count: u32,
        label: String,
    }

    describe! {
        Inventory {
            count => 1,
            label,
        }
    }

    #[test]
    fn descriptor_reflects_declaration() {
        let desc = Inventory::descriptor();
        assert_eq!(desc.type_name(), "Inventory");
        assert_eq!(desc.fields().len(), 2);
        assert_eq!(desc.fields()[0].name(), "count");
        assert_eq!(desc.fields()[0].ident(), Some(1));
        assert_eq!(desc.fields()[1].ident(), None);
        assert_eq!(desc.fields()[1].serializer().atom(), Atom::String);
    }

    #[test]
    fn described_types_resolve_to_objects() {
        assert_eq!(<Inventory as Serial>::atom(), Atom::Descriptor);
        assert!(!<Inventory as Serial>::is_optional());
        assert!(!<Inventory as Serial>::allocates());
    }

    #[test]
    fn descriptor_is_cached() {
        assert!(core::ptr::eq(
            Inventory::descriptor(),
            Inventory::descriptor()
        ));
    }
}
