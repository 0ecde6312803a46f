use core::any::Any;
use core::hash::Hash;
use core::mem;
use std::collections::{BTreeMap, HashMap};

use crate::archive::{InArchiveRegistry, MapInserter, MapReader, OutArchiveRegistry};
use crate::{Atom, FieldSerializer, Result, Serial, ValueSerializer};

// -----------------------------------------------------------------------------
// Cursors

/// [`MapReader`] over a snapshot of a container's pairs.
///
/// The pairs are collected up front so the codec can make multiple passes
/// (size, then write) over a stable order, the source container's natural
/// iteration order at the moment the cursor was built.
pub struct PairReader<'a, K: Serial, V: Serial> {
    pairs: Vec<(&'a K, &'a V)>,
}

impl<'a, K: Serial, V: Serial> PairReader<'a, K, V> {
    #[inline]
    pub fn new(iter: impl Iterator<Item = (&'a K, &'a V)>) -> Self {
        Self {
            pairs: iter.collect(),
        }
    }
}

impl<K: Serial, V: Serial> MapReader for PairReader<'_, K, V> {
    #[inline]
    fn key_serializer(&self) -> &'static dyn FieldSerializer {
        ValueSerializer::<K>::erased()
    }

    #[inline]
    fn value_serializer(&self) -> &'static dyn FieldSerializer {
        ValueSerializer::<V>::erased()
    }

    #[inline]
    fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    fn key(&self, i: usize) -> &dyn Any {
        self.pairs[i].0
    }

    #[inline]
    fn value(&self, i: usize) -> &dyn Any {
        self.pairs[i].1
    }
}

/// [`MapInserter`] with a staged key slot. Committing an already-present
/// key overwrites its value (insertion semantics; last write wins).
pub struct MapEntryInserter<'a, M, K> {
    map: &'a mut M,
    staged: K,
}

impl<'a, M, K: Default> MapEntryInserter<'a, M, K> {
    #[inline]
    pub fn new(map: &'a mut M) -> Self {
        Self {
            map,
            staged: K::default(),
        }
    }
}

impl<K, V> MapInserter for MapEntryInserter<'_, HashMap<K, V>, K>
where
    K: Serial + Default + Eq + Hash,
    V: Serial + Default,
{
    #[inline]
    fn key_serializer(&self) -> &'static dyn FieldSerializer {
        ValueSerializer::<K>::erased()
    }

    #[inline]
    fn value_serializer(&self) -> &'static dyn FieldSerializer {
        ValueSerializer::<V>::erased()
    }

    #[inline]
    fn key(&mut self) -> &mut dyn Any {
        &mut self.staged
    }

    fn insert(&mut self) -> Result<&mut dyn Any> {
        let key = mem::take(&mut self.staged);
        let slot = self
            .map
            .entry(key)
            .and_modify(|v| *v = V::default())
            .or_default();
        Ok(slot)
    }
}

impl<K, V> MapInserter for MapEntryInserter<'_, BTreeMap<K, V>, K>
where
    K: Serial + Default + Ord,
    V: Serial + Default,
{
    #[inline]
    fn key_serializer(&self) -> &'static dyn FieldSerializer {
        ValueSerializer::<K>::erased()
    }

    #[inline]
    fn value_serializer(&self) -> &'static dyn FieldSerializer {
        ValueSerializer::<V>::erased()
    }

    #[inline]
    fn key(&mut self) -> &mut dyn Any {
        &mut self.staged
    }

    fn insert(&mut self) -> Result<&mut dyn Any> {
        let key = mem::take(&mut self.staged);
        let slot = self
            .map
            .entry(key)
            .and_modify(|v| *v = V::default())
            .or_default();
        Ok(slot)
    }
}

// -----------------------------------------------------------------------------
// Serial impls

macro_rules! impl_serial_map {
    ($container:ident, $($key_bound:path),+) => {
        impl<K, V> Serial for $container<K, V>
        where
            K: Serial + Default $(+ $key_bound)+,
            V: Serial + Default,
        {
            #[inline]
            fn atom() -> Atom {
                Atom::Map
            }

            #[inline]
            fn is_optional() -> bool {
                true
            }

            #[inline]
            fn allocates() -> bool {
                K::allocates() || V::allocates()
            }

            #[inline]
            fn entries() -> Option<(&'static dyn FieldSerializer, &'static dyn FieldSerializer)> {
                Some((
                    ValueSerializer::<K>::erased(),
                    ValueSerializer::<V>::erased(),
                ))
            }

            fn size(&self, ar: &dyn OutArchiveRegistry) -> Result<u64> {
                ar.size_map(&PairReader::new(self.iter()))
            }

            fn serialize(&self, ar: &mut dyn OutArchiveRegistry) -> Result<()> {
                ar.write_map(&PairReader::new(self.iter()))
            }

            fn deserialize(&mut self, ar: &mut dyn InArchiveRegistry, _ncb: u64) -> Result<()> {
                ar.read_map(&mut MapEntryInserter::new(self))
            }
        }
    };
}

impl_serial_map!(HashMap, Eq, Hash);
impl_serial_map!(BTreeMap, Ord);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_resolution() {
        assert_eq!(<HashMap<u32, String> as Serial>::atom(), Atom::Map);
        assert!(<HashMap<u32, String> as Serial>::is_optional());
        assert!(!<BTreeMap<String, u64> as Serial>::allocates());

        let (k, v) = <BTreeMap<String, u64> as Serial>::entries().unwrap();
        assert_eq!(k.atom(), Atom::String);
        assert_eq!(v.atom(), Atom::U64);
    }

    #[test]
    fn duplicate_key_overwrites() {
        let mut map: HashMap<u32, String> = HashMap::new();
        let mut inserter = MapEntryInserter::new(&mut map);

        *inserter.key().downcast_mut::<u32>().unwrap() = 1;
        *inserter.insert().unwrap().downcast_mut::<String>().unwrap() = "first".into();

        *inserter.key().downcast_mut::<u32>().unwrap() = 1;
        *inserter.insert().unwrap().downcast_mut::<String>().unwrap() = "second".into();

        assert_eq!(map.len(), 1);
        assert_eq!(map[&1], "second");
    }

    #[test]
    fn pair_reader_snapshots_order() {
        let mut map = BTreeMap::new();
        map.insert(2u32, "b".to_string());
        map.insert(1u32, "a".to_string());

        let reader = PairReader::new(map.iter());
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.key(0).downcast_ref::<u32>(), Some(&1));
        assert_eq!(reader.key(1).downcast_ref::<u32>(), Some(&2));
    }
}
