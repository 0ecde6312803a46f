// -----------------------------------------------------------------------------
// VTable

/// The layout identity of a table: its byte size plus the slot offset of
/// every field (0 for absent fields). Tables with equal layouts share one
/// vtable in the output buffer; the vtable's own position is deliberately
/// not part of the identity.
#[derive(PartialEq, Eq, Clone)]
pub(crate) struct VTableKey {
    pub(crate) table_size: u16,
    pub(crate) field_offsets: Vec<u16>,
}

impl VTableKey {
    /// Size of the vtable itself: two `u16` headers plus one `u16` per
    /// field slot.
    #[inline]
    pub(crate) fn vt_size(&self) -> u16 {
        4 + 2 * self.field_offsets.len() as u16
    }

    /// The vtable's wire image: `[vt_size][table_size][offsets...]`, all
    /// little-endian `u16`.
    pub(crate) fn image(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.vt_size() as usize);
        out.extend_from_slice(&self.vt_size().to_le_bytes());
        out.extend_from_slice(&self.table_size.to_le_bytes());
        for off in &self.field_offsets {
            out.extend_from_slice(&off.to_le_bytes());
        }
        out
    }
}

/// The vtables already emitted this session, each with the end offset it
/// was written at.
pub(crate) struct VTableSet {
    entries: Vec<(VTableKey, u32)>,
}

impl VTableSet {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// End offset of an already-written identical vtable, if any.
    pub(crate) fn lookup(&self, key: &VTableKey) -> Option<u32> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|&(_, eo)| eo)
    }

    #[inline]
    pub(crate) fn insert(&mut self, key: VTableKey, eo: u32) {
        self.entries.push((key, eo));
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_position() {
        let a = VTableKey {
            table_size: 12,
            field_offsets: vec![4, 8],
        };
        let b = a.clone();

        let mut set = VTableSet::new();
        set.insert(a, 40);
        assert_eq!(set.lookup(&b), Some(40));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn distinct_layouts_do_not_collide() {
        let mut set = VTableSet::new();
        set.insert(
            VTableKey {
                table_size: 12,
                field_offsets: vec![4, 8],
            },
            40,
        );
        assert_eq!(
            set.lookup(&VTableKey {
                table_size: 12,
                field_offsets: vec![8, 4],
            }),
            None
        );
    }

    #[test]
    fn image_layout() {
        let key = VTableKey {
            table_size: 8,
            field_offsets: vec![4],
        };
        assert_eq!(key.vt_size(), 6);
        assert_eq!(key.image(), [6, 0, 8, 0, 4, 0]);
    }
}
